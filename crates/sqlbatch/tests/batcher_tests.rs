//! Integration tests for the async Batcher
//!
//! Drives full flushes against the MockAdapter and checks the adapter call
//! sequence: savepoints, executions, rollbacks and hook order.

mod common;

use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use sqlbatch::{
    Adapter, BatchError, Batcher, BatcherOptions, HookType, MetricsCollector, Plugin,
    QueryLogger, RetryOptions, SqlPreprocessor,
};

use common::{MockAdapter, inserts};

fn batcher(adapter: &Arc<MockAdapter>, options: BatcherOptions) -> Batcher {
    Batcher::with_options(adapter.clone() as Arc<dyn Adapter>, options).unwrap()
}

fn plain() -> BatcherOptions {
    BatcherOptions::new().without_column_adjustment()
}

// ============ Savepoint protocol ============

#[tokio::test]
async fn failed_statement_rolls_back_and_skips_the_rest() {
    let adapter = Arc::new(MockAdapter::new().failing_on(&[2]));
    let mut batcher = batcher(&adapter, plain().with_merge_inserts(false));

    let result = batcher
        .process_with_adapter(&["UPDATE a SET x = 1", "UPDATE b SET x = 2", "UPDATE c SET x = 3"])
        .await;

    assert!(matches!(result, Err(BatchError::AdapterExecution { .. })));
    assert_eq!(adapter.count("create_savepoint"), 1);
    assert_eq!(adapter.count("rollback_to_savepoint"), 1);
    assert_eq!(adapter.count("release_savepoint"), 0);
    assert_eq!(
        adapter.executed(),
        vec!["UPDATE a SET x = 1;", "UPDATE b SET x = 2;"]
    );
}

#[tokio::test]
async fn every_successful_flush_releases_its_savepoint() {
    let adapter = Arc::new(MockAdapter::new());
    let mut batcher = batcher(&adapter, plain().with_max_bytes(120).with_merge_inserts(false));

    let processed = batcher.process_with_adapter(&inserts("users", 10)).await.unwrap();

    assert_eq!(processed, 10);
    assert!(adapter.count("create_savepoint") > 1);
    assert_eq!(adapter.count("create_savepoint"), adapter.count("release_savepoint"));
    assert_eq!(adapter.count("rollback_to_savepoint"), 0);
    assert_eq!(adapter.count("execute"), 10);
}

#[tokio::test]
async fn savepoint_failure_aborts_before_execution() {
    let adapter = Arc::new(MockAdapter::new().with_savepoint_failure());
    let mut batcher = batcher(&adapter, plain());

    let result = batcher.process_with_adapter(&["SELECT 1"]).await;

    assert!(matches!(result, Err(BatchError::Savepoint { .. })));
    assert_eq!(adapter.count("execute"), 0);
    assert_eq!(adapter.count("rollback_to_savepoint"), 0);
}

#[tokio::test]
async fn savepoints_can_be_disabled() {
    let adapter = Arc::new(MockAdapter::new());
    let mut batcher = batcher(&adapter, plain().with_savepoints(false));

    batcher.process_with_adapter(&inserts("users", 3)).await.unwrap();

    assert_eq!(adapter.count("create_savepoint"), 0);
    assert_eq!(adapter.count("execute"), 1);
}

#[tokio::test]
async fn transactions_pass_through() {
    let adapter = Arc::new(MockAdapter::new());
    let batcher = batcher(&adapter, plain());

    batcher.begin_transaction().await.unwrap();
    batcher.commit_transaction().await.unwrap();
    batcher.rollback_transaction().await.unwrap();

    assert_eq!(
        adapter.call_log(),
        vec!["begin:", "commit:", "rollback_transaction:"]
    );
}

#[tokio::test]
async fn explicit_savepoint_guard() {
    let adapter = Arc::new(MockAdapter::new());
    let batcher = batcher(&adapter, plain());

    let guard = batcher.savepoint("manual").await.unwrap();
    assert_eq!(guard.name(), "manual");
    guard.rollback().await.unwrap();

    assert_eq!(
        adapter.call_log(),
        vec!["create_savepoint:manual", "rollback_to_savepoint:manual"]
    );
}

// ============ Merging ============

#[tokio::test]
async fn inserts_merge_per_table_around_barriers() {
    let adapter = Arc::new(MockAdapter::new());
    let mut batcher = batcher(&adapter, plain());

    batcher
        .process_with_adapter(&[
            "INSERT INTO a (x) VALUES (1)",
            "INSERT INTO a (x) VALUES (2)",
            "DELETE FROM a WHERE x = 1",
            "INSERT INTO a (x) VALUES (3)",
        ])
        .await
        .unwrap();

    assert_eq!(
        adapter.executed(),
        vec![
            "INSERT INTO a (x) VALUES (1), (2);",
            "DELETE FROM a WHERE x = 1;",
            "INSERT INTO a (x) VALUES (3);",
        ]
    );
}

#[tokio::test]
async fn malformed_insert_fails_the_flush() {
    let adapter = Arc::new(MockAdapter::new());
    let mut batcher = batcher(&adapter, plain());

    let result = batcher
        .process_with_adapter(&["INSERT INTO a (x) VALUES (1", "SELECT 1"])
        .await;

    assert!(matches!(result, Err(BatchError::InsertMerger(_))));
    assert_eq!(adapter.count("execute"), 0);
}

#[tokio::test]
async fn merge_respects_merge_max_bytes() {
    let adapter = Arc::new(MockAdapter::new());
    let mut batcher = batcher(&adapter, plain().with_merge_max_bytes(120));

    batcher.process_with_adapter(&inserts("users", 12)).await.unwrap();

    let executed = adapter.executed();
    assert!(executed.len() > 1);
    for sql in &executed {
        // single-row statements may exceed the limit only on their own
        assert!(sql.len() <= 120 || !sql.contains("), ("), "too long: {}", sql);
    }
    let rows: usize = executed.iter().map(|sql| sql.matches("'row").count()).sum();
    assert_eq!(rows, 12);
}

// ============ Hooks ============

#[tokio::test]
async fn hooks_fire_in_order_and_observe_merged_sql() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let adapter = Arc::new(MockAdapter::new());
    let mut batcher = batcher(&adapter, plain());

    let mut plugin = Plugin::new("trace");
    for hook_type in HookType::ALL {
        let log = log.clone();
        plugin.add_hook(hook_type, move |ctx| {
            log.lock().push(format!("{}:{}", hook_type, ctx.statements().len()));
            Ok(())
        });
    }
    batcher.register_plugin(plugin).unwrap();

    batcher.process_with_adapter(&inserts("users", 3)).await.unwrap();

    assert_eq!(
        *log.lock(),
        vec!["pre_batch:3", "pre_execute:1", "post_execute:1", "post_batch:1"]
    );
}

#[tokio::test]
async fn builtin_plugins_work_together() {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    let metrics = MetricsCollector::new();
    let adapter = Arc::new(MockAdapter::new().failing_matching("fail"));
    let mut batcher = batcher(&adapter, plain());

    batcher
        .register_plugin(SqlPreprocessor::new(|sql| sql.replace("staging.", "")))
        .unwrap();
    batcher.register_plugin(metrics.clone()).unwrap();
    batcher
        .register_plugin(QueryLogger::with_log_fn(move |line| sink.lock().push(line.to_string())))
        .unwrap();

    batcher.process_with_adapter(&["UPDATE staging.t SET a = 1"]).await.unwrap();
    let failed = batcher.process_with_adapter(&["SELECT fail"]).await;

    assert!(failed.is_err());
    assert_eq!(adapter.executed(), vec!["UPDATE t SET a = 1;", "SELECT fail;"]);
    let snapshot = metrics.metrics();
    assert_eq!(snapshot.successful_batches, 1);
    assert_eq!(snapshot.failed_batches, 1);
    let lines = lines.lock();
    assert_eq!(lines[0], "Executing: UPDATE t SET a = 1;");
    assert_eq!(lines[1], "Executed 1 statements");
    assert!(lines.last().is_some_and(|l| l.starts_with("Error: ")));
}

#[tokio::test]
async fn unregistered_plugin_stops_firing() {
    let metrics = MetricsCollector::new();
    let adapter = Arc::new(MockAdapter::new());
    let mut batcher = batcher(&adapter, plain());
    batcher.register_plugin(metrics.clone()).unwrap();

    batcher.process_with_adapter(&["SELECT 1"]).await.unwrap();
    let removed = batcher.unregister_plugin(MetricsCollector::NAME).unwrap();
    batcher.process_with_adapter(&["SELECT 2"]).await.unwrap();

    assert_eq!(removed.name(), MetricsCollector::NAME);
    assert_eq!(metrics.metrics().successful_batches, 1);
    assert!(batcher.pipeline().is_empty());
}

// ============ Dry run, retry, finish ============

#[tokio::test]
async fn dry_run_never_touches_the_adapter() {
    let adapter = Arc::new(MockAdapter::new());
    let mut batcher = batcher(&adapter, plain().with_dry_run(true));
    batcher.set_metadata("run", 42);

    let processed = batcher.process_with_adapter(&inserts("users", 4)).await.unwrap();

    assert_eq!(processed, 4);
    assert!(adapter.call_log().is_empty());
    let collected = batcher.take_collected();
    assert_eq!(collected.len(), 1);
    assert!(collected[0].sql.starts_with("INSERT INTO users (id, name) VALUES (1, 'row1'), "));
    assert_eq!(collected[0].metadata["run"], serde_json::json!(42));
}

#[tokio::test(start_paused = true)]
async fn transient_failure_is_retried_inside_the_savepoint() {
    let adapter = Arc::new(MockAdapter::new().failing_on(&[1, 2]));
    let mut batcher = batcher(&adapter, plain().with_retry(RetryOptions::new(3, 100)));

    let processed = batcher.process_with_adapter(&["SELECT 1"]).await.unwrap();

    assert_eq!(processed, 1);
    assert_eq!(adapter.count("execute"), 3);
    assert_eq!(adapter.count("create_savepoint"), 1);
    assert_eq!(adapter.count("release_savepoint"), 1);
}

#[tokio::test]
async fn finish_flushes_remaining_statements() {
    let adapter = Arc::new(MockAdapter::new());
    let mut batcher = batcher(&adapter, plain());
    for sql in inserts("users", 2) {
        batcher.add_statement(&sql);
    }

    let flushed = batcher.finish().await.unwrap();

    assert_eq!(flushed, 2);
    assert_eq!(adapter.count("execute"), 1);
    assert!(batcher.pending().is_empty());
}

// ============ Sizing ============

#[tokio::test]
async fn batches_stay_under_the_ceiling() {
    let adapter = Arc::new(MockAdapter::new());
    let mut batcher = batcher(&adapter, plain().with_max_bytes(200).with_merge_inserts(false));
    let sizes = Arc::new(Mutex::new(Vec::new()));
    let observed = sizes.clone();
    batcher
        .register_plugin(Plugin::new("sizes").with_hook(HookType::PreBatch, move |ctx| {
            observed.lock().push(ctx.statements().iter().map(String::len).sum::<usize>());
            Ok(())
        }))
        .unwrap();

    batcher.process_with_adapter(&inserts("users", 20)).await.unwrap();

    let sizes = sizes.lock();
    assert!(sizes.len() > 1);
    assert!(sizes.iter().all(|&bytes| bytes <= 200), "sizes: {:?}", sizes);
}

#[tokio::test]
async fn adapter_limit_sets_default_ceiling() {
    let adapter = Arc::new(MockAdapter::new().with_max_query_size(64));
    let batcher = Batcher::new(adapter as Arc<dyn Adapter>);

    assert_eq!(batcher.options().max_bytes, 64);
}
