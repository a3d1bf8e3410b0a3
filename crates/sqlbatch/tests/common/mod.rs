//! Common test utilities and mocks

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use sqlbatch::{Adapter, BatchError, BlockingAdapter, Result, Row};

/// Mock adapter for exercising the batcher without a database.
///
/// Every call is appended to a shared log as `kind:argument`, and executions
/// can be made to fail by their 1-based position.
pub struct MockAdapter {
    pub name: String,
    pub max_query_size: usize,
    /// 1-based execute calls that fail
    pub fail_on: Vec<usize>,
    /// Fail any execute whose SQL contains this text
    pub fail_matching: Option<String>,
    pub savepoint_failure: bool,
    pub execute_count: Arc<parking_lot::Mutex<usize>>,
    pub call_log: Arc<parking_lot::Mutex<Vec<String>>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            max_query_size: sqlbatch::DEFAULT_MAX_QUERY_SIZE,
            fail_on: Vec::new(),
            fail_matching: None,
            savepoint_failure: false,
            execute_count: Arc::new(parking_lot::Mutex::new(0)),
            call_log: Arc::new(parking_lot::Mutex::new(Vec::new())),
        }
    }

    pub fn with_max_query_size(mut self, size: usize) -> Self {
        self.max_query_size = size;
        self
    }

    pub fn failing_on(mut self, calls: &[usize]) -> Self {
        self.fail_on = calls.to_vec();
        self
    }

    pub fn failing_matching(mut self, needle: impl Into<String>) -> Self {
        self.fail_matching = Some(needle.into());
        self
    }

    pub fn with_savepoint_failure(mut self) -> Self {
        self.savepoint_failure = true;
        self
    }

    pub fn call_log(&self) -> Vec<String> {
        self.call_log.lock().clone()
    }

    /// Calls of one kind, e.g. `count("execute")`.
    pub fn count(&self, kind: &str) -> usize {
        let prefix = format!("{}:", kind);
        self.call_log
            .lock()
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    /// SQL passed to execute, in call order.
    pub fn executed(&self) -> Vec<String> {
        self.call_log
            .lock()
            .iter()
            .filter_map(|c| c.strip_prefix("execute:").map(str::to_string))
            .collect()
    }

    fn record(&self, kind: &str, argument: &str) {
        self.call_log.lock().push(format!("{}:{}", kind, argument));
    }

    fn run(&self, sql: &str) -> Result<Vec<Row>> {
        let n = {
            let mut count = self.execute_count.lock();
            *count += 1;
            *count
        };
        self.record("execute", sql);

        let matches = self
            .fail_matching
            .as_deref()
            .is_some_and(|needle| sql.contains(needle));
        if self.fail_on.contains(&n) || matches {
            return Err(BatchError::execution(&self.name, sql, "mock failure"));
        }
        Ok(Vec::new())
    }

    fn savepoint_call(&self, kind: &str, name: &str) -> Result<()> {
        self.record(kind, name);
        if self.savepoint_failure {
            return Err(BatchError::savepoint(name, "mock savepoint failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        self.run(sql)
    }

    fn max_query_size(&self) -> usize {
        self.max_query_size
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.record("begin", "");
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        self.record("commit", "");
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        self.record("rollback_transaction", "");
        Ok(())
    }

    async fn create_savepoint(&self, name: &str) -> Result<()> {
        self.savepoint_call("create_savepoint", name)
    }

    async fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        self.record("rollback_to_savepoint", name);
        Ok(())
    }

    async fn release_savepoint(&self, name: &str) -> Result<()> {
        self.record("release_savepoint", name);
        Ok(())
    }

    fn supports_savepoints(&self) -> bool {
        true
    }
}

impl BlockingAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        self.run(sql)
    }

    fn max_query_size(&self) -> usize {
        self.max_query_size
    }

    fn begin_transaction(&self) -> Result<()> {
        self.record("begin", "");
        Ok(())
    }

    fn commit_transaction(&self) -> Result<()> {
        self.record("commit", "");
        Ok(())
    }

    fn create_savepoint(&self, name: &str) -> Result<()> {
        self.savepoint_call("create_savepoint", name)
    }

    fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        self.record("rollback_to_savepoint", name);
        Ok(())
    }

    fn release_savepoint(&self, name: &str) -> Result<()> {
        self.record("release_savepoint", name);
        Ok(())
    }

    fn supports_savepoints(&self) -> bool {
        true
    }
}

/// `count` single-row INSERTs into `table` with columns (id, name).
pub fn inserts(table: &str, count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| format!("INSERT INTO {} (id, name) VALUES ({}, 'row{}')", table, i, i))
        .collect()
}
