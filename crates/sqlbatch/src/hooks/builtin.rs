//! Built-in plugins

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::{HookType, Plugin};

type RewriteFn = Arc<dyn Fn(&str) -> String + Send + Sync>;
type LogFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Rewrites every statement before merging and again before execution.
#[derive(Clone)]
pub struct SqlPreprocessor {
    rewrite: RewriteFn,
}

impl SqlPreprocessor {
    pub const NAME: &'static str = "sql_preprocessor";

    pub fn new(rewrite: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            rewrite: Arc::new(rewrite),
        }
    }

    pub fn plugin(&self) -> Plugin {
        let pre_batch = self.rewrite.clone();
        let pre_execute = self.rewrite.clone();
        Plugin::new(Self::NAME)
            .with_hook(HookType::PreBatch, move |ctx| {
                ctx.rewrite(|sql| pre_batch(sql));
                Ok(())
            })
            .with_hook(HookType::PreExecute, move |ctx| {
                ctx.rewrite(|sql| pre_execute(sql));
                Ok(())
            })
    }
}

impl From<SqlPreprocessor> for Plugin {
    fn from(preprocessor: SqlPreprocessor) -> Self {
        preprocessor.plugin()
    }
}

/// Counters gathered by [`MetricsCollector`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchMetrics {
    /// Statements in the most recent batch
    pub batch_size: usize,
    /// Bytes in the most recent batch
    pub batch_bytes: usize,
    pub successful_batches: u64,
    pub failed_batches: u64,
    pub errors: Vec<String>,
}

/// Records batch sizes and outcomes.
///
/// The collector is a handle; clones share the same counters, so keep one
/// around to read metrics after registering its plugin.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<Mutex<BatchMetrics>>,
}

impl MetricsCollector {
    pub const NAME: &'static str = "metrics_collector";

    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the counters.
    pub fn metrics(&self) -> BatchMetrics {
        self.metrics.lock().clone()
    }

    pub fn reset(&self) {
        *self.metrics.lock() = BatchMetrics::default();
    }

    pub fn plugin(&self) -> Plugin {
        let on_batch = self.metrics.clone();
        let on_success = self.metrics.clone();
        let on_error = self.metrics.clone();

        Plugin::new(Self::NAME)
            .with_hook(HookType::PreBatch, move |ctx| {
                let mut metrics = on_batch.lock();
                metrics.batch_size = ctx.statements().len();
                metrics.batch_bytes = ctx.statements().iter().map(String::len).sum();
                Ok(())
            })
            .with_hook(HookType::PostBatch, move |_| {
                on_success.lock().successful_batches += 1;
                Ok(())
            })
            .with_hook(HookType::OnError, move |ctx| {
                let mut metrics = on_error.lock();
                metrics.failed_batches += 1;
                if let Some(err) = ctx.error() {
                    metrics.errors.push(err.to_string());
                }
                Ok(())
            })
    }
}

impl From<MetricsCollector> for Plugin {
    fn from(collector: MetricsCollector) -> Self {
        collector.plugin()
    }
}

/// Logs statements before execution, counts after it, and errors.
///
/// Logs through `tracing` unless a custom sink is supplied.
#[derive(Clone, Default)]
pub struct QueryLogger {
    sink: Option<LogFn>,
}

impl QueryLogger {
    pub const NAME: &'static str = "query_logger";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_fn(log: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            sink: Some(Arc::new(log)),
        }
    }

    fn emitter(&self) -> impl Fn(String) + Send + Sync + 'static {
        let sink = self.sink.clone();
        move |line: String| match &sink {
            Some(sink) => sink(&line),
            None => tracing::info!(target: "sqlbatch::query_logger", "{}", line),
        }
    }

    pub fn plugin(&self) -> Plugin {
        let before = self.emitter();
        let after = self.emitter();
        let failed = self.emitter();

        Plugin::new(Self::NAME)
            .with_hook(HookType::PreExecute, move |ctx| {
                for statement in ctx.statements() {
                    before(format!("Executing: {}", statement));
                }
                Ok(())
            })
            .with_hook(HookType::PostExecute, move |ctx| {
                after(format!("Executed {} statements", ctx.statements().len()));
                Ok(())
            })
            .with_hook(HookType::OnError, move |ctx| {
                if let Some(err) = ctx.error() {
                    failed(format!("Error: {}", err));
                }
                Ok(())
            })
    }
}

impl From<QueryLogger> for Plugin {
    fn from(logger: QueryLogger) -> Self {
        logger.plugin()
    }
}
