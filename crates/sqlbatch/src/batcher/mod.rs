//! The batcher orchestrator
//!
//! Composes the assembler, the INSERT merger, savepoint-guarded execution
//! with optional retries and the hook pipeline behind one entry point.


use std::future::Future;
use std::sync::Arc;

use sqlbatch_core::{Adapter, Metadata, Result, Savepoint, SavepointNamer, Statement};

use crate::assembler::BatchAssembler;
use crate::collector::{CollectedQuery, QueryCollector};
use crate::executor::{SavepointGuard, run_statements};
use crate::hooks::{HookPipeline, HookType, Plugin};
use crate::merger::InsertMerger;
use crate::options::BatcherOptions;
use crate::retry::RetryPolicy;

/// Statements inspected up front to settle the column count.
const COLUMN_PRESCAN: usize = 5;

/// Size-aware SQL batcher.
///
/// One instance owns one open batch. Methods that flush take `&mut self`,
/// so two flushes of the same batcher can never overlap; use separate
/// instances for parallel ingestion.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use sqlbatch::{Adapter, Batcher, Result};
/// # async fn run(adapter: Arc<dyn Adapter>) -> Result<()> {
/// let mut batcher = Batcher::new(adapter);
/// let statements = [
///     "INSERT INTO t (a, b) VALUES (1, 2)",
///     "INSERT INTO t (a, b) VALUES (3, 4)",
/// ];
/// let processed = batcher.process_with_adapter(&statements).await?;
/// assert_eq!(processed, 2);
/// # Ok(())
/// # }
/// ```
pub struct Batcher {
    adapter: Arc<dyn Adapter>,
    options: BatcherOptions,
    assembler: BatchAssembler,
    merger: InsertMerger,
    pipeline: HookPipeline,
    retry: Option<RetryPolicy>,
    collector: QueryCollector,
    namer: SavepointNamer,
    metadata: Metadata,
}

impl Batcher {
    /// Batcher with default options sized to the adapter's query limit.
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        let options = BatcherOptions::for_adapter(adapter.as_ref());
        Self::build(adapter, options)
    }

    /// Batcher with explicit options, validated first.
    pub fn with_options(adapter: Arc<dyn Adapter>, options: BatcherOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(adapter, options))
    }

    fn build(adapter: Arc<dyn Adapter>, options: BatcherOptions) -> Self {
        let merger = InsertMerger::new(options.max_bytes)
            .with_ordering(options.merge_ordering)
            .with_delimiter(options.delimiter.clone());
        Self {
            assembler: BatchAssembler::from_options(&options),
            pipeline: HookPipeline::new().with_policy(options.hook_failure_policy),
            retry: options.retry_policy(),
            collector: QueryCollector::new(),
            namer: SavepointNamer::new(),
            metadata: Metadata::new(),
            merger,
            adapter,
            options,
        }
    }

    /// Override the retry policy derived from the options.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn with_savepoint_namer(mut self, namer: SavepointNamer) -> Self {
        self.namer = namer;
        self
    }

    pub fn options(&self) -> &BatcherOptions {
        &self.options
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    /// Statements waiting in the open batch.
    pub fn pending(&self) -> &[Statement] {
        self.assembler.statements()
    }

    pub fn current_size(&self) -> usize {
        self.assembler.current_size()
    }

    pub fn assembler(&self) -> &BatchAssembler {
        &self.assembler
    }

    /// Discard the open batch.
    pub fn reset(&mut self) {
        self.assembler.reset();
    }

    // Plugins

    pub fn register_plugin(&mut self, plugin: impl Into<Plugin>) -> Result<()> {
        self.pipeline.register(plugin)
    }

    pub fn unregister_plugin(&mut self, name: &str) -> Result<Plugin> {
        self.pipeline.unregister(name)
    }

    pub fn pipeline(&self) -> &HookPipeline {
        &self.pipeline
    }

    // Metadata and collected queries

    /// Metadata copied into every flush and shown to its hooks.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn collector(&self) -> &QueryCollector {
        &self.collector
    }

    pub fn take_collected(&mut self) -> Vec<CollectedQuery> {
        self.collector.take()
    }

    // Batching

    /// Add a statement to the open batch.
    ///
    /// Returns true once the batch has reached its adjusted ceiling; the
    /// caller should flush then.
    pub fn add_statement(&mut self, sql: &str) -> bool {
        self.assembler.add_statement(sql)
    }

    /// Flush the open batch through `callback`, one statement per call.
    ///
    /// Returns the number of buffered statements consumed. The open batch is
    /// cleared whether or not the flush succeeds.
    #[tracing::instrument(skip(self, callback), fields(pending = self.assembler.len()))]
    pub async fn flush<F, Fut, R>(&mut self, mut callback: F) -> Result<usize>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        self.flush_pending(&mut callback).await
    }

    /// Flush the open batch through the adapter's own `execute`.
    pub async fn flush_with_adapter(&mut self) -> Result<usize> {
        let adapter = self.adapter.clone();
        self.flush(move |sql: String| {
            let adapter = adapter.clone();
            async move { adapter.execute(&sql).await }
        })
        .await
    }

    /// Batch, merge and execute a list of statements.
    ///
    /// Batches are flushed before they would pass the adjusted ceiling, and
    /// statements larger than the ceiling on their own are flushed alone.
    /// Anything already pending in the open batch goes first.
    #[tracing::instrument(skip_all, fields(statements = statements.len()))]
    pub async fn process_statements<S, F, Fut, R>(
        &mut self,
        statements: &[S],
        mut callback: F,
    ) -> Result<usize>
    where
        S: AsRef<str>,
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        if statements.is_empty() {
            return self.flush_pending(&mut callback).await;
        }

        self.prescan_columns(statements);

        let mut processed = 0;
        for sql in statements {
            let sql = sql.as_ref();
            self.assembler.observe_columns(sql);
            let statement = self.assembler.normalize(sql);

            if self.assembler.is_oversized(&statement) {
                tracing::debug!(
                    bytes = statement.byte_len(),
                    max = self.assembler.adjusted_max_bytes(),
                    "statement exceeds batch ceiling; executing alone"
                );
                processed += self.flush_pending(&mut callback).await?;
                processed += self.run_flush(vec![statement], &mut callback).await?;
                continue;
            }

            if self.assembler.would_overflow(&statement) {
                processed += self.flush_pending(&mut callback).await?;
            }
            if self.assembler.add_statement(sql) {
                processed += self.flush_pending(&mut callback).await?;
            }
        }

        processed += self.flush_pending(&mut callback).await?;
        Ok(processed)
    }

    /// [`process_statements`](Self::process_statements) through the adapter.
    pub async fn process_with_adapter<S: AsRef<str>>(&mut self, statements: &[S]) -> Result<usize> {
        let adapter = self.adapter.clone();
        self.process_statements(statements, move |sql: String| {
            let adapter = adapter.clone();
            async move { adapter.execute(&sql).await }
        })
        .await
    }

    /// Flush whatever is left through the adapter and reset.
    ///
    /// Call this when done with the batcher. `OnError` hooks fire if the
    /// final flush fails; state is reset either way.
    pub async fn finish(&mut self) -> Result<usize> {
        let result = self.flush_with_adapter().await;
        self.assembler.reset();
        result
    }

    fn prescan_columns<S: AsRef<str>>(&mut self, statements: &[S]) {
        if !self.options.columns.enabled || self.assembler.column_count().is_some() {
            return;
        }
        for sql in statements.iter().take(COLUMN_PRESCAN) {
            if self.assembler.observe_columns(sql.as_ref()) {
                tracing::info!(
                    columns = ?self.assembler.column_count(),
                    factor = self.assembler.adjustment_factor(),
                    effective_max_bytes = self.assembler.adjusted_max_bytes(),
                    base_max_bytes = self.assembler.max_bytes(),
                    "column-based batch sizing active"
                );
                break;
            }
        }
    }

    async fn flush_pending<F, Fut, R>(&mut self, callback: &mut F) -> Result<usize>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let merge_limit = self
            .options
            .merge_max_bytes
            .unwrap_or_else(|| self.assembler.adjusted_max_bytes());
        self.merger.set_max_bytes(merge_limit);

        let batch = self.assembler.take();
        self.run_flush(batch, callback).await
    }

    /// One flush of `batch`: hooks, merge, savepoint, execution.
    async fn run_flush<F, Fut, R>(&mut self, batch: Vec<Statement>, callback: &mut F) -> Result<usize>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let count = batch.len();
        if count == 0 {
            return Ok(0);
        }

        let statements: Vec<String> = batch.into_iter().map(String::from).collect();
        let mut metadata = self.metadata.clone();
        let mut guard = None;

        let outcome = self
            .execute_batch(statements.clone(), &mut metadata, &mut guard, callback)
            .await;

        match outcome {
            Ok(executed) => {
                let executed_count = executed.len();
                let executed =
                    self.pipeline
                        .notify(HookType::PostExecute, executed, &mut metadata, None);
                self.pipeline
                    .notify(HookType::PostBatch, executed, &mut metadata, None);
                if let Some(guard) = guard {
                    guard.release().await?;
                }
                tracing::info!(
                    statements = count,
                    executed = executed_count,
                    dry_run = self.options.dry_run,
                    "batch flushed"
                );
                Ok(count)
            }
            Err(err) => {
                self.pipeline
                    .notify(HookType::OnError, statements, &mut metadata, Some(&err));
                if let Some(guard) = guard {
                    if let Err(rollback_err) = guard.rollback().await {
                        tracing::error!(
                            error = %rollback_err,
                            cause = %err,
                            "rollback to savepoint failed"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    /// Everything between taking the batch and its final outcome.
    ///
    /// On success returns the statements as executed (or collected, in dry
    /// run). A created savepoint is left in `guard` for the caller to
    /// resolve.
    async fn execute_batch<F, Fut, R>(
        &mut self,
        statements: Vec<String>,
        metadata: &mut Metadata,
        guard: &mut Option<SavepointGuard>,
        callback: &mut F,
    ) -> Result<Vec<String>>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let statements = self
            .pipeline
            .fire(HookType::PreBatch, statements, metadata, None)?;

        let statements = if self.options.merge_inserts {
            self.merger.merge(&statements)?
        } else {
            statements
        };

        let statements = self
            .pipeline
            .fire(HookType::PreExecute, statements, metadata, None)?;

        if self.options.dry_run {
            for sql in &statements {
                self.collector.collect(sql.as_str(), metadata);
            }
            return Ok(statements);
        }

        if self.options.use_savepoints {
            *guard = Some(SavepointGuard::create(self.adapter.clone(), self.namer.next()).await?);
        }

        run_statements(&statements, self.retry.as_ref(), callback).await?;

        if self.options.collect_queries {
            for sql in &statements {
                self.collector.collect(sql.as_str(), metadata);
            }
        }
        Ok(statements)
    }

    // Savepoints and transactions

    /// Create a named savepoint the caller resolves explicitly.
    pub async fn savepoint(&self, name: &str) -> Result<SavepointGuard> {
        SavepointGuard::create(self.adapter.clone(), Savepoint::new(name)).await
    }

    /// Run `f` inside a savepoint: released when `f` succeeds, rolled back
    /// when it fails.
    pub async fn with_savepoint<F, Fut, T>(&self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Adapter>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let guard = self.savepoint(name).await?;
        match f(self.adapter.clone()).await {
            Ok(value) => {
                guard.release().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = guard.rollback().await {
                    tracing::error!(error = %rollback_err, cause = %err, "rollback to savepoint failed");
                }
                Err(err)
            }
        }
    }

    pub async fn begin_transaction(&self) -> Result<()> {
        self.adapter.begin_transaction().await
    }

    pub async fn commit_transaction(&self) -> Result<()> {
        self.adapter.commit_transaction().await
    }

    pub async fn rollback_transaction(&self) -> Result<()> {
        self.adapter.rollback_transaction().await
    }

    pub async fn close(&self) -> Result<()> {
        self.adapter.close().await
    }
}

impl std::fmt::Debug for Batcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batcher")
            .field("adapter", &self.adapter.name())
            .field("options", &self.options)
            .field("pending", &self.assembler.len())
            .field("plugins", &self.pipeline.plugin_names())
            .finish_non_exhaustive()
    }
}
