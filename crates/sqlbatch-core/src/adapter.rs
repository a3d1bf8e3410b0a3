//! Adapter contract
//!
//! The batcher never owns a database connection. Callers hand it an adapter
//! implementing this narrow contract; everything else (pooling, credentials,
//! wire protocol) stays on the caller's side.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Result, Row};

/// Default maximum query size for adapters that do not know better.
pub const DEFAULT_MAX_QUERY_SIZE: usize = 500_000;

/// Async adapter used by the concurrent batcher.
///
/// Transaction and savepoint methods default to no-ops so adapters for
/// engines without savepoints still work; rollback-to-savepoint then becomes
/// a best-effort signal only.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Adapter name used in error messages and logs (e.g. "trino", "postgresql").
    fn name(&self) -> &str;

    /// Execute a statement and return any rows it produced.
    async fn execute(&self, sql: &str) -> Result<Vec<Row>>;

    /// Maximum query payload the target engine accepts, in bytes.
    fn max_query_size(&self) -> usize {
        DEFAULT_MAX_QUERY_SIZE
    }

    async fn begin_transaction(&self) -> Result<()> {
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        Ok(())
    }

    async fn create_savepoint(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn rollback_to_savepoint(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn release_savepoint(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    /// Whether the savepoint methods do real work.
    fn supports_savepoints(&self) -> bool {
        false
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: Adapter + ?Sized> Adapter for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        (**self).execute(sql).await
    }

    fn max_query_size(&self) -> usize {
        (**self).max_query_size()
    }

    async fn begin_transaction(&self) -> Result<()> {
        (**self).begin_transaction().await
    }

    async fn commit_transaction(&self) -> Result<()> {
        (**self).commit_transaction().await
    }

    async fn rollback_transaction(&self) -> Result<()> {
        (**self).rollback_transaction().await
    }

    async fn create_savepoint(&self, name: &str) -> Result<()> {
        (**self).create_savepoint(name).await
    }

    async fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        (**self).rollback_to_savepoint(name).await
    }

    async fn release_savepoint(&self, name: &str) -> Result<()> {
        (**self).release_savepoint(name).await
    }

    fn supports_savepoints(&self) -> bool {
        (**self).supports_savepoints()
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}

/// Synchronous adapter used by the blocking batcher.
pub trait BlockingAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, sql: &str) -> Result<Vec<Row>>;

    fn max_query_size(&self) -> usize {
        DEFAULT_MAX_QUERY_SIZE
    }

    fn begin_transaction(&self) -> Result<()> {
        Ok(())
    }

    fn commit_transaction(&self) -> Result<()> {
        Ok(())
    }

    fn rollback_transaction(&self) -> Result<()> {
        Ok(())
    }

    fn create_savepoint(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn rollback_to_savepoint(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn release_savepoint(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn supports_savepoints(&self) -> bool {
        false
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Exposes a [`BlockingAdapter`] through the async [`Adapter`] contract.
///
/// Each call runs to completion on the calling thread, which is what the
/// blocking batcher wants: its runtime only ever drives this one adapter.
#[derive(Debug)]
pub struct BlockingBridge<A> {
    inner: A,
}

impl<A: BlockingAdapter> BlockingBridge<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn into_inner(self) -> A {
        self.inner
    }
}

#[async_trait]
impl<A: BlockingAdapter> Adapter for BlockingBridge<A> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        self.inner.execute(sql)
    }

    fn max_query_size(&self) -> usize {
        self.inner.max_query_size()
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.inner.begin_transaction()
    }

    async fn commit_transaction(&self) -> Result<()> {
        self.inner.commit_transaction()
    }

    async fn rollback_transaction(&self) -> Result<()> {
        self.inner.rollback_transaction()
    }

    async fn create_savepoint(&self, name: &str) -> Result<()> {
        self.inner.create_savepoint(name)
    }

    async fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        self.inner.rollback_to_savepoint(name)
    }

    async fn release_savepoint(&self, name: &str) -> Result<()> {
        self.inner.release_savepoint(name)
    }

    fn supports_savepoints(&self) -> bool {
        self.inner.supports_savepoints()
    }

    async fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

/// Adapter built from a plain execute function.
///
/// Useful when no dedicated adapter exists for an engine: the caller supplies
/// the function that runs SQL and, optionally, a close function and a query
/// size limit. Transactions and savepoints are no-ops.
pub struct CallbackAdapter<F> {
    name: String,
    execute: F,
    close: Option<Box<dyn Fn() -> Result<()> + Send + Sync>>,
    max_query_size: usize,
}

impl<F> CallbackAdapter<F>
where
    F: Fn(&str) -> Result<Vec<Row>> + Send + Sync,
{
    pub fn new(execute: F) -> Self {
        Self {
            name: "generic".to_string(),
            execute,
            close: None,
            max_query_size: DEFAULT_MAX_QUERY_SIZE,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_query_size(mut self, max_query_size: usize) -> Self {
        self.max_query_size = max_query_size;
        self
    }

    pub fn with_close(mut self, close: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        self.close = Some(Box::new(close));
        self
    }

    pub fn set_max_query_size(&mut self, max_query_size: usize) {
        self.max_query_size = max_query_size;
    }
}

impl<F> std::fmt::Debug for CallbackAdapter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackAdapter")
            .field("name", &self.name)
            .field("max_query_size", &self.max_query_size)
            .finish_non_exhaustive()
    }
}

impl<F> BlockingAdapter for CallbackAdapter<F>
where
    F: Fn(&str) -> Result<Vec<Row>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        tracing::debug!(adapter = %self.name, bytes = sql.len(), "executing through callback adapter");
        (self.execute)(sql)
    }

    fn max_query_size(&self) -> usize {
        self.max_query_size
    }

    fn close(&self) -> Result<()> {
        match &self.close {
            Some(close) => close(),
            None => Ok(()),
        }
    }
}
