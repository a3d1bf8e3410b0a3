//! Blocking batcher
//!
//! A synchronous front over [`crate::Batcher`] for callers without an async
//! runtime. It owns a current-thread tokio runtime and drives every
//! operation to completion on the calling thread, so it must not be used
//! from inside another tokio runtime.

use std::future::ready;
use std::sync::Arc;

use sqlbatch_core::{Adapter, BlockingAdapter, BlockingBridge, Metadata, Result, Statement};
use tokio::runtime::{Builder, Runtime};

use crate::collector::{CollectedQuery, QueryCollector};
use crate::hooks::{HookPipeline, Plugin};
use crate::options::BatcherOptions;

/// Synchronous batcher over a [`BlockingAdapter`].
///
/// # Example
///
/// ```no_run
/// use sqlbatch::{CallbackAdapter, blocking};
///
/// let adapter = CallbackAdapter::new(|sql: &str| {
///     println!("{sql}");
///     Ok(vec![])
/// });
/// let mut batcher = blocking::Batcher::new(adapter)?;
/// batcher.process_with_adapter(&["INSERT INTO t (a) VALUES (1)"])?;
/// # Ok::<(), sqlbatch::BatchError>(())
/// ```
pub struct Batcher {
    inner: crate::Batcher,
    runtime: Runtime,
}

impl Batcher {
    pub fn new(adapter: impl BlockingAdapter + 'static) -> Result<Self> {
        let adapter: Arc<dyn Adapter> = Arc::new(BlockingBridge::new(adapter));
        let inner = crate::Batcher::new(adapter);
        Self::wrap(inner)
    }

    pub fn with_options(adapter: impl BlockingAdapter + 'static, options: BatcherOptions) -> Result<Self> {
        let adapter: Arc<dyn Adapter> = Arc::new(BlockingBridge::new(adapter));
        let inner = crate::Batcher::with_options(adapter, options)?;
        Self::wrap(inner)
    }

    fn wrap(inner: crate::Batcher) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { inner, runtime })
    }

    /// The async batcher this one drives.
    pub fn inner(&self) -> &crate::Batcher {
        &self.inner
    }

    pub fn options(&self) -> &BatcherOptions {
        self.inner.options()
    }

    pub fn pending(&self) -> &[Statement] {
        self.inner.pending()
    }

    pub fn current_size(&self) -> usize {
        self.inner.current_size()
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }

    pub fn add_statement(&mut self, sql: &str) -> bool {
        self.inner.add_statement(sql)
    }

    /// Flush the open batch through `callback`, one statement per call.
    pub fn flush<F, R>(&mut self, mut callback: F) -> Result<usize>
    where
        F: FnMut(&str) -> Result<R>,
    {
        let Self { inner, runtime } = self;
        runtime.block_on(inner.flush(|sql: String| ready(callback(&sql))))
    }

    pub fn flush_with_adapter(&mut self) -> Result<usize> {
        let Self { inner, runtime } = self;
        runtime.block_on(inner.flush_with_adapter())
    }

    pub fn process_statements<S, F, R>(&mut self, statements: &[S], mut callback: F) -> Result<usize>
    where
        S: AsRef<str>,
        F: FnMut(&str) -> Result<R>,
    {
        let Self { inner, runtime } = self;
        runtime.block_on(inner.process_statements(statements, |sql: String| ready(callback(&sql))))
    }

    pub fn process_with_adapter<S: AsRef<str>>(&mut self, statements: &[S]) -> Result<usize> {
        let Self { inner, runtime } = self;
        runtime.block_on(inner.process_with_adapter(statements))
    }

    pub fn finish(&mut self) -> Result<usize> {
        let Self { inner, runtime } = self;
        runtime.block_on(inner.finish())
    }

    pub fn register_plugin(&mut self, plugin: impl Into<Plugin>) -> Result<()> {
        self.inner.register_plugin(plugin)
    }

    pub fn unregister_plugin(&mut self, name: &str) -> Result<Plugin> {
        self.inner.unregister_plugin(name)
    }

    pub fn pipeline(&self) -> &HookPipeline {
        self.inner.pipeline()
    }

    pub fn metadata(&self) -> &Metadata {
        self.inner.metadata()
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.inner.set_metadata(key, value);
    }

    pub fn collector(&self) -> &QueryCollector {
        self.inner.collector()
    }

    pub fn take_collected(&mut self) -> Vec<CollectedQuery> {
        self.inner.take_collected()
    }

    /// Run `f` inside a named savepoint: released on success, rolled back on
    /// error.
    pub fn with_savepoint<T>(&self, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.runtime
            .block_on(self.inner.with_savepoint(name, |_| ready(f())))
    }

    pub fn begin_transaction(&self) -> Result<()> {
        self.runtime.block_on(self.inner.begin_transaction())
    }

    pub fn commit_transaction(&self) -> Result<()> {
        self.runtime.block_on(self.inner.commit_transaction())
    }

    pub fn rollback_transaction(&self) -> Result<()> {
        self.runtime.block_on(self.inner.rollback_transaction())
    }

    pub fn close(&self) -> Result<()> {
        self.runtime.block_on(self.inner.close())
    }
}

impl std::fmt::Debug for Batcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("blocking::Batcher").field(&self.inner).finish()
    }
}
