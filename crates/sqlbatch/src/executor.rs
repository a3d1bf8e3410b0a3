//! Savepoint-guarded statement execution
//!
//! A flush moves through `Idle -> SavepointCreated -> Executing` and ends
//! either `Released` or `RolledBack`. Savepoint operations are never retried;
//! only the per-statement callback is.

use std::future::Future;
use std::sync::Arc;

use sqlbatch_core::{Adapter, BatchError, Result, Savepoint};

use crate::retry::{RetryPolicy, execute_with_retry};

/// A savepoint created on an adapter that must be released or rolled back.
///
/// Dropping an unresolved guard leaves the savepoint in place and logs a
/// warning; there is no async drop to clean it up.
pub struct SavepointGuard {
    adapter: Arc<dyn Adapter>,
    savepoint: Savepoint,
    resolved: bool,
}

impl SavepointGuard {
    /// Create `savepoint` on the adapter.
    pub async fn create(adapter: Arc<dyn Adapter>, savepoint: Savepoint) -> Result<Self> {
        adapter
            .create_savepoint(savepoint.name())
            .await
            .map_err(|err| savepoint_error(savepoint.name(), err))?;
        tracing::debug!(
            savepoint = %savepoint,
            adapter = %adapter.name(),
            supported = adapter.supports_savepoints(),
            "created savepoint"
        );
        Ok(Self {
            adapter,
            savepoint,
            resolved: false,
        })
    }

    pub fn name(&self) -> &str {
        self.savepoint.name()
    }

    pub fn savepoint(&self) -> &Savepoint {
        &self.savepoint
    }

    /// Keep the work done since the savepoint.
    pub async fn release(mut self) -> Result<()> {
        self.resolved = true;
        self.adapter
            .release_savepoint(self.savepoint.name())
            .await
            .map_err(|err| savepoint_error(self.savepoint.name(), err))?;
        tracing::debug!(savepoint = %self.savepoint, "released savepoint");
        Ok(())
    }

    /// Undo the work done since the savepoint.
    pub async fn rollback(mut self) -> Result<()> {
        self.resolved = true;
        self.adapter
            .rollback_to_savepoint(self.savepoint.name())
            .await
            .map_err(|err| savepoint_error(self.savepoint.name(), err))?;
        tracing::debug!(savepoint = %self.savepoint, "rolled back to savepoint");
        Ok(())
    }
}

impl std::fmt::Debug for SavepointGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavepointGuard")
            .field("savepoint", &self.savepoint)
            .field("adapter", &self.adapter.name())
            .field("resolved", &self.resolved)
            .finish()
    }
}

impl Drop for SavepointGuard {
    fn drop(&mut self) {
        if !self.resolved {
            tracing::warn!(
                savepoint = %self.savepoint,
                "savepoint guard dropped without release or rollback"
            );
        }
    }
}

fn savepoint_error(name: &str, err: BatchError) -> BatchError {
    match err {
        err @ BatchError::Savepoint { .. } => err,
        other => BatchError::savepoint(name, other),
    }
}

/// Run statements one at a time through `callback`, stopping at the first
/// failure. Each invocation is retried under `retry` when given.
pub(crate) async fn run_statements<F, Fut, R>(
    statements: &[String],
    retry: Option<&RetryPolicy>,
    callback: &mut F,
) -> Result<usize>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    for (idx, sql) in statements.iter().enumerate() {
        let outcome = match retry {
            Some(policy) => execute_with_retry(policy, || callback(sql.clone())).await,
            None => callback(sql.clone()).await,
        };
        if let Err(err) = outcome {
            tracing::debug!(
                statement = idx + 1,
                of = statements.len(),
                error = %err,
                "statement failed; skipping the rest of the batch"
            );
            return Err(err);
        }
    }
    Ok(statements.len())
}
