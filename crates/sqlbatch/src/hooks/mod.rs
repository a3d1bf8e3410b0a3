//! Hook pipeline
//!
//! Plugins bind functions to fixed points of the flush lifecycle. Every
//! firing builds one [`HookContext`] that all hooks of that point share, so
//! a hook can rewrite the statement list for the hooks after it and for the
//! batcher itself.
//!
//! Firing order per flush:
//!
//! - `PreBatch` - buffered statements, before merging
//! - `PreExecute` - statements about to be sent, after merging
//! - `PostExecute` - every statement succeeded
//! - `PostBatch` - end of a successful batch
//! - `OnError` - instead of the two post hooks, once, with the error

mod builtin;
mod context;
mod pipeline;
mod plugin;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use builtin::{BatchMetrics, MetricsCollector, QueryLogger, SqlPreprocessor};
pub use context::HookContext;
pub use pipeline::HookPipeline;
pub use plugin::Plugin;

/// A point in the flush lifecycle where hooks fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookType {
    PreBatch,
    PostBatch,
    PreExecute,
    PostExecute,
    OnError,
}

impl HookType {
    pub const ALL: [HookType; 5] = [
        HookType::PreBatch,
        HookType::PostBatch,
        HookType::PreExecute,
        HookType::PostExecute,
        HookType::OnError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookType::PreBatch => "pre_batch",
            HookType::PostBatch => "post_batch",
            HookType::PreExecute => "pre_execute",
            HookType::PostExecute => "post_execute",
            HookType::OnError => "on_error",
        }
    }

    /// Hooks that run before any statement is sent.
    pub fn is_pre(&self) -> bool {
        matches!(self, HookType::PreBatch | HookType::PreExecute)
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a failing hook does to the flush it fires in.
///
/// `OnError` hook failures are always logged and swallowed, and post hooks
/// never fail a flush that already succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookFailurePolicy {
    /// Log the failure and keep running the remaining hooks
    #[default]
    Isolate,
    /// Fail the flush when a `PreBatch` or `PreExecute` hook fails
    AbortOnPreHook,
}

/// A hook function. Hooks observe and mutate the shared context.
pub type HookFn = Arc<dyn Fn(&mut HookContext<'_>) -> anyhow::Result<()> + Send + Sync>;
