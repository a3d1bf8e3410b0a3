//! sqlbatch - Size-aware SQL statement batching
//!
//! This crate accumulates SQL statements into batches bounded by a byte
//! ceiling, folds compatible INSERT statements into multi-row INSERTs, and
//! executes the result under savepoint protection with optional retries.
//! Plugins observe and rewrite statements at fixed points of every flush.

pub mod assembler;
mod batcher;
pub mod blocking;
mod collector;
mod executor;
pub mod hooks;
pub mod merger;
mod options;
pub mod retry;

pub use assembler::BatchAssembler;
pub use batcher::Batcher;
pub use collector::{CollectedQuery, QueryCollector};
pub use executor::SavepointGuard;
pub use hooks::{
    HookContext, HookFailurePolicy, HookFn, HookPipeline, HookType, MetricsCollector, Plugin,
    QueryLogger, SqlPreprocessor,
};
pub use merger::{InsertMerger, MergeOrdering};
pub use options::{BatcherOptions, ColumnAdjustment, RetryOptions};
pub use retry::{BackoffStrategy, RetryPolicy, execute_with_retry};

// Re-export the core abstractions so callers need a single dependency
pub use sqlbatch_core::{
    Adapter, BatchError, BlockingAdapter, BlockingBridge, CallbackAdapter, DEFAULT_MAX_QUERY_SIZE,
    Metadata, Result, Row, Savepoint, SavepointNamer, Statement,
};
