//! Retry with backoff
//!
//! A composable layer around any fallible async operation: bounded attempts,
//! constant or exponential delays and an optional per-attempt timeout.

mod backoff;
mod policy;

pub use backoff::BackoffStrategy;
pub use policy::{RetryInfo, RetryPolicy, execute_with_retry};
