//! Savepoint identity
//!
//! A savepoint is a named marker inside a transaction that can be rolled back
//! to without aborting the whole transaction. The batcher creates exactly one
//! per flush, so names only have to be unique per batch attempt.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Name of one savepoint the batcher rolls back to or releases.
///
/// The name is passed to the adapter verbatim, so it must already be a
/// valid identifier for the target database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Savepoint(String);

impl Savepoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn into_name(self) -> String {
        self.0
    }
}

impl fmt::Display for Savepoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Savepoint {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Generates savepoint names unique to one batcher instance.
///
/// Names combine a random per-instance prefix with a monotonic counter, so
/// two batchers sharing a connection never collide and one batcher never
/// reuses a name.
#[derive(Debug)]
pub struct SavepointNamer {
    prefix: String,
    counter: AtomicU64,
}

impl SavepointNamer {
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self::with_prefix(format!("sqlbatch_{}", &id[..8]))
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Produce the next savepoint.
    pub fn next(&self) -> Savepoint {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Savepoint::new(format!("{}_{}", self.prefix, n))
    }

    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for SavepointNamer {
    fn default() -> Self {
        Self::new()
    }
}
