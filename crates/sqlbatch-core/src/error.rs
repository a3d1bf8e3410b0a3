//! Error types for sqlbatch

use std::time::Duration;

use thiserror::Error;

/// Core error type for batching operations
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Failed to connect to database using {adapter} adapter: {message}")]
    AdapterConnection { adapter: String, message: String },

    #[error("Failed to execute query using {adapter} adapter: {message}")]
    AdapterExecution {
        adapter: String,
        sql: String,
        message: String,
    },

    #[error("Batch size {size} exceeds maximum allowed size of {max}")]
    BatchSizeExceeded { size: usize, max: usize },

    #[error("Insert merge failed: {0}")]
    InsertMerger(String),

    #[error("Maximum number of retries ({max_retries}) exceeded after {attempts} attempts")]
    MaxRetriesExceeded {
        max_retries: u32,
        attempts: u32,
        #[source]
        source: Box<BatchError>,
    },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("Savepoint '{name}' failed: {message}")]
    Savepoint { name: String, message: String },

    #[error("Hook {hook} failed: {message}")]
    Hook { hook: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BatchError {
    /// Build an execution error for a statement run through the named adapter.
    pub fn execution(
        adapter: impl Into<String>,
        sql: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::AdapterExecution {
            adapter: adapter.into(),
            sql: sql.into(),
            message: message.into(),
        }
    }

    pub fn savepoint(name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Savepoint {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Whether the failed operation is worth running again.
    ///
    /// Savepoint, merger, plugin, hook and configuration failures are never
    /// transient. Retry policies consult this only when restricted to
    /// retryable errors; by default every error is retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            BatchError::AdapterConnection { .. } => true,
            BatchError::AdapterExecution { .. } => true,
            BatchError::Timeout(_) => true,
            BatchError::Io(_) => true,
            BatchError::Other(_) => true,
            BatchError::BatchSizeExceeded { .. } => false,
            BatchError::InsertMerger(_) => false,
            BatchError::MaxRetriesExceeded { .. } => false,
            BatchError::Plugin(_) => false,
            BatchError::Savepoint { .. } => false,
            BatchError::Hook { .. } => false,
            BatchError::Configuration(_) => false,
        }
    }

    /// The SQL text carried by an execution error, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            BatchError::AdapterExecution { sql, .. } => Some(sql),
            BatchError::MaxRetriesExceeded { source, .. } => source.sql(),
            _ => None,
        }
    }

    /// The error that ultimately caused a retry exhaustion, or `self`.
    pub fn root_cause(&self) -> &BatchError {
        match self {
            BatchError::MaxRetriesExceeded { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias for sqlbatch operations
pub type Result<T> = std::result::Result<T, BatchError>;
