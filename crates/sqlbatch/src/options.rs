//! Batcher configuration
//!
//! Options are plain serde structs so they can be embedded in whatever
//! configuration file the host application already has.

use serde::{Deserialize, Serialize};
use sqlbatch_core::{Adapter, BatchError, Result};

use crate::hooks::HookFailurePolicy;
use crate::merger::MergeOrdering;
use crate::retry::{BackoffStrategy, RetryPolicy};

/// Configuration for a [`Batcher`](crate::Batcher).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherOptions {
    /// Byte ceiling for one batch before column adjustment
    pub max_bytes: usize,
    /// Delimiter appended to statements that lack one
    pub delimiter: String,
    /// Collect statements instead of executing them
    pub dry_run: bool,
    /// Fold compatible INSERT statements before execution
    pub merge_inserts: bool,
    /// Ceiling for merged statements (defaults to the adjusted batch ceiling)
    pub merge_max_bytes: Option<usize>,
    /// Placement of pass-through statements relative to merged INSERTs
    pub merge_ordering: MergeOrdering,
    /// Wrap each flush in a savepoint
    pub use_savepoints: bool,
    /// Record executed statements in the query collector
    pub collect_queries: bool,
    /// What to do when a hook returns an error
    pub hook_failure_policy: HookFailurePolicy,
    /// Column-count based ceiling adjustment
    pub columns: ColumnAdjustment,
    /// Retry behaviour for statement execution (None = no retries)
    pub retry: Option<RetryOptions>,
}

impl BatcherOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options seeded with the adapter's maximum query size.
    pub fn for_adapter(adapter: &dyn Adapter) -> Self {
        Self::default().with_max_bytes(adapter.max_query_size())
    }

    /// Parse options from a TOML document.
    ///
    /// Missing keys fall back to their defaults; the result is validated.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let options: Self = toml::from_str(source)
            .map_err(|e| BatchError::Configuration(format!("invalid batcher options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_merge_inserts(mut self, merge: bool) -> Self {
        self.merge_inserts = merge;
        self
    }

    pub fn with_merge_max_bytes(mut self, max_bytes: usize) -> Self {
        self.merge_max_bytes = Some(max_bytes);
        self
    }

    pub fn with_merge_ordering(mut self, ordering: MergeOrdering) -> Self {
        self.merge_ordering = ordering;
        self
    }

    pub fn with_savepoints(mut self, enabled: bool) -> Self {
        self.use_savepoints = enabled;
        self
    }

    pub fn with_collect_queries(mut self, collect: bool) -> Self {
        self.collect_queries = collect;
        self
    }

    pub fn with_hook_failure_policy(mut self, policy: HookFailurePolicy) -> Self {
        self.hook_failure_policy = policy;
        self
    }

    pub fn with_columns(mut self, columns: ColumnAdjustment) -> Self {
        self.columns = columns;
        self
    }

    /// Disable column-count based adjustment of the byte ceiling.
    pub fn without_column_adjustment(mut self) -> Self {
        self.columns.enabled = false;
        self
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Check the options for values the batcher cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_bytes == 0 {
            return Err(BatchError::Configuration(
                "max_bytes must be greater than zero".into(),
            ));
        }
        if self.delimiter.is_empty() {
            return Err(BatchError::Configuration(
                "delimiter must not be empty".into(),
            ));
        }
        if self.merge_max_bytes == Some(0) {
            return Err(BatchError::Configuration(
                "merge_max_bytes must be greater than zero".into(),
            ));
        }
        self.columns.validate()?;
        if let Some(retry) = &self.retry {
            retry.validate()?;
        }
        Ok(())
    }

    /// Retry policy derived from the retry options, if any.
    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        self.retry.as_ref().map(RetryOptions::to_policy)
    }
}

impl Default for BatcherOptions {
    fn default() -> Self {
        Self {
            max_bytes: 1_000_000,
            delimiter: ";".to_string(),
            dry_run: false,
            merge_inserts: true,
            merge_max_bytes: None,
            merge_ordering: MergeOrdering::default(),
            use_savepoints: true,
            collect_queries: false,
            hook_failure_policy: HookFailurePolicy::default(),
            columns: ColumnAdjustment::default(),
            retry: None,
        }
    }
}

/// Column-count based adjustment of the batch byte ceiling.
///
/// Wide rows get smaller batches and narrow rows larger ones:
/// `factor = clamp(reference_column_count / detected, min_factor, max_factor)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnAdjustment {
    pub enabled: bool,
    pub reference_column_count: usize,
    pub min_factor: f64,
    pub max_factor: f64,
}

impl ColumnAdjustment {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_reference_column_count(mut self, count: usize) -> Self {
        self.reference_column_count = count;
        self
    }

    pub fn with_bounds(mut self, min_factor: f64, max_factor: f64) -> Self {
        self.min_factor = min_factor;
        self.max_factor = max_factor;
        self
    }

    /// Adjustment factor for a detected column count.
    pub fn factor_for(&self, detected_columns: usize) -> f64 {
        let raw = self.reference_column_count as f64 / detected_columns.max(1) as f64;
        raw.clamp(self.min_factor, self.max_factor)
    }

    fn validate(&self) -> Result<()> {
        if self.reference_column_count == 0 {
            return Err(BatchError::Configuration(
                "reference_column_count must be greater than zero".into(),
            ));
        }
        if !(self.min_factor > 0.0) || self.min_factor > self.max_factor {
            return Err(BatchError::Configuration(format!(
                "invalid adjustment bounds: min {} max {}",
                self.min_factor, self.max_factor
            )));
        }
        Ok(())
    }
}

impl Default for ColumnAdjustment {
    fn default() -> Self {
        Self {
            enabled: true,
            reference_column_count: 5,
            min_factor: 0.2,
            max_factor: 5.0,
        }
    }
}

/// Retry settings in configuration-friendly units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds
    pub retry_delay_ms: u64,
    /// Growth factor per attempt (1.0 = constant delay)
    pub backoff_multiplier: f64,
    /// Cap for the delay in milliseconds
    pub max_delay_ms: u64,
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Retry only errors classed as retryable; every error otherwise
    pub retryable_only: bool,
}

impl RetryOptions {
    pub fn new(max_retries: u32, retry_delay_ms: u64) -> Self {
        Self {
            max_retries,
            retry_delay_ms,
            ..Self::default()
        }
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_retryable_only(mut self, retryable_only: bool) -> Self {
        self.retryable_only = retryable_only;
        self
    }

    pub fn to_policy(&self) -> RetryPolicy {
        let backoff = BackoffStrategy::exponential(self.retry_delay_ms, self.max_delay_ms)
            .with_multiplier(self.backoff_multiplier);
        let mut policy = RetryPolicy::new(self.max_retries).with_backoff(backoff);
        if self.retryable_only {
            policy = policy.retryable_only();
        }
        match self.timeout_ms {
            Some(ms) => policy.with_timeout(std::time::Duration::from_millis(ms)),
            None => policy,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.backoff_multiplier >= 1.0) {
            return Err(BatchError::Configuration(format!(
                "backoff_multiplier must be at least 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.timeout_ms == Some(0) {
            return Err(BatchError::Configuration(
                "timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1_000,
            backoff_multiplier: 1.0,
            max_delay_ms: 60_000,
            timeout_ms: None,
            retryable_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_options_default() {
        let options = BatcherOptions::default();

        assert_eq!(options.max_bytes, 1_000_000);
        assert_eq!(options.delimiter, ";");
        assert!(!options.dry_run);
        assert!(options.merge_inserts);
        assert!(options.use_savepoints);
        assert_eq!(options.merge_ordering, MergeOrdering::PreserveBarriers);
        assert_eq!(options.hook_failure_policy, HookFailurePolicy::Isolate);
        assert!(options.retry.is_none());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_builder() {
        let options = BatcherOptions::new()
            .with_max_bytes(4_096)
            .with_delimiter("\n")
            .with_dry_run(true)
            .with_merge_inserts(false)
            .with_merge_max_bytes(2_048)
            .with_savepoints(false)
            .with_retry(RetryOptions::new(5, 10));

        assert_eq!(options.max_bytes, 4_096);
        assert_eq!(options.delimiter, "\n");
        assert!(options.dry_run);
        assert!(!options.merge_inserts);
        assert_eq!(options.merge_max_bytes, Some(2_048));
        assert!(!options.use_savepoints);
        assert_eq!(options.retry.as_ref().map(|r| r.max_retries), Some(5));
    }

    #[test]
    fn test_from_toml_with_partial_document() {
        let source = r#"
            max_bytes = 250000
            dry_run = true
            merge_ordering = "inserts_first"

            [columns]
            reference_column_count = 8

            [retry]
            max_retries = 2
            retry_delay_ms = 50
            timeout_ms = 1000
        "#;

        let options = BatcherOptions::from_toml_str(source).expect("should parse");

        assert_eq!(options.max_bytes, 250_000);
        assert!(options.dry_run);
        assert_eq!(options.merge_ordering, MergeOrdering::InsertsFirst);
        assert_eq!(options.columns.reference_column_count, 8);
        assert_eq!(options.columns.min_factor, 0.2);
        let retry = options.retry.expect("retry section present");
        assert_eq!(retry.max_retries, 2);
        assert_eq!(retry.backoff_multiplier, 1.0);
        assert_eq!(retry.timeout_ms, Some(1_000));
    }

    #[test]
    fn test_from_toml_rejects_invalid_values() {
        assert!(BatcherOptions::from_toml_str("max_bytes = 0").is_err());
        assert!(BatcherOptions::from_toml_str("delimiter = \"\"").is_err());
        assert!(BatcherOptions::from_toml_str("max_bytes = \"big\"").is_err());

        let inverted = "[columns]\nmin_factor = 3.0\nmax_factor = 1.0";
        assert!(matches!(
            BatcherOptions::from_toml_str(inverted),
            Err(BatchError::Configuration(_))
        ));
    }

    #[test]
    fn test_column_factor_clamps() {
        let columns = ColumnAdjustment::default();

        assert_eq!(columns.factor_for(5), 1.0);
        assert_eq!(columns.factor_for(10), 0.5);
        assert_eq!(columns.factor_for(100), 0.2);
        assert_eq!(columns.factor_for(1), 5.0);
        // zero columns never divides by zero
        assert_eq!(columns.factor_for(0), 5.0);
    }

    #[test]
    fn test_retry_options_to_policy() {
        let policy = RetryOptions::new(2, 100)
            .with_backoff_multiplier(2.0)
            .with_max_delay_ms(300)
            .with_timeout_ms(50)
            .to_policy();

        assert_eq!(policy.max_retries(), 2);
        assert_eq!(policy.timeout(), Some(Duration::from_millis(50)));
        assert_eq!(policy.backoff().calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff().calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff().calculate_delay(5), Duration::from_millis(300));
        assert!(!policy.is_retryable_only());
        assert!(RetryOptions::default().with_retryable_only(true).to_policy().is_retryable_only());
    }

    #[test]
    fn test_options_serialization_roundtrip() {
        let options = BatcherOptions::new()
            .with_max_bytes(10)
            .with_retry(RetryOptions::default());

        let json = serde_json::to_string(&options).unwrap();
        let deserialized: BatcherOptions = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, options);
    }
}
