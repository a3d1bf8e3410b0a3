//! Batch assembly
//!
//! The assembler accumulates statements until a byte ceiling is reached.
//! The ceiling is the configured `max_bytes` scaled by a factor derived from
//! the column count of the first INSERT in the batch, so batches of wide rows
//! stay smaller than batches of narrow ones.

mod columns;

pub use columns::detect_column_count;

use sqlbatch_core::{Result, Statement};

use crate::options::{BatcherOptions, ColumnAdjustment};

/// Accumulates statements into one open batch.
#[derive(Debug, Clone)]
pub struct BatchAssembler {
    max_bytes: usize,
    delimiter: String,
    columns: ColumnAdjustment,
    statements: Vec<Statement>,
    current_size: usize,
    column_count: Option<usize>,
    adjustment_factor: f64,
}

impl BatchAssembler {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            delimiter: ";".to_string(),
            columns: ColumnAdjustment::default(),
            statements: Vec::new(),
            current_size: 0,
            column_count: None,
            adjustment_factor: 1.0,
        }
    }

    pub fn from_options(options: &BatcherOptions) -> Self {
        Self::new(options.max_bytes)
            .with_delimiter(options.delimiter.clone())
            .with_column_adjustment(options.columns.clone())
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_column_adjustment(mut self, columns: ColumnAdjustment) -> Self {
        self.columns = columns;
        self
    }

    /// Normalize raw SQL the way the assembler stores it.
    pub fn normalize(&self, sql: &str) -> Statement {
        Statement::with_delimiter(sql, &self.delimiter)
    }

    /// Run column detection on `sql` unless this batch already has a count.
    ///
    /// Returns true when this call established the count.
    pub fn observe_columns(&mut self, sql: &str) -> bool {
        if !self.columns.enabled || self.column_count.is_some() {
            return false;
        }
        let Some(detected) = detect_column_count(sql) else {
            return false;
        };

        self.column_count = Some(detected);
        self.adjustment_factor = self.columns.factor_for(detected);
        tracing::debug!(
            columns = detected,
            reference = self.columns.reference_column_count,
            factor = self.adjustment_factor,
            "column-based batch size adjustment"
        );
        true
    }

    /// Add a statement to the open batch.
    ///
    /// Returns true when the batch has reached the adjusted ceiling and
    /// should be flushed.
    pub fn add_statement(&mut self, sql: &str) -> bool {
        self.observe_columns(sql);
        let statement = self.normalize(sql);
        self.current_size += statement.byte_len();
        self.statements.push(statement);
        self.current_size >= self.adjusted_max_bytes()
    }

    /// Whether adding `statement` would push a non-empty batch past the
    /// adjusted ceiling.
    pub fn would_overflow(&self, statement: &Statement) -> bool {
        !self.statements.is_empty()
            && self.current_size + statement.byte_len() > self.adjusted_max_bytes()
    }

    /// Whether `statement` is larger than the adjusted ceiling on its own.
    pub fn is_oversized(&self, statement: &Statement) -> bool {
        statement.byte_len() > self.adjusted_max_bytes()
    }

    /// The byte ceiling after column adjustment.
    pub fn adjusted_max_bytes(&self) -> usize {
        if !self.columns.enabled || self.adjustment_factor == 1.0 {
            return self.max_bytes;
        }
        ((self.max_bytes as f64 * self.adjustment_factor) as usize).max(1)
    }

    /// Execute the open batch as one newline-joined payload.
    ///
    /// Returns the number of statements flushed; an empty batch is a no-op.
    /// The batch is cleared before `execute` runs, so a failing callback
    /// leaves the assembler empty.
    pub fn flush<F>(&mut self, execute: F) -> Result<usize>
    where
        F: FnOnce(&str) -> Result<()>,
    {
        if self.statements.is_empty() {
            return Ok(0);
        }

        let statements = self.take();
        let count = statements.len();
        let payload = statements
            .iter()
            .map(Statement::as_str)
            .collect::<Vec<_>>()
            .join("\n");

        execute(&payload)?;
        Ok(count)
    }

    /// Remove and return the open batch, resetting the assembler.
    pub fn take(&mut self) -> Vec<Statement> {
        let statements = std::mem::take(&mut self.statements);
        self.reset();
        statements
    }

    /// Clear the batch and the detected column state.
    pub fn reset(&mut self) {
        self.statements.clear();
        self.current_size = 0;
        self.column_count = None;
        self.adjustment_factor = 1.0;
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Running size of the open batch in bytes.
    pub fn current_size(&self) -> usize {
        self.current_size
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn column_count(&self) -> Option<usize> {
        self.column_count
    }

    pub fn adjustment_factor(&self) -> f64 {
        self.adjustment_factor
    }
}
