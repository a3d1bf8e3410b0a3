//! Common value types

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A result row returned by an adapter.
pub type Row = Vec<serde_json::Value>;

/// Free-form metadata attached to a flush and shared with every hook firing.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A single SQL statement held in a batch.
///
/// The text is normalized once on construction and never changes afterwards;
/// hooks that rewrite SQL produce new statements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statement {
    sql: String,
}

impl Statement {
    /// Create a statement from raw text, trimming surrounding whitespace.
    pub fn new(sql: impl AsRef<str>) -> Self {
        Self {
            sql: sql.as_ref().trim().to_string(),
        }
    }

    /// Create a statement that is guaranteed to end with `delimiter`.
    pub fn with_delimiter(sql: impl AsRef<str>, delimiter: &str) -> Self {
        let trimmed = sql.as_ref().trim();
        if delimiter.is_empty() || trimmed.ends_with(delimiter) {
            Self::new(trimmed)
        } else {
            Self {
                sql: format!("{}{}", trimmed, delimiter),
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.sql
    }

    /// Size of the statement in bytes once UTF-8 encoded.
    pub fn byte_len(&self) -> usize {
        self.sql.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn into_string(self) -> String {
        self.sql
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

impl AsRef<str> for Statement {
    fn as_ref(&self) -> &str {
        &self.sql
    }
}

impl From<Statement> for String {
    fn from(statement: Statement) -> Self {
        statement.sql
    }
}
