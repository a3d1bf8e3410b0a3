//! Query collection for dry runs and auditing

use serde::Serialize;
use sqlbatch_core::Metadata;

/// A statement recorded by the collector, with the flush metadata at the
/// time it was recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedQuery {
    pub sql: String,
    pub metadata: Metadata,
}

/// Records statements instead of, or in addition to, executing them.
#[derive(Debug, Clone, Default)]
pub struct QueryCollector {
    queries: Vec<CollectedQuery>,
}

impl QueryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(&mut self, sql: impl Into<String>, metadata: &Metadata) {
        self.queries.push(CollectedQuery {
            sql: sql.into(),
            metadata: metadata.clone(),
        });
    }

    pub fn queries(&self) -> &[CollectedQuery] {
        &self.queries
    }

    /// Collected SQL text only, in collection order.
    pub fn statements(&self) -> Vec<&str> {
        self.queries.iter().map(|q| q.sql.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Remove and return everything collected so far.
    pub fn take(&mut self) -> Vec<CollectedQuery> {
        std::mem::take(&mut self.queries)
    }

    pub fn reset(&mut self) {
        self.queries.clear();
    }
}
