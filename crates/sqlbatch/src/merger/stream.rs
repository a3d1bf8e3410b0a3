//! Streaming merge
//!
//! Statements are fed one at a time. One group is kept pending per table and
//! flushed when an incompatible INSERT for the same table arrives, when the
//! group grows past the early-flush threshold, or when a pass-through
//! statement needs everything before it executed first.

use sqlbatch_core::Result;

use super::parse::{self, Classified};
use super::{InsertMerger, TableGroup};

impl InsertMerger {
    /// Feed one statement to the streaming merger.
    ///
    /// Returns the statements that became ready, in execution order. An
    /// empty vector means the statement was buffered.
    pub fn add_statement(&mut self, sql: &str) -> Result<Vec<String>> {
        let insert = match parse::classify(sql)? {
            Classified::Insert(insert) => insert,
            Classified::Passthrough => {
                let mut ready = self.flush_all();
                ready.push(sql.to_string());
                return Ok(ready);
            }
        };

        let Some(idx) = self
            .pending
            .iter()
            .position(|g| g.key.table == insert.key.table)
        else {
            self.pending.push(TableGroup::new(insert));
            return Ok(Vec::new());
        };

        if self.pending[idx].key != insert.key {
            tracing::debug!(table = %insert.key.table, "incompatible INSERT; flushing pending group");
            let flushed = self.merge_group(&self.pending[idx]);
            self.pending[idx] = TableGroup::new(insert);
            return Ok(flushed);
        }

        let group = &self.pending[idx];
        let tentative = group.merged_len(0..group.members.len(), &self.delimiter)
            + insert.tuples.iter().map(|t| t.len() + 2).sum::<usize>();
        let threshold = (self.max_bytes as f64 * self.early_flush_ratio) as usize;

        if tentative > threshold && group.tuple_count() >= 2 {
            tracing::debug!(
                table = %insert.key.table,
                tentative,
                threshold,
                "pending group past early-flush threshold"
            );
            let flushed = self.merge_group(group);
            self.pending[idx] = TableGroup::new(insert);
            return Ok(flushed);
        }

        self.pending[idx].push(insert);
        Ok(Vec::new())
    }

    /// Flush the pending group for `table`, if any.
    pub fn flush_table(&mut self, table: &str) -> Vec<String> {
        let table = parse::strip_identifier_quotes(table);
        match self.pending.iter().position(|g| g.key.table == table) {
            Some(idx) => {
                let group = self.pending.remove(idx);
                self.merge_group(&group)
            }
            None => Vec::new(),
        }
    }

    /// Flush every pending group in first-seen order.
    pub fn flush_all(&mut self) -> Vec<String> {
        let groups = std::mem::take(&mut self.pending);
        groups
            .iter()
            .flat_map(|group| self.merge_group(group))
            .collect()
    }

    /// Number of statements buffered across all pending groups.
    pub fn pending_len(&self) -> usize {
        self.pending.iter().map(|g| g.members.len()).sum()
    }

    /// Tables with a pending group, in first-seen order.
    pub fn pending_tables(&self) -> Vec<&str> {
        self.pending.iter().map(|g| g.key.table.as_str()).collect()
    }
}
