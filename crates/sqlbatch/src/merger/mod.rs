//! INSERT statement merging
//!
//! Compatible `INSERT ... VALUES` statements (same table, same column set)
//! are folded into one multi-row INSERT. Merged statements never exceed the
//! configured byte ceiling: oversized groups are split in half until every
//! part fits or consists of a single original statement, which is emitted
//! untouched.

mod parse;
mod stream;

use std::collections::HashMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use sqlbatch_core::Result;

use parse::{Classified, GroupKey, ParsedInsert, split_tuple};

/// Default ceiling for merged statements.
pub const DEFAULT_MERGE_MAX_BYTES: usize = 900_000;

/// Ratio of the ceiling at which the streaming merger flushes a group early.
pub const DEFAULT_EARLY_FLUSH_RATIO: f64 = 0.6;

/// Placement of pass-through statements relative to merged INSERT groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOrdering {
    /// Pass-through statements are barriers: INSERTs are only merged with
    /// INSERTs between the same two barriers, and every merged group is
    /// emitted before the barrier that ends its run.
    #[default]
    PreserveBarriers,
    /// All merged INSERT groups first, then every pass-through statement in
    /// its original order.
    InsertsFirst,
}

/// Folds compatible INSERT statements into multi-row INSERTs.
#[derive(Debug, Clone)]
pub struct InsertMerger {
    max_bytes: usize,
    ordering: MergeOrdering,
    delimiter: String,
    early_flush_ratio: f64,
    pending: Vec<TableGroup>,
}

impl InsertMerger {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            ordering: MergeOrdering::default(),
            delimiter: String::new(),
            early_flush_ratio: DEFAULT_EARLY_FLUSH_RATIO,
            pending: Vec::new(),
        }
    }

    pub fn with_ordering(mut self, ordering: MergeOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Delimiter appended to statements the merger generates.
    ///
    /// Statements emitted unmerged keep their own text.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_early_flush_ratio(mut self, ratio: f64) -> Self {
        self.early_flush_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn set_max_bytes(&mut self, max_bytes: usize) {
        self.max_bytes = max_bytes;
    }

    pub fn ordering(&self) -> MergeOrdering {
        self.ordering
    }

    /// Merge a list of statements.
    ///
    /// Every statement is validated before any grouping happens, so one
    /// malformed INSERT fails the whole call.
    pub fn merge<S: AsRef<str>>(&self, statements: &[S]) -> Result<Vec<String>> {
        let classified = statements
            .iter()
            .map(|s| parse::classify(s.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let mut output = Vec::with_capacity(statements.len());
        let mut passthrough = Vec::new();
        let mut run = GroupSet::default();

        for (statement, class) in statements.iter().zip(classified) {
            match class {
                Classified::Insert(insert) => run.add(insert),
                Classified::Passthrough => match self.ordering {
                    MergeOrdering::PreserveBarriers => {
                        self.drain_groups(&mut run, &mut output);
                        output.push(statement.as_ref().to_string());
                    }
                    MergeOrdering::InsertsFirst => {
                        passthrough.push(statement.as_ref().to_string());
                    }
                },
            }
        }

        self.drain_groups(&mut run, &mut output);
        output.extend(passthrough);

        tracing::debug!(
            input = statements.len(),
            output = output.len(),
            "merged INSERT statements"
        );
        Ok(output)
    }

    fn drain_groups(&self, groups: &mut GroupSet, output: &mut Vec<String>) {
        for group in groups.take() {
            output.extend(self.merge_group(&group));
        }
    }

    /// Render a group, splitting it until every part fits.
    ///
    /// Uses an explicit worklist instead of recursion; ranges are popped
    /// left-first so output keeps the group's member order.
    fn merge_group(&self, group: &TableGroup) -> Vec<String> {
        let mut output = Vec::new();
        let mut worklist = vec![0..group.members.len()];

        while let Some(range) = worklist.pop() {
            if range.len() == 1 {
                output.push(group.members[range.start].source.clone());
                continue;
            }

            let size = group.merged_len(range.clone(), &self.delimiter);
            if size <= self.max_bytes {
                output.push(group.render(range, &self.delimiter));
                continue;
            }

            let mid = range.start + range.len() / 2;
            tracing::debug!(
                table = %group.table,
                statements = range.len(),
                size,
                max = self.max_bytes,
                "merged INSERT too large; splitting"
            );
            worklist.push(mid..range.end);
            worklist.push(range.start..mid);
        }

        output
    }
}

impl Default for InsertMerger {
    fn default() -> Self {
        Self::new(DEFAULT_MERGE_MAX_BYTES)
    }
}

/// One original statement inside a group, with its tuples aligned to the
/// group's column order.
#[derive(Debug, Clone)]
struct Member {
    source: String,
    tuples: Vec<String>,
}

/// Pending INSERTs sharing one [`GroupKey`].
#[derive(Debug, Clone)]
struct TableGroup {
    key: GroupKey,
    table: String,
    columns_raw: Option<String>,
    columns: Option<Vec<String>>,
    members: Vec<Member>,
}

impl TableGroup {
    fn new(head: ParsedInsert) -> Self {
        let mut group = Self {
            key: head.key.clone(),
            table: head.table.clone(),
            columns_raw: head.columns_raw.clone(),
            columns: head.columns.clone(),
            members: Vec::new(),
        };
        group.push(head);
        group
    }

    fn push(&mut self, insert: ParsedInsert) {
        let tuples = match (&self.columns, &insert.columns) {
            (Some(order), Some(columns)) if order != columns => {
                realign(&insert.tuples, columns, order)
            }
            _ => insert.tuples,
        };
        self.members.push(Member {
            source: insert.source,
            tuples,
        });
    }

    fn tuple_count(&self) -> usize {
        self.members.iter().map(|m| m.tuples.len()).sum()
    }

    fn prefix(&self) -> String {
        match &self.columns_raw {
            Some(columns) => format!("INSERT INTO {} {} VALUES ", self.table, columns),
            None => format!("INSERT INTO {} VALUES ", self.table),
        }
    }

    /// Byte length of the merged statement for `range` without rendering it.
    fn merged_len(&self, range: Range<usize>, delimiter: &str) -> usize {
        let mut tuples = 0;
        let mut bytes = 0;
        for member in &self.members[range] {
            tuples += member.tuples.len();
            bytes += member.tuples.iter().map(String::len).sum::<usize>();
        }
        self.prefix().len() + bytes + 2 * tuples.saturating_sub(1) + delimiter.len()
    }

    fn render(&self, range: Range<usize>, delimiter: &str) -> String {
        let tuples: Vec<&str> = self.members[range]
            .iter()
            .flat_map(|m| m.tuples.iter().map(String::as_str))
            .collect();
        format!("{}{}{}", self.prefix(), tuples.join(", "), delimiter)
    }
}

/// Reorder each tuple's values from `from` column order into `to` order.
fn realign(tuples: &[String], from: &[String], to: &[String]) -> Vec<String> {
    let positions: Vec<usize> = to
        .iter()
        .filter_map(|name| from.iter().position(|c| c == name))
        .collect();

    tuples
        .iter()
        .map(|tuple| {
            let values = split_tuple(tuple);
            let ordered: Vec<&str> = positions
                .iter()
                .filter_map(|&i| values.get(i).copied())
                .collect();
            format!("({})", ordered.join(", "))
        })
        .collect()
}

/// Groups keyed by compatibility, kept in first-seen order.
#[derive(Debug, Default)]
struct GroupSet {
    groups: Vec<TableGroup>,
    index: HashMap<GroupKey, usize>,
}

impl GroupSet {
    fn add(&mut self, insert: ParsedInsert) {
        match self.index.get(&insert.key) {
            Some(&idx) => self.groups[idx].push(insert),
            None => {
                self.index.insert(insert.key.clone(), self.groups.len());
                self.groups.push(TableGroup::new(insert));
            }
        }
    }

    fn take(&mut self) -> Vec<TableGroup> {
        self.index.clear();
        std::mem::take(&mut self.groups)
    }
}
