//! Property-style tests for the INSERT merger
//!
//! Runs the merger over deterministic statement mixes and checks the
//! invariants that must hold for any input: no rows lost or invented, the
//! byte limit honored, merging twice changes nothing.

mod common;

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use sqlbatch::{InsertMerger, MergeOrdering};

use common::inserts;

/// Interleaved inserts into three tables with a barrier every seventh statement.
fn mixed_workload(count: usize) -> Vec<String> {
    let tables = ["users", "orders", "events"];
    (0..count)
        .map(|i| {
            if i % 7 == 6 {
                format!("UPDATE counters SET n = n + 1 WHERE id = {}", i)
            } else {
                let table = tables[i % tables.len()];
                format!("INSERT INTO {} (id, name) VALUES ({}, 'v{}')", table, i, i)
            }
        })
        .collect()
}

/// Value tuples per table, in the order they appear.
fn rows_by_table(statements: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut rows: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for sql in statements.iter().filter(|s| s.starts_with("INSERT")) {
        let table = sql
            .split_whitespace()
            .nth(2)
            .unwrap_or_default()
            .to_string();
        let values = &sql[sql.find(" VALUES ").unwrap() + " VALUES ".len()..];
        let values = values.trim_end_matches(';');
        for tuple in values.split("), (") {
            let tuple = tuple.trim_start_matches('(').trim_end_matches(')');
            rows.entry(table.clone()).or_default().push(tuple.to_string());
        }
    }
    rows
}

fn barriers(statements: &[String]) -> Vec<&str> {
    statements
        .iter()
        .filter(|s| !s.starts_with("INSERT"))
        .map(String::as_str)
        .collect()
}

#[test]
fn rows_are_preserved_in_order_per_table() {
    for count in [1, 5, 20, 64] {
        let input = mixed_workload(count);

        let merged = InsertMerger::new(10_000).merge(&input).unwrap();

        assert_eq!(rows_by_table(&merged), rows_by_table(&input), "count = {}", count);
        assert_eq!(barriers(&merged), barriers(&input));
    }
}

#[test]
fn merging_reduces_statement_count() {
    let input = inserts("users", 50);

    let merged = InsertMerger::new(10_000).merge(&input).unwrap();

    assert_eq!(merged.len(), 1);
    assert_eq!(rows_by_table(&merged)["users"].len(), 50);
}

#[test]
fn outputs_respect_max_bytes() {
    for max_bytes in [60, 100, 250, 1_000] {
        let input = mixed_workload(80);

        let merged = InsertMerger::new(max_bytes).merge(&input).unwrap();

        for sql in merged.iter().filter(|s| s.contains("), (")) {
            assert!(
                sql.len() <= max_bytes,
                "{} bytes over limit {}: {}",
                sql.len(),
                max_bytes,
                sql
            );
        }
        assert_eq!(rows_by_table(&merged), rows_by_table(&input));
    }
}

#[test]
fn merging_twice_changes_nothing() {
    for max_bytes in [80, 400, 10_000] {
        let merger = InsertMerger::new(max_bytes);
        let once = merger.merge(&mixed_workload(40)).unwrap();

        let twice = merger.merge(&once).unwrap();

        assert_eq!(twice, once, "max_bytes = {}", max_bytes);
    }
}

#[test]
fn reordering_inserts_keeps_the_same_rows() {
    let forward = inserts("users", 12);
    let mut backward = forward.clone();
    backward.reverse();
    let merger = InsertMerger::new(10_000).with_ordering(MergeOrdering::InsertsFirst);

    let mut a = rows_by_table(&merger.merge(&forward).unwrap())["users"].clone();
    let mut b = rows_by_table(&merger.merge(&backward).unwrap())["users"].clone();
    a.sort();
    b.sort();

    assert_eq!(a, b);
}

#[test]
fn inserts_first_moves_barriers_after_inserts() {
    let input = mixed_workload(14);

    let merged = InsertMerger::new(10_000)
        .with_ordering(MergeOrdering::InsertsFirst)
        .merge(&input)
        .unwrap();

    let first_barrier = merged.iter().position(|s| !s.starts_with("INSERT")).unwrap();
    assert!(merged[..first_barrier].iter().all(|s| s.starts_with("INSERT")));
    assert!(merged[first_barrier..].iter().all(|s| !s.starts_with("INSERT")));
    assert_eq!(rows_by_table(&merged), rows_by_table(&input));
}

#[test]
fn streaming_matches_batch_merge_rows() {
    let input = mixed_workload(30);
    let mut merger = InsertMerger::new(10_000);
    let mut streamed = Vec::new();

    for sql in &input {
        streamed.extend(merger.add_statement(sql).unwrap());
    }
    streamed.extend(merger.flush_all());

    assert_eq!(merger.pending_len(), 0);
    assert_eq!(rows_by_table(&streamed), rows_by_table(&input));
}
