//! INSERT column-count detection
//!
//! Detection is pattern based and only has to be good enough to size
//! batches; malformed statements simply yield `None`.

use std::sync::LazyLock;

use regex::Regex;

/// Leading `INSERT INTO` keyword pair.
static INSERT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*INSERT\s+INTO\b").expect("valid regex"));

/// `VALUES` keyword followed by an opening parenthesis.
static VALUES_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bVALUES\s*\(").expect("valid regex"));

/// Explicit column list right after the (optionally qualified) table name.
static COLUMN_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*INSERT\s+INTO\s+[\w."`\[\]]+\s*\(([^)]*)\)"#).expect("valid regex")
});

/// Detect the number of columns an INSERT statement writes.
///
/// The first `VALUES (...)` group wins; commas nested inside `()`, `[]` or
/// `{}` and inside quoted literals are not counted. Without a VALUES group
/// the explicit column list is used. Non-INSERT statements return `None`.
pub fn detect_column_count(sql: &str) -> Option<usize> {
    if !INSERT_PREFIX.is_match(sql) {
        return None;
    }

    if let Some(m) = VALUES_OPEN.find(sql) {
        if let Some(count) = count_top_level_items(&sql[m.end()..]) {
            return Some(count);
        }
    }

    COLUMN_LIST.captures(sql).map(|caps| {
        let list = caps.get(1).map_or("", |m| m.as_str());
        list.matches(',').count() + 1
    })
}

/// Count the top-level comma separated items up to the parenthesis closing
/// the group that `body` starts inside of.
fn count_top_level_items(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut commas = 0usize;
    let mut quote: Option<char> = None;

    for c in body.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' if depth == 0 => return Some(commas + 1),
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => commas += 1,
            _ => {}
        }
    }

    // The group never closed
    None
}
