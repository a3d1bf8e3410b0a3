//! Pattern-based INSERT parsing
//!
//! Only the parts of an INSERT needed for merging are extracted: the target
//! table, the optional column list and the VALUES tuples. Everything inside a
//! tuple stays opaque text.

use std::sync::LazyLock;

use regex::Regex;
use sqlbatch_core::{BatchError, Result};

/// Any statement starting with the INSERT keyword.
static INSERT_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^INSERT\b").expect("valid regex"));

/// `INSERT INTO` followed by an optionally quoted, optionally schema-qualified name.
static INSERT_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    let ident = r#"(?:"[^"]+"|`[^`]+`|\[[^\]]+\]|[\w$]+)"#;
    Regex::new(&format!(
        r"(?i)^INSERT\s+INTO\s+({ident}(?:\s*\.\s*{ident})*)"
    ))
    .expect("valid regex")
});

static VALUES_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^VALUES\b").expect("valid regex"));

/// Bodies that insert the result of a query rather than literal tuples.
static QUERY_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:SELECT|WITH|TABLE|DEFAULT\s+VALUES)\b|^\(\s*(?:SELECT|WITH)\b")
        .expect("valid regex")
});

static PLAIN_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid regex"));

/// How a statement takes part in merging.
#[derive(Debug, Clone)]
pub(crate) enum Classified {
    /// A single-table `INSERT ... VALUES` that can be folded with others
    Insert(ParsedInsert),
    /// Anything else; executed as written
    Passthrough,
}

/// Merge compatibility key: table as written (quotes stripped, case kept)
/// plus the column shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct GroupKey {
    pub table: String,
    pub columns: ColumnKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ColumnKey {
    /// No column list; tuples of different width never merge
    Implicit { arity: usize },
    /// Sorted, lowercased, unquoted column names
    Explicit(Vec<String>),
}

#[derive(Debug, Clone)]
pub(crate) struct ParsedInsert {
    /// Trimmed statement text as supplied
    pub source: String,
    /// Table reference as written
    pub table: String,
    /// Column list as written, parentheses included
    pub columns_raw: Option<String>,
    /// Normalized column names in written order
    pub columns: Option<Vec<String>>,
    /// VALUES tuples as written, parentheses included
    pub tuples: Vec<String>,
    pub key: GroupKey,
}

/// Classify and validate one statement.
///
/// Non-INSERT statements, INSERTs fed by a query and INSERTs carrying
/// clauses after their tuples (`ON CONFLICT`, `RETURNING`, ...) pass through.
/// Malformed INSERTs are rejected with [`BatchError::InsertMerger`].
pub(crate) fn classify(sql: &str) -> Result<Classified> {
    let source = sql.trim();
    if !INSERT_KEYWORD.is_match(source) {
        return Ok(Classified::Passthrough);
    }
    if !INSERT_TARGET.is_match(source) {
        // INSERT OVERWRITE and other dialect forms are left alone
        if !starts_with_insert_into(source) {
            return Ok(Classified::Passthrough);
        }
        return Err(merge_error("could not extract table name", source));
    }

    check_balanced(source)?;

    let caps = INSERT_TARGET
        .captures(source)
        .ok_or_else(|| merge_error("could not extract table name", source))?;
    let whole = caps.get(0).map_or(0, |m| m.end());
    let table = caps.get(1).map_or("", |m| m.as_str()).to_string();

    let mut rest = source[whole..].trim_start();
    if QUERY_BODY.is_match(rest) {
        return Ok(Classified::Passthrough);
    }

    let mut columns_raw = None;
    let mut columns = None;
    if rest.starts_with('(') {
        let end = matching_close(rest)
            .ok_or_else(|| merge_error("unbalanced parentheses in column list", source))?;
        let raw = &rest[..=end];
        let names = parse_columns(&raw[1..end], source)?;
        columns_raw = Some(raw.to_string());
        columns = Some(names);
        rest = rest[end + 1..].trim_start();
        if QUERY_BODY.is_match(rest) {
            return Ok(Classified::Passthrough);
        }
    }

    let Some(values) = VALUES_KEYWORD.find(rest) else {
        return Err(merge_error("INSERT statement must contain a VALUES clause", source));
    };
    rest = rest[values.end()..].trim_start();

    let mut tuples = Vec::new();
    loop {
        if !rest.starts_with('(') {
            return Err(merge_error("expected '(' to open a VALUES tuple", source));
        }
        let end = matching_close(rest)
            .ok_or_else(|| merge_error("unbalanced parentheses in VALUES clause", source))?;
        tuples.push(rest[..=end].to_string());
        rest = rest[end + 1..].trim_start();
        match rest.strip_prefix(',') {
            Some(next) => rest = next.trim_start(),
            None => break,
        }
    }

    let trailing = rest.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if !trailing.is_empty() {
        tracing::debug!(trailing = %trailing, "INSERT has trailing clauses; not merging");
        return Ok(Classified::Passthrough);
    }

    let arity = check_arity(&tuples, columns.as_deref(), source)?;
    let key = GroupKey {
        table: strip_identifier_quotes(&table),
        columns: match &columns {
            Some(names) => {
                let mut sorted = names.clone();
                sorted.sort();
                ColumnKey::Explicit(sorted)
            }
            None => ColumnKey::Implicit { arity },
        },
    };

    Ok(Classified::Insert(ParsedInsert {
        source: source.to_string(),
        table,
        columns_raw,
        columns,
        tuples,
        key,
    }))
}

/// Split a tuple `(a, b, c)` into its top-level values.
pub(crate) fn split_tuple(tuple: &str) -> Vec<&str> {
    let inner = tuple
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(tuple);
    split_top_level(inner)
}

fn starts_with_insert_into(source: &str) -> bool {
    let mut words = source.split_whitespace();
    matches!(
        (words.next(), words.next()),
        (Some(a), Some(b)) if a.eq_ignore_ascii_case("INSERT") && b.eq_ignore_ascii_case("INTO")
    )
}

fn merge_error(message: &str, sql: &str) -> BatchError {
    const PREVIEW: usize = 80;
    let preview = match sql.char_indices().nth(PREVIEW) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    };
    BatchError::InsertMerger(format!("{}: {}", message, preview))
}

fn check_balanced(source: &str) -> Result<()> {
    let mut depth: i64 = 0;
    let mut quote: Option<char> = None;

    for c in source.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(merge_error("unbalanced parentheses", source));
                }
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return Err(merge_error("unterminated quoted literal", source));
    }
    if depth != 0 {
        return Err(merge_error("unbalanced parentheses", source));
    }
    Ok(())
}

/// Byte offset of the bracket closing the group opened by `text[0]`.
///
/// Quote aware; `[]` and `{}` nest alongside parentheses so JSON-like
/// literals and array constructors stay inside their tuple.
fn matching_close(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (idx, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return (c == ')').then_some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (idx, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

fn parse_columns(list: &str, source: &str) -> Result<Vec<String>> {
    if list.trim().is_empty() {
        return Err(merge_error("empty column list", source));
    }

    let mut names: Vec<String> = Vec::new();
    for raw in split_top_level(list) {
        let quoted = is_quoted_identifier(raw);
        let name = strip_identifier_quotes(raw);
        if name.is_empty() || (!quoted && !PLAIN_COLUMN.is_match(&name)) {
            return Err(merge_error(&format!("invalid column name '{}'", raw), source));
        }
        let normalized = name.to_lowercase();
        if names.contains(&normalized) {
            return Err(merge_error(&format!("duplicate column '{}'", raw), source));
        }
        names.push(normalized);
    }
    Ok(names)
}

fn check_arity(tuples: &[String], columns: Option<&[String]>, source: &str) -> Result<usize> {
    let mut expected = columns.map(<[String]>::len);

    for tuple in tuples {
        let values = split_tuple(tuple);
        if values.iter().all(|v| v.is_empty()) {
            return Err(merge_error("empty VALUES tuple", source));
        }
        if values.iter().any(|v| v.is_empty()) {
            return Err(merge_error("empty value in VALUES tuple", source));
        }
        match expected {
            Some(n) if n != values.len() => {
                return Err(merge_error(
                    &format!("VALUES tuple has {} values, expected {}", values.len(), n),
                    source,
                ));
            }
            Some(_) => {}
            None => expected = Some(values.len()),
        }
    }
    Ok(expected.unwrap_or(0))
}

fn is_quoted_identifier(ident: &str) -> bool {
    let ident = ident.trim();
    (ident.len() >= 2)
        && ((ident.starts_with('"') && ident.ends_with('"'))
            || (ident.starts_with('`') && ident.ends_with('`'))
            || (ident.starts_with('[') && ident.ends_with(']')))
}

/// Remove identifier quoting from every part of a possibly qualified name.
pub(crate) fn strip_identifier_quotes(ident: &str) -> String {
    ident
        .split('.')
        .map(|part| {
            let part = part.trim();
            if is_quoted_identifier(part) {
                &part[1..part.len() - 1]
            } else {
                part
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}
