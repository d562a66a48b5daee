//! 🔍 FilterEngine — keep the rows that match every filter, drop the rest.
//!
//! Semantics, in full:
//! - `None` or an empty [`FilterSpec`] → identity. Same rows, same order, duplicates and all.
//! - Otherwise a row survives only if, for EVERY `(key, expected)` pair, the row
//!   has `key` and the text form of `row[key]` contains `expected` as a
//!   case-sensitive substring.
//!
//! Substring, not equality: `"27"` matches `nb_hits: 27` exactly, and
//! `"MostViewedPage?editor=wiki"` matches a label carrying that fragment.

use std::borrow::Cow;

use serde_json::Value;
use tracing::trace;

use crate::common::{FilterSpec, Row};

/// 🔍 Apply `filters` to `rows`, preserving input order among the survivors.
pub fn apply(rows: Vec<Row>, filters: Option<&FilterSpec>) -> Vec<Row> {
    // 🚪 No filters, no work. Hand the rows back exactly as they came in, dupes and all.
    let Some(filters) = filters.filter(|filters| !filters.is_empty()) else {
        return rows;
    };

    // -- headcount before the bouncer gets to work, for the trace log
    let before = rows.len();
    let the_survivors: Vec<Row> = rows.into_iter().filter(|row| matches(row, filters)).collect();
    trace!(before, after = the_survivors.len(), "🔍 Filters applied");
    the_survivors
}

/// ✅ Does `row` satisfy every pair in `filters`? An empty spec matches everything.
pub fn matches(row: &Row, filters: &FilterSpec) -> bool {
    // 🤝 AND, not OR. Every pair has to agree. One "nope" and the row is out.
    filters.iter().all(|(key, expected)| {
        // -- no key at all is a mismatch, even for an empty expected value
        row.get(key)
            .is_some_and(|value| field_text(value).contains(expected.as_str()))
    })
}

/// 📝 The string form a filter compares against.
///
/// Strings are their contents (no quotes). Everything else is its compact JSON
/// text: `27`, `true`, `null`, `{"a":1}`.
pub fn field_text(value: &Value) -> Cow<'_, str> {
    match value {
        // 🧵 strings lend their contents, no allocation, no quotes
        Value::String(text) => Cow::Borrowed(text.as_str()),
        // -- numbers, bools, nulls, nested things: their compact JSON, freshly printed
        other => Cow::Owned(other.to_string()),
    }
}
