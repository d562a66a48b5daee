//! 📦 Common data structures — the building blocks of wikalytics
//!
//! 🎬 COLD OPEN — INT. ANALYTICS DASHBOARD — MONDAY, 9:02 AM
//!
//! Someone asked for "most viewed pages this week". The analytics server
//! answered. Sometimes with an array. Sometimes with an object of arrays keyed
//! by a date nobody asked for. Once, memorably, with a single object and a shrug.
//!
//! The types in here are what every one of those answers becomes once it has
//! been talked down off the ledge: a [`Row`], a list of them, or exactly one.
//!
//! ⚠️ Everything here is transient. Built per request, dropped per request.
//! No identity. No persistence. Like a Snapchat, but for JSON. 🦆

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// 🎯 One record of a report, keyed by field name.
///
/// Backed by `serde_json::Map` with `preserve_order` on, so fields come out in
/// the order the analytics server sent them. Recognised fields: `label`
/// (page URL or URL fragment), `nb_hits` and friends (opaque metrics).
pub type Row = Map<String, Value>;

/// 🔍 Field name → expected substring. Keys are unique, so a caller who sets
/// the same key twice gets last-write-wins for free.
pub type FilterSpec = HashMap<String, String>;

/// 📐 The canonical shape every payload is coerced into.
///
/// Serialises untagged: `Single` is written as the bare row object, `List` as
/// a bare JSON array. Callers downstream never see the enum, only the JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CanonicalForm {
    /// One aggregated record, returned as-is.
    Single(Row),
    /// An ordered sequence of rows.
    List(Vec<Row>),
}

/// ✅ What a normaliser hands back. Same shape as [`CanonicalForm`], different
/// stage of life: this one has been resolved, permission-gated and filtered.
pub type NormalisedResult = CanonicalForm;

impl CanonicalForm {
    /// 📊 How many rows are in here. `Single` counts as one, obviously.
    pub fn len(&self) -> usize {
        match self {
            CanonicalForm::Single(_) => 1,
            CanonicalForm::List(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 🔄 Flatten into a list of rows, whichever shape we started as.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            CanonicalForm::Single(row) => vec![row],
            CanonicalForm::List(rows) => rows,
        }
    }

    /// 📦 Back to a plain `serde_json::Value`, for callers who compare JSON to JSON.
    pub fn into_value(self) -> Value {
        match self {
            CanonicalForm::Single(row) => Value::Object(row),
            CanonicalForm::List(rows) => Value::Array(rows.into_iter().map(Value::Object).collect()),
        }
    }
}
