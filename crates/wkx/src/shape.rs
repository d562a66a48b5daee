//! 📐 ShapeCoercer — one payload, three possible shapes, one canonical answer.
//!
//! The analytics backend answers the same question in different outfits
//! depending on the query parameters:
//!
//! ```text
//!   [ {row}, {row} ]                      flat array        → List
//!   { "2024-01": [ {row}, {row} ], ... }  object of arrays  → List (first entry)
//!   { "label": "/x", "nb_hits": 5 }       single record     → Single
//! ```
//!
//! Anything else is a [`NormaliseError::Shape`]. We do not guess.
//!
//! ## The "first entry wins" rule 🥇
//! An object of arrays is keyed by site or period. Callers of this crate only
//! ever want one series per call, so the first key (payload order, thanks to
//! serde_json's `preserve_order`) is taken and the rest are dropped with a
//! debug log. Multiplicity is the query's problem, not ours.

use serde_json::Value;
use tracing::debug;

use crate::common::{CanonicalForm, Row};
use crate::error::{NormaliseError, Result};

/// 🔄 Parse `raw_payload` and coerce it into a [`CanonicalForm`].
///
/// # Errors
/// - [`NormaliseError::Parse`] when the payload is not JSON.
/// - [`NormaliseError::Shape`] for scalars, mixed objects, or arrays holding non-objects.
pub fn coerce(raw_payload: &str) -> Result<CanonicalForm> {
    // 🧪 Step one: is it even JSON? If not, Parse error, and we go home early.
    let parsed: Value = serde_json::from_str(raw_payload)?;
    match parsed {
        // -- the easy one. Already a list. Just make sure every element is a row.
        Value::Array(items) => Ok(CanonicalForm::List(rows_from(items, "top-level array")?)),
        // -- the interesting one. Could be a row, could be a bag of series. Go find out.
        Value::Object(map) => coerce_object(map),
        // 💀 a bare number, string, bool or null. Not a report. Not today.
        honestly_who_knows => Err(NormaliseError::Shape(format!(
            "expected an array or an object at the top level, got {}",
            kind_of(&honestly_who_knows)
        ))),
    }
}

fn coerce_object(map: Row) -> Result<CanonicalForm> {
    // 🕳️ {} — no keys, no periods, no rows. An empty report, not a single empty record.
    if map.is_empty() {
        return Ok(CanonicalForm::List(Vec::new()));
    }

    // 🔢 Count the arrays. All or nothing: the only two honest answers.
    let the_array_valued = map.values().filter(|value| value.is_array()).count();

    if the_array_valued == 0 {
        // 📦 No arrays anywhere: this IS the row.
        return Ok(CanonicalForm::Single(map));
    }

    // 🤨 Some arrays, some not. A series AND a total? Pick a lane.
    if the_array_valued < map.len() {
        return Err(NormaliseError::Shape(format!(
            "object mixes array and non-array values ({} of {} keys hold arrays)",
            the_array_valued,
            map.len()
        )));
    }

    // 🥇 Every value is a series. First one in the door gets the job.
    let the_key_count = map.len();
    match map.into_iter().next() {
        Some((the_first_key, Value::Array(items))) => {
            debug!(
                key = %the_first_key,
                skipped = the_key_count - 1,
                "📐 Flattening object of arrays to its first entry"
            );
            let context = format!("entry '{the_first_key}'");
            Ok(CanonicalForm::List(rows_from(items, &context)?))
        }
        // -- every value was counted as an array above; this arm is for the type checker
        _ => Err(NormaliseError::Shape("object of arrays has no usable first entry".to_string())),
    }
}

/// Every element must be an object. One bad apple spoils the payload.
fn rows_from(items: Vec<Value>, context: &str) -> Result<Vec<Row>> {
    // -- collect() into Result short-circuits on the first bad element. One strike.
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            // ✅ an object is a row, no questions asked
            Value::Object(row) => Ok(row),
            // -- anything else gets named and shamed, with its index, so someone can find it
            other => Err(NormaliseError::Shape(format!(
                "{context}: element {index} is {}, expected an object",
                kind_of(&other)
            ))),
        })
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
