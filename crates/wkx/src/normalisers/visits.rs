//! 📈 VisitsNormaliser — visits over a period. No labels to police, just shape and filters.
//!
//! Shape class in = shape class out:
//! - `List` → filtered `List`.
//! - `Single` → filtered as a one-row list; still `Single` if it survives,
//!   an empty `List` if it doesn't.

use tracing::debug;

use super::ReportNormaliser;
use crate::common::{CanonicalForm, FilterSpec, NormalisedResult};
use crate::error::Result;
use crate::filter;
use crate::shape;

/// 📈 Normaliser for "visits over period" reports. No collaborators, no state.
#[derive(Debug, Default, Clone, Copy)]
pub struct VisitsNormaliser;

impl ReportNormaliser for VisitsNormaliser {
    fn normalise_data(&self, raw_payload: &str, filters: Option<&FilterSpec>) -> Result<NormalisedResult> {
        let the_result = match shape::coerce(raw_payload)? {
            CanonicalForm::Single(row) => match filter::apply(vec![row], filters).pop() {
                Some(row) => CanonicalForm::Single(row),
                None => CanonicalForm::List(Vec::new()),
            },
            CanonicalForm::List(rows) => CanonicalForm::List(filter::apply(rows, filters)),
        };
        debug!(rows = the_result.len(), "📈 Visits report normalised");
        Ok(the_result)
    }
}
