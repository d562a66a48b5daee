//! 🏆 MostViewedNormaliser — the popular pages, minus the ones you can't see.
//!
//! Pipeline per call:
//! 1. `shape::coerce` the payload.
//! 2. `Single` → returned as-is. An aggregate is not a list of pages; nothing to gate, nothing to filter.
//! 3. `List` → every row with a string `label` goes through the gate:
//!    - label won't parse as a URL → one `warn!`, row kept
//!    - URL points at no page     → row kept
//!    - page the principal can't read → row DROPPED
//!    - page the principal can read   → row kept, label untouched
//! 4. `filter::apply` on whatever survived.
//!
//! Deny drops, malformed keeps. Authorization is a hard line; an unparseable
//! legacy URL just has nothing to check against.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use super::ReportNormaliser;
use crate::common::{CanonicalForm, FilterSpec, NormalisedResult, Row};
use crate::error::Result;
use crate::filter;
use crate::permissions::{PermissionChecker, Principal};
use crate::references::ReferenceResolver;
use crate::shape;

/// The row field carrying the page URL.
pub const LABEL_FIELD: &str = "label";

/// 🏆 Normaliser for "most viewed pages" / "most viewed search terms" reports.
///
/// Holds shared, read-only collaborators plus the principal the report is for.
/// Cheap to build per request; `Arc`s make the collaborators cheap to share.
pub struct MostViewedNormaliser {
    resolver: Arc<dyn ReferenceResolver>,
    permissions: Arc<dyn PermissionChecker>,
    principal: Principal,
}

// 🎭 manual Debug: trait objects don't derive it, and nobody needs to see inside them anyway
impl fmt::Debug for MostViewedNormaliser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MostViewedNormaliser")
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}

impl MostViewedNormaliser {
    pub fn new(
        resolver: Arc<dyn ReferenceResolver>,
        permissions: Arc<dyn PermissionChecker>,
        principal: Principal,
    ) -> Self {
        Self {
            resolver,
            permissions,
            principal,
        }
    }

    /// 🔒 Same collaborators, different audience.
    pub fn for_principal(&self, principal: Principal) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
            permissions: Arc::clone(&self.permissions),
            principal,
        }
    }

    /// 🚦 Keep or drop one row. Only a denied read drops.
    fn is_visible(&self, row: &Row) -> bool {
        let Some(Value::String(label)) = row.get(LABEL_FIELD) else {
            return true;
        };

        match self.resolver.resolve(label) {
            Err(err) => {
                warn!(url = %label, cause = %err, "Failed to get resource reference from URL");
                true
            }
            Ok(None) => {
                trace!(%label, "🔗 Label points at no page, keeping row");
                true
            }
            Ok(Some(reference)) => {
                let allowed = self.permissions.has_read_access(&self.principal, &reference);
                if !allowed {
                    debug!(%label, %reference, principal = ?self.principal, "🔒 Dropping row the principal cannot read");
                }
                allowed
            }
        }
    }
}

impl ReportNormaliser for MostViewedNormaliser {
    fn normalise_data(&self, raw_payload: &str, filters: Option<&FilterSpec>) -> Result<NormalisedResult> {
        let rows = match shape::coerce(raw_payload)? {
            CanonicalForm::Single(row) => {
                debug!("📦 Single aggregated record, returned as-is");
                return Ok(CanonicalForm::Single(row));
            }
            CanonicalForm::List(rows) => rows,
        };

        let before = rows.len();
        let the_visible: Vec<Row> = rows.into_iter().filter(|row| self.is_visible(row)).collect();
        let the_survivors = filter::apply(the_visible, filters);
        debug!(before, after = the_survivors.len(), "🏆 Most viewed report normalised");

        Ok(CanonicalForm::List(the_survivors))
    }
}
