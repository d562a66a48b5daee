//! 🔒 Permissions — who gets to see which page in a report.
//!
//! The normaliser only ever asks one question: "can this principal read that
//! page?" [`PermissionChecker`] is that question. A host wiki answers it with
//! its own authorization service; standalone, [`AccessRules`] answers it from
//! config.
//!
//! Deny means the row disappears from the report. Not masked. Gone.

use std::collections::HashMap;

use serde::Deserialize;

use crate::references::EntityReference;

/// 👤 Whoever the report is being rendered for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Principal {
    #[default]
    Guest,
    User(String),
}

impl Principal {
    /// `None` or an empty name is the guest.
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => Principal::User(name.to_string()),
            None => Principal::Guest,
        }
    }
}

/// 🔒 The one question the normaliser asks.
pub trait PermissionChecker: Send + Sync {
    fn has_read_access(&self, principal: &Principal, reference: &EntityReference) -> bool;
}

/// ✅ Everyone reads everything. For hosts that already filtered upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn has_read_access(&self, _principal: &Principal, _reference: &EntityReference) -> bool {
        true
    }
}

/// 📋 Config-driven deny lists, matched by prefix on the serialised reference.
///
/// ```toml
/// [permissions]
/// guest_deny = ["xwiki:Admin."]
///
/// [permissions.deny]
/// alice = ["xwiki:HR.", "marketing:"]
/// ```
///
/// A logged-in user is subject to the guest rules too, plus their own list.
/// Rules only take away: everything not denied is allowed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessRules {
    #[serde(default)]
    pub guest_deny: Vec<String>,
    #[serde(default)]
    pub deny: HashMap<String, Vec<String>>,
}

impl AccessRules {
    fn prefixes_for<'a>(&'a self, principal: &Principal) -> impl Iterator<Item = &'a String> {
        let the_personal: &[String] = match principal {
            Principal::User(name) => self.deny.get(name).map(Vec::as_slice).unwrap_or_default(),
            Principal::Guest => &[],
        };
        self.guest_deny.iter().chain(the_personal)
    }
}

impl PermissionChecker for AccessRules {
    fn has_read_access(&self, principal: &Principal, reference: &EntityReference) -> bool {
        let the_serialised = reference.to_string();
        !self
            .prefixes_for(principal)
            .any(|prefix| the_serialised.starts_with(prefix.as_str()))
    }
}
