//! Capability catalog
//!
//! Registry of the capability names the compliance application gates on,
//! with display descriptions and categories. The catalog is used to validate
//! override writes and to present grant sets; it never participates in a
//! permission decision.

use crate::capability::{Capability, GrantSet};
use std::collections::BTreeMap;

/// Capability names and descriptions shipped with RCMS
pub const DEFAULT_CAPABILITIES: &[(&str, &str)] = &[
    ("user_add", "Add Users"),
    ("user_update", "Update/Modify Users"),
    ("user_delete", "Delete Users"),
    ("category_add", "Add Categories"),
    ("category_delete", "Delete Categories"),
    ("regulation_add", "Add Regulations"),
    ("regulation_manage", "Manage Regulations"),
    ("regulation_update", "Update/Modify Regulations"),
    ("regulation_delete", "Delete Regulations"),
    ("activity_add", "Add Activities"),
    ("activity_update", "Update/Modify Activities"),
    ("activity_delete", "Delete Activities"),
    ("activity_assign", "Assign Activities"),
    ("task_reassign", "Reassign Tasks"),
    ("holiday_add", "Add Holidays"),
    ("holiday_update", "Update/Modify Holidays"),
    ("holiday_delete", "Delete Holidays"),
    ("holiday_access", "Access Holidays"),
    ("entity_add", "Add Entities"),
    ("entity_update", "Update/Modify Entities"),
    ("entity_delete", "Delete Entities"),
    ("analysis_access", "Access Analysis"),
];

/// Known capabilities keyed by name
#[derive(Debug, Clone)]
pub struct CapabilityCatalog {
    entries: BTreeMap<Capability, String>,
}

impl CapabilityCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register a capability with its description
    pub fn register(&mut self, capability: Capability, description: impl Into<String>) {
        self.entries.insert(capability, description.into());
    }

    /// True if `name` is a registered capability
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Human-readable description, falling back to the raw name
    pub fn describe<'a>(&'a self, name: &'a str) -> &'a str {
        self.entries.get(name).map(String::as_str).unwrap_or(name)
    }

    /// All registered capabilities, in name order
    pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
        self.entries.keys()
    }

    /// Number of registered capabilities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Group a grant set's capabilities by category for display.
    ///
    /// The `AllCapabilities` sentinel (or a set holding `"All"`) expands to
    /// every catalog entry.
    pub fn grouped(&self, grants: &GrantSet) -> BTreeMap<String, Vec<String>> {
        let names: Vec<&Capability> = if grants.is_unrestricted() {
            self.entries.keys().collect()
        } else {
            grants.capabilities().collect()
        };

        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for cap in names {
            groups
                .entry(category_of(cap.as_str()))
                .or_default()
                .push(self.describe(cap.as_str()).to_string());
        }
        groups
    }
}

impl Default for CapabilityCatalog {
    fn default() -> Self {
        let mut catalog = Self::new();
        for (name, description) in DEFAULT_CAPABILITIES {
            if let Ok(cap) = Capability::new(*name) {
                catalog.register(cap, *description);
            }
        }
        catalog
    }
}

/// Category of a capability: the prefix before the first `_`, capitalized.
pub fn category_of(name: &str) -> String {
    let prefix = name.split('_').next().unwrap_or(name);
    let mut chars = prefix.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
