//! Discovered-object model.

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ObjectKind;

/// A discovered object shared across concurrent flow stages.
pub type SharedObject = Arc<Mutex<DiscoveredObject>>;

/// Result of applying one comparison filter to a discovered object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterResult {
    /// Filter name from the job configuration.
    pub name: String,
    /// Whether the filter condition matched.
    pub matched: bool,
    /// Discrepancy text configured on the filter.
    pub filter_match_text: String,
    /// Corrective action configured on the filter, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconcile_action: Option<String>,
}

/// An object discovered on the source or target system.
///
/// Properties are mutated during enrichment; filter results accumulate
/// during comparison. The persisted representation is owned by the
/// surrounding system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredObject {
    pub job_id: i64,
    pub kind: ObjectKind,
    pub properties: IndexMap<String, Value>,
    /// Properties of the linked opposing object, populated by the link
    /// stage. Empty when the object has no linked counterpart.
    #[serde(default)]
    pub additional_properties: IndexMap<String, Value>,
    #[serde(default)]
    pub filter_results: Vec<FilterResult>,
}

impl DiscoveredObject {
    /// Create a discovered object with the given properties.
    #[must_use]
    pub fn new(job_id: i64, kind: ObjectKind, properties: IndexMap<String, Value>) -> Self {
        Self {
            job_id,
            kind,
            properties,
            additional_properties: IndexMap::new(),
            filter_results: Vec::new(),
        }
    }

    /// Wrap in the shared handle used by concurrent stages.
    #[must_use]
    pub fn shared(self) -> SharedObject {
        Arc::new(Mutex::new(self))
    }

    /// Update the object properties. Existing keys are replaced.
    pub fn update_properties(&mut self, updates: IndexMap<String, Value>) {
        for (key, value) in updates {
            self.properties.insert(key, value);
        }
    }

    /// True when the object has been linked to an opposing object.
    #[must_use]
    pub fn has_linked_object(&self) -> bool {
        !self.additional_properties.is_empty()
    }

    /// Append a filter result.
    pub fn add_filter_result(&mut self, result: FilterResult) {
        self.filter_results.push(result);
    }

    /// Check if any filter has matched.
    #[must_use]
    pub fn has_filter_match(&self) -> bool {
        self.filter_results.iter().any(|r| r.matched)
    }
}
