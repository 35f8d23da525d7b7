//! Flow contexts.
//!
//! One context instance is exclusively owned by one job execution. Object
//! lists are replaced wholesale by the fetch stages and read by everything
//! after; the error accumulator collects stage failures append-only for
//! inspection once the flow has finished.

use std::sync::{Mutex, PoisonError};

use indexmap::IndexMap;
use serde_json::Value;

use recon_core::{ActionDefinition, JobDefinition, SharedObject};

/// Aggregate state of one discovery run.
pub struct DiscoveryContext {
    pub feature_pack_id: i64,
    pub feature_pack_name: String,
    pub application_id: i64,
    pub application_name: String,
    pub job_id: i64,
    pub job_name: String,
    /// Whether a matched discrepancy should be reconciled automatically.
    pub auto_reconcile: bool,
    pub inputs: IndexMap<String, Value>,
    pub job: JobDefinition,
    sources: Mutex<Vec<SharedObject>>,
    targets: Mutex<Vec<SharedObject>>,
    errors: Mutex<Vec<String>>,
}

impl DiscoveryContext {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feature_pack_id: i64,
        feature_pack_name: impl Into<String>,
        application_id: i64,
        application_name: impl Into<String>,
        job_id: i64,
        auto_reconcile: bool,
        inputs: IndexMap<String, Value>,
        job: JobDefinition,
    ) -> Self {
        Self {
            feature_pack_id,
            feature_pack_name: feature_pack_name.into(),
            application_id,
            application_name: application_name.into(),
            job_id,
            job_name: job.name.clone(),
            auto_reconcile,
            inputs,
            job,
            sources: Mutex::new(Vec::new()),
            targets: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the discovered source objects.
    #[must_use]
    pub fn sources(&self) -> Vec<SharedObject> {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the discovered source objects.
    pub fn set_sources(&self, objects: Vec<SharedObject>) {
        *self.sources.lock().unwrap_or_else(PoisonError::into_inner) = objects;
    }

    /// Snapshot of the discovered target objects.
    #[must_use]
    pub fn targets(&self) -> Vec<SharedObject> {
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the discovered target objects.
    pub fn set_targets(&self, objects: Vec<SharedObject>) {
        *self.targets.lock().unwrap_or_else(PoisonError::into_inner) = objects;
    }

    /// Record a stage failure. Append-only.
    pub fn add_error(&self, message: impl Into<String>) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.into());
    }

    /// Snapshot of the recorded stage failures.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Enrich action configured for discovered source objects.
    #[must_use]
    pub fn source_enrich_action(&self) -> Option<&ActionDefinition> {
        self.job.discover.source.enrich_action.as_ref()
    }

    /// Enrich action configured for discovered target objects.
    #[must_use]
    pub fn target_enrich_action(&self) -> Option<&ActionDefinition> {
        self.job.discover.target.enrich_action.as_ref()
    }

    /// Property pairs linking each source to its matching target.
    #[must_use]
    pub fn link_arg(&self) -> Option<&str> {
        self.job.discover.link_source_and_target.as_deref()
    }
}

/// Aggregate state of one reconciliation run.
pub struct ReconcileContext {
    pub job_id: i64,
    pub job_name: String,
    pub feature_pack_id: i64,
    pub feature_pack_name: String,
    /// Filters selected for this run.
    pub filter_names: Vec<String>,
    /// Job inputs overlaid with the request inputs; request values win.
    pub inputs: IndexMap<String, Value>,
    /// Objects to reconcile.
    pub objects: Vec<SharedObject>,
    /// Previously discovered source objects, read-only reference data.
    pub sources: Vec<SharedObject>,
    pub job: JobDefinition,
}

impl ReconcileContext {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: i64,
        feature_pack_id: i64,
        feature_pack_name: impl Into<String>,
        filter_names: Vec<String>,
        job_inputs: IndexMap<String, Value>,
        request_inputs: IndexMap<String, Value>,
        objects: Vec<SharedObject>,
        sources: Vec<SharedObject>,
        job: JobDefinition,
    ) -> Self {
        let mut inputs = job_inputs;
        for (key, value) in request_inputs {
            inputs.insert(key, value);
        }
        Self {
            job_id,
            job_name: job.name.clone(),
            feature_pack_id,
            feature_pack_name: feature_pack_name.into(),
            filter_names,
            inputs,
            objects,
            sources,
            job,
        }
    }

    /// Corrective action configured for a matched filter.
    #[must_use]
    pub fn reconcile_action(&self, filter_name: &str) -> Option<&ActionDefinition> {
        self.job
            .reconcile
            .as_ref()
            .and_then(|r| r.filters.get(filter_name))
            .map(|f| &f.reconcile_action)
    }

    /// Enrich action configured for source objects under reconciliation.
    #[must_use]
    pub fn source_enrich_action(&self) -> Option<&ActionDefinition> {
        self.job
            .reconcile
            .as_ref()
            .and_then(|r| r.source_enrich_action.as_ref())
    }

    /// Enrich action configured for target objects under reconciliation.
    #[must_use]
    pub fn target_enrich_action(&self) -> Option<&ActionDefinition> {
        self.job
            .reconcile
            .as_ref()
            .and_then(|r| r.target_enrich_action.as_ref())
    }

    /// Whether any enrich action is configured for this run.
    #[must_use]
    pub fn has_enrich_action(&self) -> bool {
        self.source_enrich_action().is_some() || self.target_enrich_action().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> JobDefinition {
        serde_json::from_value(serde_json::json!({
            "name": "job-1",
            "discover": {
                "source": { "fetchAction": { "type": "rest" } },
                "target": { "fetchAction": { "type": "rest" } }
            },
            "reconcile": {
                "filters": {
                    "missingInTarget": {
                        "reconcileAction": { "type": "shell", "command": "create" }
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_request_inputs_override_job_inputs() {
        let mut job_inputs = IndexMap::new();
        job_inputs.insert("zone".to_string(), json!("eu-1"));
        job_inputs.insert("limit".to_string(), json!(10));
        let mut request_inputs = IndexMap::new();
        request_inputs.insert("zone".to_string(), json!("us-2"));

        let context = ReconcileContext::new(
            1,
            2,
            "fp",
            Vec::new(),
            job_inputs,
            request_inputs,
            Vec::new(),
            Vec::new(),
            job(),
        );
        assert_eq!(context.inputs["zone"], json!("us-2"));
        assert_eq!(context.inputs["limit"], json!(10));
    }

    #[test]
    fn test_reconcile_action_lookup() {
        let context = ReconcileContext::new(
            1,
            2,
            "fp",
            Vec::new(),
            IndexMap::new(),
            IndexMap::new(),
            Vec::new(),
            Vec::new(),
            job(),
        );
        assert!(context.reconcile_action("missingInTarget").is_some());
        assert!(context.reconcile_action("unknown").is_none());
        assert!(!context.has_enrich_action());
    }
}
