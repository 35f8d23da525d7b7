//! Comparison over discovered objects.

use std::sync::PoisonError;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use recon_core::{FilterResult, ObjectKind, SharedObject};

use crate::conditions::{ConditionRegistry, FilterContext};
use crate::context::DiscoveryContext;
use crate::error::FlowError;

fn snapshot(object: &SharedObject) -> (IndexMap<String, Value>, IndexMap<String, Value>) {
    let guard = object.lock().unwrap_or_else(PoisonError::into_inner);
    (guard.properties.clone(), guard.additional_properties.clone())
}

/// Applies the configured comparison filters to the discovered objects.
pub struct ComparisonEngine {
    registry: ConditionRegistry,
}

impl ComparisonEngine {
    #[must_use]
    pub fn new(registry: ConditionRegistry) -> Self {
        Self { registry }
    }

    /// Evaluate every filter, in declaration order, against every object of
    /// the filter's kind, appending a [`FilterResult`] per object.
    ///
    /// Results accumulate: objects already carrying matches from earlier
    /// filters (or earlier runs) are evaluated again and get further
    /// results appended.
    pub fn apply_filters(&self, context: &DiscoveryContext) -> Result<(), FlowError> {
        let sources = context.sources();
        let targets = context.targets();

        for (filter_name, filter) in &context.job.discover.filters {
            let condition = self.registry.resolve(filter_name, filter)?;
            let (objects, opposing) = match condition.kind() {
                ObjectKind::Source => (&sources, &targets),
                ObjectKind::Target => (&targets, &sources),
            };
            let opposing_snapshots: Vec<IndexMap<String, Value>> = opposing
                .iter()
                .map(|object| snapshot(object).0)
                .collect();

            debug!(
                filter = %filter_name,
                kind = %condition.kind(),
                objects = objects.len(),
                "applying filter"
            );
            for object in objects {
                let (object_properties, linked_properties) = snapshot(object);
                let mut filter_context = FilterContext {
                    object_properties,
                    linked_properties,
                    opposing: opposing_snapshots.clone(),
                    feature_pack_id: context.feature_pack_id,
                    inputs: context.inputs.clone(),
                };
                let matched = condition.evaluate(filter, &mut filter_context)?;

                object
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .add_filter_result(FilterResult {
                        name: filter_name.clone(),
                        matched,
                        filter_match_text: filter.filter_match_text.clone(),
                        reconcile_action: filter.reconcile_action.clone(),
                    });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::json;
    use std::sync::Arc;

    use recon_core::{
        AssetService, DiscoveredObject, JobDefinition, ScriptSettings, ServiceError, ServiceResult,
    };
    use recon_substitution::ScriptEvaluator;

    struct NoAssets;

    impl AssetService for NoAssets {
        fn get_asset_content(&self, name: &str, feature_pack_id: i64) -> ServiceResult<Vec<u8>> {
            Err(ServiceError::AssetNotFound {
                name: name.to_string(),
                feature_pack_id,
            })
        }
    }

    fn engine() -> ComparisonEngine {
        ComparisonEngine::new(ConditionRegistry::standard(
            Arc::new(ScriptEvaluator::new(ScriptSettings::default())),
            Arc::new(NoAssets),
        ))
    }

    fn job_with_filters() -> JobDefinition {
        serde_json::from_value(json!({
            "name": "compare-job",
            "discover": {
                "source": { "fetchAction": { "type": "rest" } },
                "target": { "fetchAction": { "type": "rest" } },
                "filters": {
                    "missingInTarget": {
                        "condition": { "name": "sourceNotInTarget", "arg": "id:targetId" },
                        "filterMatchText": "Missing in target",
                        "reconcileAction": "createInTarget"
                    },
                    "orphanInTarget": {
                        "condition": { "name": "targetNotInSource", "arg": "id:targetId" },
                        "filterMatchText": "Orphan in target"
                    }
                }
            }
        }))
        .unwrap()
    }

    fn context_with_objects() -> DiscoveryContext {
        let context = DiscoveryContext::new(
            1,
            "fp",
            2,
            "app",
            3,
            false,
            IndexMap::new(),
            job_with_filters(),
        );

        let mut present = IndexMap::new();
        present.insert("id".to_string(), json!("vm-1"));
        let mut missing = IndexMap::new();
        missing.insert("id".to_string(), json!("vm-2"));
        context.set_sources(vec![
            DiscoveredObject::new(3, ObjectKind::Source, present).shared(),
            DiscoveredObject::new(3, ObjectKind::Source, missing).shared(),
        ]);

        let mut target = IndexMap::new();
        target.insert("targetId".to_string(), json!("vm-1"));
        context.set_targets(vec![
            DiscoveredObject::new(3, ObjectKind::Target, target).shared(),
        ]);
        context
    }

    #[test]
    fn test_apply_filters_flags_discrepancies() {
        let context = context_with_objects();
        engine().apply_filters(&context).unwrap();

        let sources = context.sources();
        let first = sources[0].lock().unwrap();
        assert_eq!(first.filter_results.len(), 1);
        assert!(!first.filter_results[0].matched);
        drop(first);

        let second = sources[1].lock().unwrap();
        assert!(second.filter_results[0].matched);
        assert_eq!(second.filter_results[0].name, "missingInTarget");
        assert_eq!(
            second.filter_results[0].reconcile_action.as_deref(),
            Some("createInTarget")
        );
        drop(second);

        // The target filter ran against the target list.
        let targets = context.targets();
        let target = targets[0].lock().unwrap();
        assert_eq!(target.filter_results.len(), 1);
        assert!(!target.filter_results[0].matched);
    }

    #[test]
    fn test_apply_filters_accumulates_on_rerun() {
        let context = context_with_objects();
        let engine = engine();
        engine.apply_filters(&context).unwrap();
        engine.apply_filters(&context).unwrap();

        let sources = context.sources();
        let object = sources[0].lock().unwrap();
        assert_eq!(object.filter_results.len(), 2);
    }

    #[test]
    fn test_unknown_condition_is_fatal() {
        let mut job = job_with_filters();
        job.discover.filters.insert(
            "broken".to_string(),
            serde_json::from_value(json!({
                "condition": { "name": "bogus" }
            }))
            .unwrap(),
        );
        let context = DiscoveryContext::new(1, "fp", 2, "app", 3, false, IndexMap::new(), job);

        let err = engine().apply_filters(&context).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_CONDITION");
    }
}
