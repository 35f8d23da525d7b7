//! Feature-pack configuration tree.
//!
//! The configuration is loaded and validated by the surrounding system and
//! consumed read-only by the engine. Maps use [`IndexMap`] so that filter
//! and mapping declaration order is preserved through evaluation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ActionType;

/// A configured unit of work: an HTTP call, shell command or python script
/// with optional pre/post processing and output mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    /// Command type, selects the executor.
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Shell command or python asset name. Unused by rest actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Template applied to the substitution context before the command runs.
    /// An `@name` value resolves the template from a feature-pack asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_function: Option<String>,
    /// Template applied to the raw command response. `@name` resolves an asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_function: Option<String>,
    /// Executor-specific properties (url/method/headers/body for rest,
    /// arg0..argN for python, timeouts, subsystem routing).
    #[serde(default)]
    pub properties: IndexMap<String, Value>,
    /// Output mapping: output key to jq expression over the response.
    #[serde(default)]
    pub mapping: IndexMap<String, String>,
}

impl ActionDefinition {
    /// Create a definition with only a type; the rest is filled in by the
    /// configuration loader or test builders.
    #[must_use]
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            command: None,
            pre_function: None,
            post_function: None,
            properties: IndexMap::new(),
            mapping: IndexMap::new(),
        }
    }
}

/// Condition attached to a comparison filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionDefinition {
    /// Registry key of the condition implementation, e.g. `sourceInTarget`.
    pub name: String,
    /// Condition argument: property pairs (`srcProp:targetProp&...`) or a
    /// script expression for script conditions (`@name` resolves an asset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
}

/// Comparison filter applied to discovered objects. A filter without a
/// condition matches every source object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionDefinition>,
    /// Human-readable discrepancy text recorded with a match.
    #[serde(default)]
    pub filter_match_text: String,
    /// Name of the corrective action configured for this filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconcile_action: Option<String>,
}

/// Fetch and optional enrichment actions for one side of a discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchDefinition {
    pub fetch_action: ActionDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrich_action: Option<ActionDefinition>,
}

/// Discovery section of a job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverDefinition {
    pub source: FetchDefinition,
    pub target: FetchDefinition,
    /// Property pairs used to link each source to its matching target,
    /// in the same `srcProp:targetProp&...` format as condition args.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_source_and_target: Option<String>,
    /// Comparison filters in declaration order.
    #[serde(default)]
    pub filters: IndexMap<String, FilterDefinition>,
}

/// Corrective action bound to a matched filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileFilterDefinition {
    pub reconcile_action: ActionDefinition,
}

/// Reconciliation section of a job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_enrich_action: Option<ActionDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_enrich_action: Option<ActionDefinition>,
    /// Filter name to its corrective action.
    #[serde(default)]
    pub filters: IndexMap<String, ReconcileFilterDefinition>,
}

/// A job configuration linking discovery and reconciliation sub-configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub discover: DiscoverDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconcile: Option<ReconcileDefinition>,
}
