//! Seam between the `execute` helper and the execution engine.

use indexmap::IndexMap;
use serde_json::Value;

use recon_core::ActionDefinition;

use crate::error::SubstitutionResult;

/// Executes an action definition on behalf of the `execute` template helper.
///
/// Implemented by the execution engine; the indirection keeps the template
/// engine free of a direct dependency on action execution while still
/// allowing templates to trigger it.
pub trait ActionRunner: Send + Sync {
    /// Execute the action and return the mapped command response rows.
    fn run(
        &self,
        action: ActionDefinition,
        feature_pack_id: i64,
    ) -> SubstitutionResult<Vec<IndexMap<String, Value>>>;
}
