//! Nested action execution for the `execute` template helper.

use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use serde_json::Value;

use recon_core::ActionDefinition;
use recon_substitution::{ActionRunner, SubstitutionError, SubstitutionResult};

use crate::context::ExecutionContext;
use crate::engine::ExecutionEngine;

/// [`ActionRunner`] backed by the execution engine.
///
/// The runner is handed to the substitution engine before the execution
/// engine exists (the engine needs the substitution engine to be built)
/// and bound to it afterwards. Running an action before the bind is an
/// error, not a panic.
#[derive(Default)]
pub struct NestedActionRunner {
    engine: OnceLock<Arc<ExecutionEngine>>,
}

impl NestedActionRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the runner to the execution engine. Later binds are ignored.
    pub fn bind(&self, engine: Arc<ExecutionEngine>) {
        let _ = self.engine.set(engine);
    }
}

impl ActionRunner for NestedActionRunner {
    fn run(
        &self,
        action: ActionDefinition,
        feature_pack_id: i64,
    ) -> SubstitutionResult<Vec<IndexMap<String, Value>>> {
        let engine = self.engine.get().ok_or_else(|| {
            SubstitutionError::nested_action_failed("execution engine is not bound")
        })?;

        // Nested actions start from an empty substitution context; they see
        // only feature pack properties and their own pre function output.
        let context = ExecutionContext::new(feature_pack_id, action, IndexMap::new());
        let result = engine
            .execute(&context)
            .map_err(|e| SubstitutionError::nested_action_failed(e.to_string()))?;
        Ok(result.mapped_command_response)
    }
}
