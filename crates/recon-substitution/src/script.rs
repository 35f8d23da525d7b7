//! Sandboxed script evaluation.
//!
//! Backs the `script` template helper and the script filter conditions.
//! A fresh, resource-limited engine is created per evaluation so no state
//! leaks between feature packs or jobs.

use indexmap::IndexMap;
use rhai::{Dynamic, Engine, Scope};
use serde_json::Value;
use tracing::{debug, info, warn};

use recon_core::ScriptSettings;

use crate::error::{SubstitutionError, SubstitutionResult};

/// Evaluates script expressions with JSON bindings inside a sandbox.
pub struct ScriptEvaluator {
    settings: ScriptSettings,
}

impl ScriptEvaluator {
    /// Create an evaluator with the given sandbox limits.
    #[must_use]
    pub fn new(settings: ScriptSettings) -> Self {
        Self { settings }
    }

    /// Create a sandboxed engine with resource limits.
    fn create_engine(&self) -> Engine {
        let mut engine = Engine::new();

        engine.set_max_operations(self.settings.max_operations);
        engine.set_max_call_levels(self.settings.max_call_levels);
        engine.set_max_string_size(self.settings.max_string_size);
        engine.set_max_array_size(self.settings.max_array_size);
        engine.set_max_map_size(self.settings.max_map_size);

        // Loops allowed but bounded by max_operations
        engine.set_allow_looping(true);
        engine.set_strict_variables(true);

        engine.register_fn("log_info", |msg: &str| {
            info!(script_log = %msg, "script log");
        });
        engine.register_fn("log_warn", |msg: &str| {
            warn!(script_log = %msg, "script warning");
        });
        engine.register_fn("log_debug", |msg: &str| {
            debug!(script_log = %msg, "script debug");
        });

        engine
    }

    /// Evaluate a script with the given bindings pushed into scope and
    /// convert the result back to JSON.
    pub fn eval(
        &self,
        source: &str,
        bindings: &IndexMap<String, Value>,
    ) -> SubstitutionResult<Value> {
        let engine = self.create_engine();

        let mut scope = Scope::new();
        for (name, value) in bindings {
            let dynamic = rhai::serde::to_dynamic(value).map_err(|e| {
                SubstitutionError::script_failed(format!("binding '{name}' conversion error: {e}"))
            })?;
            scope.push_dynamic(name.clone(), dynamic);
        }

        // Compile with scope so strict variables mode can see the bindings
        let ast = engine
            .compile_with_scope(&scope, source)
            .map_err(|e| SubstitutionError::script_failed(format!("compilation error: {e}")))?;

        let result = engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|e| SubstitutionError::script_failed(format!("runtime error: {e}")))?;

        rhai::serde::from_dynamic::<Value>(&result)
            .map_err(|e| SubstitutionError::script_failed(format!("result conversion error: {e}")))
    }
}
