//! The substitution engine.

use std::sync::Arc;

use handlebars::Handlebars;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

use recon_core::{AssetService, EngineSettings, PropertiesService};

use crate::error::{SubstitutionError, SubstitutionResult};
use crate::functions::{
    CurrentTimeMillisHelper, CurrentTimeStampHelper, ExecuteActionHelper, JqHelper,
    ReplaceAtSymbolHelper, ScriptHelper,
};
use crate::runner::ActionRunner;
use crate::script::ScriptEvaluator;

/// Internal binding carrying the feature pack id into helper invocations.
pub const FP_CTX_VAR: &str = "__featurePackId__";

/// Renders templates against a runtime context, feature-pack properties and
/// the built-in helper functions.
///
/// Rendering is not guaranteed side-effect-free: the `execute` helper can
/// trigger arbitrary command execution when the template invokes it.
pub struct SubstitutionEngine {
    registry: Handlebars<'static>,
    properties_service: Arc<dyn PropertiesService>,
}

impl SubstitutionEngine {
    /// Create the engine and register the built-in helpers.
    pub fn new(
        properties_service: Arc<dyn PropertiesService>,
        asset_service: Arc<dyn AssetService>,
        action_runner: Arc<dyn ActionRunner>,
        settings: &EngineSettings,
    ) -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(settings.substitution.fail_on_unknown_tokens);
        registry.register_escape_fn(handlebars::no_escape);

        let evaluator = Arc::new(ScriptEvaluator::new(settings.script.clone()));

        registry.register_helper("jq", Box::new(JqHelper));
        registry.register_helper(
            "execute",
            Box::new(ExecuteActionHelper {
                runner: action_runner,
            }),
        );
        registry.register_helper(
            "script",
            Box::new(ScriptHelper {
                evaluator,
                asset_service,
            }),
        );
        registry.register_helper("replaceAtSymbol", Box::new(ReplaceAtSymbolHelper));
        registry.register_helper("currentTimeStamp", Box::new(CurrentTimeStampHelper));
        registry.register_helper("currentTimeMillis", Box::new(CurrentTimeMillisHelper));

        Self {
            registry,
            properties_service,
        }
    }

    /// Render a template against the substitution context.
    ///
    /// When a feature pack id is supplied, the feature pack's properties are
    /// merged into the bindings under the `properties` key and the id itself
    /// is injected for helpers that need it.
    pub fn render(
        &self,
        template: &str,
        context: &IndexMap<String, Value>,
        feature_pack_id: Option<i64>,
    ) -> SubstitutionResult<String> {
        let mut bindings = Map::with_capacity(context.len() + 2);
        for (key, value) in context {
            bindings.insert(key.clone(), value.clone());
        }

        if let Some(fp_id) = feature_pack_id {
            let properties = self.properties_service.get_properties(fp_id)?;
            if !properties.is_empty() {
                bindings.insert(
                    "properties".to_string(),
                    serde_json::to_value(&properties).map_err(|e| {
                        SubstitutionError::render_failed(format!(
                            "failed to serialize feature pack properties: {e}"
                        ))
                    })?,
                );
            }
        }
        bindings.insert(
            FP_CTX_VAR.to_string(),
            feature_pack_id.map_or(Value::Null, Value::from),
        );

        debug!(template, feature_pack_id, "rendering template");
        self.registry
            .render_template(template, &Value::Object(bindings))
            .map_err(|e| SubstitutionError::render_failed(e.to_string()))
    }
}
