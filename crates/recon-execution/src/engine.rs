//! The execution engine.
//!
//! Runs every action through the same pipeline: pre function, command,
//! post function, json mapping. Step failures are wrapped with the step
//! name and, once a command has run, the raw command response, so callers
//! can report what the command actually returned.

use std::sync::Arc;

use tracing::{debug, instrument};

use recon_core::{ActionType, AssetService, EngineSettings, PropertiesService};
use recon_substitution::SubstitutionEngine;

use crate::context::{ExecutionContext, ExecutionResult};
use crate::error::{CommandError, ExecutionError};
use crate::executors::{
    ExecutorRegistry, HttpExecutor, ProcessRunner, PythonAssetStore, PythonExecutor, ShellExecutor,
};
use crate::runner::NestedActionRunner;
use crate::steps;

/// Executes action definitions through the four-step pipeline.
pub struct ExecutionEngine {
    substitution: Arc<SubstitutionEngine>,
    asset_service: Arc<dyn AssetService>,
    python_assets: Arc<PythonAssetStore>,
    registry: ExecutorRegistry,
}

impl ExecutionEngine {
    /// Create an engine over an explicit executor registry.
    #[must_use]
    pub fn new(
        substitution: Arc<SubstitutionEngine>,
        asset_service: Arc<dyn AssetService>,
        python_assets: Arc<PythonAssetStore>,
        registry: ExecutorRegistry,
    ) -> Self {
        Self {
            substitution,
            asset_service,
            python_assets,
            registry,
        }
    }

    /// Wire up a complete engine: substitution engine, the three standard
    /// executors and the nested action runner bound back to the engine.
    pub fn bootstrap(
        asset_service: Arc<dyn AssetService>,
        properties_service: Arc<dyn PropertiesService>,
        settings: &EngineSettings,
    ) -> Result<Arc<Self>, CommandError> {
        let runner = Arc::new(NestedActionRunner::new());
        let substitution = Arc::new(SubstitutionEngine::new(
            properties_service,
            asset_service.clone(),
            runner.clone(),
            settings,
        ));
        let process = Arc::new(ProcessRunner::new(&settings.process));
        let python_assets = Arc::new(PythonAssetStore::new(
            asset_service.clone(),
            &settings.process,
        ));

        let mut registry = ExecutorRegistry::new();
        registry.register(
            ActionType::Rest,
            Arc::new(HttpExecutor::new(substitution.clone(), settings.http.clone())?),
        );
        registry.register(
            ActionType::Shell,
            Arc::new(ShellExecutor::new(substitution.clone(), process.clone())),
        );
        registry.register(
            ActionType::Python,
            Arc::new(PythonExecutor::new(
                substitution.clone(),
                process,
                python_assets.clone(),
                settings.http.clone(),
                &settings.process,
            )),
        );

        let engine = Arc::new(Self::new(
            substitution,
            asset_service,
            python_assets,
            registry,
        ));
        runner.bind(engine.clone());
        Ok(engine)
    }

    /// The substitution engine the pipeline renders templates with.
    #[must_use]
    pub fn substitution(&self) -> Arc<SubstitutionEngine> {
        self.substitution.clone()
    }

    /// The python asset store, for feature pack lifecycle cleanup.
    #[must_use]
    pub fn python_assets(&self) -> Arc<PythonAssetStore> {
        self.python_assets.clone()
    }

    /// Run an action through the pipeline.
    #[instrument(skip_all, fields(
        feature_pack_id = context.feature_pack_id,
        action_type = %context.action.action_type,
    ))]
    pub fn execute(&self, context: &ExecutionContext) -> Result<ExecutionResult, ExecutionError> {
        let command_context =
            steps::pre_function(&self.substitution, self.asset_service.as_ref(), context)
                .map_err(|e| ExecutionError::step_failed("preFunction", e))?;

        let executor = self
            .registry
            .get(context.action.action_type)
            .ok_or_else(|| ExecutionError::UnsupportedActionType {
                action_type: context.action.action_type.to_string(),
            })?;
        let command_input = ExecutionContext::new(
            context.feature_pack_id,
            context.action.clone(),
            command_context,
        );
        let response = executor
            .execute(&command_input)
            .map_err(|e| ExecutionError::command_step_failed("command", e))?;
        debug!(command = %response.command, "command completed");

        let processed = steps::post_function(
            &self.substitution,
            self.asset_service.as_ref(),
            context,
            &response,
        )
        .map_err(|e| ExecutionError::step_failed_with_response("postFunction", &response, e))?;

        let mapped = steps::json_mapping(&context.action, &processed, &response)?;
        Ok(ExecutionResult {
            command_response: response,
            mapped_command_response: mapped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::{json, Value};

    use recon_core::{ActionDefinition, ServiceError, ServiceResult};

    struct EmptyProperties;

    impl PropertiesService for EmptyProperties {
        fn get_properties(&self, _: i64) -> ServiceResult<IndexMap<String, Value>> {
            Ok(IndexMap::new())
        }
    }

    struct NoAssets;

    impl AssetService for NoAssets {
        fn get_asset_content(&self, name: &str, feature_pack_id: i64) -> ServiceResult<Vec<u8>> {
            Err(ServiceError::AssetNotFound {
                name: name.to_string(),
                feature_pack_id,
            })
        }
    }

    fn engine() -> Arc<ExecutionEngine> {
        ExecutionEngine::bootstrap(
            Arc::new(NoAssets),
            Arc::new(EmptyProperties),
            &EngineSettings::default(),
        )
        .unwrap()
    }

    fn context(action: ActionDefinition, pairs: &[(&str, Value)]) -> ExecutionContext {
        ExecutionContext::new(
            1,
            action,
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_shell_action_end_to_end() {
        let mut action = ActionDefinition::new(ActionType::Shell);
        action.command = Some(r#"echo '[{"name": "{{host}}"}, {"name": "b"}]'"#.to_string());
        action.mapping.insert("name".to_string(), ".name".to_string());

        let result = engine()
            .execute(&context(action, &[("host", json!("a"))]))
            .unwrap();

        assert_eq!(
            result.command_response.response,
            r#"[{"name": "a"}, {"name": "b"}]"#
        );
        let names: Vec<&Value> = result
            .mapped_command_response
            .iter()
            .map(|row| &row["name"])
            .collect();
        assert_eq!(names, vec![&json!("a"), &json!("b")]);
    }

    #[test]
    fn test_shell_action_without_mapping_yields_raw_response_only() {
        let mut action = ActionDefinition::new(ActionType::Shell);
        action.command = Some("echo hello".to_string());

        let result = engine().execute(&context(action, &[])).unwrap();
        assert_eq!(result.command_response.response, "hello");
        assert!(result.mapped_command_response.is_empty());
    }

    #[test]
    fn test_unsupported_action_type() {
        let substitution = Arc::new(SubstitutionEngine::new(
            Arc::new(EmptyProperties),
            Arc::new(NoAssets),
            Arc::new(NestedActionRunner::new()),
            &EngineSettings::default(),
        ));
        let store = Arc::new(PythonAssetStore::new(
            Arc::new(NoAssets),
            &EngineSettings::default().process,
        ));
        let engine = ExecutionEngine::new(
            substitution,
            Arc::new(NoAssets),
            store,
            ExecutorRegistry::new(),
        );

        let action = ActionDefinition::new(ActionType::Shell);
        let err = engine.execute(&context(action, &[])).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_ACTION_TYPE");
    }

    #[test]
    fn test_command_failure_carries_step_and_output() {
        let mut action = ActionDefinition::new(ActionType::Shell);
        action.command = Some("ls /definitely/not/a/path".to_string());

        let err = engine().execute(&context(action, &[])).unwrap_err();
        match &err {
            ExecutionError::StepFailed { step, .. } => assert_eq!(*step, "command"),
            other => panic!("unexpected error: {other}"),
        }
        let response = err.command_response().unwrap();
        assert!(response.command.contains("ls /definitely/not/a/path"));
    }

    #[test]
    fn test_post_function_failure_preserves_command_response() {
        let mut action = ActionDefinition::new(ActionType::Shell);
        action.command = Some("echo raw".to_string());
        action.post_function = Some("@missing.template".to_string());

        let err = engine().execute(&context(action, &[])).unwrap_err();
        match &err {
            ExecutionError::StepFailed { step, .. } => assert_eq!(*step, "postFunction"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.command_response().unwrap().response, "raw");
    }

    #[test]
    fn test_nested_action_through_execute_helper() {
        let mut nested = ActionDefinition::new(ActionType::Shell);
        nested.command = Some(r#"echo '[{"id": 1}, {"id": 2}]'"#.to_string());
        nested.mapping.insert("value".to_string(), ".id".to_string());

        let mut action = ActionDefinition::new(ActionType::Shell);
        action.command = Some("echo {{execute nested}}".to_string());
        let nested_json = serde_json::to_value(&nested).unwrap();

        let result = engine()
            .execute(&context(action, &[("nested", nested_json)]))
            .unwrap();
        assert_eq!(result.command_response.response, "[1,2]");
    }
}
