//! Pipeline steps.
//!
//! The pipeline runs every action through the same four steps: pre
//! function, command, post function, json mapping. The pre and post steps
//! are template renders; the mapping step turns the processed output into
//! rows via the configured jq expressions.

use indexmap::IndexMap;
use serde_json::Value;

use recon_core::{ActionDefinition, AssetService};
use recon_substitution::jq;
use recon_substitution::{SubstitutionEngine, SubstitutionError, SubstitutionResult};

use crate::context::{CommandResponse, ExecutionContext};
use crate::error::ExecutionError;

/// Key under which the pre function output is exposed to later templates.
pub const PRE_FUNCTION_KEY: &str = "preFunction";

/// Resolve a template that may reference a feature-pack asset by `@name`.
fn resolve_template(
    asset_service: &dyn AssetService,
    template: &str,
    feature_pack_id: i64,
) -> SubstitutionResult<String> {
    match template.strip_prefix('@') {
        Some(asset_name) => {
            let content = asset_service.get_asset_content(asset_name, feature_pack_id)?;
            Ok(String::from_utf8_lossy(&content).into_owned())
        }
        None => Ok(template.to_string()),
    }
}

/// Whether the action consumes the pre function output as raw text. True
/// when the properties reference the `{{preFunction}}` token directly, in
/// which case the output is not parsed as JSON.
fn references_pre_function_token(action: &ActionDefinition) -> bool {
    let serialized = serde_json::to_string(&action.properties).unwrap_or_default();
    let stripped: String = serialized.chars().filter(|c| !c.is_whitespace()).collect();
    stripped.contains("{{preFunction}}")
}

/// Run the pre function and build the substitution context for the command
/// step. Without a pre function the incoming context is used unchanged.
///
/// The pre function output is inserted under `preFunction`, then the
/// incoming context is laid over it, so a context key of the same name
/// wins.
pub fn pre_function(
    substitution: &SubstitutionEngine,
    asset_service: &dyn AssetService,
    context: &ExecutionContext,
) -> SubstitutionResult<IndexMap<String, Value>> {
    let Some(template) = &context.action.pre_function else {
        return Ok(context.substitution_context.clone());
    };

    let source = resolve_template(asset_service, template, context.feature_pack_id)?;
    let rendered = substitution.render(
        &source,
        &context.substitution_context,
        Some(context.feature_pack_id),
    )?;

    let output = if references_pre_function_token(&context.action) {
        Value::String(rendered)
    } else {
        serde_json::from_str(&rendered).map_err(|e| {
            SubstitutionError::render_failed(format!("pre function output is not valid JSON: {e}"))
        })?
    };

    let mut command_context = IndexMap::with_capacity(context.substitution_context.len() + 1);
    command_context.insert(PRE_FUNCTION_KEY.to_string(), output);
    for (key, value) in &context.substitution_context {
        command_context.insert(key.clone(), value.clone());
    }
    Ok(command_context)
}

/// Run the post function over the raw command response. Without a post
/// function the raw response passes through unchanged.
pub fn post_function(
    substitution: &SubstitutionEngine,
    asset_service: &dyn AssetService,
    context: &ExecutionContext,
    response: &CommandResponse,
) -> SubstitutionResult<String> {
    let Some(template) = &context.action.post_function else {
        return Ok(response.response.clone());
    };

    let source = resolve_template(asset_service, template, context.feature_pack_id)?;
    let mut bindings = IndexMap::with_capacity(1);
    bindings.insert(
        "originalOutputs".to_string(),
        Value::String(response.response.clone()),
    );
    substitution.render(&source, &bindings, Some(context.feature_pack_id))
}

/// Apply the output mapping to the processed command output.
///
/// A JSON array input yields one row per element in array order; a JSON
/// object yields a single row. Anything else is rejected. An action without
/// a mapping yields no rows.
pub fn json_mapping(
    action: &ActionDefinition,
    output: &str,
    response: &CommandResponse,
) -> Result<Vec<IndexMap<String, Value>>, ExecutionError> {
    if action.mapping.is_empty() {
        return Ok(Vec::new());
    }

    let invalid_input = |input: &str| ExecutionError::InvalidMappingInput {
        input: input.to_string(),
        command: Some(response.command.clone()),
        command_output: Some(response.response.clone()),
    };

    let parsed: Value = serde_json::from_str(output).map_err(|_| invalid_input(output))?;
    let elements = match parsed {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        other => return Err(invalid_input(&other.to_string())),
    };

    let mut rows = Vec::with_capacity(elements.len());
    for element in &elements {
        let row = jq::query_map(&action.mapping, element)
            .map_err(|e| ExecutionError::step_failed_with_response("jsonMapping", response, e))?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    use recon_core::{ActionType, EngineSettings, PropertiesService, ServiceError, ServiceResult};
    use recon_substitution::ActionRunner;

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

    struct StaticAssets {
        content: &'static str,
    }

    impl AssetService for StaticAssets {
        fn get_asset_content(&self, _: &str, _: i64) -> ServiceResult<Vec<u8>> {
            Ok(self.content.as_bytes().to_vec())
        }
    }

    struct UnusedRunner;

    impl ActionRunner for UnusedRunner {
        fn run(
            &self,
            _: ActionDefinition,
            _: i64,
        ) -> SubstitutionResult<Vec<IndexMap<String, Value>>> {
            panic!("runner must not be invoked");
        }
    }

    fn engine() -> SubstitutionEngine {
        SubstitutionEngine::new(
            Arc::new(EmptyProperties),
            Arc::new(NoAssets),
            Arc::new(UnusedRunner),
            &EngineSettings::default(),
        )
    }

    fn context_with(action: ActionDefinition, pairs: &[(&str, Value)]) -> ExecutionContext {
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
    fn test_pre_function_absent_passes_context_through() {
        let context = context_with(
            ActionDefinition::new(ActionType::Shell),
            &[("id", json!(7))],
        );
        let result = pre_function(&engine(), &NoAssets, &context).unwrap();
        assert_eq!(result, context.substitution_context);
    }

    #[test]
    fn test_pre_function_output_parsed_as_json() {
        let mut action = ActionDefinition::new(ActionType::Shell);
        action.pre_function = Some(r#"{"derived": "{{id}}"}"#.to_string());
        let context = context_with(action, &[("id", json!("vm-1"))]);

        let result = pre_function(&engine(), &NoAssets, &context).unwrap();
        assert_eq!(result["preFunction"], json!({"derived": "vm-1"}));
        assert_eq!(result["id"], json!("vm-1"));
    }

    #[test]
    fn test_pre_function_output_kept_raw_when_token_referenced() {
        let mut action = ActionDefinition::new(ActionType::Shell);
        action.pre_function = Some("not json: {{id}}".to_string());
        action
            .properties
            .insert("body".to_string(), json!("{{ preFunction }}"));
        let context = context_with(action, &[("id", json!("vm-1"))]);

        let result = pre_function(&engine(), &NoAssets, &context).unwrap();
        assert_eq!(result["preFunction"], json!("not json: vm-1"));
    }

    #[test]
    fn test_pre_function_context_key_shadows_output() {
        let mut action = ActionDefinition::new(ActionType::Shell);
        action.pre_function = Some(r#"{"a": 1}"#.to_string());
        let context = context_with(action, &[("preFunction", json!("original"))]);

        let result = pre_function(&engine(), &NoAssets, &context).unwrap();
        assert_eq!(result["preFunction"], json!("original"));
    }

    #[test]
    fn test_pre_function_resolves_asset_template() {
        let mut action = ActionDefinition::new(ActionType::Shell);
        action.pre_function = Some("@pre.template".to_string());
        let context = context_with(action, &[("id", json!(3))]);
        let assets = StaticAssets {
            content: r#"{"id": {{id}}}"#,
        };

        let result = pre_function(&engine(), &assets, &context).unwrap();
        assert_eq!(result["preFunction"], json!({"id": 3}));
    }

    #[test]
    fn test_post_function_absent_passes_response_through() {
        let context = context_with(ActionDefinition::new(ActionType::Shell), &[]);
        let response = CommandResponse::new("echo", "raw output");
        let result = post_function(&engine(), &NoAssets, &context, &response).unwrap();
        assert_eq!(result, "raw output");
    }

    #[test]
    fn test_post_function_binds_original_outputs() {
        let mut action = ActionDefinition::new(ActionType::Shell);
        action.post_function = Some("wrapped: {{originalOutputs}}".to_string());
        let context = context_with(action, &[]);
        let response = CommandResponse::new("echo", "raw");

        let result = post_function(&engine(), &NoAssets, &context, &response).unwrap();
        assert_eq!(result, "wrapped: raw");
    }

    #[test]
    fn test_json_mapping_without_mapping_yields_no_rows() {
        let action = ActionDefinition::new(ActionType::Shell);
        let response = CommandResponse::new("echo", "anything");
        let rows = json_mapping(&action, "anything", &response).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_json_mapping_array_preserves_element_order() {
        let mut action = ActionDefinition::new(ActionType::Rest);
        action.mapping.insert("name".to_string(), ".name".to_string());
        let output = r#"[{"name": "a"}, {"name": "b"}, {"name": "c"}]"#;
        let response = CommandResponse::new("GET http://host", output);

        let rows = json_mapping(&action, output, &response).unwrap();
        let names: Vec<&Value> = rows.iter().map(|row| &row["name"]).collect();
        assert_eq!(names, vec![&json!("a"), &json!("b"), &json!("c")]);
    }

    #[test]
    fn test_json_mapping_object_yields_single_row() {
        let mut action = ActionDefinition::new(ActionType::Rest);
        action.mapping.insert("id".to_string(), ".id".to_string());
        let output = r#"{"id": 9}"#;
        let response = CommandResponse::new("GET http://host", output);

        let rows = json_mapping(&action, output, &response).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(9));
    }

    #[test]
    fn test_json_mapping_scalar_input_rejected() {
        let mut action = ActionDefinition::new(ActionType::Rest);
        action.mapping.insert("id".to_string(), ".id".to_string());
        let response = CommandResponse::new("GET http://host", "42");

        let err = json_mapping(&action, "42", &response).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_MAPPING_INPUT");
        let captured = err.command_response().unwrap();
        assert_eq!(captured.command, "GET http://host");
    }
}
