//! HTTP executor integration tests against a mock server.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use recon_core::{
    ActionDefinition, ActionType, AssetService, EngineSettings, HttpSettings, PropertiesService,
    ServiceError, ServiceResult,
};
use recon_execution::executors::HttpExecutor;
use recon_execution::{CommandExecutor, ExecutionContext, ExecutionEngine};
use recon_substitution::SubstitutionEngine;

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

fn settings_with_http(http: HttpSettings) -> EngineSettings {
    EngineSettings {
        http,
        ..EngineSettings::default()
    }
}

fn engine(settings: &EngineSettings) -> Arc<ExecutionEngine> {
    ExecutionEngine::bootstrap(Arc::new(NoAssets), Arc::new(EmptyProperties), settings).unwrap()
}

fn executor(settings: &EngineSettings) -> HttpExecutor {
    let substitution = Arc::new(SubstitutionEngine::new(
        Arc::new(EmptyProperties),
        Arc::new(NoAssets),
        Arc::new(recon_execution::NestedActionRunner::new()),
        settings,
    ));
    HttpExecutor::new(substitution, settings.http.clone()).unwrap()
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

#[tokio::test]
async fn test_rest_action_with_mapping_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "name": "vm-1"},
            {"id": 2, "name": "vm-2"},
        ])))
        .mount(&server)
        .await;

    let mut action = ActionDefinition::new(ActionType::Rest);
    action
        .properties
        .insert("url".to_string(), json!(format!("{}/objects", server.uri())));
    action.properties.insert("method".to_string(), json!("GET"));
    action.mapping.insert("id".to_string(), ".id".to_string());
    action.mapping.insert("name".to_string(), ".name".to_string());

    let settings = EngineSettings::default();
    let result = tokio::task::spawn_blocking(move || {
        engine(&settings).execute(&context(action, &[]))
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(result.mapped_command_response.len(), 2);
    assert_eq!(result.mapped_command_response[0]["id"], json!(1));
    assert_eq!(result.mapped_command_response[1]["name"], json!("vm-2"));
    assert!(result.command_response.command.starts_with("GET "));
}

#[tokio::test]
async fn test_rest_action_renders_url_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/subsystems/net-1/objects"))
        .and(header("X-Request-Source", "recon"))
        .and(body_json(json!({"query": "all"})))
        .respond_with(ResponseTemplate::new(201).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let mut action = ActionDefinition::new(ActionType::Rest);
    action.properties.insert(
        "url".to_string(),
        json!(format!("{}/subsystems/{{{{subsystem}}}}/objects", server.uri())),
    );
    action.properties.insert("method".to_string(), json!("post"));
    action.properties.insert(
        "headers".to_string(),
        json!({"X-Request-Source": "{{requestSource}}"}),
    );
    action
        .properties
        .insert("body".to_string(), json!({"query": "all"}));

    let settings = EngineSettings::default();
    let result = tokio::task::spawn_blocking(move || {
        engine(&settings).execute(&context(
            action,
            &[
                ("subsystem", json!("net-1")),
                ("requestSource", json!("recon")),
            ],
        ))
    })
    .await
    .unwrap()
    .unwrap();

    assert!(result.mapped_command_response.is_empty());
}

#[tokio::test]
async fn test_rest_action_without_url_uses_internal_run_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest-service/v1/run/enm-1/node/router"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut action = ActionDefinition::new(ActionType::Rest);
    action
        .properties
        .insert("subsystemName".to_string(), json!("enm-1"));
    action.properties.insert(
        "resource".to_string(),
        json!({"resourceConfigurationName": "node", "resourceName": "{{name}}"}),
    );
    action.mapping.insert("state".to_string(), ".state".to_string());

    let settings = settings_with_http(HttpSettings {
        internal_rest_base_url: server.uri(),
        ..HttpSettings::default()
    });
    let result = tokio::task::spawn_blocking(move || {
        engine(&settings).execute(&context(action, &[("name", json!("router"))]))
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(result.mapped_command_response[0]["state"], json!("ok"));
}

#[tokio::test]
async fn test_internal_run_endpoint_ignores_declared_headers() {
    let server = MockServer::start().await;
    // A request carrying the declared header must never arrive.
    Mock::given(method("POST"))
        .and(path("/rest-service/v1/run/enm-1/node/router"))
        .and(header("X-Custom", "leaked"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest-service/v1/run/enm-1/node/router"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let mut action = ActionDefinition::new(ActionType::Rest);
    action
        .properties
        .insert("subsystemName".to_string(), json!("enm-1"));
    action.properties.insert(
        "resource".to_string(),
        json!({"resourceConfigurationName": "node", "resourceName": "router"}),
    );
    action
        .properties
        .insert("headers".to_string(), json!({"X-Custom": "leaked"}));

    let settings = settings_with_http(HttpSettings {
        internal_rest_base_url: server.uri(),
        ..HttpSettings::default()
    });
    let result = tokio::task::spawn_blocking(move || {
        engine(&settings).execute(&context(action, &[]))
    })
    .await
    .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_declared_write_timeout_bounds_the_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let settings = settings_with_http(HttpSettings {
        retry_attempts: 1,
        ..HttpSettings::default()
    });
    let url = format!("{}/slow", server.uri());

    let err = tokio::task::spawn_blocking(move || {
        let mut action = ActionDefinition::new(ActionType::Rest);
        action.properties.insert("url".to_string(), json!(url));
        action
            .properties
            .insert("writeTimeoutSeconds".to_string(), json!(1));
        executor(&settings).execute(&context(action, &[]))
    })
    .await
    .unwrap()
    .unwrap_err();

    assert_eq!(err.error_code(), "RETRIES_EXHAUSTED");
}

#[tokio::test]
async fn test_invalid_timeout_property_rejected() {
    let settings = EngineSettings::default();
    let err = tokio::task::spawn_blocking(move || {
        let mut action = ActionDefinition::new(ActionType::Rest);
        action
            .properties
            .insert("url".to_string(), json!("http://127.0.0.1:9/objects"));
        action
            .properties
            .insert("connectTimeoutSeconds".to_string(), json!("soon"));
        executor(&settings).execute(&context(action, &[]))
    })
    .await
    .unwrap()
    .unwrap_err();

    assert_eq!(err.error_code(), "INVALID_PROPERTIES");
    assert!(err.to_string().contains("connectTimeoutSeconds"));
}

#[tokio::test]
async fn test_error_response_captured_in_step_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/objects"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
        .mount(&server)
        .await;

    let mut action = ActionDefinition::new(ActionType::Rest);
    action
        .properties
        .insert("url".to_string(), json!(format!("{}/objects", server.uri())));

    let settings = EngineSettings::default();
    let err = tokio::task::spawn_blocking(move || {
        engine(&settings).execute(&context(action, &[]))
    })
    .await
    .unwrap()
    .unwrap_err();

    let response = err.command_response().unwrap();
    assert_eq!(response.response, "backend exploded");
}

#[tokio::test]
async fn test_connectivity_failures_retry_until_exhausted() {
    let settings = settings_with_http(HttpSettings {
        retry_attempts: 2,
        retry_delay_millis: 10,
        connect_timeout_secs: 1,
        ..HttpSettings::default()
    });

    let err = tokio::task::spawn_blocking(move || {
        let mut action = ActionDefinition::new(ActionType::Rest);
        // Reserved port, nothing listens there.
        action
            .properties
            .insert("url".to_string(), json!("http://127.0.0.1:9/objects"));
        executor(&settings).execute(&context(action, &[]))
    })
    .await
    .unwrap()
    .unwrap_err();

    assert_eq!(err.error_code(), "RETRIES_EXHAUSTED");
    assert!(err.is_permanent());
}
