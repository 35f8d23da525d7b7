//! HTTP command executor.
//!
//! Builds a request from the action properties, rendering every fragment
//! through the substitution engine. An action without a `url` property is
//! routed to the internal REST service using the default run shape.
//! Connectivity failures are retried with a fixed delay; response errors
//! are not.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use recon_core::HttpSettings;
use recon_substitution::SubstitutionEngine;

use crate::context::{CommandResponse, ExecutionContext};
use crate::error::CommandError;
use crate::executors::CommandExecutor;

/// A fully rendered request, ready to send.
struct HttpRequest {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
    /// Whole-request deadline, summed from the action's declared
    /// connect/read/write budgets. The client has no per-phase override
    /// at request granularity, so the budgets share one deadline.
    deadline_secs: Option<u64>,
}

impl fmt::Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Executes rest actions over a pooled blocking HTTP client.
pub struct HttpExecutor {
    client: reqwest::blocking::Client,
    substitution: Arc<SubstitutionEngine>,
    settings: HttpSettings,
}

impl HttpExecutor {
    /// Create the executor and its connection pool.
    pub fn new(
        substitution: Arc<SubstitutionEngine>,
        settings: HttpSettings,
    ) -> Result<Self, CommandError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.read_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(settings.pool_idle_timeout_secs))
            .pool_max_idle_per_host(settings.pool_max_idle_per_host)
            .build()
            .map_err(|e| CommandError::RequestFailed {
                command: "http client initialization".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            substitution,
            settings,
        })
    }

    /// Case-insensitive property lookup; action property keys come from
    /// hand-written configuration.
    fn property<'a>(properties: &'a IndexMap<String, Value>, key: &str) -> Option<&'a Value> {
        properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    fn render(&self, template: &str, context: &ExecutionContext) -> Result<String, CommandError> {
        Ok(self.substitution.render(
            template,
            &context.substitution_context,
            Some(context.feature_pack_id),
        )?)
    }

    fn parse_method(&self, value: &Value, context: &ExecutionContext) -> Result<Method, CommandError> {
        let name = value
            .as_str()
            .ok_or_else(|| CommandError::invalid_properties("'method' must be a string"))?;
        let rendered = self.render(name, context)?;
        Method::from_bytes(rendered.to_uppercase().as_bytes())
            .map_err(|_| CommandError::invalid_properties(format!("unknown http method '{rendered}'")))
    }

    fn parse_headers(
        &self,
        value: &Value,
        context: &ExecutionContext,
    ) -> Result<Vec<(String, String)>, CommandError> {
        let map = value
            .as_object()
            .ok_or_else(|| CommandError::invalid_properties("'headers' must be an object"))?;
        let mut headers = Vec::new();
        for (name, header_value) in map {
            match header_value {
                Value::String(s) => headers.push((name.clone(), self.render(s, context)?)),
                Value::Array(items) => {
                    for item in items {
                        let s = item.as_str().ok_or_else(|| {
                            CommandError::invalid_properties(format!(
                                "header '{name}' values must be strings"
                            ))
                        })?;
                        headers.push((name.clone(), self.render(s, context)?));
                    }
                }
                _ => {
                    return Err(CommandError::invalid_properties(format!(
                        "header '{name}' must be a string or an array of strings"
                    )))
                }
            }
        }
        Ok(headers)
    }

    fn parse_body(
        &self,
        properties: &IndexMap<String, Value>,
        context: &ExecutionContext,
    ) -> Result<Option<String>, CommandError> {
        match Self::property(properties, "body") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(self.render(s, context)?)),
            Some(other) => {
                let serialized = other.to_string();
                Ok(Some(self.render(&serialized, context)?))
            }
        }
    }

    fn parse_timeout_secs(
        properties: &IndexMap<String, Value>,
        key: &str,
    ) -> Result<Option<u64>, CommandError> {
        match Self::property(properties, key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                .map(Some)
                .ok_or_else(|| {
                    CommandError::invalid_properties(format!("'{key}' must be a positive integer"))
                }),
        }
    }

    /// Build a request from the action properties. When no `url` property is
    /// declared, the action targets the internal REST service run endpoint,
    /// addressed by subsystem and resource, with fixed JSON headers; a
    /// declared `headers` property applies only to explicit urls.
    fn parse_properties(&self, context: &ExecutionContext) -> Result<HttpRequest, CommandError> {
        let properties = &context.action.properties;

        let (method, url, headers) = match Self::property(properties, "url") {
            Some(url_value) => {
                let url_template = url_value
                    .as_str()
                    .ok_or_else(|| CommandError::invalid_properties("'url' must be a string"))?;
                let url = self.render(url_template, context)?;
                let method = match Self::property(properties, "method") {
                    Some(value) => self.parse_method(value, context)?,
                    None => Method::GET,
                };
                let headers = match Self::property(properties, "headers") {
                    Some(value) => self.parse_headers(value, context)?,
                    None => Vec::new(),
                };
                (method, url, headers)
            }
            None => (
                Method::POST,
                self.internal_run_url(context)?,
                vec![
                    ("Content-Type".to_string(), "application/json".to_string()),
                    ("Accept".to_string(), "*/*".to_string()),
                ],
            ),
        };

        let connect = Self::parse_timeout_secs(properties, "connectTimeoutSeconds")?;
        let read = Self::parse_timeout_secs(properties, "readTimeoutSeconds")?;
        let write = Self::parse_timeout_secs(properties, "writeTimeoutSeconds")?;
        let deadline_secs = [connect, read, write]
            .into_iter()
            .flatten()
            .reduce(u64::saturating_add);

        Ok(HttpRequest {
            method,
            url,
            headers,
            body: self.parse_body(properties, context)?,
            deadline_secs,
        })
    }

    fn internal_run_url(&self, context: &ExecutionContext) -> Result<String, CommandError> {
        let properties = &context.action.properties;
        let subsystem = Self::property(properties, "subsystemName")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CommandError::invalid_properties(
                    "rest action without 'url' requires a 'subsystemName' property",
                )
            })?;
        let resource = Self::property(properties, "resource")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                CommandError::invalid_properties(
                    "rest action without 'url' requires a 'resource' object property",
                )
            })?;
        let configuration = resource
            .get("resourceConfigurationName")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CommandError::invalid_properties("'resource' requires 'resourceConfigurationName'")
            })?;
        let name = resource
            .get("resourceName")
            .and_then(Value::as_str)
            .ok_or_else(|| CommandError::invalid_properties("'resource' requires 'resourceName'"))?;

        let url = format!(
            "{}{}/{}/{}/{}",
            self.settings.internal_rest_base_url,
            self.settings.internal_rest_run_path,
            self.render(subsystem, context)?,
            self.render(configuration, context)?,
            self.render(name, context)?,
        );
        Ok(url)
    }

    fn send(&self, request: &HttpRequest) -> Result<reqwest::blocking::Response, reqwest::Error> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(secs) = request.deadline_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder.send()
    }
}

impl CommandExecutor for HttpExecutor {
    fn execute(&self, context: &ExecutionContext) -> Result<CommandResponse, CommandError> {
        let request = self.parse_properties(context)?;
        let command = request.to_string();

        let attempts = self.settings.retry_attempts.max(1);
        let mut last_failure: Option<CommandError> = None;
        for attempt in 1..=attempts {
            debug!(command = %command, attempt, "sending http request");
            match self.send(&request) {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().map_err(|e| CommandError::RequestFailed {
                        command: command.clone(),
                        message: format!("failed to read response body: {e}"),
                    })?;
                    if !status.is_success() {
                        return Err(CommandError::HttpResponse {
                            command,
                            status: status.as_u16(),
                            body,
                        });
                    }
                    return Ok(CommandResponse::new(command, body));
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!(command = %command, attempt, error = %e, "connectivity failure");
                    last_failure = Some(CommandError::ConnectionFailed {
                        command: command.clone(),
                        message: e.to_string(),
                    });
                    if attempt < attempts {
                        thread::sleep(Duration::from_millis(self.settings.retry_delay_millis));
                    }
                }
                Err(e) => {
                    return Err(CommandError::RequestFailed {
                        command,
                        message: e.to_string(),
                    })
                }
            }
        }

        let message = last_failure.map_or_else(String::new, |e| e.to_string());
        Err(CommandError::RetriesExhausted {
            command,
            attempts,
            message,
        })
    }
}
