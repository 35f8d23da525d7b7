//! Engine settings.
//!
//! Deserialized from the service configuration by the surrounding system.
//! Every field carries a default so partial configuration files work.

use serde::Deserialize;

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_millis() -> u64 {
    1000
}

fn default_pool_idle_timeout_secs() -> u64 {
    30
}

fn default_pool_max_idle_per_host() -> usize {
    10
}

fn default_internal_rest_base_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_internal_rest_run_path() -> String {
    "/rest-service/v1/run".to_string()
}

/// HTTP executor settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpSettings {
    /// Connect timeout applied when the action declares none.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Read timeout applied when the action declares none.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Retry attempts for connectivity-class failures.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Fixed delay between retry attempts.
    #[serde(default = "default_retry_delay_millis")]
    pub retry_delay_millis: u64,
    #[serde(default = "default_pool_idle_timeout_secs")]
    pub pool_idle_timeout_secs: u64,
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
    /// Base URL of the internal REST service, also exported to python
    /// scripts as `REST_SERVICE_URL`.
    #[serde(default = "default_internal_rest_base_url")]
    pub internal_rest_base_url: String,
    /// Run path appended to the base URL for the default REST action shape
    /// used when an action declares no explicit url.
    #[serde(default = "default_internal_rest_run_path")]
    pub internal_rest_run_path: String,
    #[serde(default)]
    pub tls: TlsSettings,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_millis: default_retry_delay_millis(),
            pool_idle_timeout_secs: default_pool_idle_timeout_secs(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            internal_rest_base_url: default_internal_rest_base_url(),
            internal_rest_run_path: default_internal_rest_run_path(),
            tls: TlsSettings::default(),
        }
    }
}

/// TLS material passed to python scripts and the HTTP client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TlsSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ca_bundle_path: Option<String>,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
}

fn default_restricted_path() -> String {
    "/usr/bin".to_string()
}

fn default_python_bin() -> String {
    "python3".to_string()
}

fn default_asset_dir() -> String {
    "/tmp/recon/python-assets".to_string()
}

/// Restricted process execution settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProcessSettings {
    /// Directory the subprocess PATH is restricted to.
    #[serde(default = "default_restricted_path")]
    pub restricted_path: String,
    /// Python interpreter invoked for python actions.
    #[serde(default = "default_python_bin")]
    pub python_bin: String,
    /// Directory python assets are materialized under.
    #[serde(default = "default_asset_dir")]
    pub asset_dir: String,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            restricted_path: default_restricted_path(),
            python_bin: default_python_bin(),
            asset_dir: default_asset_dir(),
        }
    }
}

fn default_max_operations() -> u64 {
    100_000
}

fn default_max_call_levels() -> usize {
    64
}

fn default_max_string_size() -> usize {
    65536
}

fn default_max_array_size() -> usize {
    10_000
}

fn default_max_map_size() -> usize {
    10_000
}

/// Sandbox limits for script evaluation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScriptSettings {
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,
    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,
    #[serde(default = "default_max_array_size")]
    pub max_array_size: usize,
    #[serde(default = "default_max_map_size")]
    pub max_map_size: usize,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
            max_call_levels: default_max_call_levels(),
            max_string_size: default_max_string_size(),
            max_array_size: default_max_array_size(),
            max_map_size: default_max_map_size(),
        }
    }
}

/// Template rendering policy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SubstitutionSettings {
    /// When enabled, unresolved template tokens fail the render instead of
    /// expanding to an empty string.
    #[serde(default)]
    pub fail_on_unknown_tokens: bool,
}

fn default_task_pool_size() -> usize {
    20
}

/// Worker pool sizing. Bounds how many fan-out tasks a flow stage keeps in
/// flight at once.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PoolSettings {
    #[serde(default = "default_task_pool_size")]
    pub tasks: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            tasks: default_task_pool_size(),
        }
    }
}

/// Aggregated engine settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineSettings {
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub process: ProcessSettings,
    #[serde(default)]
    pub script: ScriptSettings,
    #[serde(default)]
    pub substitution: SubstitutionSettings,
    #[serde(default)]
    pub pools: PoolSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.http.retry_attempts, 3);
        assert_eq!(settings.http.retry_delay_millis, 1000);
        assert_eq!(settings.process.python_bin, "python3");
        assert_eq!(settings.script.max_operations, 100_000);
        assert!(!settings.substitution.fail_on_unknown_tokens);
        assert_eq!(settings.pools.tasks, 20);
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let json = serde_json::json!({
            "http": { "retry-attempts": 5 },
            "substitution": { "fail-on-unknown-tokens": true }
        });
        let settings: EngineSettings = serde_json::from_value(json).unwrap();
        assert_eq!(settings.http.retry_attempts, 5);
        assert_eq!(settings.http.connect_timeout_secs, 10);
        assert!(settings.substitution.fail_on_unknown_tokens);
    }
}
