//! Python command executor.
//!
//! Python actions name a feature-pack asset holding the script. The asset
//! is materialized to the local filesystem once per feature pack, then
//! invoked through the restricted shell with the rendered `argN` properties
//! as positional arguments.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use recon_core::{AssetService, HttpSettings, ProcessSettings, ServiceError};
use recon_substitution::SubstitutionEngine;

use crate::context::{CommandResponse, ExecutionContext};
use crate::error::CommandError;
use crate::executors::{CommandExecutor, ProcessRunner};

fn arg_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^arg(\d+)$").expect("valid pattern"))
}

/// Materializes python assets under a per-feature-pack directory.
///
/// Assets are written once and reused by subsequent executions; the write
/// is serialized so concurrent executions of the same script race neither
/// the existence check nor the write.
pub struct PythonAssetStore {
    asset_dir: PathBuf,
    asset_service: Arc<dyn AssetService>,
    stored: Mutex<HashMap<i64, HashSet<String>>>,
}

impl PythonAssetStore {
    #[must_use]
    pub fn new(asset_service: Arc<dyn AssetService>, settings: &ProcessSettings) -> Self {
        Self {
            asset_dir: PathBuf::from(&settings.asset_dir),
            asset_service,
            stored: Mutex::new(HashMap::new()),
        }
    }

    /// Get the local path of an asset, fetching and writing it on first use.
    pub fn path(&self, name: &str, feature_pack_id: i64) -> Result<PathBuf, CommandError> {
        let path = self.asset_path(name, feature_pack_id);

        let mut stored = self.stored.lock().unwrap_or_else(PoisonError::into_inner);
        if stored
            .get(&feature_pack_id)
            .is_some_and(|names| names.contains(name))
        {
            return Ok(path);
        }

        if !path.exists() {
            let content = self.asset_service.get_asset_content(name, feature_pack_id)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    ServiceError::io_with_source(
                        format!("failed to create asset directory {}", parent.display()),
                        e,
                    )
                })?;
            }
            fs::write(&path, content).map_err(|e| {
                ServiceError::io_with_source(
                    format!("failed to write asset {}", path.display()),
                    e,
                )
            })?;
            debug!(asset = name, feature_pack_id, "materialized python asset");
        }

        stored.entry(feature_pack_id).or_default().insert(name.to_string());
        Ok(path)
    }

    /// Drop the materialized assets of a feature pack. Best effort.
    pub fn remove_feature_pack(&self, feature_pack_id: i64) {
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&feature_pack_id);
        let dir = self.asset_dir.join(feature_pack_id.to_string());
        if let Err(e) = fs::remove_dir_all(&dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(feature_pack_id, error = %e, "failed to remove python asset directory");
            }
        }
    }

    fn asset_path(&self, name: &str, feature_pack_id: i64) -> PathBuf {
        self.asset_dir.join(feature_pack_id.to_string()).join(name)
    }
}

/// Executes python actions through the restricted shell.
pub struct PythonExecutor {
    substitution: Arc<SubstitutionEngine>,
    process: Arc<ProcessRunner>,
    store: Arc<PythonAssetStore>,
    http: HttpSettings,
    python_bin: String,
}

impl PythonExecutor {
    #[must_use]
    pub fn new(
        substitution: Arc<SubstitutionEngine>,
        process: Arc<ProcessRunner>,
        store: Arc<PythonAssetStore>,
        http: HttpSettings,
        process_settings: &ProcessSettings,
    ) -> Self {
        Self {
            substitution,
            process,
            store,
            http,
            python_bin: process_settings.python_bin.clone(),
        }
    }

    /// Collect the `argN` properties in numeric order. Values must be
    /// non-blank strings.
    fn script_args(
        properties: &IndexMap<String, Value>,
    ) -> Result<Vec<&str>, CommandError> {
        let mut indexed: Vec<(usize, &str)> = Vec::new();
        for (key, value) in properties {
            let Some(captures) = arg_key_pattern().captures(key) else {
                continue;
            };
            let index: usize = captures[1].parse().map_err(|_| {
                CommandError::invalid_properties(format!("invalid argument key '{key}'"))
            })?;
            let arg = value
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    CommandError::invalid_properties(format!(
                        "'{key}' must be a non-blank string"
                    ))
                })?;
            indexed.push((index, arg));
        }
        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, arg)| arg).collect())
    }

    fn script_env(&self) -> IndexMap<String, String> {
        let mut env = IndexMap::new();
        env.insert(
            "REST_SERVICE_URL".to_string(),
            self.http.internal_rest_base_url.clone(),
        );
        if self.http.tls.enabled {
            if let Some(ca_bundle) = &self.http.tls.ca_bundle_path {
                env.insert("REQUESTS_CA_BUNDLE".to_string(), ca_bundle.clone());
            }
            if let Some(cert) = &self.http.tls.cert_path {
                env.insert("CLIENT_CERT".to_string(), cert.clone());
            }
            if let Some(key) = &self.http.tls.key_path {
                env.insert("CLIENT_KEY".to_string(), key.clone());
            }
        }
        env
    }

    fn build_command(&self, script_path: &Path, args: &[String]) -> String {
        let mut command = format!("{} {}", self.python_bin, script_path.display());
        for arg in args {
            command.push(' ');
            command.push_str(arg);
        }
        command
    }
}

impl CommandExecutor for PythonExecutor {
    fn execute(&self, context: &ExecutionContext) -> Result<CommandResponse, CommandError> {
        let asset_name = context
            .action
            .command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                CommandError::invalid_properties(
                    "python action requires a 'command' naming the script asset",
                )
            })?;

        let script_path = self.store.path(asset_name, context.feature_pack_id)?;

        let mut args = Vec::new();
        for template in Self::script_args(&context.action.properties)? {
            args.push(self.substitution.render(
                template,
                &context.substitution_context,
                Some(context.feature_pack_id),
            )?);
        }

        let command = self.build_command(&script_path, &args);
        debug!(command = %command, "executing python action");
        let output = self.process.run(&command, &self.script_env())?;
        Ok(CommandResponse::new(command, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use recon_core::ServiceResult;

    struct CountingAssets {
        fetches: AtomicUsize,
    }

    impl AssetService for CountingAssets {
        fn get_asset_content(&self, _: &str, _: i64) -> ServiceResult<Vec<u8>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(b"print('hi')".to_vec())
        }
    }

    fn store_in(dir: &Path) -> (Arc<PythonAssetStore>, Arc<CountingAssets>) {
        let assets = Arc::new(CountingAssets {
            fetches: AtomicUsize::new(0),
        });
        let settings = ProcessSettings {
            asset_dir: dir.display().to_string(),
            ..ProcessSettings::default()
        };
        (
            Arc::new(PythonAssetStore::new(assets.clone(), &settings)),
            assets,
        )
    }

    #[test]
    fn test_asset_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let (store, assets) = store_in(dir.path());

        let first = store.path("enrich.py", 7).unwrap();
        let second = store.path("enrich.py", 7).unwrap();

        assert_eq!(first, second);
        assert_eq!(assets.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read(&first).unwrap(), b"print('hi')");
    }

    #[test]
    fn test_concurrent_materialization_fetches_once() {
        let dir = tempfile::tempdir().unwrap();
        let (store, assets) = store_in(dir.path());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || store.path("enrich.py", 7).unwrap())
            })
            .collect();
        let paths: Vec<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(paths.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(assets.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_feature_pack_forces_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let (store, assets) = store_in(dir.path());

        let path = store.path("enrich.py", 7).unwrap();
        store.remove_feature_pack(7);
        assert!(!path.exists());

        store.path("enrich.py", 7).unwrap();
        assert_eq!(assets.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_script_args_sorted_numerically() {
        let mut properties = IndexMap::new();
        properties.insert("arg10".to_string(), json!("ten"));
        properties.insert("arg2".to_string(), json!("two"));
        properties.insert("arg0".to_string(), json!("zero"));
        properties.insert("other".to_string(), json!("ignored"));

        let args = PythonExecutor::script_args(&properties).unwrap();
        assert_eq!(args, vec!["zero", "two", "ten"]);
    }

    #[test]
    fn test_blank_script_arg_rejected() {
        let mut properties = IndexMap::new();
        properties.insert("arg0".to_string(), json!("  "));
        let err = PythonExecutor::script_args(&properties).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PROPERTIES");
    }
}
