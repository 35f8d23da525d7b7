//! Contracts for the external collaborators supplying feature-pack data.
//!
//! Implementations are owned by the surrounding system (database, archive
//! store). The engine calls them from blocking worker threads, so the
//! contracts are synchronous; implementations may block.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::ServiceResult;

/// Supplies feature-pack asset content (scripts, templates).
pub trait AssetService: Send + Sync {
    /// Fetch the raw content of the named asset.
    fn get_asset_content(&self, name: &str, feature_pack_id: i64) -> ServiceResult<Vec<u8>>;
}

/// Supplies feature-pack scoped properties for template bindings.
pub trait PropertiesService: Send + Sync {
    /// Fetch the properties defined for the feature pack. An empty map means
    /// the feature pack defines none.
    fn get_properties(&self, feature_pack_id: i64) -> ServiceResult<IndexMap<String, Value>>;
}
