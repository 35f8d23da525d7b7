//! Shared data model for the discovery & reconciliation engine.
//!
//! Holds the feature-pack configuration tree, the discovered-object model,
//! the collaborator contracts for assets and properties, and the engine
//! settings. The execution, substitution and flow crates all build on the
//! types defined here.

pub mod config;
pub mod error;
pub mod object;
pub mod services;
pub mod settings;
pub mod types;

pub use config::{
    ActionDefinition, ConditionDefinition, DiscoverDefinition, FetchDefinition, FilterDefinition,
    JobDefinition, ReconcileDefinition, ReconcileFilterDefinition,
};
pub use error::{ServiceError, ServiceResult};
pub use object::{DiscoveredObject, FilterResult, SharedObject};
pub use services::{AssetService, PropertiesService};
pub use settings::{
    EngineSettings, HttpSettings, PoolSettings, ProcessSettings, ScriptSettings,
    SubstitutionSettings, TlsSettings,
};
pub use types::{ActionType, ObjectKind, ParseActionTypeError};
