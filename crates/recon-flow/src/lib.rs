//! Discovery and reconciliation flows.
//!
//! Orchestrates externally supplied stage functions into concurrent
//! pipelines over [`DiscoveryContext`] and [`ReconcileContext`], and
//! applies the configured comparison filters to discovered objects.

pub mod compare;
pub mod conditions;
pub mod context;
pub mod error;
pub mod functions;
pub mod futures;

mod discovery;
mod reconcile;

pub use compare::ComparisonEngine;
pub use conditions::{Condition, ConditionRegistry, FilterContext, PropertiesArg};
pub use context::{DiscoveryContext, ReconcileContext};
pub use discovery::DiscoveryFlow;
pub use error::FlowError;
pub use functions::{DiscoveryFunctions, ReconcileFunctions};
pub use reconcile::ReconcileFlow;
