//! Stage function contracts.
//!
//! The flows own ordering, concurrency and failure routing; the stage work
//! itself (fetching, enriching, persisting, notifications) is supplied by
//! the surrounding system through these traits.

use std::sync::Arc;

use async_trait::async_trait;

use recon_core::SharedObject;

use crate::context::{DiscoveryContext, ReconcileContext};
use crate::error::FlowError;

/// Stage functions of the discovery flow.
#[async_trait]
pub trait DiscoveryFunctions: Send + Sync {
    /// Validate the job inputs before any work starts.
    async fn validate_inputs(&self, context: Arc<DiscoveryContext>) -> Result<(), FlowError>;

    /// Fetch the source objects and store them on the context.
    async fn fetch_sources(&self, context: Arc<DiscoveryContext>) -> Result<(), FlowError>;

    /// Fetch the target objects and store them on the context.
    async fn fetch_targets(&self, context: Arc<DiscoveryContext>) -> Result<(), FlowError>;

    /// Enrich one discovered object with its configured enrich action.
    async fn enrich_object(
        &self,
        context: Arc<DiscoveryContext>,
        object: SharedObject,
    ) -> Result<(), FlowError>;

    /// Pair each source with its matching target.
    async fn link_sources_and_targets(
        &self,
        context: Arc<DiscoveryContext>,
    ) -> Result<(), FlowError>;

    /// Apply the comparison filters.
    async fn compare_sources_and_targets(
        &self,
        context: Arc<DiscoveryContext>,
    ) -> Result<(), FlowError>;

    /// Persist the discovered objects and their filter results.
    async fn save_discovered_objects(
        &self,
        context: Arc<DiscoveryContext>,
    ) -> Result<(), FlowError>;

    /// Terminal success notification.
    async fn discovery_completed(&self, context: Arc<DiscoveryContext>) -> Result<(), FlowError>;

    /// Terminal failure notification. Called exactly once per failed run.
    async fn discovery_failed(&self, context: Arc<DiscoveryContext>);
}

/// Stage functions of the reconciliation flow.
#[async_trait]
pub trait ReconcileFunctions: Send + Sync {
    /// Mark the run started.
    async fn reconcile_started(&self, context: Arc<ReconcileContext>) -> Result<(), FlowError>;

    /// Enrich one object before reconciliation.
    async fn enrich_object(
        &self,
        context: Arc<ReconcileContext>,
        object: SharedObject,
    ) -> Result<(), FlowError>;

    /// Run the corrective action for one object's matched filters.
    async fn reconcile_object(
        &self,
        context: Arc<ReconcileContext>,
        object: SharedObject,
    ) -> Result<(), FlowError>;

    /// Terminal success notification.
    async fn reconcile_completed(&self, context: Arc<ReconcileContext>) -> Result<(), FlowError>;

    /// Terminal failure notification. Called exactly once per failed run.
    async fn reconcile_failed(&self, context: Arc<ReconcileContext>);
}
