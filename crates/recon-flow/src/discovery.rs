//! The discovery flow.
//!
//! Stage order: validate, fetch (sources and targets in parallel), enrich
//! (parallel per object, bounded by the worker pool), link, compare, save,
//! completed. Stage N+1 never starts before stage N's full fan-out has
//! settled. Any failure is recorded into the context's error accumulator,
//! skips the remaining stages and routes to the failure notification
//! exactly once.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use recon_core::PoolSettings;

use crate::context::DiscoveryContext;
use crate::error::FlowError;
use crate::functions::DiscoveryFunctions;
use crate::futures::{acquire_worker, join_cancel_on_failure, join_settle};

/// Drives one discovery run over an externally supplied function set.
pub struct DiscoveryFlow {
    functions: Arc<dyn DiscoveryFunctions>,
    workers: Arc<Semaphore>,
}

impl DiscoveryFlow {
    #[must_use]
    pub fn new(functions: Arc<dyn DiscoveryFunctions>, pools: &PoolSettings) -> Self {
        Self {
            functions,
            workers: Arc::new(Semaphore::new(pools.tasks.max(1))),
        }
    }

    /// Start the flow. Returns immediately; the handle resolves when the
    /// run has completed or failed.
    pub fn execute(&self, context: Arc<DiscoveryContext>) -> JoinHandle<Result<(), FlowError>> {
        let functions = self.functions.clone();
        let workers = self.workers.clone();
        tokio::spawn(async move {
            info!(
                job = %context.job_name,
                feature_pack = %context.feature_pack_name,
                "discovery started"
            );
            match Self::run(&functions, &context, &workers).await {
                Ok(()) => {
                    info!(job = %context.job_name, "discovery completed");
                    Ok(())
                }
                Err(e) => {
                    error!(job = %context.job_name, error = %e, "discovery failed");
                    functions.discovery_failed(context).await;
                    Err(e)
                }
            }
        })
    }

    async fn run(
        functions: &Arc<dyn DiscoveryFunctions>,
        context: &Arc<DiscoveryContext>,
        workers: &Arc<Semaphore>,
    ) -> Result<(), FlowError> {
        stage(context, "validate", functions.validate_inputs(context.clone())).await?;

        let mut fetches = JoinSet::new();
        {
            let functions = functions.clone();
            let context = context.clone();
            fetches.spawn(async move {
                stage(&context, "fetchSources", functions.fetch_sources(context.clone())).await
            });
        }
        {
            let functions = functions.clone();
            let context = context.clone();
            fetches.spawn(async move {
                stage(&context, "fetchTargets", functions.fetch_targets(context.clone())).await
            });
        }
        join_settle(fetches).await?;

        let mut enrichments = JoinSet::new();
        let mut enrichable = Vec::new();
        if context.source_enrich_action().is_some() {
            enrichable.extend(context.sources());
        }
        if context.target_enrich_action().is_some() {
            enrichable.extend(context.targets());
        }
        debug!(job = %context.job_name, objects = enrichable.len(), "enriching objects");
        for object in enrichable {
            let permit = acquire_worker(workers, "enrich").await?;
            let functions = functions.clone();
            let context = context.clone();
            enrichments.spawn(async move {
                let _permit = permit;
                stage(
                    &context,
                    "enrich",
                    functions.enrich_object(context.clone(), object),
                )
                .await
            });
        }
        join_cancel_on_failure(enrichments).await?;

        stage(context, "link", functions.link_sources_and_targets(context.clone())).await?;
        stage(
            context,
            "compare",
            functions.compare_sources_and_targets(context.clone()),
        )
        .await?;
        stage(context, "save", functions.save_discovered_objects(context.clone())).await?;
        stage(context, "completed", functions.discovery_completed(context.clone())).await
    }
}

/// Run one stage, recording a failure into the context accumulator before
/// propagating it.
async fn stage<F>(
    context: &Arc<DiscoveryContext>,
    name: &'static str,
    work: F,
) -> Result<(), FlowError>
where
    F: Future<Output = Result<(), FlowError>>,
{
    debug!(job = %context.job_name, stage = name, "stage starting");
    match work.await {
        Ok(()) => Ok(()),
        Err(e) => {
            context.add_error(format!("{name}: {e}"));
            Err(e)
        }
    }
}
