//! The reconciliation flow.
//!
//! Stage order: started, enrich (parallel, only when an enrich action is
//! configured), reconcile (parallel, one task per object), completed. Both
//! fan-outs are bounded by the worker pool. Siblings of a failed task run
//! to completion; any failure routes to the failure notification exactly
//! once.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use recon_core::PoolSettings;

use crate::context::ReconcileContext;
use crate::error::FlowError;
use crate::functions::ReconcileFunctions;
use crate::futures::{acquire_worker, join_settle};

/// Drives one reconciliation run over an externally supplied function set.
pub struct ReconcileFlow {
    functions: Arc<dyn ReconcileFunctions>,
    workers: Arc<Semaphore>,
}

impl ReconcileFlow {
    #[must_use]
    pub fn new(functions: Arc<dyn ReconcileFunctions>, pools: &PoolSettings) -> Self {
        Self {
            functions,
            workers: Arc::new(Semaphore::new(pools.tasks.max(1))),
        }
    }

    /// Start the flow. Returns immediately; the handle resolves when the
    /// run has completed or failed.
    pub fn execute(&self, context: Arc<ReconcileContext>) -> JoinHandle<Result<(), FlowError>> {
        let functions = self.functions.clone();
        let workers = self.workers.clone();
        tokio::spawn(async move {
            info!(
                job = %context.job_name,
                feature_pack = %context.feature_pack_name,
                objects = context.objects.len(),
                "reconciliation started"
            );
            match Self::run(&functions, &context, &workers).await {
                Ok(()) => {
                    info!(job = %context.job_name, "reconciliation completed");
                    Ok(())
                }
                Err(e) => {
                    error!(job = %context.job_name, error = %e, "reconciliation failed");
                    functions.reconcile_failed(context).await;
                    Err(e)
                }
            }
        })
    }

    async fn run(
        functions: &Arc<dyn ReconcileFunctions>,
        context: &Arc<ReconcileContext>,
        workers: &Arc<Semaphore>,
    ) -> Result<(), FlowError> {
        functions.reconcile_started(context.clone()).await?;

        if context.has_enrich_action() {
            debug!(job = %context.job_name, "enriching objects before reconciliation");
            let mut enrichments = JoinSet::new();
            for object in context.objects.clone() {
                let permit = acquire_worker(workers, "enrich").await?;
                let functions = functions.clone();
                let context = context.clone();
                enrichments.spawn(async move {
                    let _permit = permit;
                    functions.enrich_object(context, object).await
                });
            }
            join_settle(enrichments).await?;
        }

        let mut reconciliations = JoinSet::new();
        for object in context.objects.clone() {
            let permit = acquire_worker(workers, "reconcile").await?;
            let functions = functions.clone();
            let context = context.clone();
            reconciliations.spawn(async move {
                let _permit = permit;
                functions.reconcile_object(context, object).await
            });
        }
        join_settle(reconciliations).await?;

        functions.reconcile_completed(context.clone()).await
    }
}
