//! Fan-out join policies.
//!
//! Flow stages fan work out into a [`JoinSet`] and then join it under one
//! of two policies: let every sibling finish before surfacing the first
//! failure, or abort the remaining siblings as soon as one fails. Fan-out
//! width is bounded by the configured worker pool.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::warn;

use crate::error::FlowError;

/// Take a worker-pool permit before spawning another fan-out task. The
/// spawned task holds the permit until it finishes, so at most pool-size
/// tasks of a stage run at once.
pub async fn acquire_worker(
    pool: &Arc<Semaphore>,
    stage: &'static str,
) -> Result<OwnedSemaphorePermit, FlowError> {
    Arc::clone(pool)
        .acquire_owned()
        .await
        .map_err(|_| FlowError::stage_failed(stage, "worker pool is closed"))
}

fn panicked(error: tokio::task::JoinError) -> FlowError {
    FlowError::TaskPanicked {
        message: error.to_string(),
    }
}

/// Join every task, letting siblings of a failed task run to completion.
/// The first failure is returned after all tasks have settled.
pub async fn join_settle(mut set: JoinSet<Result<(), FlowError>>) -> Result<(), FlowError> {
    let mut first_failure: Option<FlowError> = None;
    while let Some(joined) = set.join_next().await {
        let failure = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(e) if e.is_cancelled() => continue,
            Err(e) => panicked(e),
        };
        if first_failure.is_none() {
            first_failure = Some(failure);
        } else {
            warn!(error = %failure, "additional task failure after first");
        }
    }
    first_failure.map_or(Ok(()), Err)
}

/// Join tasks until the first failure, then abort and drain the remaining
/// siblings and return that failure.
pub async fn join_cancel_on_failure(
    mut set: JoinSet<Result<(), FlowError>>,
) -> Result<(), FlowError> {
    while let Some(joined) = set.join_next().await {
        let failure = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(e) if e.is_cancelled() => continue,
            Err(e) => panicked(e),
        };
        set.abort_all();
        while set.join_next().await.is_some() {}
        return Err(failure);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_join_settle_lets_siblings_finish() {
        let completed = Arc::new(AtomicUsize::new(0));
        let mut set = JoinSet::new();

        set.spawn(async { Err(FlowError::validation("boom")) });
        for _ in 0..3 {
            let completed = completed.clone();
            set.spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let err = join_settle(set).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_FAILED");
        assert_eq!(completed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_join_settle_all_ok() {
        let mut set = JoinSet::new();
        for _ in 0..4 {
            set.spawn(async { Ok(()) });
        }
        assert!(join_settle(set).await.is_ok());
    }

    #[tokio::test]
    async fn test_join_cancel_on_failure_aborts_siblings() {
        let completed = Arc::new(AtomicUsize::new(0));
        let mut set = JoinSet::new();

        set.spawn(async { Err(FlowError::validation("boom")) });
        for _ in 0..3 {
            let completed = completed.clone();
            set.spawn(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let err = join_cancel_on_failure(set).await.unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_FAILED");
        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }
}
