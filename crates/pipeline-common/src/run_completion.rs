use tokio::task::JoinSet;

use crate::PipelineError;

/// Wait for every worker of a stage and resolve the stage outcome.
///
/// This is the completion barrier: it returns only after all workers in
/// `workers` have exited, whatever their individual results.
///
/// Semantics:
/// - A worker that panicked yields `WorkerPanicked`.
/// - The first failure wins; later ones are logged and dropped.
/// - If every worker finished cleanly the stage succeeds.
pub async fn settle_workers(
    stage: &'static str,
    mut workers: JoinSet<Result<(), PipelineError>>,
) -> Result<(), PipelineError> {
    let mut first_error: Option<PipelineError> = None;

    while let Some(joined) = workers.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(join_error) if join_error.is_cancelled() => Err(PipelineError::Cancelled),
            Err(join_error) => Err(PipelineError::WorkerPanicked {
                stage,
                message: join_error.to_string(),
            }),
        };

        if let Err(err) = result {
            if first_error.is_none() {
                first_error = Some(err);
            } else {
                tracing::warn!(stage, error = %err, "Additional worker failure");
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::settle_workers;
    use crate::PipelineError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::task::JoinSet;

    #[tokio::test]
    async fn settle_workers_waits_for_every_worker() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut workers = JoinSet::new();
        for i in 0..4u64 {
            let finished = finished.clone();
            workers.spawn(async move {
                tokio::time::sleep(Duration::from_millis(10 * i)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        settle_workers("test", workers).await.unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn settle_workers_reports_panics() {
        let mut workers = JoinSet::new();
        workers.spawn(async { Ok(()) });
        workers.spawn(async { panic!("boom") });

        let result = settle_workers("transform", workers).await;
        match result {
            Err(PipelineError::WorkerPanicked { stage, .. }) => assert_eq!(stage, "transform"),
            other => panic!("expected worker panic, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn settle_workers_keeps_first_error() {
        let mut workers = JoinSet::new();
        workers.spawn(async { Err(PipelineError::ChannelClosed("sink")) });

        let result = settle_workers("transcribe", workers).await;
        assert!(matches!(result, Err(PipelineError::ChannelClosed("sink"))));
    }
}
