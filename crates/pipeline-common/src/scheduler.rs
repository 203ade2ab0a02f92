//! # Stage scheduler
//!
//! Wires a declarative list of [`StageSpec`]s into running worker pools.
//!
//! Runtime model:
//! - Each stage owns one MPMC input queue (`flume`), bounded by the stage's
//!   `queue_capacity` (`0` = rendezvous).
//! - Each stage spawns `workers` tokio tasks that pull from that queue.
//! - A worker forwards [`StageOutcome::Forward`] jobs to the next stage's
//!   queue (or the results sink for the last stage) and routes
//!   [`StageOutcome::Terminal`] jobs straight to the results sink.
//! - Each stage has a barrier task that waits for *all* of its workers via
//!   [`settle_workers`] and only then drops the last sender of the downstream
//!   queue. A downstream queue can therefore never close while an upstream
//!   worker might still send on it.
//! - Each handler call runs in its own task. A panic drops that one job,
//!   is reported on the faults channel, and the worker moves on.

use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::{PipelineContext, PipelineError, StageHandler, StageOutcome, StageSpec, settle_workers};

/// Handles to a running pipeline.
///
/// Dropping `input_tx` closes the first stage's queue; `results_rx` yields
/// every job once it is terminal and disconnects after the last stage has
/// drained. `faults_rx` carries one [`PipelineError::JobPanicked`] per job
/// lost to a panicking handler.
pub struct SpawnedStages<J> {
    pub input_tx: flume::Sender<J>,
    pub results_rx: flume::Receiver<J>,
    pub faults_rx: flume::Receiver<PipelineError>,
    pub supervisor: JoinHandle<Result<(), PipelineError>>,
}

/// Outcome of [`StagePipeline::run`].
#[derive(Debug)]
pub struct RunSummary<J> {
    /// Every job that reached the results sink, in completion order.
    pub results: Vec<J>,
    /// Number of jobs handed to the pipeline.
    pub submitted: usize,
    /// Whether the run was cancelled before it could drain.
    pub cancelled: bool,
    /// Faults that cost jobs without failing the run: handler panics and
    /// stage-level failures.
    pub stage_errors: Vec<PipelineError>,
}

impl<J> RunSummary<J> {
    /// Jobs that never reached a terminal state: queued jobs dropped on
    /// cancellation and jobs lost to a fault.
    pub fn incomplete(&self) -> usize {
        self.submitted.saturating_sub(self.results.len())
    }
}

/// A pipeline of sequential stages, each backed by its own worker pool.
pub struct StagePipeline<J> {
    stages: Vec<StageSpec<J>>,
    context: Arc<PipelineContext>,
}

struct Worker<J> {
    stage: &'static str,
    id: usize,
    input: flume::Receiver<J>,
    forward: flume::Sender<J>,
    sink: flume::Sender<J>,
    faults: flume::Sender<PipelineError>,
    handler: Arc<dyn StageHandler<J>>,
    context: Arc<PipelineContext>,
}

impl<J> Worker<J>
where
    J: Send + 'static,
{
    async fn run(self) -> Result<(), PipelineError> {
        debug!(stage = self.stage, worker = self.id, "Worker started");
        let token = self.context.token.clone();
        let mut processed: usize = 0;

        loop {
            let job = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(stage = self.stage, worker = self.id, "Worker stopping: cancelled");
                    break;
                }
                received = self.input.recv_async() => match received {
                    Ok(job) => job,
                    // Input exhausted and closed
                    Err(_) => break,
                },
            };

            let handler = Arc::clone(&self.handler);
            let context = Arc::clone(&self.context);
            let outcome = tokio::spawn(async move { handler.process(job, &context).await }).await;
            processed = processed.saturating_add(1);

            let (target, job, label) = match outcome {
                Ok(StageOutcome::Forward(job)) => (&self.forward, job, "downstream"),
                Ok(StageOutcome::Terminal(job)) => (&self.sink, job, "results sink"),
                Err(join_error) => {
                    error!(
                        stage = self.stage,
                        worker = self.id,
                        error = %join_error,
                        "Handler panicked, dropping job"
                    );
                    let _ = self.faults.send(PipelineError::JobPanicked {
                        stage: self.stage,
                        message: join_error.to_string(),
                    });
                    continue;
                }
            };

            tokio::select! {
                biased;
                sent = target.send_async(job) => {
                    if sent.is_err() {
                        if token.is_cancelled() {
                            break;
                        }
                        error!(stage = self.stage, worker = self.id, queue = label, "Send on closed queue");
                        return Err(PipelineError::ChannelClosed(label));
                    }
                }
                _ = token.cancelled() => {
                    warn!(stage = self.stage, worker = self.id, queue = label, "Dropping job blocked on a full queue during cancellation");
                    break;
                }
            }
        }

        debug!(stage = self.stage, worker = self.id, processed, "Worker finished");
        Ok(())
    }
}

impl<J> StagePipeline<J>
where
    J: Send + 'static,
{
    /// Create a new empty pipeline with the given context.
    pub fn new(context: Arc<PipelineContext>) -> Self {
        Self {
            stages: Vec::new(),
            context,
        }
    }

    /// Create a pipeline from a declarative stage list.
    pub fn with_stages(context: Arc<PipelineContext>, stages: Vec<StageSpec<J>>) -> Self {
        Self { stages, context }
    }

    /// Add a stage to the end of the pipeline.
    pub fn add_stage(mut self, stage: StageSpec<J>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.context
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::InvalidStage {
                stage: "<none>",
                reason: "pipeline has no stages".to_string(),
            });
        }
        for stage in &self.stages {
            if stage.workers == 0 {
                return Err(PipelineError::InvalidStage {
                    stage: stage.name,
                    reason: "worker count must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Spawn every stage and return the pipeline handles.
    ///
    /// `sink_capacity` bounds the results sink; `None` leaves it unbounded.
    /// Must be called from within a tokio runtime.
    pub fn spawn(self, sink_capacity: Option<usize>) -> Result<SpawnedStages<J>, PipelineError> {
        self.validate()?;

        let (sink_tx, results_rx) = match sink_capacity {
            Some(capacity) => flume::bounded(capacity),
            None => flume::unbounded(),
        };
        let (faults_tx, faults_rx) = flume::unbounded();

        let capacities: Vec<usize> = self.stages.iter().map(|s| s.queue_capacity).collect();
        let stage_count = self.stages.len();
        let (input_tx, first_rx) = flume::bounded(capacities[0]);

        let mut stage_input = Some(first_rx);
        let mut barriers: Vec<(&'static str, JoinHandle<Result<(), PipelineError>>)> =
            Vec::with_capacity(stage_count);

        for (index, stage) in self.stages.into_iter().enumerate() {
            let Some(input_rx) = stage_input.take() else {
                break;
            };

            let (forward_tx, next_rx) = if index + 1 < stage_count {
                let (tx, rx) = flume::bounded(capacities[index + 1]);
                (tx, Some(rx))
            } else {
                (sink_tx.clone(), None)
            };

            info!(
                pipeline = %self.context.name,
                stage = stage.name,
                workers = stage.workers,
                queue_capacity = stage.queue_capacity,
                "Starting stage"
            );

            let mut workers = JoinSet::new();
            for id in 0..stage.workers {
                let worker = Worker {
                    stage: stage.name,
                    id,
                    input: input_rx.clone(),
                    forward: forward_tx.clone(),
                    sink: sink_tx.clone(),
                    faults: faults_tx.clone(),
                    handler: Arc::clone(&stage.handler),
                    context: Arc::clone(&self.context),
                };
                workers.spawn(worker.run());
            }
            drop(input_rx);

            let stage_name = stage.name;
            let barrier = tokio::spawn(async move {
                let result = settle_workers(stage_name, workers).await;
                // Every worker of this stage has exited: this is the last
                // sender of the downstream queue.
                drop(forward_tx);
                debug!(stage = stage_name, "Stage drained, downstream queue closed");
                result
            });
            barriers.push((stage_name, barrier));

            stage_input = next_rx;
        }

        drop(sink_tx);

        let supervisor = tokio::spawn(async move {
            let mut first_error: Option<PipelineError> = None;
            for (stage, barrier) in barriers {
                let result = match barrier.await {
                    Ok(result) => result,
                    Err(join_error) => Err(PipelineError::WorkerPanicked {
                        stage,
                        message: join_error.to_string(),
                    }),
                };
                if let Err(err) = result {
                    error!(stage, error = %err, "Stage failed");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
            match first_error {
                Some(err) => Err(err),
                None => Ok(()),
            }
        });

        Ok(SpawnedStages {
            input_tx,
            results_rx,
            faults_rx,
            supervisor,
        })
    }

    /// Submit every job, close the input, and collect all terminal jobs.
    ///
    /// The results sink is sized to the number of submitted jobs. Submission
    /// blocks whenever the first stage cannot accept more work. Once the
    /// stages are running a summary is always returned: on cancellation or
    /// after a fault it holds whatever reached the sink, and the faults are
    /// listed in [`RunSummary::stage_errors`].
    pub async fn run<I>(self, jobs: I) -> Result<RunSummary<J>, PipelineError>
    where
        I: IntoIterator<Item = J>,
    {
        let jobs: Vec<J> = jobs.into_iter().collect();
        let submitted = jobs.len();
        let token = self.context.token.clone();

        let SpawnedStages {
            input_tx,
            results_rx,
            faults_rx,
            supervisor,
        } = self.spawn(Some(submitted.max(1)))?;

        let submit_token = token.clone();
        let submitter = tokio::spawn(async move {
            for job in jobs {
                tokio::select! {
                    biased;
                    _ = submit_token.cancelled() => return,
                    sent = input_tx.send_async(job) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
            // input_tx dropped here: the first stage queue closes
        });

        let mut results = Vec::with_capacity(submitted);
        while let Ok(job) = results_rx.recv_async().await {
            results.push(job);
        }

        if let Err(e) = submitter.await {
            warn!(error = %e, "Submitter task failed");
        }

        let stage_failure = match supervisor.await {
            Ok(result) => result.err(),
            Err(e) => Some(PipelineError::WorkerPanicked {
                stage: "supervisor",
                message: e.to_string(),
            }),
        };
        // Every worker has exited once the supervisor returns, so all
        // faults are already queued.
        let mut stage_errors: Vec<PipelineError> = faults_rx.drain().collect();
        stage_errors.extend(stage_failure);
        if !stage_errors.is_empty() {
            warn!(
                faults = stage_errors.len(),
                completed = results.len(),
                submitted,
                "Pipeline finished with faults"
            );
        }

        let cancelled = token.is_cancelled();
        if cancelled {
            warn!(
                submitted,
                completed = results.len(),
                "Pipeline cancelled before all jobs completed"
            );
        }

        Ok(RunSummary {
            results,
            submitted,
            cancelled,
            stage_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_context, init_tracing};
    use crate::{CancellationToken, StageSpec};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct TestJob {
        id: usize,
        trail: Vec<&'static str>,
        failed_at: Option<&'static str>,
    }

    impl TestJob {
        fn new(id: usize) -> Self {
            Self {
                id,
                trail: Vec::new(),
                failed_at: None,
            }
        }
    }

    fn passthrough(name: &'static str, workers: usize) -> StageSpec<TestJob> {
        StageSpec::from_fn(name, workers, move |mut job: TestJob, _ctx| async move {
            // Uneven work so completion order differs from submission order
            tokio::time::sleep(Duration::from_millis((job.id % 3) as u64)).await;
            job.trail.push(name);
            StageOutcome::Forward(job)
        })
    }

    #[tokio::test]
    async fn test_every_job_reaches_the_sink_exactly_once() {
        init_tracing();

        for transform_workers in 1..=3 {
            for transcribe_workers in 1..=4 {
                let pipeline = StagePipeline::new(create_test_context())
                    .add_stage(passthrough("transform", transform_workers))
                    .add_stage(passthrough("transcribe", transcribe_workers));

                let summary = pipeline.run((0..25).map(TestJob::new)).await.unwrap();

                assert_eq!(summary.submitted, 25);
                assert_eq!(summary.results.len(), 25);
                assert!(!summary.cancelled);
                assert_eq!(summary.incomplete(), 0);
                assert!(summary.stage_errors.is_empty());

                let ids: HashSet<usize> = summary.results.iter().map(|j| j.id).collect();
                assert_eq!(ids.len(), 25, "no job may be duplicated");
                for job in &summary.results {
                    assert_eq!(job.trail, vec!["transform", "transcribe"]);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_failed_jobs_skip_remaining_stages() {
        let seen_by_second = Arc::new(Mutex::new(Vec::new()));
        let seen = seen_by_second.clone();

        let first = StageSpec::from_fn("transform", 2, |mut job: TestJob, _ctx| async move {
            if job.id % 2 == 1 {
                job.failed_at = Some("transform");
                StageOutcome::Terminal(job)
            } else {
                StageOutcome::Forward(job)
            }
        });
        let second = StageSpec::from_fn("transcribe", 3, move |job: TestJob, _ctx| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(job.id);
                StageOutcome::Forward(job)
            }
        });

        let summary = StagePipeline::new(create_test_context())
            .add_stage(first)
            .add_stage(second)
            .run((0..10).map(TestJob::new))
            .await
            .unwrap();

        assert_eq!(summary.results.len(), 10);
        let seen = seen_by_second.lock().unwrap();
        assert_eq!(seen.len(), 5);
        assert!(seen.iter().all(|id| id % 2 == 0));

        let failed: Vec<_> = summary
            .results
            .iter()
            .filter(|j| j.failed_at.is_some())
            .collect();
        assert_eq!(failed.len(), 5);
    }

    #[tokio::test]
    async fn test_supports_any_number_of_stages() {
        let summary = StagePipeline::new(create_test_context())
            .add_stage(passthrough("a", 1))
            .add_stage(passthrough("b", 2))
            .add_stage(passthrough("c", 3).with_queue_capacity(4))
            .run((0..12).map(TestJob::new))
            .await
            .unwrap();

        assert_eq!(summary.results.len(), 12);
        for job in summary.results {
            assert_eq!(job.trail, vec!["a", "b", "c"]);
        }
    }

    #[tokio::test]
    async fn test_slow_upstream_worker_does_not_close_downstream_early() {
        // One straggler in the first stage must still be able to forward its
        // job after its siblings have exited.
        let first = StageSpec::from_fn("transform", 4, |job: TestJob, _ctx| async move {
            if job.id == 0 {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            StageOutcome::Forward(job)
        });

        let summary = StagePipeline::new(create_test_context())
            .add_stage(first)
            .add_stage(passthrough("transcribe", 2))
            .run((0..4).map(TestJob::new))
            .await
            .unwrap();

        assert_eq!(summary.results.len(), 4);
        assert!(summary.results.iter().any(|j| j.id == 0));
    }

    #[tokio::test]
    async fn test_submission_blocks_when_workers_are_busy() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let stage_gate = gate.clone();
        let stage = StageSpec::from_fn("transform", 1, move |job: TestJob, _ctx| {
            let gate = stage_gate.clone();
            async move {
                let _permit = gate.acquire().await;
                StageOutcome::Forward(job)
            }
        });

        let spawned = StagePipeline::new(create_test_context())
            .add_stage(stage)
            .spawn(None)
            .unwrap();

        // The single worker takes the first job and blocks on the gate.
        spawned.input_tx.send_async(TestJob::new(0)).await.unwrap();

        // Rendezvous queue and busy worker: the second submission must block.
        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            spawned.input_tx.send_async(TestJob::new(1)),
        )
        .await;
        assert!(blocked.is_err(), "submission should block while the worker is busy");

        gate.add_permits(2);
        spawned.input_tx.send_async(TestJob::new(1)).await.unwrap();
        drop(spawned.input_tx);

        let mut ids = Vec::new();
        while let Ok(job) = spawned.results_rx.recv_async().await {
            ids.push(job.id);
        }
        assert_eq!(ids, vec![0, 1]);
        spawned.supervisor.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_work() {
        let token = CancellationToken::new();
        let context = Arc::new(PipelineContext::with_name("cancel-test", token.clone()));
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();

        // Simulates a hung external call that only returns on cancellation.
        let hung = StageSpec::from_fn("transform", 2, move |mut job: TestJob, ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                ctx.token.cancelled().await;
                job.failed_at = Some("cancelled");
                StageOutcome::Terminal(job)
            }
        });

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            StagePipeline::new(context)
                .add_stage(hung)
                .add_stage(passthrough("transcribe", 1))
                .run((0..10).map(TestJob::new)),
        )
        .await
        .expect("pipeline must stop promptly after cancellation")
        .unwrap();

        assert!(summary.cancelled);
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert!(summary.results.len() <= 2);
        assert!(summary.incomplete() >= 8);
        assert!(
            summary
                .results
                .iter()
                .all(|j| j.failed_at == Some("cancelled"))
        );
    }

    fn panics_on(id: usize, workers: usize) -> StageSpec<TestJob> {
        StageSpec::from_fn("transform", workers, move |mut job: TestJob, _ctx| async move {
            if job.id == id {
                panic!("handler bug on job {id}");
            }
            job.trail.push("transform");
            StageOutcome::Forward(job)
        })
    }

    #[tokio::test]
    async fn test_handler_panic_loses_only_that_job() {
        let summary = StagePipeline::new(create_test_context())
            .add_stage(panics_on(3, 2))
            .run((0..10).map(TestJob::new))
            .await
            .unwrap();

        assert_eq!(summary.results.len(), 9);
        assert!(summary.results.iter().all(|j| j.id != 3));
        assert_eq!(summary.incomplete(), 1);
        assert!(!summary.cancelled);
        assert_eq!(summary.stage_errors.len(), 1);
        match &summary.stage_errors[0] {
            PipelineError::JobPanicked { stage, message } => {
                assert_eq!(*stage, "transform");
                assert!(message.contains("handler bug on job 3"));
            }
            other => panic!("expected JobPanicked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_single_worker_survives_a_panic() {
        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            StagePipeline::new(create_test_context())
                .add_stage(panics_on(0, 1))
                .add_stage(passthrough("transcribe", 1))
                .run((0..5).map(TestJob::new)),
        )
        .await
        .expect("a panic must not stall the pipeline")
        .unwrap();

        let mut ids: Vec<usize> = summary.results.iter().map(|j| j.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        for job in &summary.results {
            assert_eq!(job.trail, vec!["transform", "transcribe"]);
        }
        assert_eq!(summary.incomplete(), 1);
        assert_eq!(summary.stage_errors.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_invalid_stage_lists() {
        let empty = StagePipeline::<TestJob>::new(create_test_context()).spawn(None);
        assert!(matches!(empty, Err(PipelineError::InvalidStage { .. })));

        let zero_workers = StagePipeline::new(create_test_context())
            .add_stage(passthrough("transform", 0))
            .spawn(None);
        match zero_workers {
            Err(PipelineError::InvalidStage { stage, .. }) => assert_eq!(stage, "transform"),
            _ => panic!("expected InvalidStage"),
        }
    }

    #[tokio::test]
    async fn test_empty_job_list_completes() {
        let summary = StagePipeline::new(create_test_context())
            .add_stage(passthrough("transform", 2))
            .run(Vec::<TestJob>::new())
            .await
            .unwrap();
        assert!(summary.results.is_empty());
        assert_eq!(summary.submitted, 0);
    }
}
