//! # Stage descriptions
//!
//! A stage is one phase of a pipeline: a name, a number of concurrent
//! workers, the capacity of its input queue, and the handler every worker
//! runs for each job it pulls.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::PipelineContext;

/// Where a job goes after a handler is done with it.
#[derive(Debug)]
pub enum StageOutcome<J> {
    /// The job was enriched and continues to the next stage (or to the
    /// results sink if this was the last stage).
    Forward(J),
    /// The job reached a terminal state in this stage. It is routed directly
    /// to the results sink and skips every remaining stage.
    Terminal(J),
}

/// Per-job processing logic of a stage.
///
/// A handler owns the job for the duration of the call; no other worker can
/// observe it concurrently. Handlers must watch `context.token` and abort
/// external work when it is cancelled.
#[async_trait]
pub trait StageHandler<J>: Send + Sync {
    async fn process(&self, job: J, context: &Arc<PipelineContext>) -> StageOutcome<J>;
}

/// Adapter turning an async closure into a [`StageHandler`].
pub struct FnStage<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnStage<F, Fut> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<J, F, Fut> StageHandler<J> for FnStage<F, Fut>
where
    J: Send + 'static,
    F: Fn(J, Arc<PipelineContext>) -> Fut + Send + Sync,
    Fut: Future<Output = StageOutcome<J>> + Send + 'static,
{
    async fn process(&self, job: J, context: &Arc<PipelineContext>) -> StageOutcome<J> {
        (self.f)(job, Arc::clone(context)).await
    }
}

/// Declarative description of one stage.
pub struct StageSpec<J> {
    pub name: &'static str,
    pub workers: usize,
    /// Capacity of this stage's input queue. `0` makes the queue a
    /// rendezvous: a send only completes once a worker takes the job.
    pub queue_capacity: usize,
    pub handler: Arc<dyn StageHandler<J>>,
}

impl<J> StageSpec<J> {
    pub fn new(name: &'static str, workers: usize, handler: Arc<dyn StageHandler<J>>) -> Self {
        Self {
            name,
            workers,
            queue_capacity: 0,
            handler,
        }
    }

    /// Build a stage from an async closure.
    pub fn from_fn<F, Fut>(name: &'static str, workers: usize, f: F) -> Self
    where
        J: Send + 'static,
        F: Fn(J, Arc<PipelineContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StageOutcome<J>> + Send + 'static,
    {
        Self::new(name, workers, Arc::new(FnStage::new(f)))
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

impl<J> std::fmt::Debug for StageSpec<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageSpec")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}
