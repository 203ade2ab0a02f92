//! # Pipeline Common
//!
//! This crate provides the stage scheduler used to move jobs through a
//! fixed sequence of processing phases. A pipeline is described as a
//! declarative list of stages, each with a name, a worker count, an input
//! queue capacity and a [`StageHandler`].
//!
//! ## Features
//!
//! - One bounded (or rendezvous) MPMC input queue per stage
//! - A fixed pool of workers per stage pulling from that queue
//! - Successful jobs are forwarded to the next stage, failed jobs go straight
//!   to a shared results sink
//! - An explicit completion barrier per stage: the downstream queue is only
//!   closed once every worker of the upstream stage has exited
//! - Cooperative cancellation through a shared [`CancellationToken`]
//! - A panicking handler loses only the job it was processing
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

use thiserror::Error;

mod context;
mod run_completion;
pub mod scheduler;
pub mod stage;

#[cfg(test)]
mod test_utils;

/// Re-export key traits and types
pub use context::PipelineContext;
pub use run_completion::settle_workers;
pub use scheduler::{RunSummary, SpawnedStages, StagePipeline};
pub use stage::{FnStage, StageHandler, StageOutcome, StageSpec};
pub use tokio_util::sync::CancellationToken;

/// Common error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Invalid stage ({stage}): {reason}")]
    InvalidStage { stage: &'static str, reason: String },

    #[error("Worker panicked in stage {stage}: {message}")]
    WorkerPanicked { stage: &'static str, message: String },

    /// A handler panicked while processing one job. The job is lost, the
    /// worker keeps serving its queue.
    #[error("Handler panicked in stage {stage}, job dropped: {message}")]
    JobPanicked { stage: &'static str, message: String },
}
