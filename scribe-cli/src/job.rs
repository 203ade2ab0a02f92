//! Per-file pipeline state.

use std::path::PathBuf;

use avmedia::{MediaDescriptor, TransformError};
use thiserror::Error;
use transcribe::{TranscribeError, Transcript};

/// Why a job ended without a transcript.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Transcribe(#[from] TranscribeError),

    #[error("no {0} produced by the previous stage")]
    MissingInput(&'static str),

    #[error("failed to write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl JobError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Transform(TransformError::Cancelled) | Self::Transcribe(TranscribeError::Cancelled)
        )
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transform(e) if e.is_recoverable())
    }
}

/// One source file travelling through the pipeline.
///
/// Each stage owns the job while working on it and fills in its own field.
/// Once `error` is set the job is terminal.
#[derive(Debug)]
pub struct ScribeJob {
    pub source: MediaDescriptor,
    pub target: Option<MediaDescriptor>,
    pub transcript: Option<Transcript>,
    pub error: Option<JobError>,
}

impl ScribeJob {
    pub fn new(source: MediaDescriptor) -> Self {
        Self {
            source,
            target: None,
            transcript: None,
            error: None,
        }
    }

    /// Attach a terminal error.
    pub fn fail(mut self, error: impl Into<JobError>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.transcript.is_some()
    }

    pub fn name(&self) -> String {
        self.source.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_not_yet_successful() {
        let job = ScribeJob::new(MediaDescriptor::default());
        assert!(!job.is_success());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_fail_sets_terminal_error() {
        let job = ScribeJob::new(MediaDescriptor::default()).fail(TransformError::Cancelled);
        assert!(!job.is_success());
        assert!(job.error.as_ref().is_some_and(JobError::is_cancelled));
    }

    #[test]
    fn test_recoverable_only_for_size_cap() {
        let oversized = JobError::from(TransformError::SizeCapExceeded {
            size_cap: 1,
            file_size: 2,
            target: Box::default(),
        });
        assert!(oversized.is_recoverable());
        assert!(!JobError::MissingInput("target").is_recoverable());
        assert!(JobError::from(TranscribeError::Cancelled).is_cancelled());
    }
}
