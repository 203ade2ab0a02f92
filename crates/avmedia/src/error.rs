use std::path::PathBuf;

use process_utils::CommandError;
use thiserror::Error;

use crate::MediaDescriptor;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Raw failures of the external transcoder.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("{program} exited with {status}: {diagnostic}")]
    Failed {
        program: String,
        status: String,
        diagnostic: String,
    },

    #[error("could not parse {field} from probe output {output:?}")]
    MalformedOutput { field: &'static str, output: String },

    #[error("invalid downsample target {}: {reason}", path.display())]
    InvalidTarget { path: PathBuf, reason: &'static str },

    #[error("{0}")]
    Other(String),
}

impl ToolError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Command(CommandError::Cancelled { .. }))
    }
}

/// Errors returned by [`crate::TransformEngine`] and descriptor probing.
#[derive(Error, Debug)]
pub enum TransformError {
    /// Caller or configuration mistake. Every problem found is listed.
    #[error("validation error: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Filesystem or external tool failure. Critical for the file at hand.
    #[error("file operation error: {context}: {source}")]
    FileOperation {
        context: String,
        #[source]
        source: BoxError,
    },

    /// Even the selected tier did not bring the file under the cap.
    ///
    /// `target` describes the intermediate output that was produced (and
    /// not published), so callers can inspect the real size.
    #[error("file size [{file_size}] exceeded the maximum size cap: {size_cap}")]
    SizeCapExceeded {
        size_cap: u64,
        file_size: u64,
        target: Box<MediaDescriptor>,
    },

    #[error("transform cancelled")]
    Cancelled,
}

impl TransformError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(vec![msg.into()])
    }

    pub fn file_op(
        context: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::FileOperation {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Classify a tool failure, keeping cancellation distinct.
    pub(crate) fn from_tool(context: impl Into<String>, err: ToolError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::file_op(context, err)
        }
    }

    /// Whether the caller may reasonably act on the failure (skip, accept
    /// the oversized result or escalate) instead of treating it as fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SizeCapExceeded { .. })
    }
}
