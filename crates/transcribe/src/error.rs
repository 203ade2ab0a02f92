use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from the transcription service client.
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("request failed with status: {status}: {body}")]
    Status {
        status: u16,
        body: String,
        /// Wait requested by the service through `Retry-After`.
        retry_after: Option<Duration>,
    },

    #[error("failed to decode transcript: {0}")]
    Decode(String),

    #[error("transcription cancelled")]
    Cancelled,
}

impl TranscribeError {
    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures, timeouts, 408, 429 and 5xx are transient. Other
    /// 4xx responses mean the request itself is wrong and are never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => !e.is_builder() && !e.is_decode(),
            Self::Status { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            Self::Config(_) | Self::Io { .. } | Self::Decode(_) | Self::Cancelled => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Errors from output formatting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("output format not supported: {0}")]
    Unsupported(String),

    #[error("unknown output format: {0}")]
    Unknown(String),
}
