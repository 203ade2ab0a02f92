//! Shared pipeline context
//!
//! Every worker of every stage receives the same context. It carries the
//! run name used in log spans and the cancellation token that must be
//! threaded into every external call a handler makes.

use crate::CancellationToken;

/// Shared context for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Name of the run, used for logging
    pub name: String,
    /// The cancellation token
    pub token: CancellationToken,
}

impl PipelineContext {
    /// Create a new context around an existing token
    pub fn new(token: CancellationToken) -> Self {
        Self {
            name: "pipeline".to_string(),
            token,
        }
    }

    pub fn with_name(name: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            name: name.into(),
            ..Self::new(token)
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}
