//! Port to the external transcoder.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use process_utils::CancellationToken;

use crate::{BitrateTier, TargetEncoding, ToolError};

/// Probe and downsample operations the transform engine relies on.
///
/// Probes return `Ok(None)` when the tool reports no value for the field.
/// `Err` is reserved for failed invocations and malformed output. Every call
/// must abort promptly once `token` is cancelled.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Bitrate of the first audio stream, in bits per second.
    async fn probe_bitrate(
        &self,
        path: &Path,
        token: &CancellationToken,
    ) -> Result<Option<u64>, ToolError>;

    /// Duration of the first audio stream.
    async fn probe_duration(
        &self,
        path: &Path,
        token: &CancellationToken,
    ) -> Result<Option<Duration>, ToolError>;

    /// Re-encode `source` into `target` as mono ogg/opus at `tier`.
    ///
    /// `target` must not exist and must carry the `.ogg` extension.
    async fn downsample(
        &self,
        source: &Path,
        target: &Path,
        tier: BitrateTier,
        token: &CancellationToken,
    ) -> Result<(), ToolError>;

    /// Free-form description of the file, for debug output.
    async fn probe_dump(&self, path: &Path, token: &CancellationToken)
    -> Result<String, ToolError>;
}

/// Check the downsample target contract before anything is spawned.
pub fn validate_downsample_target(target: &Path) -> Result<(), ToolError> {
    let expected = TargetEncoding::OggOpus.extension();
    let has_ext = target
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(expected));
    if !has_ext {
        return Err(ToolError::InvalidTarget {
            path: target.to_path_buf(),
            reason: "target must have an .ogg extension",
        });
    }
    if target.exists() {
        return Err(ToolError::InvalidTarget {
            path: target.to_path_buf(),
            reason: "target already exists",
        });
    }
    Ok(())
}
