//! # Transform engine
//!
//! Downsamples one source file into a size-capped ogg/opus file.
//!
//! Every call runs in its own scratch workspace (a [`tempfile::TempDir`]),
//! which is removed on every return path. The produced file only reaches
//! the caller's output directory once it is known to fit under the cap.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use process_utils::CancellationToken;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::{MediaDescriptor, MediaTool, TransformError, select_bitrate};

/// How the target bitrate is picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownsampleStrategy {
    /// Best quality that neither upsamples nor exceeds the size cap. If even
    /// the lowest tier does not fit, [`TransformError::SizeCapExceeded`] is
    /// returned.
    #[default]
    AutoBest,
}

/// Encodings the engine can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetEncoding {
    OggOpus,
}

impl TargetEncoding {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::OggOpus => "ogg",
        }
    }
}

/// Source formats accepted for downsampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Mp3,
    Aac,
    Wav,
    Flac,
    M4a,
    Mp4,
    Webm,
}

impl SourceKind {
    pub const ALL: [SourceKind; 7] = [
        Self::Mp3,
        Self::Aac,
        Self::Wav,
        Self::Flac,
        Self::M4a,
        Self::Mp4,
        Self::Webm,
    ];

    /// Case-insensitive lookup by file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.extension().eq_ignore_ascii_case(ext))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub const fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::M4a => "m4a",
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }

    /// Encoding this kind is downsampled to.
    pub const fn target_encoding(self) -> TargetEncoding {
        match self {
            Self::Mp3
            | Self::Aac
            | Self::Wav
            | Self::Flac
            | Self::M4a
            | Self::Mp4
            | Self::Webm => TargetEncoding::OggOpus,
        }
    }
}

/// Parameters of a downsample call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformConfig {
    /// Existing directory the final file is published into.
    pub output_dir: PathBuf,
    /// Maximum size of the published file, in bytes.
    pub size_cap: u64,
    pub strategy: DownsampleStrategy,
}

impl TransformConfig {
    pub fn new(output_dir: impl Into<PathBuf>, size_cap: u64) -> Self {
        Self {
            output_dir: output_dir.into(),
            size_cap,
            strategy: DownsampleStrategy::AutoBest,
        }
    }

    /// Check every field and report all problems at once.
    pub async fn validate(&self) -> Result<(), TransformError> {
        let mut errors = Vec::new();

        match tokio::fs::metadata(&self.output_dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => errors.push(format!(
                "invalid output_dir [{}]: not a directory",
                self.output_dir.display()
            )),
            Err(e) => errors.push(format!(
                "invalid output_dir [{}]: {e}",
                self.output_dir.display()
            )),
        }

        if self.size_cap == 0 {
            errors.push("invalid size_cap [0]: must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TransformError::Validation(errors))
        }
    }
}

/// Runs size-capped downsamples through a [`MediaTool`].
#[derive(Clone)]
pub struct TransformEngine {
    tool: Arc<dyn MediaTool>,
    scratch_root: Option<PathBuf>,
}

impl TransformEngine {
    pub fn new(tool: Arc<dyn MediaTool>) -> Self {
        Self {
            tool,
            scratch_root: None,
        }
    }

    /// Create scratch workspaces under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn tool(&self) -> &Arc<dyn MediaTool> {
        &self.tool
    }

    /// Probe `path` with this engine's tool.
    pub async fn probe(
        &self,
        path: impl Into<PathBuf>,
        token: &CancellationToken,
    ) -> Result<MediaDescriptor, TransformError> {
        MediaDescriptor::probe(self.tool.as_ref(), path, token).await
    }

    fn scratch_workspace(&self) -> io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("scribe-");
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    /// Downsample `source` according to `config`.
    ///
    /// On success the returned descriptor points at
    /// `<output_dir>/<source name>.ogg`. On [`TransformError::SizeCapExceeded`]
    /// nothing is published; the error carries the intermediate descriptor.
    pub async fn downsample(
        &self,
        source: &MediaDescriptor,
        config: &TransformConfig,
        token: &CancellationToken,
    ) -> Result<MediaDescriptor, TransformError> {
        if !source.is_initialized() {
            return Err(TransformError::validation(
                "media uninitialized: probe it first",
            ));
        }
        config.validate().await?;

        let ext = source.ext();
        let kind = SourceKind::from_extension(&ext).ok_or_else(|| {
            TransformError::validation(format!("extension not allowed: {ext:?}"))
        })?;
        let encoding = kind.target_encoding();

        if token.is_cancelled() {
            return Err(TransformError::Cancelled);
        }

        let workspace = self
            .scratch_workspace()
            .map_err(|e| TransformError::file_op("failed to create scratch workspace", e))?;

        let file_name = format!("{}.{}", source.name(), encoding.extension());
        let scratch_path = workspace.path().join(&file_name);
        let final_path = config.output_dir.join(&file_name);

        let tier = match config.strategy {
            DownsampleStrategy::AutoBest => {
                select_bitrate(source.bitrate(), source.duration(), config.size_cap)
            }
        };
        info!(
            file = %source.name(),
            source_bitrate = source.bitrate(),
            duration_secs = source.duration().as_secs(),
            tier = %tier,
            "Downsampling"
        );

        self.tool
            .downsample(source.path(), &scratch_path, tier, token)
            .await
            .map_err(|e| TransformError::from_tool("ffmpeg failed", e))?;

        let target = self.probe(&scratch_path, token).await?;
        if target.size() > config.size_cap {
            warn!(
                file = %source.name(),
                size = target.size(),
                size_cap = config.size_cap,
                tier = %tier,
                "Downsampled file exceeds size cap"
            );
            return Err(TransformError::SizeCapExceeded {
                size_cap: config.size_cap,
                file_size: target.size(),
                target: Box::new(target),
            });
        }

        publish(&scratch_path, &final_path).await?;

        // The path changed, so probe again at the final location. A failure
        // here must not leave a published file behind.
        let published = match self.probe(&final_path, token).await {
            Ok(published) => published,
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&final_path).await {
                    warn!(
                        path = %final_path.display(),
                        error = %remove_err,
                        "Failed to remove unverified output"
                    );
                }
                return Err(e);
            }
        };

        if let Err(e) = workspace.close() {
            warn!(error = %e, "Failed to remove scratch workspace");
        }

        debug!(output = %published, "Transform complete");
        Ok(published)
    }
}

/// Move `from` to `to`, falling back to copy-then-rename across filesystems.
async fn publish(from: &Path, to: &Path) -> Result<(), TransformError> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            let partial = partial_path(to);
            let copied = async {
                tokio::fs::copy(from, &partial).await?;
                tokio::fs::rename(&partial, to).await
            }
            .await;
            if let Err(e) = copied {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(TransformError::file_op("file move/rename failed", e));
            }
            Ok(())
        }
        Err(e) => Err(TransformError::file_op("file move/rename failed", e)),
    }
}

/// Hidden sibling of `to` used while copying.
fn partial_path(to: &Path) -> PathBuf {
    let name = to
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    to.with_file_name(format!(".{name}.partial"))
}
