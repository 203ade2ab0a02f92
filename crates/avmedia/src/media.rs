//! Probed media snapshots.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use process_utils::CancellationToken;
use tracing::debug;

use crate::{MediaTool, TransformError};

/// Metadata of one media file at one path.
///
/// A descriptor wraps a path and a few probed numbers, never file contents.
/// The only way to get an initialized one is [`MediaDescriptor::probe`];
/// `Default` yields an uninitialized descriptor that every transform rejects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaDescriptor {
    path: PathBuf,
    size: u64,
    duration: Duration,
    bitrate: u64,
    initialized: bool,
}

impl MediaDescriptor {
    /// Stat and probe `path`.
    ///
    /// A probe that reports no value leaves the field at zero, which the
    /// bitrate selector treats as unknown.
    pub async fn probe(
        tool: &dyn MediaTool,
        path: impl Into<PathBuf>,
        token: &CancellationToken,
    ) -> Result<Self, TransformError> {
        let path = path.into();

        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            TransformError::file_op(format!("failed to stat {}", path.display()), e)
        })?;
        if !metadata.is_file() {
            return Err(TransformError::file_op(
                format!("failed to stat {}", path.display()),
                "not a regular file",
            ));
        }

        let bitrate = tool
            .probe_bitrate(&path, token)
            .await
            .map_err(|e| TransformError::from_tool("failed to probe bitrate", e))?
            .unwrap_or(0);

        let duration = tool
            .probe_duration(&path, token)
            .await
            .map_err(|e| TransformError::from_tool("failed to probe duration", e))?
            .unwrap_or(Duration::ZERO);

        let media = Self {
            path,
            size: metadata.len(),
            duration,
            bitrate,
            initialized: true,
        };
        debug!(media = %media, "Probed media");
        Ok(media)
    }

    /// Full path, e.g. `/my/docs/zoom.mp3`.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parent directory, e.g. `/my/docs`.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// File name, e.g. `zoom.mp3`.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Lowercased extension without the dot, e.g. `mp3`.
    pub fn ext(&self) -> String {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Encoded bitrate in bits per second, `0` when unknown.
    pub fn bitrate(&self) -> u64 {
        self.bitrate
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl fmt::Display for MediaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (size: {} bytes, duration: {:.3}s, bitrate: {} bps)",
            self.path.display(),
            self.size,
            self.duration.as_secs_f64(),
            self.bitrate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(path: &str) -> MediaDescriptor {
        MediaDescriptor {
            path: PathBuf::from(path),
            size: 1_738_968,
            duration: Duration::from_secs(432),
            bitrate: 36_981,
            initialized: true,
        }
    }

    #[test]
    fn test_path_accessors() {
        let media = descriptor("/my/docs/Zoom.MP3");
        assert_eq!(media.dir(), Path::new("/my/docs"));
        assert_eq!(media.name(), "Zoom.MP3");
        assert_eq!(media.ext(), "mp3");
        assert_eq!(media.size(), 1_738_968);
        assert_eq!(media.bitrate(), 36_981);
        assert!(media.is_initialized());
    }

    #[test]
    fn test_missing_extension() {
        let media = descriptor("/my/docs/recording");
        assert_eq!(media.ext(), "");
        assert_eq!(media.name(), "recording");
    }

    #[test]
    fn test_default_is_uninitialized() {
        let media = MediaDescriptor::default();
        assert!(!media.is_initialized());
        assert_eq!(media.size(), 0);
        assert_eq!(media.name(), "");
    }

    #[test]
    fn test_display() {
        let shown = descriptor("/a/b.aac").to_string();
        assert!(shown.contains("/a/b.aac"));
        assert!(shown.contains("1738968 bytes"));
        assert!(shown.contains("36981 bps"));
    }
}
