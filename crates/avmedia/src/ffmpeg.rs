//! ffmpeg/ffprobe implementation of [`MediaTool`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use process_utils::{CancellationToken, output_with_cancel, tokio_command};
use tracing::debug;

use crate::{BitrateTier, MediaTool, ToolError, validate_downsample_target};

/// Runs the `ffmpeg` and `ffprobe` binaries as child processes.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    threads: usize,
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegTool {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            threads: 4,
        }
    }

    /// Resolve binaries from `FFMPEG_PATH` / `FFPROBE_PATH`, falling back to `$PATH`.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
        )
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    pub fn ffprobe_path(&self) -> &Path {
        &self.ffprobe_path
    }

    /// Arguments for a mono, metadata-free, voice-tuned opus encode.
    pub fn downsample_args(&self, source: &Path, target: &Path, tier: BitrateTier) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-i".into(), source.into()];
        args.extend(
            [
                "-vn",
                "-map_metadata",
                "-1",
                "-ac",
                "1",
                "-c:a",
                "libopus",
                "-b:a",
                tier.ffmpeg_arg(),
                "-application",
                "voip",
                "-threads",
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(self.threads.to_string().into());
        args.push(target.into());
        args
    }

    /// Arguments printing a single stream entry of the first audio stream.
    pub fn probe_args(entry: &str, path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-v",
            "error",
            "-select_streams",
            "a:0",
            "-show_entries",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(format!("stream={entry}").into());
        args.push("-of".into());
        args.push("default=noprint_wrappers=1:nokey=1".into());
        args.push(path.into());
        args
    }

    async fn run(
        &self,
        program: &Path,
        args: Vec<OsString>,
        token: &CancellationToken,
    ) -> Result<String, ToolError> {
        let mut cmd = tokio_command(program);
        cmd.args(&args);
        debug!(program = %program.display(), ?args, "Running external tool");

        let output = output_with_cancel(&mut cmd, token).await?;
        if !output.success() {
            return Err(ToolError::Failed {
                program: program.display().to_string(),
                status: output.status.to_string(),
                diagnostic: output.combined(),
            });
        }
        Ok(output.stdout_trimmed())
    }
}

/// `N/A` and empty output mean the stream carries no value.
fn is_unknown(output: &str) -> bool {
    output.is_empty() || output == "N/A"
}

pub(crate) fn parse_bitrate(output: &str) -> Result<Option<u64>, ToolError> {
    let output = output.trim();
    if is_unknown(output) {
        return Ok(None);
    }
    output
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ToolError::MalformedOutput {
            field: "bit_rate",
            output: output.to_string(),
        })
}

pub(crate) fn parse_duration(output: &str) -> Result<Option<Duration>, ToolError> {
    let output = output.trim();
    if is_unknown(output) {
        return Ok(None);
    }
    match output.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
        _ => Err(ToolError::MalformedOutput {
            field: "duration",
            output: output.to_string(),
        }),
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn probe_bitrate(
        &self,
        path: &Path,
        token: &CancellationToken,
    ) -> Result<Option<u64>, ToolError> {
        let output = self
            .run(&self.ffprobe_path, Self::probe_args("bit_rate", path), token)
            .await?;
        parse_bitrate(&output)
    }

    async fn probe_duration(
        &self,
        path: &Path,
        token: &CancellationToken,
    ) -> Result<Option<Duration>, ToolError> {
        let output = self
            .run(&self.ffprobe_path, Self::probe_args("duration", path), token)
            .await?;
        parse_duration(&output)
    }

    async fn downsample(
        &self,
        source: &Path,
        target: &Path,
        tier: BitrateTier,
        token: &CancellationToken,
    ) -> Result<(), ToolError> {
        validate_downsample_target(target)?;
        self.run(&self.ffmpeg_path, self.downsample_args(source, target, tier), token)
            .await
            .map(|_| ())
    }

    async fn probe_dump(
        &self,
        path: &Path,
        token: &CancellationToken,
    ) -> Result<String, ToolError> {
        let mut cmd = tokio_command(&self.ffprobe_path);
        cmd.arg(path);
        // ffprobe prints its report on stderr.
        let output = output_with_cancel(&mut cmd, token).await?;
        if !output.success() {
            return Err(ToolError::Failed {
                program: self.ffprobe_path.display().to_string(),
                status: output.status.to_string(),
                diagnostic: output.combined(),
            });
        }
        Ok(output.combined())
    }
}
