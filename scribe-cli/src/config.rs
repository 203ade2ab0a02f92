//! Run configuration assembled from the command line.

use std::path::PathBuf;
use std::time::Duration;

use avmedia::FfmpegTool;
use tracing::warn;
use transcribe::{OutputKind, ResponseFormat, RetryConfig, WhisperConfig, max_upload_size};

use crate::cli::{ToolArgs, TranscribeArgs};
use crate::error::{AppError, Result};

/// Settings of one `scribe transcribe` run.
#[derive(Debug, Clone)]
pub struct ScribeConfig {
    pub transform_workers: usize,
    pub transcribe_workers: usize,
    /// Capacity of each stage queue, `0` for hand-off only.
    pub queue_capacity: usize,
    pub size_cap: u64,
    /// Requested outputs, deduplicated, in request order.
    pub outputs: Vec<OutputKind>,
    pub force: bool,
    /// Parent of the run-scoped work directory.
    pub work_root: Option<PathBuf>,
}

impl Default for ScribeConfig {
    fn default() -> Self {
        Self {
            transform_workers: 4,
            transcribe_workers: 6,
            queue_capacity: 0,
            size_cap: max_upload_size(),
            outputs: vec![OutputKind::Text],
            force: false,
            work_root: None,
        }
    }
}

impl ScribeConfig {
    pub fn from_args(args: &TranscribeArgs) -> Result<Self> {
        let mut outputs = Vec::with_capacity(args.outputs.len());
        for kind in &args.outputs {
            if !outputs.contains(kind) {
                outputs.push(*kind);
            }
        }

        let config = Self {
            transform_workers: args.transform_workers,
            transcribe_workers: args.transcribe_workers,
            queue_capacity: args.queue_capacity,
            size_cap: args.size_cap,
            outputs,
            force: args.force,
            work_root: args.work_dir.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.transform_workers == 0 {
            errors.push("transform workers must be at least 1");
        }
        if self.transcribe_workers == 0 {
            errors.push("transcribe workers must be at least 1");
        }
        if self.size_cap == 0 {
            errors.push("size cap must be greater than 0");
        }
        if self.outputs.is_empty() {
            errors.push("at least one output kind is required");
        }
        if !errors.is_empty() {
            return Err(AppError::config(errors.join("; ")));
        }

        if self.size_cap > max_upload_size() {
            warn!(
                size_cap = self.size_cap,
                limit = max_upload_size(),
                "Size cap is above the transcription upload limit"
            );
        }
        Ok(())
    }
}

/// Build the transcription client settings. A missing key is reported when
/// the client is constructed.
pub fn whisper_config(args: &TranscribeArgs) -> WhisperConfig {
    let response_format = if args.timestamps {
        ResponseFormat::VerboseJson
    } else {
        ResponseFormat::Json
    };
    WhisperConfig::new(args.api_key.clone().unwrap_or_default())
        .with_base_url(args.base_url.clone())
        .with_model(args.model.clone())
        .with_language(args.language.clone())
        .with_response_format(response_format)
        .with_timeout(Duration::from_secs(args.request_timeout))
        .with_retry(RetryConfig::default().with_max_retries(args.max_retries))
}

pub fn ffmpeg_tool(args: &ToolArgs) -> FfmpegTool {
    FfmpegTool::new(&args.ffmpeg, &args.ffprobe).with_threads(args.ffmpeg_threads)
}
