//! Subcommand entry points.

use std::sync::Arc;

use avmedia::{MediaTool, TransformEngine};
use pipeline_common::CancellationToken;
use tracing::info;
use transcribe::WhisperClient;

use crate::cli::{ProbeArgs, TranscribeArgs};
use crate::config::{ffmpeg_tool, whisper_config};
use crate::{Report, Result, Scribe, ScribeConfig};

/// `scribe transcribe`
pub async fn transcribe_files(args: TranscribeArgs, token: CancellationToken) -> Result<Report> {
    let config = ScribeConfig::from_args(&args)?;
    // Fails fast on a missing API key, before any file is touched.
    let transcriber = Arc::new(WhisperClient::new(whisper_config(&args))?);
    let tool: Arc<dyn MediaTool> = Arc::new(ffmpeg_tool(&args.tools));

    info!(files = args.files.len(), outputs = ?config.outputs, "Scribe starting");

    let scribe = Scribe::new(TransformEngine::new(tool), transcriber, config);
    scribe.run(&args.files, &token).await
}

/// `scribe probe`
pub async fn probe_file(args: ProbeArgs, verbose: bool, token: CancellationToken) -> Result<String> {
    let engine = TransformEngine::new(Arc::new(ffmpeg_tool(&args.tools)));
    let media = engine.probe(&args.file, &token).await?;

    let mut out = format!(
        "path: {}\nsize: {} bytes\nduration: {:.3}s\nbitrate: {}",
        media.path().display(),
        media.size(),
        media.duration().as_secs_f64(),
        match media.bitrate() {
            0 => "unknown".to_string(),
            bps => format!("{bps} bps"),
        }
    );

    if verbose {
        let dump = engine
            .tool()
            .probe_dump(&args.file, &token)
            .await
            .map_err(|e| avmedia::TransformError::file_op("ffprobe dump failed", e))?;
        out.push_str("\n\n");
        out.push_str(&dump);
    }
    Ok(out)
}
