use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use transcribe::{DEFAULT_BASE_URL, OutputKind, max_upload_size};

#[derive(Parser, Debug)]
#[command(name = "scribe")]
#[command(about = "Downsample audio under an upload cap and transcribe it to text")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging (includes ffprobe dumps)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcribe audio/video files, writing `<file>.<kind>` next to each source
    Transcribe(TranscribeArgs),

    /// Print the probed descriptor of a media file
    Probe(ProbeArgs),
}

/// External transcoder settings.
#[derive(ClapArgs, Debug, Clone)]
pub struct ToolArgs {
    /// Path to the ffmpeg binary
    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Path to the ffprobe binary
    #[arg(long, env = "FFPROBE_PATH", default_value = "ffprobe")]
    pub ffprobe: PathBuf,

    /// Threads handed to each ffmpeg encode
    #[arg(long, default_value_t = 4)]
    pub ffmpeg_threads: usize,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct TranscribeArgs {
    /// Files to transcribe
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Output kinds to write (repeatable)
    #[arg(short = 'o', long = "output", value_name = "KIND", default_value = "txt")]
    pub outputs: Vec<OutputKind>,

    /// Transcribe even if every requested output already exists
    #[arg(short, long)]
    pub force: bool,

    /// Concurrent downsample workers
    #[arg(long, default_value_t = 4)]
    pub transform_workers: usize,

    /// Concurrent transcription workers
    #[arg(long, default_value_t = 6)]
    pub transcribe_workers: usize,

    /// Capacity of each stage queue (0 = hand-off only)
    #[arg(long, default_value_t = 0)]
    pub queue_capacity: usize,

    /// Maximum size in bytes of each uploaded file
    #[arg(long, default_value_t = max_upload_size())]
    pub size_cap: u64,

    /// API key for the transcription service
    #[arg(long, env = "API_KEY_OPENAI", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the transcription service
    #[arg(long, env = "SCRIBE_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Transcription model
    #[arg(long, default_value = "whisper-1")]
    pub model: String,

    /// Spoken language (ISO-639-1)
    #[arg(long, default_value = "en")]
    pub language: String,

    /// Request word and segment timings from the service
    #[arg(long)]
    pub timestamps: bool,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 300)]
    pub request_timeout: u64,

    /// Retries for transient transcription failures
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Directory for intermediate files (defaults to the system temp dir)
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    #[command(flatten)]
    pub tools: ToolArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ProbeArgs {
    /// File to probe
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    #[command(flatten)]
    pub tools: ToolArgs,
}
