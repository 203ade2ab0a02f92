//! # avmedia
//!
//! Media handling for the scribe workspace:
//!
//! - [`MediaDescriptor`]: an immutable probed snapshot of a file
//! - [`select_bitrate`]: picks the best non-upsampling opus tier that fits a
//!   byte-size cap
//! - [`TransformEngine`]: downsamples one file inside a private scratch
//!   workspace and publishes the result atomically
//! - [`MediaTool`]: the port to the external transcoder, with an
//!   ffmpeg/ffprobe implementation in [`FfmpegTool`]
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

mod bitrate;
mod error;
mod ffmpeg;
mod media;
mod tool;
mod transform;

pub use bitrate::{BitrateTier, select_bitrate};
pub use error::{ToolError, TransformError};
pub use ffmpeg::FfmpegTool;
pub use media::MediaDescriptor;
pub use process_utils::CancellationToken;
pub use tool::{MediaTool, validate_downsample_target};
pub use transform::{
    DownsampleStrategy, SourceKind, TargetEncoding, TransformConfig, TransformEngine,
};
