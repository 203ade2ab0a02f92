//! # transcribe
//!
//! Turns downsampled audio files into text:
//!
//! - [`Transcript`]: the structured result returned by the service
//! - [`Transcriber`]: the port the pipeline talks to, implemented for the
//!   OpenAI Whisper HTTP API by [`WhisperClient`]
//! - [`RetryConfig`]: exponential backoff for transient failures only
//! - [`OutputKind`]: the closed set of output formats
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

mod client;
mod error;
mod format;
mod retry;
mod transcript;

pub use client::{
    DEFAULT_BASE_URL, ResponseFormat, Transcriber, WhisperClient, WhisperConfig,
    max_upload_size,
};
pub use error::{FormatError, TranscribeError};
pub use format::{OutputKind, split_sentences};
pub use retry::RetryConfig;
pub use transcript::{Segment, Transcript, Word};
