//! Library target for the `scribe` package.
//!
//! The primary deliverable is the `scribe` CLI binary (`src/main.rs`). The
//! command logic lives here so it can be driven from integration tests with
//! fake transcoders and transcribers.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod job;
pub mod output;
pub mod runner;
pub mod stages;

pub use config::ScribeConfig;
pub use error::{AppError, Result};
pub use job::{JobError, ScribeJob};
pub use output::{FileReport, Report, SkipReason};
pub use runner::Scribe;
