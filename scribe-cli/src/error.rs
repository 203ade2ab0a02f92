use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] pipeline_common::PipelineError),

    #[error("Transform error: {0}")]
    Transform(#[from] avmedia::TransformError),

    #[error("Transcription error: {0}")]
    Transcribe(#[from] transcribe::TranscribeError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AppError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
