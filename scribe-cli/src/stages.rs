//! The two concrete pipeline stages.

use std::sync::Arc;

use async_trait::async_trait;
use avmedia::{TransformConfig, TransformEngine};
use pipeline_common::{PipelineContext, StageHandler, StageOutcome, StageSpec};
use tracing::{debug, info, warn};
use transcribe::Transcriber;

use crate::{JobError, ScribeConfig, ScribeJob};

pub const TRANSFORM_STAGE: &str = "transform";
pub const TRANSCRIBE_STAGE: &str = "transcribe";

/// Downsamples the source into the run's work directory.
pub struct TransformStage {
    engine: TransformEngine,
    config: TransformConfig,
}

impl TransformStage {
    pub fn new(engine: TransformEngine, config: TransformConfig) -> Self {
        Self { engine, config }
    }
}

#[async_trait]
impl StageHandler<ScribeJob> for TransformStage {
    async fn process(
        &self,
        mut job: ScribeJob,
        context: &Arc<PipelineContext>,
    ) -> StageOutcome<ScribeJob> {
        match self
            .engine
            .downsample(&job.source, &self.config, &context.token)
            .await
        {
            Ok(target) => {
                info!(file = %job.name(), size = target.size(), "Downsampled");
                job.target = Some(target);
                StageOutcome::Forward(job)
            }
            Err(e) => {
                warn!(file = %job.name(), error = %e, "Downsample failed");
                StageOutcome::Terminal(job.fail(e))
            }
        }
    }
}

/// Sends the downsampled file to the transcription service.
pub struct TranscribeStage {
    transcriber: Arc<dyn Transcriber>,
}

impl TranscribeStage {
    pub fn new(transcriber: Arc<dyn Transcriber>) -> Self {
        Self { transcriber }
    }
}

#[async_trait]
impl StageHandler<ScribeJob> for TranscribeStage {
    async fn process(
        &self,
        mut job: ScribeJob,
        context: &Arc<PipelineContext>,
    ) -> StageOutcome<ScribeJob> {
        let Some(target_path) = job.target.as_ref().map(|t| t.path().to_path_buf()) else {
            return StageOutcome::Terminal(job.fail(JobError::MissingInput("downsampled file")));
        };

        let result = self
            .transcriber
            .transcribe(&target_path, &context.token)
            .await;

        // The intermediate file is not needed past this point.
        if let Err(e) = tokio::fs::remove_file(&target_path).await {
            debug!(path = %target_path.display(), error = %e, "Failed to remove intermediate file");
        }

        match result {
            Ok(transcript) => {
                info!(file = %job.name(), chars = transcript.text.len(), "Transcribed");
                job.transcript = Some(transcript);
                StageOutcome::Forward(job)
            }
            Err(e) => {
                warn!(file = %job.name(), error = %e, "Transcription failed");
                StageOutcome::Terminal(job.fail(e))
            }
        }
    }
}

/// Declarative stage list for a run: transform, then transcribe.
pub fn build_stages(
    config: &ScribeConfig,
    engine: TransformEngine,
    transform_config: TransformConfig,
    transcriber: Arc<dyn Transcriber>,
) -> Vec<StageSpec<ScribeJob>> {
    vec![
        StageSpec::new(
            TRANSFORM_STAGE,
            config.transform_workers,
            Arc::new(TransformStage::new(engine, transform_config)),
        )
        .with_queue_capacity(config.queue_capacity),
        StageSpec::new(
            TRANSCRIBE_STAGE,
            config.transcribe_workers,
            Arc::new(TranscribeStage::new(transcriber)),
        )
        .with_queue_capacity(config.queue_capacity),
    ]
}
