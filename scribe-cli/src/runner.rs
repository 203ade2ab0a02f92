//! # Scribe run
//!
//! Drives one `scribe transcribe` invocation:
//!
//! 1. Discover: filter inputs by extension and existing outputs, probe the
//!    rest. A file that fails to probe is reported and skipped.
//! 2. Run every job through `[transform, transcribe]` on the stage scheduler.
//! 3. Write the requested outputs for every successful job and collect a
//!    per-file [`Report`].

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use avmedia::{SourceKind, TransformConfig, TransformEngine, TransformError};
use pipeline_common::{CancellationToken, PipelineContext, StagePipeline};
use tempfile::TempDir;
use tracing::{Level, debug, info, warn};
use transcribe::Transcriber;

use crate::output::{outputs_exist, write_outputs};
use crate::stages::build_stages;
use crate::{AppError, FileReport, JobError, Report, ScribeConfig, ScribeJob, SkipReason};

/// Jobs ready for submission plus the files that never will be.
#[derive(Debug, Default)]
pub struct Discovery {
    pub jobs: Vec<ScribeJob>,
    pub reports: Vec<FileReport>,
}

pub struct Scribe {
    engine: TransformEngine,
    transcriber: Arc<dyn Transcriber>,
    config: ScribeConfig,
}

impl Scribe {
    pub fn new(
        engine: TransformEngine,
        transcriber: Arc<dyn Transcriber>,
        config: ScribeConfig,
    ) -> Self {
        Self {
            engine,
            transcriber,
            config,
        }
    }

    pub fn config(&self) -> &ScribeConfig {
        &self.config
    }

    fn work_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("scribe-run-");
        match &self.config.work_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    /// Turn input paths into jobs.
    pub async fn discover(&self, paths: &[PathBuf], token: &CancellationToken) -> Discovery {
        let mut discovery = Discovery::default();
        // Intermediate files are keyed by file name in a shared directory.
        let mut names = HashSet::new();

        for path in paths {
            if token.is_cancelled() {
                break;
            }

            if SourceKind::from_path(path).is_none() {
                debug!(path = %path.display(), "Skipping unsupported extension");
                discovery.reports.push(FileReport::Skipped {
                    source: path.clone(),
                    reason: SkipReason::UnsupportedExtension,
                });
                continue;
            }

            if !self.config.force && outputs_exist(path, &self.config.outputs) {
                info!(path = %path.display(), "Skipping: outputs already exist");
                discovery.reports.push(FileReport::Skipped {
                    source: path.clone(),
                    reason: SkipReason::OutputsExist,
                });
                continue;
            }

            if tracing::enabled!(Level::DEBUG) {
                match self.engine.tool().probe_dump(path, token).await {
                    Ok(dump) => debug!(path = %path.display(), "ffprobe dump:\n{dump}"),
                    Err(e) => debug!(path = %path.display(), error = %e, "ffprobe dump failed"),
                }
            }

            let source = match self.engine.probe(path, token).await {
                Ok(source) => source,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Probe failed");
                    discovery
                        .reports
                        .push(FileReport::failed(path, &JobError::from(e)));
                    continue;
                }
            };

            if !names.insert(source.name()) {
                let error = JobError::from(TransformError::validation(format!(
                    "duplicate file name {:?}: another input with the same name is already queued",
                    source.name()
                )));
                discovery.reports.push(FileReport::failed(path, &error));
                continue;
            }

            info!(path = %path.display(), "processing");
            discovery.jobs.push(ScribeJob::new(source));
        }

        discovery
    }

    /// Process `paths` end to end. Individual file failures end up in the
    /// report; only setup failures are returned as errors.
    pub async fn run(&self, paths: &[PathBuf], token: &CancellationToken) -> Result<Report, AppError> {
        let work_dir = self.work_dir()?;
        debug!(work_dir = %work_dir.path().display(), "Created work directory");

        let transform_config = TransformConfig::new(work_dir.path(), self.config.size_cap);
        transform_config.validate().await?;

        let Discovery { jobs, reports } = self.discover(paths, token).await;
        let mut report = Report {
            files: reports,
            ..Default::default()
        };

        if !jobs.is_empty() {
            info!(
                files = jobs.len(),
                transform_workers = self.config.transform_workers,
                transcribe_workers = self.config.transcribe_workers,
                "Starting pipeline"
            );

            let context = Arc::new(PipelineContext::with_name("scribe", token.clone()));
            let stages = build_stages(
                &self.config,
                self.engine.clone(),
                transform_config,
                Arc::clone(&self.transcriber),
            );
            let summary = StagePipeline::with_stages(context, stages).run(jobs).await?;

            report.not_completed = summary.incomplete();
            for fault in &summary.stage_errors {
                warn!(error = %fault, "Pipeline fault");
                report.faults.push(fault.to_string());
            }
            for job in summary.results {
                report.files.push(self.finish(job).await);
            }
        }

        report.cancelled = token.is_cancelled();

        if let Err(e) = work_dir.close() {
            warn!(error = %e, "Failed to remove work directory");
        }
        Ok(report)
    }

    async fn finish(&self, job: ScribeJob) -> FileReport {
        let source = job.source.path().to_path_buf();
        if let Some(error) = &job.error {
            return FileReport::failed(source, error);
        }
        match write_outputs(&job, &self.config.outputs).await {
            Ok(outputs) => FileReport::Succeeded { source, outputs },
            Err(error) => {
                warn!(file = %job.name(), error = %error, "Failed to write outputs");
                FileReport::failed(source, &error)
            }
        }
    }
}
