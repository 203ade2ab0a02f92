//! Transcript files and the end-of-run report.

use std::fmt;
use std::path::{Path, PathBuf};

use transcribe::OutputKind;

use crate::{JobError, ScribeJob};

/// `<source path>.<kind extension>`, e.g. `/talks/zoom.mp3.txt`.
pub fn output_path(source: &Path, kind: OutputKind) -> PathBuf {
    let mut path = source.as_os_str().to_owned();
    path.push(".");
    path.push(kind.extension());
    PathBuf::from(path)
}

/// Whether every requested output of `source` is already on disk.
pub fn outputs_exist(source: &Path, kinds: &[OutputKind]) -> bool {
    kinds.iter().all(|kind| output_path(source, *kind).is_file())
}

/// Format the job's transcript in every requested kind and write each file
/// next to the source.
pub async fn write_outputs(job: &ScribeJob, kinds: &[OutputKind]) -> Result<Vec<PathBuf>, JobError> {
    let transcript = job
        .transcript
        .as_ref()
        .ok_or(JobError::MissingInput("transcript"))?;

    let mut written = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let path = output_path(job.source.path(), *kind);
        tokio::fs::write(&path, kind.format(transcript))
            .await
            .map_err(|source| JobError::Output {
                path: path.clone(),
                source,
            })?;
        written.push(path);
    }
    Ok(written)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnsupportedExtension,
    OutputsExist,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedExtension => f.write_str("unsupported extension"),
            Self::OutputsExist => f.write_str("outputs already exist"),
        }
    }
}

/// Outcome of one input path.
#[derive(Debug)]
pub enum FileReport {
    Succeeded {
        source: PathBuf,
        outputs: Vec<PathBuf>,
    },
    Failed {
        source: PathBuf,
        error: String,
        recoverable: bool,
    },
    Skipped {
        source: PathBuf,
        reason: SkipReason,
    },
}

impl FileReport {
    pub fn failed(source: impl Into<PathBuf>, error: &JobError) -> Self {
        Self::Failed {
            source: source.into(),
            error: error.to_string(),
            recoverable: error.is_recoverable(),
        }
    }
}

/// Everything that happened during a run.
#[derive(Debug, Default)]
pub struct Report {
    pub files: Vec<FileReport>,
    /// Submitted jobs that never reached a terminal state (cancellation or
    /// a fault).
    pub not_completed: usize,
    pub cancelled: bool,
    /// Pipeline faults that cost a job, e.g. a panicking stage handler.
    pub faults: Vec<String>,
}

impl Report {
    pub fn succeeded(&self) -> usize {
        self.count(|f| matches!(f, FileReport::Succeeded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|f| matches!(f, FileReport::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|f| matches!(f, FileReport::Skipped { .. }))
    }

    fn count(&self, pred: impl Fn(&FileReport) -> bool) -> usize {
        self.files.iter().filter(|f| pred(f)).count()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for file in &self.files {
            match file {
                FileReport::Succeeded { outputs, .. } => {
                    for output in outputs {
                        writeln!(f, "succeeded: {}", output.display())?;
                    }
                }
                FileReport::Failed { source, error, .. } => {
                    let name = source
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| source.display().to_string());
                    writeln!(f, "failed: {name}: {error}")?;
                }
                FileReport::Skipped { source, reason } => {
                    writeln!(f, "skipped: {}: {reason}", source.display())?;
                }
            }
        }
        for fault in &self.faults {
            writeln!(f, "fault: {fault}")?;
        }
        if self.not_completed > 0 {
            writeln!(f, "not completed: {} file(s)", self.not_completed)?;
        }
        write!(
            f,
            "done: {} succeeded, {} failed, {} skipped",
            self.succeeded(),
            self.failed(),
            self.skipped()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_appends_extension() {
        assert_eq!(
            output_path(Path::new("/talks/zoom.mp3"), OutputKind::Text),
            PathBuf::from("/talks/zoom.mp3.txt")
        );
    }

    #[test]
    fn test_outputs_exist() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.wav");
        assert!(!outputs_exist(&source, &[OutputKind::Text]));
        std::fs::write(dir.path().join("a.wav.txt"), "hi").unwrap();
        assert!(outputs_exist(&source, &[OutputKind::Text]));
    }

    #[test]
    fn test_report_rendering() {
        let report = Report {
            files: vec![
                FileReport::Succeeded {
                    source: PathBuf::from("/x/a.mp3"),
                    outputs: vec![PathBuf::from("/x/a.mp3.txt")],
                },
                FileReport::Failed {
                    source: PathBuf::from("/x/b.wav"),
                    error: "transform cancelled".to_string(),
                    recoverable: false,
                },
                FileReport::Skipped {
                    source: PathBuf::from("/x/c.doc"),
                    reason: SkipReason::UnsupportedExtension,
                },
            ],
            not_completed: 2,
            cancelled: true,
            faults: vec!["Handler panicked in stage transcribe, job dropped".to_string()],
        };
        let text = report.to_string();
        assert!(text.contains("succeeded: /x/a.mp3.txt"));
        assert!(text.contains("failed: b.wav: transform cancelled"));
        assert!(text.contains("skipped: /x/c.doc: unsupported extension"));
        assert!(text.contains("fault: Handler panicked in stage transcribe"));
        assert!(text.contains("not completed: 2 file(s)"));
        assert!(text.ends_with("done: 1 succeeded, 1 failed, 1 skipped"));
    }
}
