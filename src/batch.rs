//! Batch processing over a folder or a list of PDFs.
//!
//! Up to `batch.workers` items are extracted and resolved concurrently.
//! Results are consumed in input order and committed one at a time, so
//! citation keys are assigned in file-name order regardless of which lookup
//! finishes first.

use futures_util::stream::{self, StreamExt};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::models::{Outcome, ProcessingResult, RunSummary};
use crate::organize::validate_output_dir;
use crate::pipeline::{finish, Pipeline};

/// Name of the failure report written to the output directory
pub const FAILED_LIST_FILE: &str = "failed_list.md";

/// One finished item, as reported to progress listeners
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent<'a> {
    /// Zero-based position in the run
    pub index: usize,
    pub total: usize,
    pub result: &'a ProcessingResult,
}

pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent<'_>) + Send + Sync>;

/// Errors that prevent a run from starting
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("cannot read input folder {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Runs the pipeline over many files
#[derive(Clone)]
pub struct BatchOrchestrator {
    pipeline: Pipeline,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("pipeline", &self.pipeline)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl BatchOrchestrator {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Call `callback` once per finished item, in input order
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Process every `*.pdf` directly inside `folder`, in file-name order
    pub async fn run_folder(&self, folder: &Path) -> Result<RunSummary, BatchError> {
        let files = list_pdfs(folder).map_err(|source| BatchError::Input {
            path: folder.to_path_buf(),
            source,
        })?;
        tracing::info!("Found {} PDF files in {}", files.len(), folder.display());
        self.run_files(files).await
    }

    /// Process an explicit list of files in the given order
    pub async fn run_files(&self, files: Vec<PathBuf>) -> Result<RunSummary, BatchError> {
        let config = self.pipeline.config();
        if config.output.validate_write_permission {
            validate_output_dir(&config.output.path)?;
        }
        let mut keys = self.pipeline.key_allocator()?;

        let total = files.len();
        let workers = config.batch.effective_workers();
        tracing::debug!("Processing {} files with {} workers", total, workers);

        let mut prepared = stream::iter(files)
            .map(|path| {
                let pipeline = self.pipeline.clone();
                let cancel = self.cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return (path, None);
                    }
                    let prepared = pipeline.prepare(&path).await;
                    (path, Some(prepared))
                }
            })
            .buffered(workers);

        let mut summary = RunSummary::default();
        while let Some((path, item)) = prepared.next().await {
            let Some(item) = item else {
                summary.skipped += 1;
                continue;
            };

            let result = match item {
                Ok(item) => self.pipeline.commit(item, &mut keys).await,
                Err(e) => Err(e),
            };
            let result = finish(path, result);

            if let Some(callback) = &self.progress {
                callback(&ProgressEvent {
                    index: summary.results.len() + summary.skipped,
                    total,
                    result: &result,
                });
            }
            summary.results.push(result);
        }

        summary.cancelled = self.cancel.is_cancelled();
        if summary.cancelled {
            tracing::warn!(
                "Run cancelled: {} processed, {} not started",
                summary.total(),
                summary.skipped
            );
        }

        if summary.failed() > 0 && config.output.failed_list {
            let path = config.output.path.join(FAILED_LIST_FILE);
            if let Err(e) = std::fs::write(&path, failed_list(&summary)) {
                tracing::error!("Failed to write {}: {}", path.display(), e);
            }
        }

        Ok(summary)
    }
}

/// Immediate `*.pdf` children of `folder`, sorted by file name
pub fn list_pdfs(folder: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Markdown list of failed items
fn failed_list(summary: &RunSummary) -> String {
    let mut out = String::from("Failed files:\n");
    for result in summary.failures() {
        if let Outcome::Failure { kind, message } = &result.outcome {
            let message = message.replace(['\n', '\r'], " ");
            let _ = writeln!(out, "- {} ({}: {})", result.file_name(), kind, message);
        }
    }
    out
}
