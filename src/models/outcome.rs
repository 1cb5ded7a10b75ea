use serde::Serialize;
use std::path::{Path, PathBuf};

use super::ConfidenceTier;
use crate::error::{ErrorKind, PipelineError};

/// What happened to one input file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        key: String,
        pdf_path: PathBuf,
        note_path: PathBuf,
        tier: ConfidenceTier,
        /// Non-fatal problems, e.g. an unreachable registry
        warnings: Vec<String>,
    },
    Failure {
        kind: ErrorKind,
        message: String,
    },
}

/// Per-item result reported by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingResult {
    pub source: PathBuf,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ProcessingResult {
    pub fn success(
        source: PathBuf,
        key: String,
        pdf_path: PathBuf,
        note_path: PathBuf,
        tier: ConfidenceTier,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            source,
            outcome: Outcome::Success {
                key,
                pdf_path,
                note_path,
                tier,
                warnings,
            },
        }
    }

    pub fn failure(source: PathBuf, kind: ErrorKind, message: String) -> Self {
        Self {
            source,
            outcome: Outcome::Failure { kind, message },
        }
    }

    pub fn from_error(source: PathBuf, error: &PipelineError) -> Self {
        Self::failure(source, error.kind(), error.to_string())
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// Final citation key, for successful items
    pub fn key(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { key, .. } => Some(key),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// File name of the input, for display
    pub fn file_name(&self) -> String {
        file_name_of(&self.source)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Totals for one batch run, results in input order
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub results: Vec<ProcessingResult>,
    /// Items never started because the run was cancelled
    pub skipped: usize,
    pub cancelled: bool,
}

impl RunSummary {
    /// Items that ran to a result
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// Percentage of processed items that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        self.succeeded() as f64 * 100.0 / self.total() as f64
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProcessingResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}
