//! Error taxonomy for the single-file pipeline.
//!
//! Every failure inside one item is converted into a [`PipelineError`] at the
//! pipeline boundary and recorded in that item's
//! [`ProcessingResult`](crate::models::ProcessingResult). Nothing here aborts
//! a batch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Coarse classification of a pipeline failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// File is not a parseable PDF container
    UnreadablePdf,
    /// Neither the registry nor the language model could be reached
    ResolutionUnavailable,
    /// An explicitly configured template could not be read
    TemplateNotFound,
    /// A different note already exists at the destination
    NoteWriteConflict,
    /// The shared bibliography could not be appended to
    BibliographyWriteFailure,
    /// The PDF could not be moved or copied to the output directory
    PdfTransferFailure,
    /// The output directory or a file in it cannot be written
    OutputNotWritable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnreadablePdf => "UnreadablePdf",
            ErrorKind::ResolutionUnavailable => "ResolutionUnavailable",
            ErrorKind::TemplateNotFound => "TemplateNotFound",
            ErrorKind::NoteWriteConflict => "NoteWriteConflict",
            ErrorKind::BibliographyWriteFailure => "BibliographyWriteFailure",
            ErrorKind::PdfTransferFailure => "PdfTransferFailure",
            ErrorKind::OutputNotWritable => "OutputNotWritable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the literature-to-note pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("not a readable PDF ({path}): {reason}")]
    UnreadablePdf { path: PathBuf, reason: String },

    #[error("citation lookup unavailable: {0}")]
    ResolutionUnavailable(String),

    #[error("template not found ({path}): {source}")]
    TemplateNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a different note already exists at {path}")]
    NoteWriteConflict { path: PathBuf },

    #[error("failed to append to bibliography {path}: {reason}")]
    BibliographyWriteFailure { path: PathBuf, reason: String },

    #[error("failed to transfer PDF to {path}: {reason}")]
    PdfTransferFailure { path: PathBuf, reason: String },

    #[error("output directory {path} is not writable: {reason}")]
    OutputNotWritable { path: PathBuf, reason: String },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::UnreadablePdf { .. } => ErrorKind::UnreadablePdf,
            PipelineError::ResolutionUnavailable(_) => ErrorKind::ResolutionUnavailable,
            PipelineError::TemplateNotFound { .. } => ErrorKind::TemplateNotFound,
            PipelineError::NoteWriteConflict { .. } => ErrorKind::NoteWriteConflict,
            PipelineError::BibliographyWriteFailure { .. } => ErrorKind::BibliographyWriteFailure,
            PipelineError::PdfTransferFailure { .. } => ErrorKind::PdfTransferFailure,
            PipelineError::OutputNotWritable { .. } => ErrorKind::OutputNotWritable,
        }
    }
}
