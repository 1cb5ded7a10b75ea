//! Core data models for documents, citations and per-item results.

mod bibtex;
mod document;
mod outcome;

pub use bibtex::{validate_entry, BibtexError, BibtexRecord};
pub use document::{CitationCandidate, ConfidenceTier, SourceDocument};
pub use outcome::{Outcome, ProcessingResult, RunSummary};
