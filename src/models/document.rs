//! What the extractor learned about a PDF before any lookup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::utils::DocumentInfo;

/// How a citation was (or can be) resolved, weakest first
///
/// The derived ordering follows trust: `Unresolved < TitleGuess < TitleExact < DoiExact`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfidenceTier {
    /// Built from the file name and file metadata only
    Unresolved,
    /// Guessed by a language model, not confirmed by a registry
    TitleGuess,
    /// Registry match on the title above the similarity threshold
    TitleExact,
    /// Registry record for an exact DOI
    DoiExact,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::Unresolved => "unresolved",
            ConfidenceTier::TitleGuess => "title-guess",
            ConfidenceTier::TitleExact => "title-exact",
            ConfidenceTier::DoiExact => "doi-exact",
        }
    }

    /// Whether a bibliographic registry confirmed the record
    pub fn is_verified(&self) -> bool {
        matches!(self, ConfidenceTier::DoiExact | ConfidenceTier::TitleExact)
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A PDF as read from disk
///
/// Built once by the extractor and only handed out by reference afterwards.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    path: PathBuf,
    text: String,
    properties: DocumentInfo,
    page_count: usize,
    modified_year: Option<i32>,
}

impl SourceDocument {
    pub fn new(
        path: PathBuf,
        text: String,
        properties: DocumentInfo,
        page_count: usize,
        modified_year: Option<i32>,
    ) -> Self {
        Self {
            path,
            text,
            properties,
            page_count,
            modified_year,
        }
    }

    /// Absolute path of the PDF
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Text of the leading pages; empty for image-only PDFs
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn properties(&self) -> &DocumentInfo {
        &self.properties
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Year the file was last modified, from filesystem metadata
    pub fn modified_year(&self) -> Option<i32> {
        self.modified_year
    }

    /// File name without the extension
    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Leading `max_chars` characters of the text
    pub fn snippet(&self, max_chars: usize) -> String {
        self.text.chars().take(max_chars).collect()
    }
}

/// Identifiers and hints pulled from a document, input to the resolver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationCandidate {
    /// Lowercase DOI without URL prefix
    pub doi: Option<String>,
    /// Embedded title, else a heading-like line
    pub title: Option<String>,
    pub author_hint: Option<String>,
    pub year_hint: Option<i32>,
    /// Strongest evidence available before lookup
    pub tier: Option<ConfidenceTier>,
}

impl CitationCandidate {
    /// Tier implied by the evidence found
    pub fn evidence_tier(&self) -> ConfidenceTier {
        self.tier.unwrap_or(ConfidenceTier::Unresolved)
    }
}
