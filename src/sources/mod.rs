//! External citation sources.
//!
//! Two seams are defined here:
//!
//! - [`BibliographicRegistry`]: exact lookups against a bibliographic registry
//!   (BibTeX by DOI, candidate works by title). [`CrossRefSource`] is the
//!   production implementation.
//! - [`TitleGuesser`]: a language-model fallback that guesses title, authors
//!   and year from the leading text of a document. [`OpenAiGuesser`] talks to
//!   any OpenAI-compatible chat completions endpoint.
//!
//! Both are object-safe so the pipeline can hold `Arc<dyn ...>` and tests can
//! substitute [`MockSource`].
//!
//! # Adding a Registry
//!
//! 1. Create a struct that implements [`BibliographicRegistry`]
//! 2. Return `Ok(None)` / an empty list for "not found"; reserve errors for
//!    failures worth retrying or reporting
//! 3. Map HTTP failures with [`status_error`](crate::utils::status_error) so
//!    the retry layer can tell transient from permanent

mod crossref;
pub mod mock;
mod openai;

pub use crossref::CrossRefSource;
pub use mock::MockSource;
pub use openai::OpenAiGuesser;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A work returned by a registry title search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkSummary {
    pub title: String,
    pub doi: Option<String>,
    /// `Family, Given` where the registry provides both
    pub authors: Vec<String>,
    pub year: Option<i32>,
    /// Registry entry type, e.g. `journal-article`
    pub work_type: Option<String>,
    pub container_title: Option<String>,
    pub publisher: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub url: Option<String>,
}

/// Metadata guessed by a language model; never verified
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TitleGuess {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
}

/// Exact lookups against a bibliographic registry
#[async_trait]
pub trait BibliographicRegistry: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this registry, used in logs
    fn id(&self) -> &str;

    /// Fetch the BibTeX entry for `doi`; `Ok(None)` when the DOI is unknown
    async fn bibtex_by_doi(&self, doi: &str) -> Result<Option<String>, SourceError>;

    /// Candidate works for a title, best match first as ranked by the registry
    async fn search_title(
        &self,
        title: &str,
        author: Option<&str>,
    ) -> Result<Vec<WorkSummary>, SourceError>;
}

/// Guesses bibliographic metadata from raw document text
#[async_trait]
pub trait TitleGuesser: Send + Sync + std::fmt::Debug {
    fn id(&self) -> &str;

    /// Guess from the leading text of a document
    async fn guess(&self, snippet: &str) -> Result<TitleGuess, SourceError>;
}

/// Errors that can occur when interacting with a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Network or connection error
    #[error("Network error: {0}")]
    Network(String),

    /// A request or attempt exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// 5xx response
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// 429 response, with the `Retry-After` seconds if present
    #[error("Rate limit exceeded")]
    RateLimit(Option<u64>),

    /// Any other non-success response
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// The source needs configuration it does not have, e.g. an API key
    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}
