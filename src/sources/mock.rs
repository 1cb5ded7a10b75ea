//! Mock source for testing purposes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::sources::{BibliographicRegistry, SourceError, TitleGuess, TitleGuesser, WorkSummary};

/// A mock registry and guesser that returns predefined responses.
///
/// With `unreachable(true)` every call fails with a network error, which is
/// how tests simulate running without network access.
#[derive(Debug, Default)]
pub struct MockSource {
    bibtex: Mutex<HashMap<String, String>>,
    works: Mutex<Vec<WorkSummary>>,
    guess: Mutex<Option<TitleGuess>>,
    unreachable: bool,
    calls: AtomicUsize,
}

impl MockSource {
    /// Create a new mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call as if the network were down
    pub fn unreachable(mut self, unreachable: bool) -> Self {
        self.unreachable = unreachable;
        self
    }

    /// Register the BibTeX returned for `doi`
    pub fn with_bibtex(self, doi: &str, bibtex: &str) -> Self {
        self.bibtex
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(doi.to_lowercase(), bibtex.to_string());
        self
    }

    /// Set the works returned by every title search
    pub fn with_works(self, works: Vec<WorkSummary>) -> Self {
        *self.works.lock().unwrap_or_else(|e| e.into_inner()) = works;
        self
    }

    /// Set the language-model guess
    pub fn with_guess(self, guess: TitleGuess) -> Self {
        *self.guess.lock().unwrap_or_else(|e| e.into_inner()) = Some(guess);
        self
    }

    /// Number of calls made so far, across all methods
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) -> Result<(), SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(SourceError::Network("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BibliographicRegistry for MockSource {
    fn id(&self) -> &str {
        "mock"
    }

    async fn bibtex_by_doi(&self, doi: &str) -> Result<Option<String>, SourceError> {
        self.record_call()?;
        let guard = self.bibtex.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.get(&doi.to_lowercase()).cloned())
    }

    async fn search_title(
        &self,
        _title: &str,
        _author: Option<&str>,
    ) -> Result<Vec<WorkSummary>, SourceError> {
        self.record_call()?;
        Ok(self.works.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

#[async_trait]
impl TitleGuesser for MockSource {
    fn id(&self) -> &str {
        "mock"
    }

    async fn guess(&self, _snippet: &str) -> Result<TitleGuess, SourceError> {
        self.record_call()?;
        self.guess
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| SourceError::Parse("no guess configured".to_string()))
    }
}

/// Helper function to create a work summary for testing.
pub fn make_work(title: &str, doi: Option<&str>, authors: &[&str], year: Option<i32>) -> WorkSummary {
    WorkSummary {
        title: title.to_string(),
        doi: doi.map(str::to_string),
        authors: authors.iter().map(|a| a.to_string()).collect(),
        year,
        ..WorkSummary::default()
    }
}
