//! Citation resolution.
//!
//! Strategies run in strict priority order and the first success wins:
//!
//! 1. DOI lookup (`doi-exact`)
//! 2. Registry title search with fuzzy matching (`title-exact`)
//! 3. Language-model guess (`title-guess`, only with an API key)
//! 4. Fallback record from file name and hints (`unresolved`)
//!
//! Each network strategy is bounded by its own timeout and retried on
//! transient failures. Failures never fail the item; they are carried as
//! warnings on the [`Resolution`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use strsim::jaro_winkler;
use tokio::time::timeout;
use unicode_normalization::UnicodeNormalization;

use crate::config::{Config, ResolverConfig};
use crate::error::PipelineError;
use crate::models::{BibtexRecord, CitationCandidate, ConfidenceTier, SourceDocument};
use crate::sources::{
    BibliographicRegistry, CrossRefSource, OpenAiGuesser, SourceError, TitleGuesser, WorkSummary,
};
use crate::utils::{title_from_stem, with_retry};

/// Outcome of resolving one document
#[derive(Debug, Clone)]
pub struct Resolution {
    pub record: BibtexRecord,
    /// `ResolutionUnavailable` messages for strategies that could not run
    pub warnings: Vec<String>,
}

impl Resolution {
    pub fn tier(&self) -> ConfidenceTier {
        self.record.tier
    }
}

/// Turns extracted evidence into a bibliography record
#[derive(Debug, Clone)]
pub struct CitationResolver {
    registry: Option<Arc<dyn BibliographicRegistry>>,
    guesser: Option<Arc<dyn TitleGuesser>>,
    config: ResolverConfig,
}

impl CitationResolver {
    pub fn new(
        registry: Option<Arc<dyn BibliographicRegistry>>,
        guesser: Option<Arc<dyn TitleGuesser>>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            registry,
            guesser,
            config,
        }
    }

    /// Resolver with CrossRef and, when an API key is set, the OpenAI guesser
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let registry: Option<Arc<dyn BibliographicRegistry>> = if config.resolver.offline {
            None
        } else {
            Some(Arc::new(CrossRefSource::new(&config.resolver)?))
        };
        let guesser: Option<Arc<dyn TitleGuesser>> = match &config.api_keys.openai {
            Some(key) if !key.trim().is_empty() => {
                Some(Arc::new(OpenAiGuesser::new(&config.resolver, key)?))
            }
            _ => None,
        };
        Ok(Self::new(registry, guesser, config.resolver.clone()))
    }

    /// Resolve a document; always yields a record
    pub async fn resolve(
        &self,
        document: &SourceDocument,
        candidate: &CitationCandidate,
    ) -> Resolution {
        let mut warnings = Vec::new();
        let registry = self.registry.as_ref().filter(|_| !self.config.offline);

        if let (Some(registry), Some(doi)) = (registry, candidate.doi.as_deref()) {
            match self.lookup_doi(registry, doi).await {
                Ok(Some(mut record)) => {
                    record.tier = ConfidenceTier::DoiExact;
                    record.doi.get_or_insert_with(|| doi.to_string());
                    return self.done(document, record, warnings);
                }
                Ok(None) => tracing::debug!("DOI {} not known to {}", doi, registry.id()),
                Err(e) => warnings.push(unavailable(format!("DOI lookup for {} failed: {}", doi, e))),
            }
        }

        if let (Some(registry), Some(title)) = (registry, candidate.title.as_deref()) {
            match self.lookup_title(registry, title, candidate, &mut warnings).await {
                Ok(Some(record)) => return self.done(document, record, warnings),
                Ok(None) => tracing::debug!("No registry match for title {:?}", title),
                Err(e) => warnings.push(unavailable(format!("title search failed: {}", e))),
            }
        }

        if let Some(guesser) = &self.guesser {
            if document.text().trim().is_empty() {
                tracing::debug!("No text to send to {}", guesser.id());
            } else {
                match self.guess(guesser, document).await {
                    Ok(record) => return self.done(document, record, warnings),
                    Err(e) => {
                        warnings.push(unavailable(format!("{} guess failed: {}", guesser.id(), e)))
                    }
                }
            }
        }

        let record = fallback_record(document, candidate);
        self.done(document, record, warnings)
    }

    fn done(
        &self,
        document: &SourceDocument,
        record: BibtexRecord,
        warnings: Vec<String>,
    ) -> Resolution {
        tracing::info!(
            "Resolved {} as {} ({})",
            document.path().display(),
            record.title,
            record.tier
        );
        for warning in &warnings {
            tracing::warn!("{}: {}", document.path().display(), warning);
        }
        Resolution { record, warnings }
    }

    async fn lookup_doi(
        &self,
        registry: &Arc<dyn BibliographicRegistry>,
        doi: &str,
    ) -> Result<Option<BibtexRecord>, SourceError> {
        let raw = {
            let registry = Arc::clone(registry);
            let doi = doi.to_string();
            self.bounded(self.config.doi_timeout_secs, move || {
                let registry = Arc::clone(&registry);
                let doi = doi.clone();
                async move { registry.bibtex_by_doi(&doi).await }
            })
            .await?
        };

        match raw {
            Some(raw) => BibtexRecord::parse(&raw, ConfidenceTier::DoiExact)
                .map(Some)
                .map_err(|e| SourceError::Parse(format!("registry BibTeX for {}: {}", doi, e))),
            None => Ok(None),
        }
    }

    async fn lookup_title(
        &self,
        registry: &Arc<dyn BibliographicRegistry>,
        title: &str,
        candidate: &CitationCandidate,
        warnings: &mut Vec<String>,
    ) -> Result<Option<BibtexRecord>, SourceError> {
        let works = {
            let registry = Arc::clone(registry);
            let title = title.to_string();
            let author = candidate.author_hint.clone();
            self.bounded(self.config.title_timeout_secs, move || {
                let registry = Arc::clone(&registry);
                let title = title.clone();
                let author = author.clone();
                async move { registry.search_title(&title, author.as_deref()).await }
            })
            .await?
        };

        let Some((work, score)) = best_match(title, &works, self.config.similarity_threshold) else {
            return Ok(None);
        };
        tracing::debug!("Title match {:?} (similarity {:.3})", work.title, score);

        if let Some(doi) = work.doi.as_deref() {
            match self.lookup_doi(registry, doi).await {
                Ok(Some(mut record)) => {
                    record.tier = ConfidenceTier::TitleExact;
                    record.doi.get_or_insert_with(|| doi.to_string());
                    return Ok(Some(record));
                }
                Ok(None) => {}
                Err(e) => warnings.push(unavailable(format!(
                    "BibTeX for matched DOI {} unavailable: {}",
                    doi, e
                ))),
            }
        }
        Ok(Some(record_from_work(work)))
    }

    async fn guess(
        &self,
        guesser: &Arc<dyn TitleGuesser>,
        document: &SourceDocument,
    ) -> Result<BibtexRecord, SourceError> {
        let snippet = document.snippet(self.config.snippet_chars);
        let guesser = Arc::clone(guesser);
        let guess = self
            .bounded(self.config.llm_timeout_secs, move || {
                let guesser = Arc::clone(&guesser);
                let snippet = snippet.clone();
                async move { guesser.guess(&snippet).await }
            })
            .await?;

        Ok(BibtexRecord::minimal(
            &guess.title,
            guess.authors,
            guess.year.map(|y| y.to_string()),
            ConfidenceTier::TitleGuess,
        ))
    }

    /// Run `op` with retries, the whole strategy bounded by `secs`
    async fn bounded<T, F, Fut>(&self, secs: u64, op: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let limit = Duration::from_secs(secs.max(1));
        let mut retry = self.config.retry_config();
        retry.attempt_timeout = retry.attempt_timeout.min(limit);

        match timeout(limit, with_retry(retry, op)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(format!("no answer within {:?}", limit))),
        }
    }
}

fn unavailable(message: String) -> String {
    PipelineError::ResolutionUnavailable(message).to_string()
}

/// Best work whose title clears `threshold`, with its similarity
fn best_match<'a>(
    title: &str,
    works: &'a [WorkSummary],
    threshold: f64,
) -> Option<(&'a WorkSummary, f64)> {
    let wanted = comparable_title(title);
    if wanted.is_empty() {
        return None;
    }
    works
        .iter()
        .map(|work| (work, jaro_winkler(&wanted, &comparable_title(&work.title))))
        .filter(|(_, score)| *score >= threshold)
        .fold(None, |best: Option<(&WorkSummary, f64)>, (work, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((work, score)),
        })
}

/// Lowercase ASCII words separated by single spaces
fn comparable_title(title: &str) -> String {
    let folded: String = title
        .nfkd()
        .filter(|c| c.is_ascii())
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Record built from registry search metadata when no BibTeX is available
fn record_from_work(work: &WorkSummary) -> BibtexRecord {
    let entry_type = match work.work_type.as_deref() {
        Some("journal-article") => "article",
        Some("proceedings-article") => "inproceedings",
        Some("book") | Some("monograph") | Some("edited-book") => "book",
        Some("book-chapter") | Some("book-section") => "incollection",
        Some("report") => "techreport",
        Some("dissertation") => "phdthesis",
        _ => "misc",
    };

    let mut record = BibtexRecord::minimal(
        &work.title,
        work.authors.clone(),
        work.year.map(|y| y.to_string()),
        ConfidenceTier::TitleExact,
    );
    record.entry_type = entry_type.to_string();
    record.doi = work.doi.clone();

    let container_field = match entry_type {
        "article" => "journal",
        "inproceedings" | "incollection" => "booktitle",
        _ => "howpublished",
    };
    let optional = [
        (container_field, &work.container_title),
        ("publisher", &work.publisher),
        ("volume", &work.volume),
        ("number", &work.issue),
        ("pages", &work.pages),
        ("url", &work.url),
    ];
    for (name, value) in optional {
        if let Some(value) = value.as_ref().filter(|v| !v.trim().is_empty()) {
            record.fields.insert(name.to_string(), value.clone());
        }
    }
    record
}

/// Last-resort record from what the file itself tells us
fn fallback_record(document: &SourceDocument, candidate: &CitationCandidate) -> BibtexRecord {
    let title = candidate
        .title
        .clone()
        .unwrap_or_else(|| title_from_stem(&document.file_stem()));
    let authors = candidate.author_hint.iter().cloned().collect();
    let year = candidate
        .year_hint
        .or(document.modified_year())
        .map(|y| y.to_string());
    BibtexRecord::minimal(&title, authors, year, ConfidenceTier::Unresolved)
}
