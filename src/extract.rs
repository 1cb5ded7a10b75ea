//! Metadata extraction: DOI, title and author/year hints from a PDF.

use chrono::{DateTime, Datelike, Local};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::PipelineError;
use crate::models::{CitationCandidate, ConfidenceTier, SourceDocument};
use crate::utils::{find_doi, read_pdf, PdfExtractError};

/// Lines scanned from the top of the text when looking for a heading
const HEADING_SCAN_LINES: usize = 40;

/// Reads PDFs and derives a [`CitationCandidate`] from them
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    max_pages: u32,
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new(3)
    }
}

impl MetadataExtractor {
    /// Extractor reading text from the first `max_pages` pages
    pub fn new(max_pages: u32) -> Self {
        Self {
            max_pages: max_pages.max(1),
        }
    }

    /// Read `path` and collect the evidence needed for citation lookup
    ///
    /// Parsing runs on the blocking pool. A PDF with no extractable text is
    /// not an error; it yields an empty-text document and weaker evidence.
    pub async fn extract(
        &self,
        path: &Path,
    ) -> Result<(SourceDocument, CitationCandidate), PipelineError> {
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let max_pages = self.max_pages;
        let task_path = path.clone();

        let document = tokio::task::spawn_blocking(move || read_document(task_path, max_pages))
            .await
            .map_err(|e| PipelineError::UnreadablePdf {
                path: path.clone(),
                reason: format!("extraction task failed: {}", e),
            })??;

        let candidate = candidate_from(&document);
        tracing::debug!(
            "Extracted {}: doi={:?} title={:?} tier={}",
            path.display(),
            candidate.doi,
            candidate.title,
            candidate.evidence_tier()
        );
        Ok((document, candidate))
    }
}

fn read_document(path: PathBuf, max_pages: u32) -> Result<SourceDocument, PipelineError> {
    let contents = read_pdf(&path, max_pages).map_err(|e| PipelineError::UnreadablePdf {
        path: path.clone(),
        reason: match e {
            PdfExtractError::InvalidFile(reason) => reason,
            PdfExtractError::Io(err) => err.to_string(),
        },
    })?;

    let modified_year = std::fs::metadata(&path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(|time| DateTime::<Local>::from(time).year());

    Ok(SourceDocument::new(
        path,
        contents.text,
        contents.info,
        contents.page_count,
        modified_year,
    ))
}

/// Derive lookup evidence from an already-read document
pub fn candidate_from(document: &SourceDocument) -> CitationCandidate {
    let doi = find_doi(document.text());

    let embedded_title = document
        .properties()
        .title
        .as_deref()
        .filter(|title| is_meaningful_title(title))
        .map(collapse);

    let (title, title_tier) = match embedded_title {
        Some(title) => (Some(title), Some(ConfidenceTier::TitleExact)),
        None => match find_heading(document.text()) {
            Some(line) => (Some(line), Some(ConfidenceTier::TitleGuess)),
            None => (None, None),
        },
    };

    let tier = if doi.is_some() {
        Some(ConfidenceTier::DoiExact)
    } else {
        title_tier
    };

    let author_hint = document
        .properties()
        .author
        .as_deref()
        .map(collapse)
        .filter(|author| !author.is_empty() && !author.eq_ignore_ascii_case("unknown"));

    let year_hint = find_year(document.text()).or(document.properties().creation_year);

    CitationCandidate {
        doi,
        title,
        author_hint,
        year_hint,
        tier,
    }
}

/// Whether an embedded `Title` property is worth trusting
fn is_meaningful_title(title: &str) -> bool {
    let title = title.trim();
    if title.chars().filter(|c| c.is_alphabetic()).count() < 4 {
        return false;
    }
    let lower = title.to_lowercase();
    if lower == "untitled" || lower.starts_with("microsoft word - ") {
        return false;
    }
    const FILE_EXTENSIONS: [&str; 7] = [".pdf", ".doc", ".docx", ".tex", ".dvi", ".indd", ".ps"];
    !FILE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// First line near the top that reads like a paper title
pub fn find_heading(text: &str) -> Option<String> {
    text.lines()
        .take(HEADING_SCAN_LINES)
        .map(collapse)
        .find(|line| is_heading_like(line))
}

fn is_heading_like(line: &str) -> bool {
    let len = line.chars().count();
    if !(15..=250).contains(&len) || line.split_whitespace().count() < 3 {
        return false;
    }

    let non_space = line.chars().filter(|c| !c.is_whitespace()).count();
    let letters = line.chars().filter(|c| c.is_alphabetic()).count();
    if letters * 10 < non_space * 7 {
        return false;
    }

    let lower = line.to_lowercase();
    const BANNERS: [&str; 16] = [
        "http",
        "www.",
        "doi",
        "@",
        "©",
        "copyright",
        "all rights reserved",
        "journal of",
        "proceedings of",
        "vol.",
        "volume",
        "issn",
        "arxiv",
        "preprint",
        "received",
        "licensed under",
    ];
    !BANNERS.iter().any(|banner| lower.contains(banner))
}

/// First plausible publication year in the text
fn find_year(text: &str) -> Option<i32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid year regex"));
    re.find(text).and_then(|m| m.as_str().parse().ok())
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::utils::{fixtures, DocumentInfo};
    use tempfile::tempdir;

    fn document(text: &str, info: DocumentInfo) -> SourceDocument {
        SourceDocument::new(PathBuf::from("/in/x.pdf"), text.to_string(), info, 1, Some(2020))
    }

    #[test]
    fn test_heading_detection() {
        let text = "Journal of Examples, Vol. 12\n\
                    https://example.org\n\
                    Short\n\
                    Learning Sparse Representations for Retrieval\n\
                    Jane Smith";
        assert_eq!(
            find_heading(text).as_deref(),
            Some("Learning Sparse Representations for Retrieval")
        );
        assert_eq!(find_heading("1 2 3 4 5 6 7 8 9 10 11 12"), None);
        assert_eq!(find_heading(""), None);
    }

    #[test]
    fn test_embedded_title_filters() {
        assert!(is_meaningful_title("A Study of Things"));
        assert!(!is_meaningful_title("untitled"));
        assert!(!is_meaningful_title("Microsoft Word - draft3.docx"));
        assert!(!is_meaningful_title("paper_final.pdf"));
        assert!(!is_meaningful_title("  "));
    }

    #[test]
    fn test_candidate_prefers_doi_then_embedded_title() {
        let info = DocumentInfo {
            title: Some("A Study of Things".into()),
            author: Some("Jane Smith".into()),
            creation_year: Some(2019),
        };
        let doc = document("Published 2021\ndoi:10.1000/XYZ123.", info.clone());
        let candidate = candidate_from(&doc);
        assert_eq!(candidate.doi.as_deref(), Some("10.1000/xyz123"));
        assert_eq!(candidate.title.as_deref(), Some("A Study of Things"));
        assert_eq!(candidate.author_hint.as_deref(), Some("Jane Smith"));
        assert_eq!(candidate.year_hint, Some(2021));
        assert_eq!(candidate.evidence_tier(), ConfidenceTier::DoiExact);

        let doc = document("no identifiers", info);
        let candidate = candidate_from(&doc);
        assert_eq!(candidate.evidence_tier(), ConfidenceTier::TitleExact);
        assert_eq!(candidate.year_hint, Some(2019));
    }

    #[test]
    fn test_candidate_with_nothing() {
        let candidate = candidate_from(&document("", DocumentInfo::default()));
        assert_eq!(candidate, CitationCandidate::default());
        assert_eq!(candidate.evidence_tier(), ConfidenceTier::Unresolved);
    }

    #[tokio::test]
    async fn test_extract_reads_fixture() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("paper.pdf");
        fixtures::write_text_pdf(
            &path,
            &["Graph Methods for Citation Analysis", "doi:10.1000/xyz123"],
            None,
            Some("Jane Smith"),
        );

        let (doc, candidate) = MetadataExtractor::default().extract(&path).await.unwrap();
        assert!(doc.path().is_absolute());
        assert_eq!(doc.page_count(), 1);
        assert_eq!(candidate.doi.as_deref(), Some("10.1000/xyz123"));
        assert_eq!(
            candidate.title.as_deref(),
            Some("Graph Methods for Citation Analysis")
        );
    }

    #[tokio::test]
    async fn test_extract_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.pdf");
        std::fs::write(&path, b"%PDF-1.4 truncated garbage").unwrap();

        let err = MetadataExtractor::default().extract(&path).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnreadablePdf);
    }
}
