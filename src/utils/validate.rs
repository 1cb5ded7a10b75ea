//! Normalization and validation helpers for DOIs and file names.

use regex::Regex;
use std::sync::OnceLock;

/// DOI shape used to find identifiers in free text
const DOI_PATTERN: &str = r"10\.\d{4,}(?:\.\d+)*/[-._;()/:A-Za-z0-9]+";

fn doi_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DOI_PATTERN).expect("valid DOI regex"))
}

/// Find the first DOI in `text`, normalized
pub fn find_doi(text: &str) -> Option<String> {
    doi_regex()
        .find_iter(text)
        .filter_map(|m| normalize_doi(m.as_str()))
        .next()
}

/// Normalize a DOI: strip URL and `doi:` prefixes, trailing punctuation, lowercase.
///
/// Returns `None` if what remains is not DOI-shaped.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let mut doi = raw.trim();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi.org/",
        "doi:",
        "DOI:",
    ] {
        if let Some(rest) = doi.strip_prefix(prefix) {
            doi = rest.trim();
            break;
        }
    }

    // trailing punctuation belongs to the surrounding prose
    let doi = doi
        .trim_end_matches(|c: char| !(c.is_alphanumeric() || c == '/' || c == '-'))
        .to_lowercase();
    match doi_regex().find(&doi) {
        Some(m) if m.start() == 0 && m.end() == doi.len() && !doi.ends_with('/') => Some(doi),
        _ => None,
    }
}

/// Human-readable title from a file stem: `my_paper-final` -> `my paper final`
pub fn title_from_stem(stem: &str) -> String {
    stem.split(|c: char| c == '_' || c == '-' || c == '.' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
