//! BibTeX record model.
//!
//! Records come either from a registry (parsed with `biblatex`) or are
//! synthesized from weaker evidence. Either way [`BibtexRecord::to_bibtex`]
//! renders exactly one entry that parses back without error.

use biblatex::{Bibliography, Chunk, Spanned};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::ConfidenceTier;

/// Errors that can occur when reading BibTeX text
#[derive(Debug, thiserror::Error)]
pub enum BibtexError {
    #[error("BibTeX parse failed: {0}")]
    Parse(String),

    #[error("no BibTeX entry found")]
    NoEntries,

    #[error("expected one BibTeX entry, found {0}")]
    MultipleEntries(usize),
}

/// A single bibliography entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BibtexRecord {
    /// Entry type without `@`, lowercase (`article`, `inproceedings`, `misc`, ...)
    pub entry_type: String,
    /// Citation key; replaced by the key normalizer before commit
    pub key: String,
    pub title: String,
    /// Ordered authors, `Family, Given` where known
    pub authors: Vec<String>,
    pub year: Option<String>,
    pub doi: Option<String>,
    /// Every other field, lowercase names
    pub fields: BTreeMap<String, String>,
    pub tier: ConfidenceTier,
}

impl BibtexRecord {
    /// Parse a single entry as returned by a registry
    pub fn parse(raw: &str, tier: ConfidenceTier) -> Result<Self, BibtexError> {
        let bibliography =
            Bibliography::parse(raw).map_err(|e| BibtexError::Parse(e.to_string()))?;
        let mut entries = bibliography.into_iter();
        let entry = entries.next().ok_or(BibtexError::NoEntries)?;
        let extra = entries.count();
        if extra > 0 {
            return Err(BibtexError::MultipleEntries(extra + 1));
        }

        let entry_type = entry_type_of(raw).unwrap_or_else(|| "misc".to_string());

        let mut fields: BTreeMap<String, String> = entry
            .fields
            .iter()
            .map(|(name, chunks)| (name.to_lowercase(), chunks_to_string(chunks)))
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();

        let title = fields.remove("title").unwrap_or_default();
        let authors = fields
            .remove("author")
            .map(|value| split_authors(&value))
            .unwrap_or_default();
        let year = fields
            .remove("year")
            .or_else(|| fields.get("date").map(|d| d.chars().take(4).collect()))
            .map(|y| y.trim().to_string());
        let doi = fields.remove("doi").map(|d| d.trim().to_lowercase());

        Ok(Self {
            entry_type,
            key: entry.key.clone(),
            title: collapse_whitespace(&title),
            authors,
            year,
            doi,
            fields,
            tier,
        })
    }

    /// Minimal `misc` record for citations no registry confirmed
    ///
    /// Unverified records carry a `note` so readers of the bibliography can tell.
    pub fn minimal(
        title: &str,
        authors: Vec<String>,
        year: Option<String>,
        tier: ConfidenceTier,
    ) -> Self {
        let mut fields = BTreeMap::new();
        if !tier.is_verified() {
            fields.insert(
                "note".to_string(),
                format!("Unverified citation ({})", tier),
            );
        }
        Self {
            entry_type: "misc".to_string(),
            key: String::new(),
            title: collapse_whitespace(title),
            authors,
            year,
            doi: None,
            fields,
            tier,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.tier.is_verified()
    }

    /// Journal, proceedings or publisher, whichever is present first
    pub fn venue(&self) -> Option<&str> {
        ["journal", "booktitle", "publisher", "howpublished"]
            .iter()
            .find_map(|name| self.fields.get(*name))
            .map(String::as_str)
    }

    /// Surname of the first author, if any
    pub fn first_author_surname(&self) -> Option<String> {
        let first = self.authors.first()?.trim();
        let surname = match first.split_once(',') {
            Some((family, _)) => family.trim(),
            None => first.split_whitespace().last().unwrap_or(first),
        };
        (!surname.is_empty()).then(|| surname.to_string())
    }

    /// Render as formatted BibTeX text
    pub fn to_bibtex(&self) -> String {
        let mut lines = Vec::new();
        let mut push = |name: &str, value: &str| {
            let value = escape_value(name, value);
            if !value.is_empty() {
                lines.push(format!("  {:<12} = {{{}}}", name, value));
            }
        };

        push("title", &self.title);
        push("author", &self.authors.join(" and "));
        if let Some(year) = &self.year {
            push("year", year);
        }
        if let Some(doi) = &self.doi {
            push("doi", doi);
        }
        for (name, value) in &self.fields {
            if is_field_name(name) {
                push(name, value);
            }
        }

        let entry_type = if is_field_name(&self.entry_type) {
            self.entry_type.as_str()
        } else {
            "misc"
        };
        let key = if self.key.is_empty() {
            "unknown"
        } else {
            self.key.as_str()
        };

        format!("@{}{{{},\n{}\n}}\n", entry_type, key, lines.join(",\n"))
    }
}

/// Check that `text` parses as exactly one BibTeX entry
pub fn validate_entry(text: &str) -> Result<(), BibtexError> {
    let bibliography = Bibliography::parse(text).map_err(|e| BibtexError::Parse(e.to_string()))?;
    match bibliography.len() {
        0 => Err(BibtexError::NoEntries),
        1 => Ok(()),
        n => Err(BibtexError::MultipleEntries(n)),
    }
}

fn entry_type_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@\s*([A-Za-z]+)\s*\{").expect("valid entry regex"))
}

fn entry_type_of(raw: &str) -> Option<String> {
    entry_type_regex()
        .captures(raw)
        .map(|caps| caps[1].to_lowercase())
}

fn chunks_to_string(chunks: &[Spanned<Chunk>]) -> String {
    chunks
        .iter()
        .map(|spanned| match &spanned.v {
            Chunk::Normal(s) => s.clone(),
            Chunk::Verbatim(s) => s.clone(),
            Chunk::Math(s) => format!("${}$", s),
        })
        .collect::<Vec<_>>()
        .join("")
}

/// Split a BibTeX author list on ` and `
fn split_authors(value: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)\s+and\s+").expect("valid author regex"));
    re.split(&collapse_whitespace(value))
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_field_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Fields whose values are read verbatim, without TeX special characters
const VERBATIM_FIELDS: [&str; 10] = [
    "doi", "eprint", "file", "pdf", "uri", "url", "urlraw", "verba", "verbb", "verbc",
];

/// Escape a value for `name = {...}` so it parses back to the same text
///
/// Whitespace is collapsed to single spaces. `-{}-` keeps a double hyphen
/// from being read as a dash ligature.
fn escape_value(name: &str, value: &str) -> String {
    let verbatim = VERBATIM_FIELDS.contains(&name);
    let value = collapse_whitespace(value);
    let mut out = String::with_capacity(value.len());
    let mut prev_hyphen = false;
    for c in value.chars() {
        match c {
            '\\' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '#' | '&' | '%' | '$' | '_' if !verbatim => {
                out.push('\\');
                out.push(c);
            }
            '-' if prev_hyphen => out.push_str("{}-"),
            _ => out.push(c),
        }
        prev_hyphen = c == '-';
    }
    out
}
