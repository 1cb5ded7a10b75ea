//! Citation key derivation and collision handling.
//!
//! A base key is `surname + year + first significant title word`, folded to
//! lowercase ASCII. The [`KeyAllocator`] owns every key already taken in the
//! bibliography and hands out `-2`, `-3`, ... suffixes on collision.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

use crate::models::BibtexRecord;

/// Placeholder for a missing key component
const UNKNOWN: &str = "unknown";

const STOPWORDS: [&str; 17] = [
    "a", "an", "the", "of", "in", "on", "for", "with", "to", "and", "from", "by", "at", "is",
    "are", "towards", "toward",
];

/// Base citation key for a record, before collision handling
pub fn base_key(record: &BibtexRecord) -> String {
    let surname = record
        .first_author_surname()
        .map(|s| fold_ascii(&s))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string());

    let year = record
        .year
        .as_deref()
        .and_then(four_digit_year)
        .unwrap_or_else(|| UNKNOWN.to_string());

    let word = title_word(&record.title).unwrap_or_else(|| UNKNOWN.to_string());

    format!("{}{}{}", surname, year, word)
}

/// First title word that is not a stop word, folded
fn title_word(title: &str) -> Option<String> {
    title
        .split(|c: char| c.is_whitespace() || c == '-' || c == '/' || c == ':')
        .map(fold_ascii)
        .filter(|word| !word.is_empty())
        .find(|word| !STOPWORDS.contains(&word.as_str()))
}

fn four_digit_year(year: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\d{4}").expect("valid year regex"));
    re.find(year).map(|m| m.as_str().to_string())
}

/// NFKD-decompose, drop everything but ASCII alphanumerics, lowercase
pub fn fold_ascii(text: &str) -> String {
    text.nfkd()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Identity of the work behind a record: its DOI, else its folded title
///
/// Used to recognise a work that already has an entry in the bibliography.
pub fn work_identity(doi: Option<&str>, title: &str) -> Option<String> {
    if let Some(doi) = doi.map(str::trim).filter(|d| !d.is_empty()) {
        return Some(format!("doi:{}", doi.to_lowercase()));
    }
    let title = fold_ascii(title);
    (!title.is_empty()).then(|| format!("title:{}", title))
}

/// `(key, identity)` for each entry in BibTeX text
///
/// Only single-line `doi` and `title` fields are read; an entry without
/// either has no identity.
pub fn bibliography_entries(content: &str) -> Vec<(String, Option<String>)> {
    static ENTRY: OnceLock<Regex> = OnceLock::new();
    static FIELD: OnceLock<Regex> = OnceLock::new();
    let entry = ENTRY.get_or_init(|| {
        Regex::new(r"@\s*\w+\s*\{\s*([^,\s]+)\s*,").expect("valid entry key regex")
    });
    let field = FIELD.get_or_init(|| {
        Regex::new(r#"(?im)^\s*(doi|title)\s*=\s*[{"](.*)[}"]\s*,?\s*$"#)
            .expect("valid field regex")
    });

    let starts: Vec<_> = entry.captures_iter(content).collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, caps)| {
            let body_start = caps.get(0).map_or(0, |m| m.end());
            let body_end = starts
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(content.len(), |m| m.start());
            let body = &content[body_start..body_end];

            let mut doi = None;
            let mut title = None;
            for field_caps in field.captures_iter(body) {
                let value = field_caps[2].to_string();
                if field_caps[1].eq_ignore_ascii_case("doi") {
                    doi.get_or_insert(value);
                } else {
                    title.get_or_insert(value);
                }
            }
            let identity = work_identity(doi.as_deref(), title.as_deref().unwrap_or(""));
            (caps[1].to_string(), identity)
        })
        .collect()
}

/// Hands out unique citation keys
///
/// Comparison is case-insensitive since keys double as file names. Keys
/// already in the bibliography are taken, except that a work seen again gets
/// its existing key back once per run.
#[derive(Debug, Default, Clone)]
pub struct KeyAllocator {
    taken: HashSet<String>,
    existing: HashMap<String, String>,
}

impl KeyAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator seeded from an existing bibliography
    ///
    /// A missing file is treated as empty; an unreadable bibliography is an
    /// error so an existing key is never silently reused. Bytes that are not
    /// UTF-8 are read lossily.
    pub fn seeded(bibliography: &Path) -> std::io::Result<Self> {
        let mut allocator = Self::new();

        match std::fs::read(bibliography) {
            Ok(bytes) => allocator.reserve_bibliography(&String::from_utf8_lossy(&bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        tracing::debug!("Key allocator seeded with {} keys", allocator.taken.len());
        Ok(allocator)
    }

    /// Mark every entry key in BibTeX text as taken
    pub fn reserve_bibliography(&mut self, content: &str) {
        for (key, identity) in bibliography_entries(content) {
            let key = key.to_lowercase();
            if let Some(identity) = identity {
                self.existing.entry(key.clone()).or_insert(identity);
            }
            self.taken.insert(key);
        }
    }

    pub fn reserve(&mut self, key: &str) {
        let key = key.to_lowercase();
        self.existing.remove(&key);
        self.taken.insert(key);
    }

    pub fn is_taken(&self, key: &str) -> bool {
        self.taken.contains(&key.to_lowercase())
    }

    /// Claim `base`, or the first free `base-N` for N = 2, 3, ...
    pub fn allocate(&mut self, base: &str) -> String {
        self.allocate_with(base, None)
    }

    /// Key for `record`, reusing the key of its existing bibliography entry
    pub fn allocate_for(&mut self, record: &BibtexRecord) -> String {
        let identity = work_identity(record.doi.as_deref(), &record.title);
        self.allocate_with(&base_key(record), identity.as_deref())
    }

    fn allocate_with(&mut self, base: &str, identity: Option<&str>) -> String {
        let candidates = std::iter::once(base.to_string())
            .chain((2..).map(|n| format!("{}-{}", base, n)));
        for candidate in candidates {
            let lower = candidate.to_lowercase();
            let same_work = identity.is_some()
                && self.existing.get(&lower).map(String::as_str) == identity;
            if !self.taken.contains(&lower) || same_work {
                if same_work {
                    tracing::debug!("Reusing existing key {}", candidate);
                }
                self.reserve(&candidate);
                return candidate;
            }
        }
        base.to_string()
    }
}
