//! PDF text extraction utilities.
//!
//! `lopdf` parses the container, reads the document-info dictionary and
//! extracts per-page text for the leading pages. When that yields nothing,
//! `pdf-extract` is tried on the whole document, which copes with more font
//! encodings but is slower and can panic on malformed input.

use lopdf::{Dictionary, Document, Object};
use std::path::Path;
use thiserror::Error;

/// Upper bound on text kept from the whole-document fallback
const FALLBACK_MAX_CHARS: usize = 20_000;

/// Errors that can occur during PDF extraction
#[derive(Debug, Error)]
pub enum PdfExtractError {
    #[error("File not found or not a valid PDF: {0}")]
    InvalidFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Properties from the PDF document-info dictionary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub creation_year: Option<i32>,
}

/// Raw contents read from a PDF
#[derive(Debug, Clone, Default)]
pub struct PdfContents {
    /// Text of the leading pages (may be empty for image-only PDFs)
    pub text: String,
    /// Total number of pages in the document
    pub page_count: usize,
    pub info: DocumentInfo,
}

/// Read the text of the first `max_pages` pages and the document properties.
///
/// A file that parses as a PDF but carries no extractable text yields empty
/// `text`, not an error.
pub fn read_pdf(path: &Path, max_pages: u32) -> Result<PdfContents, PdfExtractError> {
    if !path.is_file() {
        return Err(PdfExtractError::InvalidFile(format!(
            "Not a file: {}",
            path.display()
        )));
    }

    let bytes = std::fs::read(path)?;
    let doc = Document::load_mem(&bytes)
        .map_err(|e| PdfExtractError::InvalidFile(format!("{}: {}", path.display(), e)))?;

    let pages = doc.get_pages();
    let mut text = String::new();
    for page_number in pages.keys().take(max_pages.max(1) as usize) {
        match doc.extract_text(&[*page_number]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                if !text.ends_with('\n') {
                    text.push('\n');
                }
            }
            Err(e) => {
                tracing::debug!(
                    "No text on page {} of {}: {}",
                    page_number,
                    path.display(),
                    e
                );
            }
        }
    }

    if text.trim().is_empty() && !pages.is_empty() {
        text = fallback_text(&bytes).unwrap_or_default();
        if text.trim().is_empty() {
            tracing::debug!("Extracted empty text from PDF: {}", path.display());
        }
    }

    Ok(PdfContents {
        text,
        page_count: pages.len(),
        info: read_info(&doc),
    })
}

/// Whole-document extraction through `pdf-extract`, isolating its panics
fn fallback_text(bytes: &[u8]) -> Option<String> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Some(text.chars().take(FALLBACK_MAX_CHARS).collect()),
        Ok(Err(e)) => {
            tracing::debug!("pdf-extract fallback failed: {}", e);
            None
        }
        Err(_) => {
            tracing::warn!("pdf-extract panicked while reading document");
            None
        }
    }
}

fn read_info(doc: &Document) -> DocumentInfo {
    let Some(info) = info_dictionary(doc) else {
        return DocumentInfo::default();
    };

    DocumentInfo {
        title: info_string(doc, info, b"Title"),
        author: info_string(doc, info, b"Author"),
        creation_year: info_string(doc, info, b"CreationDate")
            .as_deref()
            .and_then(parse_pdf_date_year),
    }
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn info_string(doc: &Document, info: &Dictionary, key: &[u8]) -> Option<String> {
    let value = match info.get(key).ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    match value {
        Object::String(bytes, _) => {
            let decoded = decode_pdf_string(bytes);
            let trimmed = decoded.trim().trim_matches('\0').trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, UTF-8, else Latin-1
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Year of a PDF date string such as `D:20230115093000Z`
fn parse_pdf_date_year(date: &str) -> Option<i32> {
    let digits = date.trim().trim_start_matches("D:");
    let year: String = digits.chars().take(4).collect();
    if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
        year.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Minimal text PDFs for tests.

    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};
    use std::path::Path;

    /// Write a one-page PDF whose text is `lines`, with optional info properties
    pub fn write_text_pdf(path: &Path, lines: &[&str], title: Option<&str>, author: Option<&str>) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut operations = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            let y = 780 - (i as i64) * 14;
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 10.into()]));
            operations.push(Operation::new("Td", vec![40.into(), y.into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut info = lopdf::Dictionary::new();
        if let Some(title) = title {
            info.set("Title", Object::string_literal(title));
        }
        if let Some(author) = author {
            info.set("Author", Object::string_literal(author));
        }
        info.set("CreationDate", Object::string_literal("D:20230115093000Z"));
        let info_id = doc.add_object(info);
        doc.trailer.set("Info", info_id);

        doc.save(path).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_extract_nonexistent_file() {
        let result = read_pdf(Path::new("/nonexistent/file.pdf"), 3);
        assert!(matches!(result, Err(PdfExtractError::InvalidFile(_))));
    }

    #[test]
    fn test_garbage_is_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf at all").unwrap();

        assert!(matches!(
            read_pdf(&path, 3),
            Err(PdfExtractError::InvalidFile(_))
        ));
    }

    #[test]
    fn test_reads_text_and_info() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("paper.pdf");
        fixtures::write_text_pdf(
            &path,
            &["A Study of Things", "doi:10.1000/xyz123"],
            Some("A Study of Things"),
            Some("Jane Smith"),
        );

        let contents = read_pdf(&path, 3).unwrap();
        assert_eq!(contents.page_count, 1);
        assert!(contents.text.contains("10.1000/xyz123"));
        assert_eq!(contents.info.title.as_deref(), Some("A Study of Things"));
        assert_eq!(contents.info.author.as_deref(), Some("Jane Smith"));
        assert_eq!(contents.info.creation_year, Some(2023));
    }

    #[test]
    fn test_decode_utf16_string() {
        let bytes = [0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69];
        assert_eq!(decode_pdf_string(&bytes), "Hi");
        assert_eq!(decode_pdf_string(b"plain"), "plain");
        assert_eq!(decode_pdf_string(&[0x63, 0x61, 0x66, 0xE9]), "café");
    }

    #[test]
    fn test_parse_pdf_date_year() {
        assert_eq!(parse_pdf_date_year("D:20230115093000Z"), Some(2023));
        assert_eq!(parse_pdf_date_year("2019"), Some(2019));
        assert_eq!(parse_pdf_date_year("D:xx"), None);
    }
}
