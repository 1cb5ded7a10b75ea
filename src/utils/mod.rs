//! Utility modules supporting the pipeline.
//!
//! - [`HttpClient`]: shared HTTP client with timeouts and a user agent
//! - [`read_pdf`]: PDF text and document-info extraction
//! - [`RetryConfig`] / [`with_retry`]: retry with exponential backoff on transient errors
//! - [`LineReporter`]: `INFO:` / `ERROR:` progress lines
//! - [`find_doi`] / [`normalize_doi`]: DOI detection and normalization
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use litnote::sources::SourceError;
//! use litnote::utils::{with_retry, RetryConfig};
//!
//! # async fn fetch_data() -> Result<String, SourceError> { Ok("data".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), SourceError> {
//! let config = RetryConfig::default().max_attempts(3);
//! let result = with_retry(config, || fetch_data()).await?;
//! # Ok(())
//! # }
//! ```

mod http;
mod pdf;
mod progress;
mod retry;
mod validate;

#[cfg(test)]
pub(crate) use pdf::fixtures;

pub use http::{status_error, HttpClient};
pub use pdf::{decode_pdf_string, read_pdf, DocumentInfo, PdfContents, PdfExtractError};
pub use progress::LineReporter;
pub use retry::{with_retry, RetryConfig, TransientError};
pub use validate::{find_doi, normalize_doi, title_from_stem};
