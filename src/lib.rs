//! # litnote
//!
//! Turns academic PDFs into citation-keyed Markdown notes backed by a shared
//! BibTeX bibliography.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`extract`]: DOI, title and author/year hints from a PDF
//! - [`resolver`]: citation lookup (DOI, registry title search, language-model guess, fallback)
//! - [`keys`]: `surname + year + titleword` keys with collision suffixes
//! - [`render`]: `{{variable}}` note templates
//! - [`organize`]: PDF transfer, note writes and atomic bibliography appends
//! - [`pipeline`] / [`batch`]: the per-item pipeline and the batch orchestrator
//! - [`sources`]: registry and language-model clients behind traits
//! - [`models`]: documents, records and results
//! - [`utils`]: HTTP, retry, PDF reading and progress reporting
//! - [`config`]: configuration management
//!
//! ## Example
//!
//! ```rust,no_run
//! use litnote::{BatchOrchestrator, Config, Pipeline};
//! use std::path::Path;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Config::default();
//! config.output.path = "notes".into();
//!
//! let pipeline = Pipeline::new(config)?;
//! let summary = BatchOrchestrator::new(pipeline)
//!     .run_folder(Path::new("papers"))
//!     .await?;
//! println!("{}/{} succeeded", summary.succeeded(), summary.total());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod extract;
pub mod keys;
pub mod models;
pub mod organize;
pub mod pipeline;
pub mod render;
pub mod resolver;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use batch::{BatchError, BatchOrchestrator, ProgressCallback, ProgressEvent};
pub use config::Config;
pub use error::{ErrorKind, PipelineError};
pub use models::{BibtexRecord, ConfidenceTier, Outcome, ProcessingResult, RunSummary};
pub use pipeline::Pipeline;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
