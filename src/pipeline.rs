//! The single-file pipeline.
//!
//! Processing is split in two phases. [`Pipeline::prepare`] (extract and
//! resolve) touches nothing on disk and may run for several items at once.
//! [`Pipeline::commit`] allocates the key and writes the artifacts; callers
//! run it one item at a time, in input order, so key assignment is
//! deterministic.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::error::PipelineError;
use crate::extract::MetadataExtractor;
use crate::keys::KeyAllocator;
use crate::models::{ProcessingResult, SourceDocument};
use crate::organize::FileOrganizer;
use crate::render::{NoteFields, NoteRenderer};
use crate::resolver::{CitationResolver, Resolution};
use crate::sources::{BibliographicRegistry, TitleGuesser};

/// An item that has been read and resolved but not yet written
#[derive(Debug, Clone)]
pub struct Prepared {
    pub document: SourceDocument,
    pub resolution: Resolution,
}

/// Wires the components for one item
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Arc<Config>,
    extractor: MetadataExtractor,
    resolver: CitationResolver,
    renderer: NoteRenderer,
    organizer: FileOrganizer,
}

impl Pipeline {
    /// Pipeline using CrossRef and, if a key is configured, the OpenAI guesser
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        let resolver = CitationResolver::from_config(&config)
            .map_err(|e| PipelineError::ResolutionUnavailable(e.to_string()))?;
        Ok(Self::assemble(config, resolver))
    }

    /// Pipeline with explicit sources, e.g. mocks in tests
    pub fn with_sources(
        config: Config,
        registry: Option<Arc<dyn BibliographicRegistry>>,
        guesser: Option<Arc<dyn TitleGuesser>>,
    ) -> Self {
        let resolver = CitationResolver::new(registry, guesser, config.resolver.clone());
        Self::assemble(config, resolver)
    }

    fn assemble(config: Config, resolver: CitationResolver) -> Self {
        Self {
            extractor: MetadataExtractor::new(config.batch.max_pages),
            renderer: NoteRenderer::new(&config.template),
            organizer: FileOrganizer::new(&config.output),
            resolver,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Key allocator seeded from the bibliography
    pub fn key_allocator(&self) -> Result<KeyAllocator, PipelineError> {
        let bibliography = self.organizer.bibliography_path();
        KeyAllocator::seeded(bibliography).map_err(|e| {
            PipelineError::BibliographyWriteFailure {
                path: bibliography.to_path_buf(),
                reason: format!("cannot read existing keys: {}", e),
            }
        })
    }

    /// Extract and resolve; no files are written
    pub async fn prepare(&self, path: &Path) -> Result<Prepared, PipelineError> {
        let (document, candidate) = self.extractor.extract(path).await?;
        let resolution = self.resolver.resolve(&document, &candidate).await;
        Ok(Prepared {
            document,
            resolution,
        })
    }

    /// Allocate the key, render the note and place all artifacts
    pub async fn commit(
        &self,
        prepared: Prepared,
        keys: &mut KeyAllocator,
    ) -> Result<ProcessingResult, PipelineError> {
        let Prepared {
            document,
            resolution,
        } = prepared;
        let mut record = resolution.record;

        record.key = keys.allocate_for(&record);
        let note = self.renderer.render(&NoteFields::from_record(&record))?;

        let organizer = self.organizer.clone();
        let source = document.path().to_path_buf();
        let key = record.key.clone();
        let tier = record.tier;
        let task_source = source.clone();
        let placement =
            tokio::task::spawn_blocking(move || organizer.commit(&task_source, &note, &record))
                .await
                .map_err(|e| PipelineError::PdfTransferFailure {
                    path: source.clone(),
                    reason: format!("file task failed: {}", e),
                })??;

        Ok(ProcessingResult::success(
            source,
            key,
            placement.pdf_path,
            placement.note_path,
            tier,
            resolution.warnings,
        ))
    }

    /// Process one PDF end to end; failures become a failed result
    pub async fn process_file(&self, path: &Path) -> ProcessingResult {
        let result = async {
            let mut keys = self.key_allocator()?;
            let prepared = self.prepare(path).await?;
            self.commit(prepared, &mut keys).await
        }
        .await;
        finish(path.to_path_buf(), result)
    }
}

/// Convert a per-item outcome into a result, logging failures
pub(crate) fn finish(
    source: PathBuf,
    result: Result<ProcessingResult, PipelineError>,
) -> ProcessingResult {
    match result {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("{}: {}", source.display(), e);
            ProcessingResult::from_error(source, &e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{ConfidenceTier, Outcome};
    use crate::sources::MockSource;
    use crate::utils::fixtures;
    use tempfile::tempdir;

    fn config(out: &Path) -> Config {
        let mut config = Config::default();
        config.output.path = out.to_path_buf();
        config.resolver.max_attempts = 1;
        config.api_keys.openai = None;
        config
    }

    #[tokio::test]
    async fn test_process_file_with_registry() {
        let input = tempdir().unwrap();
        let out = tempdir().unwrap();
        let pdf = input.path().join("download (3).pdf");
        fixtures::write_text_pdf(&pdf, &["Example Paper", "doi:10.1000/xyz123"], None, None);

        let registry: Arc<dyn BibliographicRegistry> = Arc::new(MockSource::new().with_bibtex(
            "10.1000/xyz123",
            "@article{x, title={Example Paper}, author={Jane Smith}, year={2023}}",
        ));
        let pipeline = Pipeline::with_sources(config(out.path()), Some(registry), None);

        let result = pipeline.process_file(&pdf).await;
        assert_eq!(result.key(), Some("smith2023example"));
        match &result.outcome {
            Outcome::Success { tier, note_path, .. } => {
                assert_eq!(*tier, ConfidenceTier::DoiExact);
                let note = std::fs::read_to_string(note_path).unwrap();
                assert!(note.contains("# Example Paper"));
                assert!(note.contains("doi          = {10.1000/xyz123}"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!pdf.exists());
        assert!(out.path().join("smith2023example.pdf").exists());
    }

    #[tokio::test]
    async fn test_process_file_failure_is_a_result() {
        let out = tempdir().unwrap();
        let pipeline = Pipeline::with_sources(config(out.path()), None, None);
        let result = pipeline.process_file(Path::new("/nonexistent/paper.pdf")).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::UnreadablePdf));
    }

    #[tokio::test]
    async fn test_missing_template_fails_item_without_side_effects() {
        let input = tempdir().unwrap();
        let out = tempdir().unwrap();
        let pdf = input.path().join("paper.pdf");
        fixtures::write_text_pdf(&pdf, &["Some Paper About Things"], None, None);

        let mut config = config(out.path());
        config.template.path = Some(input.path().join("missing.md"));
        let pipeline = Pipeline::with_sources(config, None, None);

        let result = pipeline.process_file(&pdf).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::TemplateNotFound));
        assert!(pdf.exists());
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }
}
