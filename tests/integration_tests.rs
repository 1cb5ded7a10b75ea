//! Integration tests for litnote
//!
//! These run whole batches through the public API against temp directories,
//! with the citation registry served by a local mock HTTP server.

mod common;

use common::{config, file_names, write_pdf};
use litnote::organize::{bibliography_lock, stage_append};
use litnote::{BatchOrchestrator, ConfidenceTier, ErrorKind, Outcome, Pipeline};
use mockito::{Matcher, Server};
use tempfile::tempdir;

const BIBTEX: &str = "@article{Smith_2023, title={Example Paper}, \
    author={Smith, Jane and Doe, John}, journal={Journal of Examples}, \
    year={2023}, doi={10.1000/xyz123}}";

#[tokio::test]
async fn test_doi_resolved_end_to_end() {
    let mut server = Server::new_async().await;
    let doi = server
        .mock("GET", "/10.1000/xyz123")
        .match_header("accept", Matcher::Regex("application/x-bibtex".into()))
        .with_status(200)
        .with_body(BIBTEX)
        .create_async()
        .await;

    let input = tempdir().unwrap();
    let out = tempdir().unwrap();
    write_pdf(
        &input.path().join("download.pdf"),
        &["Example Paper", "Jane Smith, John Doe", "https://doi.org/10.1000/XYZ123"],
        None,
        None,
    );

    let mut config = config(out.path());
    config.resolver.doi_base_url = server.url();
    config.resolver.crossref_base_url = server.url();
    let summary = BatchOrchestrator::new(Pipeline::new(config).unwrap())
        .run_folder(input.path())
        .await
        .unwrap();

    doi.assert_async().await;
    assert_eq!(summary.succeeded(), 1);
    let result = &summary.results[0];
    assert_eq!(result.key(), Some("smith2023example"));
    match &result.outcome {
        Outcome::Success { tier, warnings, .. } => {
            assert_eq!(*tier, ConfidenceTier::DoiExact);
            assert!(warnings.is_empty());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    assert_eq!(
        file_names(out.path()),
        vec!["reference.bib", "smith2023example.md", "smith2023example.pdf"]
    );
    let note = std::fs::read_to_string(out.path().join("smith2023example.md")).unwrap();
    assert!(note.contains("# Example Paper"));
    assert!(note.contains("@article{smith2023example,"));

    let bib = std::fs::read_to_string(out.path().join("reference.bib")).unwrap();
    assert_eq!(bib.matches('@').count(), 1);
    assert!(bib.contains("Journal of Examples"));
    assert!(!input.path().join("download.pdf").exists());
}

#[tokio::test]
async fn test_known_doi_skips_title_search() {
    let mut server = Server::new_async().await;
    let _doi = server
        .mock("GET", "/10.1000/xyz123")
        .with_status(200)
        .with_body(BIBTEX)
        .create_async()
        .await;
    let search = server
        .mock("GET", "/works")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let input = tempdir().unwrap();
    let out = tempdir().unwrap();
    let pdf = input.path().join("paper.pdf");
    write_pdf(&pdf, &["A Completely Different Heading Line", "doi:10.1000/xyz123"], None, None);

    let mut config = config(out.path());
    config.resolver.doi_base_url = server.url();
    config.resolver.crossref_base_url = server.url();
    let result = Pipeline::new(config).unwrap().process_file(&pdf).await;

    search.assert_async().await;
    assert_eq!(result.key(), Some("smith2023example"));
}

#[tokio::test]
async fn test_corrupt_file_does_not_stop_batch() {
    let input = tempdir().unwrap();
    let out = tempdir().unwrap();
    let titles = [
        "Graph Neural Networks For Molecules",
        "Sparse Attention In Long Documents",
        "Robust Estimation Under Heavy Tails",
        "Learning Rates For Stochastic Descent",
    ];
    for (i, title) in titles.iter().enumerate() {
        write_pdf(
            &input.path().join(format!("{}.pdf", i)),
            &[title],
            None,
            Some("Ada Lovelace"),
        );
    }
    std::fs::write(input.path().join("2b.pdf"), b"%PDF-1.4 truncated garbage").unwrap();

    let mut config = config(out.path());
    config.resolver.offline = true;
    config.batch.workers = 3;
    let summary = BatchOrchestrator::new(Pipeline::new(config).unwrap())
        .run_folder(input.path())
        .await
        .unwrap();

    assert_eq!(summary.total(), 5);
    assert_eq!(summary.succeeded(), 4);
    assert_eq!(summary.failed(), 1);
    let failed: Vec<_> = summary.failures().collect();
    assert_eq!(failed[0].file_name(), "2b.pdf");
    assert_eq!(failed[0].error_kind(), Some(ErrorKind::UnreadablePdf));

    let names = file_names(out.path());
    assert_eq!(names.iter().filter(|n| n.ends_with(".md") && *n != "failed_list.md").count(), 4);
    assert_eq!(names.iter().filter(|n| n.ends_with(".pdf")).count(), 4);
    let bib = std::fs::read_to_string(out.path().join("reference.bib")).unwrap();
    assert_eq!(bib.matches("\n@").count() + usize::from(bib.starts_with('@')), 4);
    assert!(input.path().join("2b.pdf").exists());
}

#[tokio::test]
async fn test_unreachable_registry_without_key_is_unresolved() {
    let input = tempdir().unwrap();
    let out = tempdir().unwrap();
    let pdf = input.path().join("lecture-notes.pdf");
    write_pdf(&pdf, &["Notes On Category Theory For Programmers", "doi:10.9999/nowhere"], None, None);

    let mut config = config(out.path());
    config.resolver.doi_base_url = "http://127.0.0.1:1".to_string();
    config.resolver.crossref_base_url = "http://127.0.0.1:1".to_string();
    config.resolver.doi_timeout_secs = 2;
    config.resolver.title_timeout_secs = 2;
    let result = Pipeline::new(config).unwrap().process_file(&pdf).await;

    match &result.outcome {
        Outcome::Success { tier, warnings, note_path, .. } => {
            assert_eq!(*tier, ConfidenceTier::Unresolved);
            assert!(!warnings.is_empty());
            let note = std::fs::read_to_string(note_path).unwrap();
            assert!(note.contains("Notes On Category Theory For Programmers"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    let bib = std::fs::read_to_string(out.path().join("reference.bib")).unwrap();
    assert!(bib.contains("Unverified citation (unresolved)"));
}

#[tokio::test]
async fn test_collision_suffixes_are_deterministic() {
    let input = tempdir().unwrap();
    for name in ["x.pdf", "y.pdf", "z.pdf"] {
        write_pdf(
            &input.path().join(name),
            &["Attention Is All You Need"],
            None,
            Some("Ashish Vaswani"),
        );
    }

    let mut runs = Vec::new();
    for _ in 0..2 {
        let out = tempdir().unwrap();
        let mut config = config(out.path());
        config.resolver.offline = true;
        config.output.transfer = litnote::config::TransferMode::Copy;
        config.batch.workers = 3;
        let summary = BatchOrchestrator::new(Pipeline::new(config).unwrap())
            .run_folder(input.path())
            .await
            .unwrap();
        let keys: Vec<String> = summary
            .results
            .iter()
            .filter_map(|r| r.key().map(str::to_string))
            .collect();
        runs.push(keys);
    }

    assert_eq!(
        runs[0],
        vec!["vaswani2023attention", "vaswani2023attention-2", "vaswani2023attention-3"]
    );
    assert_eq!(runs[0], runs[1]);
}

#[tokio::test]
async fn test_rerun_reuses_key_and_applies_note_policy() {
    let input = tempdir().unwrap();
    let out = tempdir().unwrap();
    write_pdf(
        &input.path().join("paper.pdf"),
        &["Consistent Hashing And Random Trees"],
        None,
        Some("David Karger"),
    );
    let template = input.path().join("template.md");
    std::fs::write(&template, "# {{title}}\n\nkey: {{key}}\n").unwrap();

    let run = |template: Option<&std::path::Path>, overwrite: bool| {
        let mut config = config(out.path());
        config.resolver.offline = true;
        config.output.transfer = litnote::config::TransferMode::Copy;
        config.output.overwrite_notes = overwrite;
        config.template.path = template.map(|p| p.to_path_buf());
        let folder = input.path().to_path_buf();
        async move {
            BatchOrchestrator::new(Pipeline::new(config).unwrap())
                .run_files(litnote::batch::list_pdfs(&folder).unwrap())
                .await
                .unwrap()
        }
    };
    let entries = || {
        let bib = std::fs::read_to_string(out.path().join("reference.bib")).unwrap();
        bib.matches("@misc{").count()
    };

    let first = run(None, false).await;
    let key = first.results[0].key().unwrap().to_string();
    assert_eq!(key, "karger2023consistent");
    let note_path = out.path().join(format!("{}.md", key));
    let first_note = std::fs::read_to_string(&note_path).unwrap();

    let again = run(None, false).await;
    assert_eq!(again.results[0].key(), Some(key.as_str()));
    assert_eq!(entries(), 1);
    assert_eq!(std::fs::read_to_string(&note_path).unwrap(), first_note);

    let conflict = run(Some(template.as_path()), false).await;
    assert_eq!(conflict.results[0].error_kind(), Some(ErrorKind::NoteWriteConflict));
    assert_eq!(std::fs::read_to_string(&note_path).unwrap(), first_note);

    let replaced = run(Some(template.as_path()), true).await;
    assert_eq!(replaced.results[0].key(), Some(key.as_str()));
    assert_eq!(
        std::fs::read_to_string(&note_path).unwrap(),
        "# Consistent Hashing And Random Trees\n\nkey: karger2023consistent\n"
    );
    assert_eq!(entries(), 1);
    assert_eq!(
        file_names(out.path()),
        vec![
            "failed_list.md",
            "karger2023consistent.md",
            "karger2023consistent.pdf",
            "reference.bib"
        ]
    );
}

#[tokio::test]
async fn test_non_utf8_bibliography_is_kept_byte_for_byte() {
    let input = tempdir().unwrap();
    let out = tempdir().unwrap();
    let pdf = input.path().join("paper.pdf");
    write_pdf(&pdf, &["Paxos Made Simple"], None, Some("Leslie Lamport"));
    let original: &[u8] = b"@book{m\xfcller1999,\n  title = {Caf\xe9 au lait}\n}\n";
    std::fs::write(out.path().join("reference.bib"), original).unwrap();

    let mut config = config(out.path());
    config.resolver.offline = true;
    let result = Pipeline::new(config).unwrap().process_file(&pdf).await;

    assert!(result.is_success(), "{:?}", result.outcome);
    let bib = std::fs::read(out.path().join("reference.bib")).unwrap();
    assert!(bib.starts_with(original));
    assert!(String::from_utf8_lossy(&bib).contains("@misc{lamport2023paxos,"));
}

#[test]
fn test_interrupted_append_leaves_bibliography_intact() {
    let dir = tempdir().unwrap();
    let bib = dir.path().join("reference.bib");
    let original = "@article{first2020entry,\n  title        = {First},\n}\n";
    std::fs::write(&bib, original).unwrap();

    {
        let lock = bibliography_lock(&bib);
        let _guard = lock.lock().unwrap();
        let staged = stage_append(&bib, "@misc{second2021entry,\n  title = {Second},\n}\n").unwrap();
        // dropped without commit, as if the process stopped mid-append
        drop(staged);
    }

    assert_eq!(std::fs::read_to_string(&bib).unwrap(), original);
    assert_eq!(file_names(dir.path()), vec!["reference.bib"]);
}
