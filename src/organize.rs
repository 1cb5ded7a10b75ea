//! Placing artifacts in the output directory.
//!
//! Per item the organizer checks for a conflicting note, transfers the PDF to
//! `<key>.pdf`, writes `<key>.md` and appends the record to the shared
//! bibliography. Every write goes through a temp file in the destination
//! directory followed by a rename, so readers never observe a half-written
//! file.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tempfile::NamedTempFile;

use crate::config::{OutputConfig, TransferMode};
use crate::error::PipelineError;
use crate::keys::bibliography_entries;
use crate::models::BibtexRecord;
use crate::render::RenderedNote;

/// Final locations of an item's artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub pdf_path: PathBuf,
    pub note_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoteState {
    Absent,
    Identical,
    Replace,
}

/// Moves PDFs and writes notes and bibliography entries
#[derive(Debug, Clone)]
pub struct FileOrganizer {
    output_dir: PathBuf,
    bibliography: PathBuf,
    transfer: TransferMode,
    overwrite_notes: bool,
}

impl FileOrganizer {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            output_dir: config.path.clone(),
            bibliography: config.bibliography_path(),
            transfer: config.transfer,
            overwrite_notes: config.overwrite_notes,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn bibliography_path(&self) -> &Path {
        &self.bibliography
    }

    /// Place all artifacts for one item whose key is already final
    pub fn commit(
        &self,
        source_pdf: &Path,
        note: &RenderedNote,
        record: &BibtexRecord,
    ) -> Result<Placement, PipelineError> {
        fs::create_dir_all(&self.output_dir).map_err(|e| PipelineError::OutputNotWritable {
            path: self.output_dir.clone(),
            reason: e.to_string(),
        })?;

        let pdf_path = self.output_dir.join(format!("{}.pdf", note.key));
        let note_path = self.output_dir.join(format!("{}.md", note.key));

        // checked first so a conflicting item leaves its PDF where it was
        let note_state = self.note_state(&note_path, &note.body)?;

        retry_once(|| self.transfer_pdf(source_pdf, &pdf_path)).map_err(|e| {
            PipelineError::PdfTransferFailure {
                path: pdf_path.clone(),
                reason: e.to_string(),
            }
        })?;
        tracing::debug!("PDF placed at {}", pdf_path.display());

        if note_state != NoteState::Identical {
            retry_once(|| write_atomic(&note_path, note.body.as_bytes())).map_err(|e| {
                PipelineError::OutputNotWritable {
                    path: note_path.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        let entry = record.to_bibtex();
        let appended = retry_once(|| append_entry(&self.bibliography, &record.key, &entry))
            .map_err(|e| PipelineError::BibliographyWriteFailure {
                path: self.bibliography.clone(),
                reason: e.to_string(),
            })?;
        if !appended {
            tracing::debug!("{} already in {}", record.key, self.bibliography.display());
        }

        Ok(Placement {
            pdf_path,
            note_path,
        })
    }

    fn note_state(&self, note_path: &Path, body: &str) -> Result<NoteState, PipelineError> {
        match fs::read(note_path) {
            Ok(existing) if existing == body.as_bytes() => Ok(NoteState::Identical),
            Ok(_) if self.overwrite_notes => {
                tracing::warn!("Replacing existing note {}", note_path.display());
                Ok(NoteState::Replace)
            }
            Ok(_) => Err(PipelineError::NoteWriteConflict {
                path: note_path.to_path_buf(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(NoteState::Absent),
            Err(e) => Err(PipelineError::OutputNotWritable {
                path: note_path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    fn transfer_pdf(&self, source: &Path, dest: &Path) -> io::Result<()> {
        if same_file(source, dest) {
            return Ok(());
        }
        if same_contents(source, dest)? {
            // placed by an earlier run, or by a move that stopped before removing the source
            tracing::debug!("{} already holds this PDF", dest.display());
            return match self.transfer {
                TransferMode::Copy => Ok(()),
                TransferMode::Move => fs::remove_file(source),
            };
        }
        match self.transfer {
            TransferMode::Copy => copy_noclobber(source, dest),
            TransferMode::Move => move_noclobber(source, dest),
        }
    }
}

/// Create the output directory and check that files can be created in it
pub fn validate_output_dir(dir: &Path) -> Result<(), PipelineError> {
    let not_writable = |e: io::Error| PipelineError::OutputNotWritable {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    };
    fs::create_dir_all(dir).map_err(not_writable)?;
    let mut scratch = staging_file(dir, None).map_err(not_writable)?;
    scratch.write_all(b"litnote").map_err(not_writable)?;
    Ok(())
}

fn retry_once<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    match op() {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::debug!("Retrying file operation after: {}", e);
            op()
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Whether `dest` exists with exactly the bytes of `source`
fn same_contents(source: &Path, dest: &Path) -> io::Result<bool> {
    let dest_len = match fs::metadata(dest) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if fs::metadata(source)?.len() != dest_len {
        return Ok(false);
    }
    Ok(fs::read(source)? == fs::read(dest)?)
}

/// Move without ever replacing `dest`; falls back to copy + remove
fn move_noclobber(source: &Path, dest: &Path) -> io::Result<()> {
    // a hard link fails if `dest` exists, unlike rename
    match fs::hard_link(source, dest) {
        Ok(()) => fs::remove_file(source),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(_) => {
            copy_noclobber(source, dest)?;
            fs::remove_file(source)
        }
    }
}

/// Copy through a temp file next to `dest`, failing if `dest` exists
///
/// The copy keeps the permissions of `source`.
fn copy_noclobber(source: &Path, dest: &Path) -> io::Result<()> {
    let mut staged = staging_file(parent_dir(dest), Some(source))?;
    let mut input = fs::File::open(source)?;
    io::copy(&mut input, staged.as_file_mut())?;
    staged.as_file().sync_all()?;
    staged.persist_noclobber(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Replace `path` with `contents` atomically, keeping its permissions
fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut staged = staging_file(parent_dir(path), Some(path))?;
    staged.write_all(contents)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Hidden temp file in `dir` that will be renamed over a real file
///
/// It gets the permissions of `like` when that file exists, else the
/// permissions a plain file creation would get under the process umask.
fn staging_file(dir: &Path, like: Option<&Path>) -> io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".litnote-");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let staged = builder.tempfile_in(dir)?;

    if let Some(existing) = like.and_then(|path| fs::metadata(path).ok()) {
        staged.as_file().set_permissions(existing.permissions())?;
    }
    Ok(staged)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Process-wide lock guarding appends to the bibliography at `path`
///
/// Every writer in this process that appends to the same file shares one lock.
pub fn bibliography_lock(path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut locks = LOCKS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    Arc::clone(locks.entry(key).or_default())
}

/// Append one entry to the bibliography under its lock
///
/// Returns `false` without writing when an entry with `key` is already there.
pub fn append_entry(path: &Path, key: &str, entry: &str) -> io::Result<bool> {
    let lock = bibliography_lock(path);
    let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

    let existing = read_bibliography(path)?;
    let present = bibliography_entries(&String::from_utf8_lossy(&existing))
        .iter()
        .any(|(existing_key, _)| existing_key.eq_ignore_ascii_case(key));
    if present {
        return Ok(false);
    }
    stage_with(path, existing, entry)?.commit()?;
    Ok(true)
}

/// An append written to a temp file but not yet visible
///
/// Dropping it without [`commit`](StagedAppend::commit) discards the staged
/// content and leaves the bibliography as it was.
#[derive(Debug)]
pub struct StagedAppend {
    staged: NamedTempFile,
    target: PathBuf,
}

impl StagedAppend {
    /// Atomically replace the bibliography with the staged content
    pub fn commit(self) -> io::Result<()> {
        self.staged.as_file().sync_all()?;
        self.staged.persist(&self.target).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Stage the bibliography with `entry` appended
///
/// Callers must hold [`bibliography_lock`] for `path` until the staged
/// append is committed or dropped. Existing bytes are kept as they are,
/// whatever their encoding.
pub fn stage_append(path: &Path, entry: &str) -> io::Result<StagedAppend> {
    let existing = read_bibliography(path)?;
    stage_with(path, existing, entry)
}

fn read_bibliography(path: &Path) -> io::Result<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

fn stage_with(path: &Path, existing: Vec<u8>, entry: &str) -> io::Result<StagedAppend> {
    let mut content = existing;
    if !content.iter().all(u8::is_ascii_whitespace) {
        if !content.ends_with(b"\n") {
            content.push(b'\n');
        }
        content.push(b'\n');
    }
    content.extend_from_slice(entry.trim_end().as_bytes());
    content.push(b'\n');

    let mut staged = staging_file(parent_dir(path), Some(path))?;
    staged.write_all(&content)?;
    Ok(StagedAppend {
        staged,
        target: path.to_path_buf(),
    })
}
