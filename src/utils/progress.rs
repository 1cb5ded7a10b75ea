//! Progress reporting for batch runs.
//!
//! Results are written as line-oriented messages prefixed with `INFO: ` or
//! `ERROR: `. Callers embedding the binary read these lines and surface them
//! verbatim; any other output is diagnostic only.
//!
//! # Usage
//!
//! ```ignore
//! use litnote::utils::LineReporter;
//!
//! let reporter = LineReporter::stdout();
//! reporter.info("starting");
//! reporter.report_result(&result);
//! reporter.report_summary(&summary);
//! ```

use std::io::Write;
use std::sync::Mutex;

use crate::models::{Outcome, ProcessingResult, RunSummary};

/// Writes `INFO:` / `ERROR:` lines to a sink
///
/// The sink is behind a mutex so lines from concurrent callers never interleave.
#[derive(Debug)]
pub struct LineReporter<W: Write + Send> {
    sink: Mutex<W>,
    quiet: bool,
}

impl LineReporter<std::io::Stdout> {
    /// Reporter writing to standard output
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> LineReporter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(sink),
            quiet: false,
        }
    }

    /// Suppress `INFO:` lines; errors are always written
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            self.write_line("INFO", message);
        }
    }

    pub fn error(&self, message: &str) {
        self.write_line("ERROR", message);
    }

    /// One line per processed item
    pub fn report_result(&self, result: &ProcessingResult) {
        let file = result.file_name();
        match &result.outcome {
            Outcome::Success { note_path, tier, .. } => {
                let note = note_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.info(&format!(
                    "Successfully processed: {} ({}, {})",
                    note, file, tier
                ));
            }
            Outcome::Failure { kind, message } => {
                self.error(&format!("{}: {}: {}", file, kind, message));
            }
        }
    }

    /// Final totals for a run
    pub fn report_summary(&self, summary: &RunSummary) {
        let total = summary.total();
        if total == 0 && summary.skipped == 0 {
            self.info("No PDF files to process");
            return;
        }

        if summary.cancelled {
            self.error(&format!(
                "Run cancelled: {} processed, {} not started",
                total, summary.skipped
            ));
        }

        if summary.failed() > 0 {
            self.error(&format!(
                "Processing completed: {}/{} successful ({:.1}%)",
                summary.succeeded(),
                total,
                summary.success_rate()
            ));
        } else if total > 0 {
            self.info(&format!("All {} files processed successfully", total));
        }
    }

    fn write_line(&self, prefix: &str, message: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        // one line per message; embedded newlines would break the protocol
        let message = message.replace(['\n', '\r'], " ");
        let _ = writeln!(sink, "{}: {}", prefix, message);
        let _ = sink.flush();
    }
}

impl<W: Write + Send> LineReporter<W> {
    /// Consume the reporter and return its sink
    pub fn into_inner(self) -> W {
        self.sink.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}
