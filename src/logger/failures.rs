//! Failure sink: append-only, timestamped error log with stderr fallback.
//!
//! Traversal failures are recovered, never propagated — an unreadable
//! directory or a vanished file contributes zero bytes and the run keeps
//! going. What *is* kept is a record: one line per failure, prefixed with an
//! ISO 8601 UTC timestamp in brackets. Lines are assembled in memory and
//! written with a single `write_all` to prevent interleaved partial lines
//! when the file is being tailed by another process.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

use crate::core::errors::{DtpError, Result};

/// A failure recovered during traversal or report persistence.
#[derive(Debug, Error)]
pub enum TraversalFailure {
    /// A directory's entries could not be enumerated.
    #[error("[DTP-2201] error accessing directory {path}: {details}")]
    Listing { path: PathBuf, details: String },

    /// A file's size could not be obtained.
    #[error("[DTP-2202] error getting file size for {path}: {details}")]
    Stat { path: PathBuf, details: String },

    /// The final report could not be persisted.
    #[error("[DTP-2203] failed to write results to {path}: {details}")]
    ReportWrite { path: PathBuf, details: String },
}

impl TraversalFailure {
    /// Stable machine-parseable failure code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Listing { .. } => "DTP-2201",
            Self::Stat { .. } => "DTP-2202",
            Self::ReportWrite { .. } => "DTP-2203",
        }
    }

    /// A listing failure for `path`.
    #[must_use]
    pub fn listing(path: impl AsRef<Path>, source: &std::io::Error) -> Self {
        Self::Listing {
            path: path.as_ref().to_path_buf(),
            details: source.to_string(),
        }
    }

    /// A stat failure for `path`.
    #[must_use]
    pub fn stat(path: impl AsRef<Path>, source: &std::io::Error) -> Self {
        Self::Stat {
            path: path.as_ref().to_path_buf(),
            details: source.to_string(),
        }
    }

    /// A report persistence failure for `path`.
    #[must_use]
    pub fn report_write(path: impl AsRef<Path>, source: &std::io::Error) -> Self {
        Self::ReportWrite {
            path: path.as_ref().to_path_buf(),
            details: source.to_string(),
        }
    }
}

/// Injected logging collaborator: record a timestamped failure notice.
///
/// The traversal core only knows this trait; where the notice lands (a log
/// file, memory, nowhere) is the caller's choice.
pub trait FailureSink: Send + Sync {
    /// Record one failure. Must never panic and must never block traversal
    /// on downstream log problems.
    fn record(&self, failure: &TraversalFailure);
}

/// File-backed sink appending `[timestamp] message` lines.
#[derive(Debug)]
pub struct FileFailureSink {
    file: Mutex<File>,
}

impl FileFailureSink {
    /// Open (or create) the log file in append mode.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| DtpError::io(path, source))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl FailureSink for FileFailureSink {
    fn record(&self, failure: &TraversalFailure) {
        let line = format!("[{}] {failure}\n", format_utc_now());
        let mut file = self.file.lock();
        if file.write_all(line.as_bytes()).is_err() {
            // Degradation: the log itself failed, fall back to stderr.
            eprintln!("[DIRTOP-LOG] {}", line.trim_end());
        }
    }
}

/// Sink that writes notices straight to stderr. Used when the log file
/// itself cannot be opened.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrFailureSink;

impl FailureSink for StderrFailureSink {
    fn record(&self, failure: &TraversalFailure) {
        eprintln!("[{}] {failure}", format_utc_now());
    }
}

/// Sink that drops every notice. For embedding the aggregator where no log
/// destination exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardFailureSink;

impl FailureSink for DiscardFailureSink {
    fn record(&self, _failure: &TraversalFailure) {}
}

/// In-memory sink collecting rendered notices. Used by tests and by callers
/// that want to inspect failures after a run.
#[derive(Debug, Default)]
pub struct MemoryFailureSink {
    lines: Mutex<Vec<String>>,
}

impl MemoryFailureSink {
    /// An empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered failure messages, in record order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Number of failures recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl FailureSink for MemoryFailureSink {
    fn record(&self, failure: &TraversalFailure) {
        self.lines.lock().push(failure.to_string());
    }
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
