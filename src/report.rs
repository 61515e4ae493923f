//! Report rendering and persistence.
//!
//! The text layout is the tool's long-standing output contract: a header,
//! one numbered line per directory with the size in GB at two decimals, and
//! a trailing execution-time line. Downstream scripts parse it, so the shape
//! is covered by tests and must not drift.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde_json::{Value, json};

use crate::scanner::rank::DirectorySize;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Format a byte count as GB with two decimals (no unit suffix).
#[must_use]
pub fn format_gb(bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let gigabytes = bytes as f64 / BYTES_PER_GB;
    format!("{gigabytes:.2}")
}

/// Render the persisted text report.
///
/// `requested` is the N the caller asked for and appears in the header even
/// when fewer directories qualified.
#[must_use]
pub fn render_text(ranked: &[DirectorySize], requested: usize, elapsed: Duration) -> String {
    let body = ranked
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            format!(
                "{}. {} - {} GB",
                index + 1,
                entry.path.display(),
                format_gb(entry.total_bytes)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Top {requested} Largest Directories:\n{body}\n\nExecution Time: {:.2} seconds\n",
        elapsed.as_secs_f64()
    )
}

/// Render the machine-readable report for `--json`.
#[must_use]
pub fn render_json(
    root: &Path,
    ranked: &[DirectorySize],
    requested: usize,
    elapsed: Duration,
) -> Value {
    let directories: Vec<Value> = ranked
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            json!({
                "rank": index + 1,
                "path": entry.path.to_string_lossy(),
                "total_bytes": entry.total_bytes,
                "gigabytes": format_gb(entry.total_bytes),
            })
        })
        .collect();

    json!({
        "root": root.to_string_lossy(),
        "requested": requested,
        "directories": directories,
        "execution_seconds": elapsed.as_secs_f64(),
    })
}

/// Persist the rendered report.
pub fn persist(path: &Path, contents: &str) -> io::Result<()> {
    fs::write(path, contents)
}
