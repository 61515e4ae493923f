//! Post-traversal ranking: recorded totals sorted descending, truncated to N.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

/// One ranked directory in the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectorySize {
    /// Directory path as traversed.
    pub path: PathBuf,
    /// Recursive size in bytes.
    pub total_bytes: u64,
}

/// Select the `n` largest recorded directories, descending by size.
///
/// The sort is stable, so equal totals keep the map's iteration order
/// (path order for a `BTreeMap`), which makes ties reproducible across
/// runs. When fewer than `n` directories qualify, all of them are returned.
#[must_use]
pub fn top_n(sizes: &BTreeMap<PathBuf, u64>, n: usize) -> Vec<DirectorySize> {
    let mut ranked: Vec<DirectorySize> = sizes
        .iter()
        .map(|(path, total)| DirectorySize {
            path: path.clone(),
            total_bytes: *total,
        })
        .collect();
    ranked.sort_by(|a, b| b.total_bytes.cmp(&a.total_bytes));
    ranked.truncate(n);
    ranked
}
