//! Recursive directory-size aggregation over the concurrency gate.
//!
//! Fan-out: every directory listing dispatches one gate job per non-ignored
//! entry (a stat for files, a recursive visit for subdirectories). Fan-in:
//! instead of blocked threads, each directory node carries a pending-child
//! counter in a shared node table; a child outcome decrements its parent and
//! the parent's total is finalized exactly when the counter reaches zero.
//! Workers therefore never wait on other work, and the fixed-size pool
//! cannot deadlock no matter how deep the recursion goes.
//!
//! Failure isolation: an unreadable directory or an un-statable file is
//! reported to the failure sink and contributes zero bytes; nothing else in
//! the tree is affected.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Sender, bounded};
use parking_lot::Mutex;

use crate::core::errors::{DtpError, Result};
use crate::logger::failures::{FailureSink, TraversalFailure};
use crate::scanner::filter::IgnoreFilter;
use crate::scanner::gate::IoGate;

/// Counts of what a survey touched, snapshotted into [`SurveyOutcome`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurveyStats {
    /// Directories whose entries were enumerated.
    pub dirs_listed: u64,
    /// Files whose size was obtained.
    pub files_statted: u64,
    /// Entries excluded by the ignore filter.
    pub entries_ignored: u64,
    /// Entries of other kinds (symlinks, sockets, devices), never followed.
    pub entries_skipped: u64,
    /// Failures recorded on the sink.
    pub failures: u64,
}

/// Result of a completed survey.
#[derive(Debug)]
pub struct SurveyOutcome {
    /// Recursive byte size of the root directory itself.
    pub root_total: u64,
    /// Directory path → recursive size, for every directory whose total met
    /// the reporting threshold. Keys are paths as traversed (the root is
    /// stored exactly as given, not canonicalized).
    pub sizes: BTreeMap<PathBuf, u64>,
    /// Traversal counters.
    pub stats: SurveyStats,
}

/// Bounded-concurrency recursive directory sizer.
///
/// Central invariant: the threshold gates *reporting* only. A directory
/// below the threshold is absent from [`SurveyOutcome::sizes`] but its total
/// still flows into its parent's sum unchanged.
///
/// Directory symlinks are classified by their own entry type and never
/// followed, so symlink cycles cannot recurse. No device+inode visited set
/// is kept; a bind-mounted cycle would recurse until the filesystem runs
/// out of path — an inherited limitation.
pub struct SizeAggregator {
    gate: Arc<IoGate>,
    filter: IgnoreFilter,
    threshold: u64,
    sink: Arc<dyn FailureSink>,
    progress: Option<Arc<dyn Fn(&Path) + Send + Sync>>,
}

impl SizeAggregator {
    /// Build an aggregator around an injected gate, filter, and sink.
    /// `threshold` is the minimum total (bytes) for a directory to be
    /// recorded in the outcome's size map.
    pub fn new(
        gate: IoGate,
        filter: IgnoreFilter,
        threshold: u64,
        sink: Arc<dyn FailureSink>,
    ) -> Self {
        Self {
            gate: Arc::new(gate),
            filter,
            threshold,
            sink,
            progress: None,
        }
    }

    /// Set a callback invoked once per directory as its listing begins.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Compute the recursive size of `root`, blocking until the whole
    /// subtree has resolved.
    ///
    /// A root that cannot be listed is a recovered failure like any other:
    /// the outcome carries a zero total and an empty size map.
    pub fn measure(&self, root: &Path) -> Result<SurveyOutcome> {
        let (done_tx, done_rx) = bounded::<u64>(1);
        let ctx = Arc::new(SurveyCtx {
            gate: Arc::clone(&self.gate),
            filter: self.filter.clone(),
            threshold: self.threshold,
            sink: Arc::clone(&self.sink),
            progress: self.progress.clone(),
            nodes: Mutex::new(vec![DirNode {
                path: root.to_path_buf(),
                parent: None,
                pending: 0,
                partial: 0,
            }]),
            sizes: Mutex::new(BTreeMap::new()),
            done_tx,
            counters: Counters::default(),
        });

        let job_ctx = Arc::clone(&ctx);
        ctx.gate.submit(move || visit_dir(&job_ctx, ROOT_NODE));

        let root_total = done_rx.recv().map_err(|_| DtpError::ChannelClosed {
            component: "aggregator",
        })?;

        let sizes = std::mem::take(&mut *ctx.sizes.lock());
        Ok(SurveyOutcome {
            root_total,
            sizes,
            stats: ctx.counters.snapshot(),
        })
    }
}

const ROOT_NODE: usize = 0;

/// One directory in the fan-in table.
struct DirNode {
    path: PathBuf,
    parent: Option<usize>,
    /// Child outcomes not yet applied. The node finalizes when this hits 0.
    pending: usize,
    /// Bytes accumulated from resolved children.
    partial: u64,
}

#[derive(Default)]
struct Counters {
    dirs_listed: AtomicU64,
    files_statted: AtomicU64,
    entries_ignored: AtomicU64,
    entries_skipped: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SurveyStats {
        SurveyStats {
            dirs_listed: self.dirs_listed.load(Ordering::Relaxed),
            files_statted: self.files_statted.load(Ordering::Relaxed),
            entries_ignored: self.entries_ignored.load(Ordering::Relaxed),
            entries_skipped: self.entries_skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Shared state for one `measure` call. Jobs hold an `Arc` to it; the table
/// and size map are single-writer via their mutexes.
struct SurveyCtx {
    gate: Arc<IoGate>,
    filter: IgnoreFilter,
    threshold: u64,
    sink: Arc<dyn FailureSink>,
    progress: Option<Arc<dyn Fn(&Path) + Send + Sync>>,
    nodes: Mutex<Vec<DirNode>>,
    sizes: Mutex<BTreeMap<PathBuf, u64>>,
    done_tx: Sender<u64>,
    counters: Counters,
}

/// List one directory, register its children, and dispatch their jobs.
fn visit_dir(ctx: &Arc<SurveyCtx>, node_id: usize) {
    let path = ctx.nodes.lock()[node_id].path.clone();
    if let Some(callback) = &ctx.progress {
        callback(&path);
    }

    let reader = match fs::read_dir(&path) {
        Ok(reader) => reader,
        Err(err) => {
            ctx.counters.failures.fetch_add(1, Ordering::Relaxed);
            ctx.sink.record(&TraversalFailure::listing(&path, &err));
            // Unlistable directories contribute 0 and are never recorded,
            // but the parent still observes the outcome.
            conclude(ctx, node_id, 0, false);
            return;
        }
    };
    ctx.counters.dirs_listed.fetch_add(1, Ordering::Relaxed);

    let mut files: Vec<PathBuf> = Vec::new();
    let mut subdirs: Vec<PathBuf> = Vec::new();
    for entry in reader {
        let Ok(entry) = entry else { continue };
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(err) => {
                ctx.counters.failures.fetch_add(1, Ordering::Relaxed);
                ctx.sink
                    .record(&TraversalFailure::stat(entry.path(), &err));
                continue;
            }
        };

        if file_type.is_dir() {
            if ctx.filter.is_ignored_dir(&name) {
                ctx.counters.entries_ignored.fetch_add(1, Ordering::Relaxed);
            } else {
                subdirs.push(entry.path());
            }
        } else if file_type.is_file() {
            if ctx.filter.is_ignored_file(&name) {
                ctx.counters.entries_ignored.fetch_add(1, Ordering::Relaxed);
            } else {
                files.push(entry.path());
            }
        } else {
            // Symlinks, sockets, devices: never followed, never counted.
            ctx.counters.entries_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    let child_count = files.len() + subdirs.len();
    let mut subdir_ids = Vec::with_capacity(subdirs.len());
    {
        // Register children before any dispatch so no completion can race
        // the pending count.
        let mut nodes = ctx.nodes.lock();
        nodes[node_id].pending = child_count;
        for subdir in subdirs {
            let id = nodes.len();
            nodes.push(DirNode {
                path: subdir,
                parent: Some(node_id),
                pending: 0,
                partial: 0,
            });
            subdir_ids.push(id);
        }
    }

    if child_count == 0 {
        // Empty, or nothing but ignored and skipped entries.
        conclude(ctx, node_id, 0, true);
        return;
    }

    for file in files {
        let job_ctx = Arc::clone(ctx);
        ctx.gate.submit(move || stat_file(&job_ctx, &file, node_id));
    }
    for id in subdir_ids {
        let job_ctx = Arc::clone(ctx);
        ctx.gate.submit(move || visit_dir(&job_ctx, id));
    }
}

/// Stat one file and apply its size to the parent node.
fn stat_file(ctx: &Arc<SurveyCtx>, path: &Path, parent_id: usize) {
    let bytes = match fs::metadata(path) {
        Ok(meta) => {
            ctx.counters.files_statted.fetch_add(1, Ordering::Relaxed);
            meta.len()
        }
        Err(err) => {
            ctx.counters.failures.fetch_add(1, Ordering::Relaxed);
            ctx.sink.record(&TraversalFailure::stat(path, &err));
            0
        }
    };
    apply_child_outcome(ctx, parent_id, bytes);
}

/// Finalize a node that produced no child jobs of its own.
fn conclude(ctx: &Arc<SurveyCtx>, node_id: usize, total: u64, recordable: bool) {
    let (path, parent) = {
        let nodes = ctx.nodes.lock();
        (nodes[node_id].path.clone(), nodes[node_id].parent)
    };
    if recordable && total >= ctx.threshold {
        ctx.sizes.lock().insert(path, total);
    }
    match parent {
        Some(parent_id) => apply_child_outcome(ctx, parent_id, total),
        None => {
            let _ = ctx.done_tx.send(total);
        }
    }
}

/// Apply one resolved child to its parent; finalize and propagate upward as
/// counters drain to zero. The loop walks ancestors instead of recursing so
/// a deep finalization chain cannot blow the stack.
fn apply_child_outcome(ctx: &Arc<SurveyCtx>, mut node_id: usize, mut bytes: u64) {
    loop {
        let finalized = {
            let mut nodes = ctx.nodes.lock();
            let node = &mut nodes[node_id];
            node.partial = node.partial.saturating_add(bytes);
            node.pending -= 1;
            if node.pending == 0 {
                Some((node.path.clone(), node.partial, node.parent))
            } else {
                None
            }
        };
        let Some((path, total, parent)) = finalized else {
            return;
        };
        if total >= ctx.threshold {
            ctx.sizes.lock().insert(path, total);
        }
        match parent {
            Some(parent_id) => {
                node_id = parent_id;
                bytes = total;
            }
            None => {
                let _ = ctx.done_tx.send(total);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::IgnoreConfig;
    use crate::logger::failures::MemoryFailureSink;
    use crate::scanner::rank::top_n;
    use std::fs;
    use tempfile::TempDir;

    fn aggregator(threshold: u64) -> (SizeAggregator, Arc<MemoryFailureSink>) {
        aggregator_with_filter(threshold, IgnoreFilter::empty())
    }

    fn aggregator_with_filter(
        threshold: u64,
        filter: IgnoreFilter,
    ) -> (SizeAggregator, Arc<MemoryFailureSink>) {
        let sink = Arc::new(MemoryFailureSink::new());
        let gate = IoGate::new(4).unwrap();
        let shared: Arc<dyn FailureSink> = Arc::clone(&sink) as Arc<dyn FailureSink>;
        let agg = SizeAggregator::new(gate, filter, threshold, shared);
        (agg, sink)
    }

    fn write_bytes(path: &Path, len: usize) {
        fs::write(path, vec![0u8; len]).unwrap();
    }

    #[test]
    fn conservation_over_a_nested_tree() {
        let tmp = TempDir::new().unwrap();
        // root/
        //   top.bin          25
        //   a/
        //     a1.bin        100
        //     b/
        //       b1.bin       50
        //   c/               (empty)
        fs::create_dir_all(tmp.path().join("a").join("b")).unwrap();
        fs::create_dir_all(tmp.path().join("c")).unwrap();
        write_bytes(&tmp.path().join("top.bin"), 25);
        write_bytes(&tmp.path().join("a").join("a1.bin"), 100);
        write_bytes(&tmp.path().join("a").join("b").join("b1.bin"), 50);

        let (agg, sink) = aggregator(1);
        let outcome = agg.measure(tmp.path()).unwrap();

        assert_eq!(outcome.root_total, 175);
        assert_eq!(outcome.sizes.get(&tmp.path().join("a")), Some(&150));
        assert_eq!(
            outcome.sizes.get(&tmp.path().join("a").join("b")),
            Some(&50)
        );
        assert_eq!(outcome.sizes.get(&tmp.path().to_path_buf()), Some(&175));
        // Empty directory: 0 bytes, below a positive threshold.
        assert!(!outcome.sizes.contains_key(&tmp.path().join("c")));
        assert!(sink.is_empty());
        assert_eq!(outcome.stats.dirs_listed, 4);
        assert_eq!(outcome.stats.files_statted, 3);
    }

    #[test]
    fn threshold_gates_reporting_but_not_sums() {
        let tmp = TempDir::new().unwrap();
        // dirA/fileA1 (300) + dirA/dirA2/fileA2 (300), threshold 512:
        // dirA2 stays unrecorded at 300 but dirA records 600.
        let dir_a = tmp.path().join("dirA");
        let dir_a2 = dir_a.join("dirA2");
        fs::create_dir_all(&dir_a2).unwrap();
        write_bytes(&dir_a.join("fileA1"), 300);
        write_bytes(&dir_a2.join("fileA2"), 300);

        let (agg, _sink) = aggregator(512);
        let outcome = agg.measure(tmp.path()).unwrap();

        assert_eq!(outcome.root_total, 600);
        assert!(!outcome.sizes.contains_key(&dir_a2));
        assert_eq!(outcome.sizes.get(&dir_a), Some(&600));
    }

    #[test]
    fn total_exactly_at_threshold_is_recorded() {
        let tmp = TempDir::new().unwrap();
        let exact = tmp.path().join("exact");
        let shy = tmp.path().join("shy");
        fs::create_dir_all(&exact).unwrap();
        fs::create_dir_all(&shy).unwrap();
        write_bytes(&exact.join("f"), 512);
        write_bytes(&shy.join("f"), 511);

        let (agg, _sink) = aggregator(512);
        let outcome = agg.measure(tmp.path()).unwrap();

        assert_eq!(outcome.sizes.get(&exact), Some(&512));
        assert!(!outcome.sizes.contains_key(&shy));
        // The 511 bytes still count toward the parent.
        assert_eq!(outcome.root_total, 1023);
    }

    #[test]
    fn ignored_entries_are_neither_counted_nor_traversed() {
        let tmp = TempDir::new().unwrap();
        let junk = tmp.path().join("Program Files");
        let junk_inner = junk.join("inner");
        fs::create_dir_all(&junk_inner).unwrap();
        write_bytes(&junk_inner.join("big.bin"), 4096);
        write_bytes(&tmp.path().join("PAGEFILE.SYS"), 2048);
        write_bytes(&tmp.path().join("kept.bin"), 10);

        let filter = IgnoreFilter::from_config(&IgnoreConfig {
            files: vec!["pagefile.sys".to_string()],
            dirs: vec!["program files".to_string()],
        });
        let (agg, sink) = aggregator_with_filter(0, filter);
        let outcome = agg.measure(tmp.path()).unwrap();

        assert_eq!(outcome.root_total, 10);
        // Not traversed at all: even with threshold 0, no entry exists for
        // the ignored subtree.
        assert!(!outcome.sizes.contains_key(&junk));
        assert!(!outcome.sizes.contains_key(&junk_inner));
        assert_eq!(outcome.stats.entries_ignored, 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn all_ignored_directory_behaves_like_empty() {
        let tmp = TempDir::new().unwrap();
        let only_junk = tmp.path().join("only_junk");
        fs::create_dir_all(&only_junk).unwrap();
        write_bytes(&only_junk.join("pagefile.sys"), 9999);

        let (agg, _sink) = aggregator_with_filter(1, IgnoreFilter::default());
        let outcome = agg.measure(tmp.path()).unwrap();

        assert_eq!(outcome.root_total, 0);
        assert!(outcome.sizes.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_contribute_nothing() {
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("real");
        fs::create_dir_all(&real).unwrap();
        write_bytes(&real.join("data.bin"), 100);
        std::os::unix::fs::symlink(&real, tmp.path().join("dir_link")).unwrap();
        std::os::unix::fs::symlink(real.join("data.bin"), tmp.path().join("file_link")).unwrap();

        let (agg, sink) = aggregator(1);
        let outcome = agg.measure(tmp.path()).unwrap();

        assert_eq!(outcome.root_total, 100);
        assert!(!outcome.sizes.contains_key(&tmp.path().join("dir_link")));
        assert_eq!(outcome.stats.entries_skipped, 2);
        assert!(sink.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_is_isolated() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let sealed = tmp.path().join("sealed");
        let open_dir = tmp.path().join("open");
        fs::create_dir_all(&sealed).unwrap();
        fs::create_dir_all(&open_dir).unwrap();
        write_bytes(&sealed.join("hidden.bin"), 500);
        write_bytes(&open_dir.join("visible.bin"), 200);

        fs::set_permissions(&sealed, fs::Permissions::from_mode(0o000)).unwrap();
        // Privileged users ignore mode bits; nothing to observe in that case.
        if fs::read_dir(&sealed).is_ok() {
            fs::set_permissions(&sealed, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let (agg, sink) = aggregator(1);
        let outcome = agg.measure(tmp.path()).unwrap();
        fs::set_permissions(&sealed, fs::Permissions::from_mode(0o755)).unwrap();

        // The sealed subtree contributes 0; the sibling is unaffected.
        assert_eq!(outcome.root_total, 200);
        assert_eq!(outcome.sizes.get(&open_dir), Some(&200));
        assert!(!outcome.sizes.contains_key(&sealed));
        assert_eq!(sink.len(), 1);
        assert!(sink.snapshot()[0].contains("DTP-2201"));
        assert_eq!(outcome.stats.failures, 1);
    }

    #[test]
    fn unlistable_root_yields_zero_and_no_records() {
        let (agg, sink) = aggregator(0);
        let outcome = agg
            .measure(Path::new("/definitely/does/not/exist"))
            .unwrap();

        assert_eq!(outcome.root_total, 0);
        // Even at threshold 0 a failed listing is never recorded.
        assert!(outcome.sizes.is_empty());
        assert_eq!(sink.len(), 1);
        assert!(sink.snapshot()[0].contains("DTP-2201"));
    }

    #[test]
    fn empty_root_records_itself_only_at_zero_threshold() {
        let tmp = TempDir::new().unwrap();

        let (agg, _sink) = aggregator(1);
        let outcome = agg.measure(tmp.path()).unwrap();
        assert_eq!(outcome.root_total, 0);
        assert!(outcome.sizes.is_empty());

        let (agg, _sink) = aggregator(0);
        let outcome = agg.measure(tmp.path()).unwrap();
        assert_eq!(outcome.sizes.get(&tmp.path().to_path_buf()), Some(&0));
    }

    #[test]
    fn repeated_runs_are_identical() {
        let tmp = TempDir::new().unwrap();
        for (dir, size) in [("big", 700usize), ("mid", 600), ("low", 550)] {
            let d = tmp.path().join(dir);
            fs::create_dir_all(&d).unwrap();
            write_bytes(&d.join("payload"), size);
        }

        let (agg_one, _s1) = aggregator(500);
        let (agg_two, _s2) = aggregator(500);
        let first = agg_one.measure(tmp.path()).unwrap();
        let second = agg_two.measure(tmp.path()).unwrap();

        assert_eq!(first.sizes, second.sizes);
        assert_eq!(
            top_n(&first.sizes, 2),
            top_n(&second.sizes, 2),
            "top-N order must be reproducible"
        );
    }

    mod conservation_property {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            /// For any assignment of files to a small fixed directory shape,
            /// every directory total equals the sum of its subtree's files.
            #[test]
            fn totals_equal_subtree_sums(
                placements in proptest::collection::vec((0usize..4, 0usize..2048), 0..24)
            ) {
                let tmp = TempDir::new().unwrap();
                // Shape: root/chain0/chain1 plus root/side.
                let chain0 = tmp.path().join("chain0");
                let chain1 = chain0.join("chain1");
                let side = tmp.path().join("side");
                fs::create_dir_all(&chain1).unwrap();
                fs::create_dir_all(&side).unwrap();
                let dirs = [tmp.path().to_path_buf(), chain0.clone(), chain1.clone(), side.clone()];

                let mut direct = [0u64; 4];
                for (index, (slot, size)) in placements.iter().enumerate() {
                    write_bytes(&dirs[*slot].join(format!("f{index}.bin")), *size);
                    direct[*slot] += *size as u64;
                }
                let expect_chain1 = direct[2];
                let expect_chain0 = direct[1] + expect_chain1;
                let expect_side = direct[3];
                let expect_root = direct[0] + expect_chain0 + expect_side;

                let (agg, sink) = aggregator(0);
                let outcome = agg.measure(tmp.path()).unwrap();

                prop_assert!(sink.is_empty());
                prop_assert_eq!(outcome.root_total, expect_root);
                prop_assert_eq!(outcome.sizes.get(&chain0).copied(), Some(expect_chain0));
                prop_assert_eq!(outcome.sizes.get(&chain1).copied(), Some(expect_chain1));
                prop_assert_eq!(outcome.sizes.get(&side).copied(), Some(expect_side));
            }
        }
    }
}
