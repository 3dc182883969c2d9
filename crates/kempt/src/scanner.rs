//! Project file discovery
//!
//! Walks the project root with `walkdir`, pruning ignored directories before
//! descending and yielding files whose extension is a processing target.
//!
//! # Design
//!
//! - [`Scanner::iter`] is lazy: entries are produced as the walk advances.
//!   It is restartable only by calling `iter` again.
//! - [`Scanner::stream`] runs the same walk on a blocking thread and feeds a
//!   bounded channel. The orchestrator consumes it, reporting ignored paths
//!   while the walk is still running.
//! - Yield order follows directory-read order and is stable for an unchanged
//!   tree. Nothing is sorted.
//! - Unreadable directories become [`ScanDiagnostic`]s; the walk continues
//!   with the rest of the tree.

use crate::config::Config;
use crate::ignore_rules::{IgnoreMatch, IgnoreMatcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Default capacity of the streaming channel.
pub const DEFAULT_STREAM_CAPACITY: usize = 1024;

/// One item produced by a walk.
#[derive(Debug, Clone)]
pub enum ScanEntry {
    /// Absolute path of an eligible file.
    File(PathBuf),
    /// A path excluded by an ignore rule. Directories are not descended.
    Ignored { path: PathBuf, rule: IgnoreMatch },
    /// A directory or entry that could not be read.
    Diagnostic(ScanDiagnostic),
}

/// Scan-level error details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanDiagnostic {
    pub path: Option<PathBuf>,
    pub message: String,
}

/// Collected output of a full walk.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub files: Vec<PathBuf>,
    pub ignored: Vec<(PathBuf, IgnoreMatch)>,
    pub diagnostics: Vec<ScanDiagnostic>,
    pub duration: Duration,
}

/// Filesystem scanner bound to one root.
#[derive(Clone)]
pub struct Scanner {
    root: PathBuf,
    matcher: Arc<IgnoreMatcher>,
    extensions: Arc<Vec<String>>,
}

impl Scanner {
    pub fn new(config: &Config, matcher: Arc<IgnoreMatcher>) -> Self {
        Self {
            root: config.root.clone(),
            matcher,
            extensions: Arc::new(config.file_extensions.clone()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazy walk over the tree.
    pub fn iter(&self) -> ScanIter {
        ScanIter {
            root: self.root.clone(),
            walker: WalkDir::new(&self.root).follow_links(false).into_iter(),
            matcher: Arc::clone(&self.matcher),
            extensions: Arc::clone(&self.extensions),
        }
    }

    /// Walk the whole tree and collect the results.
    pub fn scan(&self) -> ScanResult {
        let start = Instant::now();
        info!(root = %self.root.display(), "Starting scan");

        let mut result = ScanResult::default();
        for entry in self.iter() {
            match entry {
                ScanEntry::File(path) => result.files.push(path),
                ScanEntry::Ignored { path, rule } => result.ignored.push((path, rule)),
                ScanEntry::Diagnostic(diag) => result.diagnostics.push(diag),
            }
        }
        result.duration = start.elapsed();

        info!(
            files = result.files.len(),
            ignored = result.ignored.len(),
            diagnostics = result.diagnostics.len(),
            duration_ms = result.duration.as_millis() as u64,
            "Scan complete"
        );
        result
    }

    /// Walk on a blocking thread, sending entries through a bounded channel.
    /// The walk stops early if the receiver is dropped.
    pub fn stream(&self, capacity: usize) -> mpsc::Receiver<ScanEntry> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let scanner = self.clone();
        tokio::task::spawn_blocking(move || {
            for entry in scanner.iter() {
                if tx.blocking_send(entry).is_err() {
                    debug!("Scan stream receiver dropped, stopping walk");
                    break;
                }
            }
        });
        rx
    }

    /// Whether a single path would be yielded by a walk. Used for watch-mode
    /// notifications, which arrive without a pruning walk.
    pub fn accepts(&self, path: &Path) -> Result<(), Option<IgnoreMatch>> {
        if !is_target(path, &self.extensions) {
            return Err(None);
        }
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        match self.matcher.explain_with_parents(rel, false) {
            Some(rule) if rule.is_ignored() => Err(Some(rule)),
            _ => Ok(()),
        }
    }
}

/// Lazy iterator returned by [`Scanner::iter`].
pub struct ScanIter {
    root: PathBuf,
    walker: walkdir::IntoIter,
    matcher: Arc<IgnoreMatcher>,
    extensions: Arc<Vec<String>>,
}

impl Iterator for ScanIter {
    type Item = ScanEntry;

    fn next(&mut self) -> Option<ScanEntry> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf);
                    warn!(path = ?path, error = %err, "Skipping unreadable path");
                    return Some(ScanEntry::Diagnostic(ScanDiagnostic {
                        path,
                        message: err.to_string(),
                    }));
                }
            };

            if entry.depth() == 0 {
                continue;
            }

            let file_type = entry.file_type();
            let is_dir = file_type.is_dir();
            let rel = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());

            if let Some(rule) = self.matcher.explain(rel, is_dir) {
                if rule.is_ignored() {
                    if is_dir {
                        self.walker.skip_current_dir();
                    }
                    return Some(ScanEntry::Ignored {
                        path: entry.into_path(),
                        rule,
                    });
                }
            }

            if !file_type.is_file() {
                continue;
            }
            if !is_target(entry.path(), &self.extensions) {
                continue;
            }
            return Some(ScanEntry::File(entry.into_path()));
        }
    }
}

fn is_target(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            extensions.iter().any(|t| *t == e)
        })
        .unwrap_or(false)
}
