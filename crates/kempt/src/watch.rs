//! Watch mode plumbing: filesystem notifications and the debounce buffer.
//!
//! Notifications are collected into a [`DebounceBuffer`]. The first path
//! opens a fixed window; when it closes, every distinct path gathered so far
//! is processed in one pass.

use crate::error::Result;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Paths changed within one debounce window, in arrival order.
#[derive(Debug, Default)]
pub struct DebounceBuffer {
    pending: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
    deadline: Option<Instant>,
}

impl DebounceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `path`. The first path after a flush starts the window.
    pub fn push(&mut self, path: PathBuf, now: Instant, window: std::time::Duration) {
        if self.deadline.is_none() {
            self.deadline = Some(now + window);
        }
        if self.seen.insert(path.clone()) {
            self.pending.push(path);
        }
    }

    /// When the current window closes, if one is open.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drain the batch and close the window.
    pub fn take(&mut self) -> Vec<PathBuf> {
        self.deadline = None;
        self.seen.clear();
        std::mem::take(&mut self.pending)
    }

    /// Discard pending paths and the timer.
    pub fn cancel(&mut self) {
        let dropped = self.take();
        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), "Discarded pending watch changes");
        }
    }
}

/// Start a recursive watcher on `root`, forwarding changed paths to `tx`.
///
/// The returned watcher stops when dropped.
pub fn spawn_watcher(root: &Path, tx: mpsc::UnboundedSender<PathBuf>) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
        Ok(event) => {
            if !is_content_change(&event.kind) {
                return;
            }
            for path in event.paths {
                // The receiver is gone once the session stops watching.
                let _ = tx.send(path);
            }
        }
        Err(e) => warn!(error = %e, "File watcher error"),
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    debug!(root = %root.display(), "File watcher started");
    Ok(watcher)
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}
