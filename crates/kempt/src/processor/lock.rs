//! Per-path in-flight table
//!
//! The first request for a path runs the work; concurrent requests for the
//! same path wait on the same cell and receive a clone of its outcome. The
//! entry is removed once the leader finishes, so a later request starts fresh.

use crate::summary::FileOutcome;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<FileOutcome>>;

#[derive(Debug, Default)]
pub struct PathLocks {
    table: Mutex<HashMap<PathBuf, Slot>>,
}

/// Removes the leader's entry when dropped, including on cancellation.
struct LeaderGuard<'a> {
    locks: &'a PathLocks,
    path: &'a Path,
    slot: Slot,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        let mut table = self.locks.lock_table();
        if table
            .get(self.path)
            .map(|current| Arc::ptr_eq(current, &self.slot))
            .unwrap_or(false)
        {
            table.remove(self.path);
        }
    }
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_table(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Slot>> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of paths currently in flight.
    pub fn in_flight(&self) -> usize {
        self.lock_table().len()
    }

    /// Run `work` for `path` unless it is already running, in which case wait
    /// for the running instance. Returns the outcome and whether this caller
    /// did the work.
    pub async fn run_exclusive<F, Fut>(&self, path: &Path, work: F) -> (FileOutcome, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FileOutcome>,
    {
        let (slot, leader) = {
            let mut table = self.lock_table();
            match table.get(path) {
                Some(slot) => (Arc::clone(slot), false),
                None => {
                    let slot: Slot = Arc::new(OnceCell::new());
                    table.insert(path.to_path_buf(), Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if leader {
            let _guard = LeaderGuard {
                locks: self,
                path,
                slot: Arc::clone(&slot),
            };
            let outcome = slot.get_or_init(work).await.clone();
            (outcome, true)
        } else {
            // If the leader was cancelled before finishing, the first waiter
            // to get here runs the work instead.
            let mut ran = false;
            let outcome = slot
                .get_or_init(|| {
                    ran = true;
                    work()
                })
                .await
                .clone();
            (outcome, ran)
        }
    }
}
