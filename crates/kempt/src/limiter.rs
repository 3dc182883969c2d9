//! Concurrency limiter for file tasks
//!
//! A semaphore admits at most N tasks; counters expose how many are running
//! and how many are waiting so shutdown can poll for quiescence.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Interval between quiescence checks during shutdown.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    semaphore: Semaphore,
    limit: usize,
    active: AtomicUsize,
    queued: AtomicUsize,
}

/// Decrements a counter on drop, so cancelled futures keep counts accurate.
struct CountGuard<'a>(&'a AtomicUsize);

impl<'a> CountGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ConcurrencyLimiter {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            inner: Arc::new(Inner {
                semaphore: Semaphore::new(limit),
                limit,
                active: AtomicUsize::new(0),
                queued: AtomicUsize::new(0),
            }),
        }
    }

    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn queued(&self) -> usize {
        self.inner.queued.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.active() == 0 && self.queued() == 0
    }

    /// Run `task` once a slot is free.
    pub async fn run<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let permit = {
            let _queued = CountGuard::new(&self.inner.queued);
            // The semaphore is never closed.
            self.inner.semaphore.acquire().await
        };
        let _active = CountGuard::new(&self.inner.active);
        let output = task.await;
        drop(permit);
        output
    }

    /// Wait until no task is running or waiting.
    pub async fn drain(&self) {
        while !self.is_idle() {
            debug!(active = self.active(), queued = self.queued(), "Waiting for file tasks to finish");
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}
