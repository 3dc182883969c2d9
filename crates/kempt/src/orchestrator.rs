//! Run orchestrator
//!
//! Owns a [`Session`] and sequences each pass:
//!
//! ```text
//! initializing → scanning → [backing-up] → processing → reporting → idle
//! ```
//!
//! In watch mode the first full pass is followed by `watching`: filesystem
//! notifications are buffered for one debounce window and then processed as
//! a pass over exactly the changed paths, without rescanning the tree.
//!
//! # Shutdown
//!
//! [`Orchestrator::graceful_shutdown`] sets the session's shutdown flag (new
//! files are rejected), stops the watcher, drops any pending debounce batch,
//! waits until the limiter reports no active or queued file tasks, saves the
//! cache and emits `session:stop`. In-flight transforms are waited for, never
//! killed.

use crate::backup::BackupArchiver;
use crate::config::Config;
use crate::error::{KemptError, Result};
use crate::events::{Event, EventBus};
use crate::extension::ExtensionRegistry;
use crate::ignore_rules::IgnoreMatcher;
use crate::processor::{FileProcessor, ProcessorDeps, RetryPolicy};
use crate::scanner::{ScanEntry, ScanResult, Scanner, DEFAULT_STREAM_CAPACITY};
use crate::session::{lock, Session, SessionState};
use crate::summary::{RunSummary, RunTimings};
use crate::watch;
use notify::RecommendedWatcher;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

static PANIC_HOOK: Once = Once::new();

/// Log panics through `tracing` before the default hook runs. Installed once
/// per process; a panic does not itself stop the session.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            error!(panic = %info, "Uncaught panic");
            previous(info);
        }));
    });
}

pub struct Orchestrator {
    session: Arc<Session>,
    processor: FileProcessor,
    scanner: Scanner,
    archiver: Option<BackupArchiver>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    stopping: AtomicBool,
}

impl Orchestrator {
    /// Resolve configuration, load extensions, create the session.
    ///
    /// Configuration errors are fatal. Extension load errors are logged and
    /// the extension is skipped.
    pub async fn initialize(
        config: Config,
        registry: &ExtensionRegistry,
        deps: ProcessorDeps,
    ) -> Result<Self> {
        let config = Arc::new(config.resolve()?);

        let mut bus = EventBus::new();
        let loaded = registry.load_all(&config, &mut bus);

        let matcher = IgnoreMatcher::new(&config.root, &config.ignore)?;
        if let Some(path) = matcher.vcs_ignore_path() {
            bus.notify(Event::GitignoreLoaded { path });
        }
        let matcher = Arc::new(matcher);

        let session = Arc::new(Session::new(Arc::clone(&config), Arc::new(bus)));
        let scanner = Scanner::new(&config, matcher);
        let archiver = config.backup.enabled.then(|| {
            BackupArchiver::new(config.backup_dir(), scanner.clone(), config.hash_algorithm())
        });
        let processor = FileProcessor::new(&session, deps);

        install_panic_hook();
        info!(
            session_id = %session.id(),
            root = %config.root.display(),
            extensions = loaded.len(),
            "Session started"
        );
        session.bus().notify(Event::SessionStart {
            session_id: session.id(),
        });
        session.set_state(SessionState::Idle);

        Ok(Self {
            session,
            processor,
            scanner,
            archiver,
            watcher: Mutex::new(None),
            stopping: AtomicBool::new(false),
        })
    }

    /// Replace the processor's retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.processor = self.processor.with_retry_policy(retry);
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn processor(&self) -> &FileProcessor {
        &self.processor
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn archiver(&self) -> Option<&BackupArchiver> {
        self.archiver.as_ref()
    }

    fn config(&self) -> &Config {
        self.session.config()
    }

    /// One full pass: scan, optional backup, process, report.
    pub async fn run_once(&self) -> Result<RunSummary> {
        match self.full_pass().await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                error!(error = %e, "Run failed");
                self.session.bus().notify(Event::RunError {
                    error: &e.to_string(),
                });
                self.session.set_state(SessionState::Idle);
                Err(e)
            }
        }
    }

    async fn full_pass(&self) -> Result<RunSummary> {
        let total_start = Instant::now();
        let mut timings = RunTimings::default();

        self.session.set_state(SessionState::Scanning);
        let scan_start = Instant::now();
        let scan = self.scan().await?;
        timings.scan = scan_start.elapsed();

        let mut backup_name = None;
        if let Some(archiver) = &self.archiver {
            self.session.set_state(SessionState::BackingUp);
            let backup_start = Instant::now();
            backup_name = self.backup(archiver, &scan.files).await;
            timings.backup = backup_start.elapsed();
        }

        let mut summary = self.process(scan.files).await?;
        timings.processing = summary.timings.processing;
        timings.total = total_start.elapsed();
        summary.timings = timings;
        summary.backup = backup_name;
        Ok(summary)
    }

    /// Consume the scanner's stream, announcing ignored paths as the walk
    /// reaches them. The file list is collected in full before returning
    /// because the backup snapshots exactly that set.
    async fn scan(&self) -> Result<ScanResult> {
        let start = Instant::now();
        let bus = self.session.bus();
        let mut rx = self.scanner.stream(DEFAULT_STREAM_CAPACITY);
        let mut scan = ScanResult::default();

        while let Some(entry) = rx.recv().await {
            match entry {
                ScanEntry::File(path) => scan.files.push(path),
                ScanEntry::Ignored { path, rule } => {
                    bus.notify(Event::FileIgnored {
                        file: &path,
                        reason: &rule.reason(),
                    });
                    scan.ignored.push((path, rule));
                }
                ScanEntry::Diagnostic(diag) => {
                    warn!(path = ?diag.path, message = %diag.message, "Scan diagnostic");
                    scan.diagnostics.push(diag);
                }
            }
        }
        scan.duration = start.elapsed();

        info!(
            files = scan.files.len(),
            ignored = scan.ignored.len(),
            diagnostics = scan.diagnostics.len(),
            duration_ms = scan.duration.as_millis() as u64,
            "Scan complete"
        );
        bus.notify(Event::ScanComplete {
            file_count: scan.files.len(),
        });
        Ok(scan)
    }

    /// Snapshot `files`. Failure is reported but never blocks the run.
    async fn backup(&self, archiver: &BackupArchiver, files: &[PathBuf]) -> Option<String> {
        let archiver = archiver.clone();
        let files = files.to_vec();
        let retention = self.config().backup.retention;

        let result = tokio::task::spawn_blocking(move || {
            let handle = archiver.create_backup(&files)?;
            if let Err(e) = archiver.clean_backups(retention) {
                warn!(error = %e, "Backup retention cleanup failed");
            }
            Ok::<_, KemptError>(handle)
        })
        .await
        .map_err(|e| KemptError::InvalidState(format!("backup task failed: {}", e)))
        .and_then(|r| r);

        let bus = self.session.bus();
        match result {
            Ok(handle) => {
                bus.notify(Event::BackupComplete {
                    name: &handle.name,
                    file_count: handle.file_count,
                });
                Some(handle.name)
            }
            Err(e) => {
                warn!(error = %e, "Backup failed, continuing without one");
                bus.notify(Event::BackupError {
                    error: &e.to_string(),
                });
                None
            }
        }
    }

    /// Process `files` and report.
    async fn process(&self, files: Vec<PathBuf>) -> Result<RunSummary> {
        let bus = self.session.bus();
        self.session.set_state(SessionState::Processing);
        bus.notify(Event::RunStart {
            file_count: files.len(),
        });

        let start = Instant::now();
        let outcomes = self.processor.process_all(files).await;
        let mut summary = RunSummary::from_outcomes(outcomes, self.config().dry_run);
        summary.timings.processing = start.elapsed();
        summary.timings.total = summary.timings.processing;

        self.session.set_state(SessionState::Reporting);
        if let Err(e) = self.processor.save_cache().await {
            warn!(error = %e, "Failed to save cache");
        }
        bus.notify(Event::RunComplete { summary: &summary });
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            formatted = summary.formatted,
            skipped = summary.skipped,
            "Run complete"
        );

        if !self.session.shutdown().is_triggered() {
            self.session.set_state(SessionState::Idle);
        }
        Ok(summary)
    }

    /// Process an explicit set of changed paths (watch batches).
    ///
    /// Paths that no longer exist, are not targets or are ignored are
    /// dropped.
    pub async fn process_changes(&self, paths: Vec<PathBuf>) -> Result<RunSummary> {
        let eligible: Vec<PathBuf> = paths
            .into_iter()
            .filter(|p| p.is_file())
            .filter(|p| match self.scanner.accepts(p) {
                Ok(()) => true,
                Err(Some(rule)) => {
                    self.session.bus().notify(Event::FileIgnored {
                        file: p,
                        reason: &rule.reason(),
                    });
                    false
                }
                Err(None) => false,
            })
            .collect();
        debug!(files = eligible.len(), "Processing watch batch");
        self.process(eligible).await
    }

    /// Full pass, then process debounced changes until shutdown.
    ///
    /// `on_pass` receives every summary, starting with the full pass.
    pub async fn watch<F>(&self, mut on_pass: F) -> Result<()>
    where
        F: FnMut(&RunSummary),
    {
        let first = self.run_once().await?;
        on_pass(&first);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = watch::spawn_watcher(&self.config().root, tx)?;
        *lock(&self.watcher) = Some(watcher);
        self.session.set_state(SessionState::Watching);
        info!(root = %self.config().root.display(), "Watching for changes");

        let window = self.config().debounce();
        let shutdown = self.session.shutdown().clone();
        loop {
            let deadline = self.session.debounce().deadline();
            tokio::select! {
                _ = shutdown.triggered() => break,
                received = rx.recv() => match received {
                    Some(path) => self.buffer_change(path, window),
                    None => break,
                },
                _ = sleep_until(deadline), if deadline.is_some() => {
                    let batch = self.session.debounce().take();
                    if batch.is_empty() {
                        continue;
                    }
                    match self.process_changes(batch).await {
                        Ok(summary) => on_pass(&summary),
                        Err(e) => {
                            error!(error = %e, "Watch pass failed");
                            self.session.bus().notify(Event::RunError { error: &e.to_string() });
                        }
                    }
                    if !shutdown.is_triggered() {
                        self.session.set_state(SessionState::Watching);
                    }
                }
            }
        }
        debug!("Watch loop stopped");
        Ok(())
    }

    fn buffer_change(&self, path: PathBuf, window: Duration) {
        let mut buffer = self.session.debounce();
        buffer.push(path, tokio::time::Instant::now(), window);
    }

    /// Stop accepting work, wait for in-flight files, persist, and stop.
    /// Calling it again is a no-op.
    pub async fn graceful_shutdown(&self) -> Result<()> {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let session = &self.session;
        let bus = session.bus();
        info!(session_id = %session.id(), "Shutting down");
        bus.notify(Event::SessionShutdownStart {
            session_id: session.id(),
        });
        session.set_state(SessionState::ShuttingDown);

        session.shutdown().trigger();
        if lock(&self.watcher).take().is_some() {
            debug!("File watcher stopped");
        }
        session.debounce().cancel();

        let limiter = session.limiter();
        if !limiter.is_idle() {
            info!(active = limiter.active(), queued = limiter.queued(), "Waiting for in-flight files");
        }
        limiter.drain().await;

        let saved = self.processor.save_cache().await;
        if let Err(e) = &saved {
            warn!(error = %e, "Failed to save cache during shutdown");
        }

        bus.notify(Event::SessionStop {
            session_id: session.id(),
        });
        session.set_state(SessionState::Stopped);
        info!(session_id = %session.id(), "Session stopped");
        saved
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("session", &self.session)
            .field("backup", &self.archiver.is_some())
            .finish()
    }
}
