//! File processor
//!
//! Drives one file through
//! `pending → stated → read → validated → {skipped | simulated} →
//! transformed → written → verified → cached`, with `failed` reachable from
//! any step.
//!
//! Each file runs under three wrappers, outermost first:
//!
//! 1. the per-path lock table: a concurrent request for the same path waits
//!    for the running one and shares its outcome;
//! 2. the concurrency limiter;
//! 3. the retry loop, where every attempt has its own timeout.
//!
//! A timed-out attempt is abandoned, not killed: its future is dropped, but
//! blocking file I/O already handed to the runtime may still complete.
//!
//! Errors never escape [`FileProcessor::process_file`]; they become
//! [`FileOutcome`]s.

pub mod lock;
pub mod recovery;
pub mod retry;

pub use lock::PathLocks;
pub use recovery::RecoveryStore;
pub use retry::RetryPolicy;

use crate::cache::{CacheEntry, CacheState, CacheStore};
use crate::config::Config;
use crate::error::{KemptError, Result};
use crate::events::{Event, EventBus, FileData, ProcessingContext};
use crate::formatter::{self, merge_options, Formatter, PassthroughFormatter};
use crate::fs_io::{FsIo, LocalFsIo};
use crate::hasher::{hash_bytes, HashAlgorithm};
use crate::limiter::ConcurrencyLimiter;
use crate::session::{lock, Session};
use crate::shutdown::ShutdownToken;
use crate::summary::{FileOutcome, FileStatus};
use crate::validator::ValidatorSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Completed files between background cache saves.
pub const CACHE_SAVE_INTERVAL: usize = 50;

/// Attempts at a final cache save while a background save is in flight.
const FINAL_SAVE_ATTEMPTS: usize = 50;

/// Pluggable collaborators.
#[derive(Clone)]
pub struct ProcessorDeps {
    pub formatter: Arc<dyn Formatter>,
    pub io: Arc<dyn FsIo>,
    pub validators: ValidatorSet,
}

impl ProcessorDeps {
    /// Formatter from configuration, local file I/O, default validators.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            formatter: formatter::from_config(config)?,
            ..Self::default()
        })
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_io(mut self, io: Arc<dyn FsIo>) -> Self {
        self.io = io;
        self
    }
}

impl Default for ProcessorDeps {
    fn default() -> Self {
        Self {
            formatter: Arc::new(PassthroughFormatter),
            io: Arc::new(LocalFsIo),
            validators: ValidatorSet::default(),
        }
    }
}

/// Per-file state carried across attempts.
#[derive(Default)]
struct AttemptState {
    /// Content as first read from disk.
    original: Option<Vec<u8>>,
    recovery_path: Option<PathBuf>,
}

#[derive(Clone)]
pub struct FileProcessor {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<Config>,
    bus: Arc<EventBus>,
    deps: ProcessorDeps,
    cache: Arc<Mutex<CacheState>>,
    store: Arc<CacheStore>,
    locks: Arc<PathLocks>,
    limiter: ConcurrencyLimiter,
    recovery: RecoveryStore,
    shutdown: ShutdownToken,
    retry: RetryPolicy,
    timeout: Duration,
    algorithm: HashAlgorithm,
    completed: AtomicUsize,
}

impl FileProcessor {
    pub fn new(session: &Session, deps: ProcessorDeps) -> Self {
        let config = Arc::clone(session.config());
        Self {
            inner: Arc::new(Inner {
                retry: RetryPolicy::new(config.retries),
                timeout: config.timeout(),
                algorithm: config.hash_algorithm(),
                bus: Arc::clone(session.bus()),
                deps,
                cache: Arc::clone(session.cache()),
                store: Arc::clone(session.cache_store()),
                locks: Arc::clone(session.locks()),
                limiter: session.limiter().clone(),
                recovery: session.recovery().clone(),
                shutdown: session.shutdown().clone(),
                completed: AtomicUsize::new(0),
                config,
            }),
        }
    }

    /// Replace the retry policy (tests use short backoff).
    pub fn with_retry_policy(self, retry: RetryPolicy) -> Self {
        let inner = match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner,
            Err(shared) => {
                warn!("Retry policy change ignored on a shared processor");
                return Self { inner: shared };
            }
        };
        Self {
            inner: Arc::new(Inner { retry, ..inner }),
        }
    }

    /// Process `files` concurrently. Outcomes are returned in input order.
    pub async fn process_all(&self, files: Vec<PathBuf>) -> Vec<FileOutcome> {
        let handles: Vec<_> = files
            .into_iter()
            .map(|path| {
                let this = self.clone();
                let task_path = path.clone();
                let handle = tokio::spawn(async move { this.process_file(&task_path).await });
                (path, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (path, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(file = %path.display(), error = %e, "File task did not complete");
                    let err = KemptError::InvalidState(format!("file task did not complete: {}", e));
                    outcomes.push(FileOutcome::failure(path, &err));
                }
            }
        }
        outcomes
    }

    /// Process one file. Never fails; errors are recorded in the outcome.
    pub async fn process_file(&self, path: &Path) -> FileOutcome {
        if self.inner.shutdown.is_triggered() {
            return self.rejected(path);
        }
        let (outcome, led) = self
            .inner
            .locks
            .run_exclusive(path, || self.inner.limiter.run(self.execute(path)))
            .await;
        if !led {
            debug!(file = %path.display(), "Shared outcome of concurrent request");
        }
        outcome
    }

    fn rejected(&self, path: &Path) -> FileOutcome {
        let err = KemptError::ShutdownAborted(path.to_path_buf());
        debug!(file = %path.display(), "Rejected, shutdown in progress");
        let mut outcome = FileOutcome::failure(path.to_path_buf(), &err);
        outcome.attempts = 0;
        outcome
    }

    /// Retry loop around [`Self::attempt`].
    async fn execute(&self, path: &Path) -> FileOutcome {
        let inner = &self.inner;
        // Queued behind the limiter while shutdown began: not started yet.
        if inner.shutdown.is_triggered() {
            return self.rejected(path);
        }

        let start = Instant::now();
        let mut state = AttemptState::default();
        let mut attempts = 0;

        let result = loop {
            if inner.shutdown.is_triggered() {
                break Err(KemptError::ShutdownAborted(path.to_path_buf()));
            }
            attempts += 1;

            let result = match tokio::time::timeout(inner.timeout, self.attempt(path, &mut state)).await {
                Ok(result) => result,
                Err(_) => Err(KemptError::Timeout {
                    path: path.to_path_buf(),
                    timeout: inner.timeout,
                }),
            };

            let err = match result {
                Ok(status) => break Ok(status),
                Err(err) => err,
            };
            self.save_recovery_copy(path, &mut state);

            if !err.is_retryable() || attempts >= inner.retry.max_attempts() {
                break Err(err);
            }
            let delay = inner.retry.delay_for(attempts);
            warn!(
                file = %path.display(),
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Attempt failed, retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = inner.shutdown.triggered() => {}
            }
        };

        let mut outcome = match result {
            Ok(status) => FileOutcome::success(path.to_path_buf(), status),
            Err(err) => {
                error!(file = %path.display(), kind = err.kind(), error = %err, "File failed");
                let mut outcome = FileOutcome::failure(path.to_path_buf(), &err);
                outcome.recovery_path = state.recovery_path.take();
                outcome
            }
        };
        outcome.attempts = attempts;
        outcome.duration = start.elapsed();

        inner.bus.notify(Event::FileProcessed {
            file: path,
            duration: outcome.duration,
            status: outcome.status.as_str(),
        });
        self.completed();
        outcome
    }

    /// One pass through the state machine.
    async fn attempt(&self, path: &Path, state: &mut AttemptState) -> Result<FileStatus> {
        let inner = &self.inner;
        let config = &inner.config;

        self.emit(Event::BeforeValidate { file: path })?;
        let stat = inner.deps.io.stat(path).await?;
        self.emit(Event::Validate { file: path, size: stat.len })?;
        if stat.len > config.max_file_size {
            let reason = format!(
                "file is {} bytes, exceeding the {} byte limit",
                stat.len, config.max_file_size
            );
            return self.invalid(path, reason);
        }

        let bytes = inner.deps.io.read(path).await?;
        if state.original.is_none() {
            state.original = Some(bytes.clone());
        }
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => return self.invalid(path, "content is not valid UTF-8".to_string()),
        };
        let fingerprint = hash_bytes(text.as_bytes(), inner.algorithm);
        let extension = extension_of(path);

        if !text.is_empty() {
            if let Err(reason) = inner.deps.validators.check(&extension, &text) {
                return self.invalid(path, reason);
            }
        }
        self.emit(Event::Validated {
            file: path,
            valid: true,
            reason: None,
        })?;

        let hit = lock(&inner.cache).is_hit(path, &fingerprint, stat.modified_ms);
        if hit {
            self.emit(Event::CacheHit { file: path })?;
            debug!(file = %path.display(), "Cache hit, skipping");
            return Ok(FileStatus::Skipped);
        }
        self.emit(Event::CacheMiss { file: path })?;

        let mut data = FileData {
            path: path.to_path_buf(),
            extension,
            content: text.clone(),
            original_fingerprint: fingerprint.clone(),
            context: ProcessingContext::default(),
        };
        let formatted = match self.transform(path, &mut data).await {
            Ok(formatted) => formatted,
            Err(err) => {
                inner.bus.notify(Event::FormatError {
                    file: path,
                    error: &err.to_string(),
                });
                return Err(err);
            }
        };

        if formatted == text {
            self.record(path, fingerprint, stat.modified_ms);
            debug!(file = %path.display(), "Already formatted");
            return Ok(FileStatus::Unchanged);
        }

        if config.dry_run {
            info!(file = %path.display(), "Would format (dry run)");
            return Ok(FileStatus::WouldFormat);
        }

        let expected = hash_bytes(formatted.as_bytes(), inner.algorithm);
        inner.deps.io.write(path, formatted.as_bytes()).await?;

        let written = inner.deps.io.read(path).await?;
        let actual = hash_bytes(&written, inner.algorithm);
        if actual != expected {
            return Err(KemptError::IntegrityMismatch {
                subject: path.display().to_string(),
                expected,
                actual,
            });
        }

        let after = inner.deps.io.stat(path).await?;
        self.record(path, expected, after.modified_ms);
        info!(file = %path.display(), bytes = written.len(), "Formatted");
        Ok(FileStatus::Formatted)
    }

    /// `format:before` → formatter → `format:after`.
    async fn transform(&self, path: &Path, data: &mut FileData) -> Result<String> {
        let inner = &self.inner;
        self.emit(Event::FormatBefore(&mut *data))?;

        let file_specific = inner.deps.formatter.resolve_config(path).await?;
        let options = merge_options(
            file_specific,
            &inner.config.project_formatter_options,
            &inner.config.formatter.options,
        );
        let formatted = inner.deps.formatter.format(&data.content, path, &options).await?;

        self.emit(Event::FormatAfter {
            file: path,
            formatted_content: &formatted,
            context: &data.context,
        })?;
        Ok(formatted)
    }

    fn invalid(&self, path: &Path, reason: String) -> Result<FileStatus> {
        debug!(file = %path.display(), reason = %reason, "Validation failed");
        self.emit(Event::Validated {
            file: path,
            valid: false,
            reason: Some(reason.as_str()),
        })?;
        Err(KemptError::Validation {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn emit(&self, mut event: Event<'_>) -> Result<()> {
        self.inner.bus.emit(&mut event)
    }

    /// Update the in-memory cache. No await between read and write.
    fn record(&self, path: &Path, fingerprint: String, modified_ms: i64) {
        lock(&self.inner.cache).insert(
            path,
            CacheEntry {
                fingerprint,
                modified_ms,
            },
        );
    }

    /// Keep the first-read original outside the project tree.
    fn save_recovery_copy(&self, path: &Path, state: &mut AttemptState) {
        if state.recovery_path.is_some() {
            return;
        }
        let Some(original) = &state.original else {
            return;
        };
        match self.inner.recovery.save(path, original) {
            Ok(dest) => state.recovery_path = Some(dest),
            Err(e) => error!(file = %path.display(), error = %e, "Failed to save recovery copy"),
        }
    }

    fn completed(&self) {
        let done = self.inner.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if done % CACHE_SAVE_INTERVAL == 0 {
            self.save_cache_in_background();
        }
    }

    fn save_cache_in_background(&self) {
        let snapshot = lock(&self.inner.cache).clone();
        let store = Arc::clone(&self.inner.store);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = store.save(&snapshot) {
                warn!(path = %store.path().display(), error = %e, "Background cache save failed");
            }
        });
    }

    /// Persist the current cache, waiting out any background save.
    pub async fn save_cache(&self) -> Result<()> {
        for _ in 0..FINAL_SAVE_ATTEMPTS {
            let snapshot = lock(&self.inner.cache).clone();
            let store = Arc::clone(&self.inner.store);
            let saved = tokio::task::spawn_blocking(move || store.save(&snapshot))
                .await
                .map_err(|e| KemptError::InvalidState(format!("cache save task failed: {}", e)))??;
            if saved {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Err(KemptError::InvalidState(
            "cache save kept colliding with an in-flight save".to_string(),
        ))
    }

    pub fn files_completed(&self) -> usize {
        self.inner.completed.load(Ordering::Acquire)
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::names;
    use crate::formatter::FormatOptions;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    /// Uppercases content and counts invocations.
    #[derive(Default)]
    struct UpperFormatter {
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Formatter for UpperFormatter {
        fn name(&self) -> &str {
            "upper"
        }

        async fn format(&self, text: &str, _path: &Path, _options: &FormatOptions) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(text.to_uppercase())
        }
    }

    /// Fails a fixed number of times, then succeeds.
    struct FlakyFormatter {
        failures_left: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Formatter for FlakyFormatter {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn format(&self, text: &str, _path: &Path, _options: &FormatOptions) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(KemptError::Formatter("transient".to_string()));
            }
            Ok(text.to_uppercase())
        }
    }

    /// Records the merged options it was called with.
    #[derive(Default)]
    struct OptionsProbe {
        seen: Mutex<Option<FormatOptions>>,
    }

    #[async_trait]
    impl Formatter for OptionsProbe {
        fn name(&self) -> &str {
            "probe"
        }

        async fn resolve_config(&self, _path: &Path) -> Result<FormatOptions> {
            let mut file = FormatOptions::new();
            file.insert("tabWidth".into(), 8.into());
            file.insert("endOfLine".into(), "crlf".into());
            Ok(file)
        }

        async fn format(&self, text: &str, _path: &Path, options: &FormatOptions) -> Result<String> {
            *self.seen.lock().unwrap() = Some(options.clone());
            Ok(text.to_string())
        }
    }

    struct Fixture {
        temp: TempDir,
        root: PathBuf,
        session: Session,
    }

    fn fixture_with(config_fn: impl FnOnce(&mut Config), bus: EventBus) -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("project");
        fs::create_dir(&root).unwrap();
        let root = root.canonicalize().unwrap();
        let mut config = Config::for_root(&root);
        config.home = Some(temp.path().join("home"));
        config.retries = 0;
        config_fn(&mut config);
        let session = Session::new(Arc::new(config), Arc::new(bus));
        Fixture { temp, root, session }
    }

    fn fixture() -> Fixture {
        fixture_with(|_| {}, EventBus::new())
    }

    fn processor(f: &Fixture, formatter: Arc<dyn Formatter>) -> FileProcessor {
        FileProcessor::new(&f.session, ProcessorDeps::default().with_formatter(formatter))
            .with_retry_policy(RetryPolicy::new(f.session.config().retries).with_base(Duration::from_millis(1)))
    }

    fn write(f: &Fixture, name: &str, content: &str) -> PathBuf {
        let path = f.root.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_formats_and_records_cache() {
        let f = fixture();
        let path = write(&f, "a.js", "let a = 1;");
        let p = processor(&f, Arc::new(UpperFormatter::default()));

        let outcome = p.process_file(&path).await;
        assert_eq!(outcome.status, FileStatus::Formatted);
        assert_eq!(fs::read_to_string(&path).unwrap(), "LET A = 1;");

        let cache = f.session.cache_snapshot();
        let entry = cache.get(&path).unwrap();
        assert_eq!(entry.fingerprint, hash_bytes(b"LET A = 1;", HashAlgorithm::Sha256));
    }

    #[tokio::test]
    async fn test_second_pass_is_skipped() {
        let f = fixture();
        let path = write(&f, "a.js", "let a = 1;");
        let formatter = Arc::new(UpperFormatter::default());
        let p = processor(&f, formatter.clone());

        p.process_file(&path).await;
        let again = p.process_file(&path).await;
        assert_eq!(again.status, FileStatus::Skipped);
        assert_eq!(formatter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_touched_file_with_same_content_is_reprocessed() {
        // Two-factor cache heuristic: an mtime change alone defeats the hit,
        // even though the content fingerprint still matches.
        let f = fixture();
        let path = write(&f, "a.js", "A");
        let formatter = Arc::new(UpperFormatter::default());
        let p = processor(&f, formatter.clone());

        assert_eq!(p.process_file(&path).await.status, FileStatus::Unchanged);
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

        assert_eq!(p.process_file(&path).await.status, FileStatus::Unchanged);
        assert_eq!(formatter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_json_is_not_written_or_retried() {
        let f = fixture_with(|c| c.retries = 3, EventBus::new());
        let path = write(&f, "b.json", "{ \"a\": ");
        let formatter = Arc::new(UpperFormatter::default());
        let p = processor(&f, formatter.clone());

        let outcome = p.process_file(&path).await;
        assert_eq!(outcome.status, FileStatus::Failed);
        assert_eq!(outcome.attempts, 1);
        let error = outcome.error.unwrap();
        assert_eq!(error.kind, "validation");
        assert!(error.message.contains("invalid JSON"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ \"a\": ");
        assert_eq!(formatter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_file_is_valid() {
        let f = fixture();
        let path = write(&f, "empty.json", "");
        let p = processor(&f, Arc::new(UpperFormatter::default()));
        assert_eq!(p.process_file(&path).await.status, FileStatus::Unchanged);
    }

    #[tokio::test]
    async fn test_oversized_file_rejected_without_reading() {
        let f = fixture_with(|c| c.max_file_size = 4, EventBus::new());
        let path = write(&f, "big.js", "0123456789");
        let p = processor(&f, Arc::new(UpperFormatter::default()));

        let outcome = p.process_file(&path).await;
        assert_eq!(outcome.error.unwrap().kind, "validation");
        // Nothing was read, so there is nothing to recover.
        assert!(outcome.recovery_path.is_none());
    }

    #[tokio::test]
    async fn test_dry_run_does_not_write() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        let sink = Arc::clone(&seen);
        bus.on("test", "format:*", move |event| {
            sink.lock().unwrap().push(event.name());
            Ok(())
        });
        let f = fixture_with(|c| c.dry_run = true, bus);
        let path = write(&f, "a.js", "let a = 1;");
        let p = processor(&f, Arc::new(UpperFormatter::default()));

        let outcome = p.process_file(&path).await;
        assert_eq!(outcome.status, FileStatus::WouldFormat);
        assert_eq!(fs::read_to_string(&path).unwrap(), "let a = 1;");
        assert!(f.session.cache_snapshot().get(&path).is_none());
        assert_eq!(*seen.lock().unwrap(), vec![names::FORMAT_BEFORE, names::FORMAT_AFTER]);
    }

    #[tokio::test]
    async fn test_retries_transient_formatter_errors() {
        let f = fixture_with(|c| c.retries = 2, EventBus::new());
        let path = write(&f, "a.js", "x");
        let formatter = Arc::new(FlakyFormatter {
            failures_left: AtomicUsize::new(2),
            calls: AtomicUsize::new(0),
        });
        let p = processor(&f, formatter.clone());

        let outcome = p.process_file(&path).await;
        assert_eq!(outcome.status, FileStatus::Formatted);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(formatter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_leave_recovery_copy() {
        let f = fixture_with(|c| c.retries = 1, EventBus::new());
        let path = write(&f, "a.js", "original");
        let formatter = Arc::new(FlakyFormatter {
            failures_left: AtomicUsize::new(5),
            calls: AtomicUsize::new(0),
        });
        let p = processor(&f, formatter);

        let outcome = p.process_file(&path).await;
        assert_eq!(outcome.status, FileStatus::Failed);
        assert_eq!(outcome.attempts, 2);
        let recovery = outcome.recovery_path.unwrap();
        assert!(recovery.starts_with(f.temp.path().join("home")));
        assert!(!recovery.starts_with(&f.root));
        assert_eq!(fs::read_to_string(recovery).unwrap(), "original");
    }

    #[tokio::test]
    async fn test_timeout_fails_attempt() {
        let f = fixture_with(|c| c.timeout_ms = 20, EventBus::new());
        let path = write(&f, "a.js", "x");
        let formatter = Arc::new(UpperFormatter {
            calls: AtomicUsize::new(0),
            delay: Some(Duration::from_millis(500)),
        });
        let p = processor(&f, formatter);

        let outcome = p.process_file(&path).await;
        assert_eq!(outcome.error.unwrap().kind, "timeout");
        assert_eq!(fs::read_to_string(&path).unwrap(), "x");
    }

    #[tokio::test]
    async fn test_listener_error_fails_only_that_file() {
        let mut bus = EventBus::new();
        bus.on("picky", names::FORMAT_BEFORE, |event| {
            let data = event.file_data_mut().ok_or("no data")?;
            if data.path.ends_with("bad.js") {
                return Err("refusing bad.js".into());
            }
            Ok(())
        });
        let f = fixture_with(|_| {}, bus);
        let bad = write(&f, "bad.js", "x");
        let good = write(&f, "good.js", "y");
        let p = processor(&f, Arc::new(UpperFormatter::default()));

        let outcomes = p.process_all(vec![bad.clone(), good.clone()]).await;
        assert_eq!(outcomes[0].error.as_ref().unwrap().kind, "extension");
        assert_eq!(outcomes[1].status, FileStatus::Formatted);
        assert_eq!(fs::read_to_string(&bad).unwrap(), "x");
    }

    #[tokio::test]
    async fn test_option_precedence() {
        let f = fixture_with(
            |c| {
                c.formatter.options.insert("tabWidth".into(), 2.into());
                c.project_formatter_options.insert("tabWidth".into(), 4.into());
                c.project_formatter_options.insert("semi".into(), false.into());
            },
            EventBus::new(),
        );
        let path = write(&f, "a.js", "x");
        let probe = Arc::new(OptionsProbe::default());
        let p = processor(&f, probe.clone());
        p.process_file(&path).await;

        let seen = probe.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen["tabWidth"], 2);
        assert_eq!(seen["semi"], false);
        assert_eq!(seen["endOfLine"], "crlf");
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_files() {
        let f = fixture();
        let path = write(&f, "a.js", "x");
        let formatter = Arc::new(UpperFormatter::default());
        let p = processor(&f, formatter.clone());

        f.session.shutdown().trigger();
        let outcome = p.process_file(&path).await;
        assert_eq!(outcome.error.unwrap().kind, "shutdown_aborted");
        assert_eq!(outcome.attempts, 0);
        assert_eq!(formatter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_outcomes_follow_submission_order() {
        let f = fixture_with(|c| c.concurrency = 4, EventBus::new());
        let files: Vec<_> = (0..12).map(|i| write(&f, &format!("f{}.js", i), "x")).collect();
        let p = processor(&f, Arc::new(UpperFormatter::default()));

        let outcomes = p.process_all(files.clone()).await;
        let paths: Vec<_> = outcomes.into_iter().map(|o| o.path).collect();
        assert_eq!(paths, files);
        assert_eq!(p.files_completed(), 12);
    }

    #[tokio::test]
    async fn test_save_cache_persists_entries() {
        let f = fixture();
        let path = write(&f, "a.js", "x");
        let p = processor(&f, Arc::new(UpperFormatter::default()));
        p.process_file(&path).await;
        p.save_cache().await.unwrap();

        let loaded = f.session.cache_store().load();
        assert!(loaded.get(&path).is_some());
    }
}
