//! Extension event bus
//!
//! A process-local, synchronous, ordered publish/subscribe mechanism.
//! Listeners are registered while extensions initialise and the bus is frozen
//! (shared behind an `Arc`) before the first run. Dispatch calls listeners in
//! registration order on the emitting task.
//!
//! `format:before` carries a mutable [`FileData`]: a listener may rewrite the
//! content, and listeners registered later observe that rewrite. This is how
//! extensions compose into a pipeline.

use crate::error::KemptError;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Error type returned by listeners.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Listener result.
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Box<dyn Fn(&mut Event<'_>) -> HandlerResult + Send + Sync>;

/// Event names, as seen by extensions.
pub mod names {
    pub const CORE_PLUGIN_LOADED: &str = "core:plugin:loaded";
    pub const CORE_GITIGNORE_LOADED: &str = "core:gitignore:loaded";
    pub const SCAN_COMPLETE: &str = "scan:complete";
    pub const FILE_IGNORED: &str = "file:ignored";
    pub const FILE_BEFORE_VALIDATE: &str = "file:before_validate";
    pub const FILE_VALIDATE: &str = "file:validate";
    pub const FILE_VALIDATED: &str = "file:validated";
    pub const FILE_CACHE_HIT: &str = "file:cache:hit";
    pub const FILE_CACHE_MISS: &str = "file:cache:miss";
    pub const FORMAT_BEFORE: &str = "format:before";
    pub const FORMAT_AFTER: &str = "format:after";
    pub const FORMAT_ERROR: &str = "format:error";
    pub const FILE_PROCESSED: &str = "file:processed";
    pub const BACKUP_COMPLETE: &str = "backup:complete";
    pub const BACKUP_ERROR: &str = "backup:error";
    pub const RUN_START: &str = "run:start";
    pub const RUN_COMPLETE: &str = "run:complete";
    pub const RUN_ERROR: &str = "run:error";
    pub const SESSION_START: &str = "session:start";
    pub const SESSION_SHUTDOWN_START: &str = "session:shutdown:start";
    pub const SESSION_STOP: &str = "session:stop";
}

/// Shared analysis state passed alongside content through `format:before`
/// (written) and `format:after` (read only).
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingContext {
    facts: BTreeMap<String, Value>,
    modified_by: Vec<String>,
}

impl ProcessingContext {
    /// Publish a fact for later listeners. Keys are conventionally
    /// `<extension id>.<name>`.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.facts.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.facts.get(key)
    }

    pub fn facts(&self) -> &BTreeMap<String, Value> {
        &self.facts
    }

    /// Note that `extension` rewrote the content.
    pub fn record_modification(&mut self, extension: &str) {
        self.modified_by.push(extension.to_string());
    }

    pub fn modified_by(&self) -> &[String] {
        &self.modified_by
    }
}

/// In-flight file data handed to `format:before` listeners.
#[derive(Debug, Clone)]
pub struct FileData {
    pub path: PathBuf,
    pub extension: String,
    /// Content about to be formatted. Listeners may replace it.
    pub content: String,
    /// Fingerprint of the content as read from disk.
    pub original_fingerprint: String,
    pub context: ProcessingContext,
}

/// An event and its payload.
#[derive(Debug)]
pub enum Event<'a> {
    PluginLoaded { path: &'a str },
    GitignoreLoaded { path: &'a Path },
    ScanComplete { file_count: usize },
    FileIgnored { file: &'a Path, reason: &'a str },
    BeforeValidate { file: &'a Path },
    Validate { file: &'a Path, size: u64 },
    Validated { file: &'a Path, valid: bool, reason: Option<&'a str> },
    CacheHit { file: &'a Path },
    CacheMiss { file: &'a Path },
    FormatBefore(&'a mut FileData),
    FormatAfter {
        file: &'a Path,
        formatted_content: &'a str,
        context: &'a ProcessingContext,
    },
    FormatError { file: &'a Path, error: &'a str },
    FileProcessed { file: &'a Path, duration: Duration, status: &'a str },
    BackupComplete { name: &'a str, file_count: usize },
    BackupError { error: &'a str },
    RunStart { file_count: usize },
    RunComplete { summary: &'a crate::summary::RunSummary },
    RunError { error: &'a str },
    SessionStart { session_id: &'a str },
    SessionShutdownStart { session_id: &'a str },
    SessionStop { session_id: &'a str },
}

impl Event<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Event::PluginLoaded { .. } => names::CORE_PLUGIN_LOADED,
            Event::GitignoreLoaded { .. } => names::CORE_GITIGNORE_LOADED,
            Event::ScanComplete { .. } => names::SCAN_COMPLETE,
            Event::FileIgnored { .. } => names::FILE_IGNORED,
            Event::BeforeValidate { .. } => names::FILE_BEFORE_VALIDATE,
            Event::Validate { .. } => names::FILE_VALIDATE,
            Event::Validated { .. } => names::FILE_VALIDATED,
            Event::CacheHit { .. } => names::FILE_CACHE_HIT,
            Event::CacheMiss { .. } => names::FILE_CACHE_MISS,
            Event::FormatBefore(_) => names::FORMAT_BEFORE,
            Event::FormatAfter { .. } => names::FORMAT_AFTER,
            Event::FormatError { .. } => names::FORMAT_ERROR,
            Event::FileProcessed { .. } => names::FILE_PROCESSED,
            Event::BackupComplete { .. } => names::BACKUP_COMPLETE,
            Event::BackupError { .. } => names::BACKUP_ERROR,
            Event::RunStart { .. } => names::RUN_START,
            Event::RunComplete { .. } => names::RUN_COMPLETE,
            Event::RunError { .. } => names::RUN_ERROR,
            Event::SessionStart { .. } => names::SESSION_START,
            Event::SessionShutdownStart { .. } => names::SESSION_SHUTDOWN_START,
            Event::SessionStop { .. } => names::SESSION_STOP,
        }
    }

    /// The file this event concerns, if any.
    pub fn file(&self) -> Option<&Path> {
        match self {
            Event::FileIgnored { file, .. }
            | Event::BeforeValidate { file }
            | Event::Validate { file, .. }
            | Event::Validated { file, .. }
            | Event::CacheHit { file }
            | Event::CacheMiss { file }
            | Event::FormatAfter { file, .. }
            | Event::FormatError { file, .. }
            | Event::FileProcessed { file, .. } => Some(file),
            Event::FormatBefore(data) => Some(&data.path),
            _ => None,
        }
    }

    /// Mutable file data, only available on `format:before`.
    pub fn file_data_mut(&mut self) -> Option<&mut FileData> {
        match self {
            Event::FormatBefore(data) => Some(data),
            _ => None,
        }
    }
}

struct Listener {
    pattern: String,
    owner: String,
    handler: Handler,
}

impl Listener {
    fn matches(&self, name: &str) -> bool {
        match self.pattern.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => self.pattern == name,
        }
    }
}

/// Ordered named-event bus.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `pattern`: an exact event name, a prefix
    /// wildcard such as `file:*`, or `*` for everything.
    pub fn on<F>(&mut self, owner: &str, pattern: &str, handler: F)
    where
        F: Fn(&mut Event<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        debug!(owner, pattern, "Registered listener");
        self.listeners.push(Listener {
            pattern: pattern.to_string(),
            owner: owner.to_string(),
            handler: Box::new(handler),
        });
    }

    /// Append every listener of `other`, keeping its order.
    pub fn absorb(&mut self, other: EventBus) {
        self.listeners.extend(other.listeners);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn has_listeners(&self, name: &str) -> bool {
        self.listeners.iter().any(|l| l.matches(name))
    }

    /// Dispatch `event` to every matching listener in registration order.
    /// The first listener error stops dispatch and is returned.
    pub fn emit(&self, event: &mut Event<'_>) -> Result<(), KemptError> {
        let name = event.name();
        for listener in self.listeners.iter().filter(|l| l.matches(name)) {
            if let Err(e) = (listener.handler)(event) {
                return Err(KemptError::Extension {
                    event: name.to_string(),
                    message: format!("{}: {}", listener.owner, e),
                });
            }
        }
        Ok(())
    }

    /// Dispatch an informational event, logging listener errors instead of
    /// returning them.
    pub fn notify(&self, mut event: Event<'_>) {
        if let Err(e) = self.emit(&mut event) {
            warn!(error = %e, "Extension listener failed");
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
