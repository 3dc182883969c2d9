//! Session state
//!
//! One [`Session`] exists per orchestrator lifetime. It owns everything that
//! would otherwise be process-global: the shutdown flag, the per-path lock
//! table, the debounce buffer, the loaded cache and the extension bus.

use crate::cache::{CacheState, CacheStore};
use crate::config::Config;
use crate::events::EventBus;
use crate::limiter::ConcurrencyLimiter;
use crate::paths;
use crate::processor::{PathLocks, RecoveryStore};
use crate::shutdown::ShutdownToken;
use crate::watch::DebounceBuffer;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Orchestrator lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initializing,
    Scanning,
    BackingUp,
    Processing,
    Reporting,
    Idle,
    Watching,
    ShuttingDown,
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::Scanning => "scanning",
            SessionState::BackingUp => "backing_up",
            SessionState::Processing => "processing",
            SessionState::Reporting => "reporting",
            SessionState::Idle => "idle",
            SessionState::Watching => "watching",
            SessionState::ShuttingDown => "shutting_down",
            SessionState::Stopped => "stopped",
        }
    }
}

pub struct Session {
    id: String,
    config: Arc<Config>,
    bus: Arc<EventBus>,
    shutdown: ShutdownToken,
    locks: Arc<PathLocks>,
    limiter: ConcurrencyLimiter,
    cache_store: Arc<CacheStore>,
    cache: Arc<Mutex<CacheState>>,
    debounce: Mutex<DebounceBuffer>,
    recovery: RecoveryStore,
    state: Mutex<SessionState>,
}

impl Session {
    /// Create a session for a resolved configuration. Loads the cache.
    pub fn new(config: Arc<Config>, bus: Arc<EventBus>) -> Self {
        let id = Uuid::new_v4().to_string();
        let home = config.home_dir();
        let cache_store = CacheStore::new(
            config.cache_file(),
            config.cache_schema_version,
            &config.fingerprint(),
        );
        let cache = cache_store.load();
        let recovery = RecoveryStore::new(&config.root, paths::recovery_dir(&home, &id));
        debug!(session_id = %id, cache_entries = cache.len(), "Session created");

        Self {
            limiter: ConcurrencyLimiter::new(config.concurrency),
            id,
            bus,
            shutdown: ShutdownToken::new(),
            locks: Arc::new(PathLocks::new()),
            cache_store: Arc::new(cache_store),
            cache: Arc::new(Mutex::new(cache)),
            debounce: Mutex::new(DebounceBuffer::new()),
            recovery,
            state: Mutex::new(SessionState::Initializing),
            config,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn shutdown(&self) -> &ShutdownToken {
        &self.shutdown
    }

    pub fn locks(&self) -> &Arc<PathLocks> {
        &self.locks
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn cache_store(&self) -> &Arc<CacheStore> {
        &self.cache_store
    }

    pub fn cache(&self) -> &Arc<Mutex<CacheState>> {
        &self.cache
    }

    /// Snapshot of the in-memory cache.
    pub fn cache_snapshot(&self) -> CacheState {
        lock(&self.cache).clone()
    }

    pub fn recovery(&self) -> &RecoveryStore {
        &self.recovery
    }

    pub fn debounce(&self) -> MutexGuard<'_, DebounceBuffer> {
        lock(&self.debounce)
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn set_state(&self, next: SessionState) {
        let mut state = lock(&self.state);
        if *state != next {
            debug!(session_id = %self.id, from = state.as_str(), to = next.as_str(), "Session state change");
            *state = next;
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("root", &self.config.root)
            .field("state", &self.state())
            .finish()
    }
}

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session(temp: &TempDir) -> Session {
        let mut config = Config::for_root(temp.path());
        config.home = Some(temp.path().join("home"));
        Session::new(Arc::new(config), Arc::new(EventBus::new()))
    }

    #[test]
    fn test_sessions_get_unique_ids() {
        let temp = TempDir::new().unwrap();
        let a = session(&temp);
        let b = session(&temp);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.state(), SessionState::Initializing);
    }

    #[test]
    fn test_recovery_dir_is_per_session_under_home() {
        let temp = TempDir::new().unwrap();
        let s = session(&temp);
        assert!(s.recovery().dir().starts_with(temp.path().join("home")));
        assert!(s.recovery().dir().ends_with(s.id()));
    }

    #[test]
    fn test_state_transitions() {
        let temp = TempDir::new().unwrap();
        let s = session(&temp);
        s.set_state(SessionState::Scanning);
        s.set_state(SessionState::Processing);
        assert_eq!(s.state(), SessionState::Processing);
    }
}
