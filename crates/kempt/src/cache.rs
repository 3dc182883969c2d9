//! Per-project result cache
//!
//! Maps absolute file paths to the content fingerprint and modification time
//! observed after the last successful processing. The whole map is dropped
//! whenever the schema version or the configuration fingerprint changes.
//!
//! The file lives under the tool home, keyed by the project root, and is
//! written atomically (temp file + rename).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Cached facts about one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub modified_ms: i64,
}

/// On-disk cache contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheState {
    pub schema_version: u32,
    pub config_fingerprint: String,
    #[serde(default)]
    pub entries: BTreeMap<String, CacheEntry>,
}

impl CacheState {
    pub fn empty(schema_version: u32, config_fingerprint: &str) -> Self {
        Self {
            schema_version,
            config_fingerprint: config_fingerprint.to_string(),
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, path: &Path) -> Option<&CacheEntry> {
        self.entries.get(&cache_key(path))
    }

    pub fn insert(&mut self, path: &Path, entry: CacheEntry) {
        self.entries.insert(cache_key(path), entry);
    }

    pub fn remove(&mut self, path: &Path) -> Option<CacheEntry> {
        self.entries.remove(&cache_key(path))
    }

    /// Two-factor hit test: both the fingerprint and the mtime must match.
    pub fn is_hit(&self, path: &Path, fingerprint: &str, modified_ms: i64) -> bool {
        self.get(path)
            .map(|e| e.fingerprint == fingerprint && e.modified_ms == modified_ms)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn cache_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Loads and persists [`CacheState`] for one project.
#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    schema_version: u32,
    config_fingerprint: String,
    saving: AtomicBool,
}

/// Clears the in-flight flag when a save finishes, even on error.
struct SaveGuard<'a>(&'a AtomicBool);

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CacheStore {
    pub fn new(path: PathBuf, schema_version: u32, config_fingerprint: &str) -> Self {
        Self {
            path,
            schema_version,
            config_fingerprint: config_fingerprint.to_string(),
            saving: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fresh_state(&self) -> CacheState {
        CacheState::empty(self.schema_version, &self.config_fingerprint)
    }

    /// Load the cache. Missing, unreadable, corrupt or stale files all yield an
    /// empty state carrying the current schema version and fingerprint.
    pub fn load(&self) -> CacheState {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No cache file, starting fresh");
                return self.fresh_state();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read cache, starting fresh");
                return self.fresh_state();
            }
        };

        let state: CacheState = match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt cache file, starting fresh");
                return self.fresh_state();
            }
        };

        if state.schema_version != self.schema_version
            || state.config_fingerprint != self.config_fingerprint
        {
            info!(
                cached_schema = state.schema_version,
                schema = self.schema_version,
                discarded = state.entries.len(),
                "Cache invalidated by schema or configuration change"
            );
            return self.fresh_state();
        }

        debug!(path = %self.path.display(), entries = state.entries.len(), "Loaded cache");
        state
    }

    /// Persist `state` atomically.
    ///
    /// Returns `Ok(false)` without writing when another save is in flight; a
    /// later save supersedes the dropped one.
    pub fn save(&self, state: &CacheState) -> std::io::Result<bool> {
        if self
            .saving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(path = %self.path.display(), "Cache save already in flight, dropping request");
            return Ok(false);
        }
        let _guard = SaveGuard(&self.saving);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let encoded = serde_json::to_vec(state)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let temp_path = self
            .path
            .with_extension(format!("json.{}.tmp", std::process::id()));
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&encoded)?;
        file.sync_all()?;
        drop(file);
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        debug!(path = %self.path.display(), entries = state.entries.len(), "Saved cache");
        Ok(true)
    }

    /// Remove the cache file. A missing file is not an error.
    pub fn clear(&self) -> std::io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Cache cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[cfg(test)]
    fn force_in_flight(&self) -> SaveGuard<'_> {
        self.saving.store(true, Ordering::Release);
        SaveGuard(&self.saving)
    }
}
