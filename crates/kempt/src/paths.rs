//! Tool-owned directories
//!
//! Everything kempt persists lives under its home directory, never inside the
//! project tree. Per-project state is keyed by a fingerprint of the root path
//! so distinct projects do not collide.

use crate::hasher::{hash_bytes, HashAlgorithm};
use std::path::{Path, PathBuf};

pub use kempt_logging::{kempt_home, logs_dir};

const PROJECT_KEY_LEN: usize = 16;

/// Stable key for a project root.
pub fn project_key(root: &Path) -> String {
    let digest = hash_bytes(root.to_string_lossy().as_bytes(), HashAlgorithm::Sha256);
    digest[..PROJECT_KEY_LEN].to_string()
}

/// Get the cache directory: ~/.kempt/cache
pub fn cache_dir(home: &Path) -> PathBuf {
    home.join("cache")
}

/// Cache file for a project: ~/.kempt/cache/<key>.json
pub fn cache_file(home: &Path, root: &Path) -> PathBuf {
    cache_dir(home).join(format!("{}.json", project_key(root)))
}

/// Default backup directory for a project: ~/.kempt/backups/<key>
pub fn backup_dir(home: &Path, root: &Path) -> PathBuf {
    home.join("backups").join(project_key(root))
}

/// Recovery directory for one session: ~/.kempt/recovery/<session_id>
pub fn recovery_dir(home: &Path, session_id: &str) -> PathBuf {
    home.join("recovery").join(session_id)
}
