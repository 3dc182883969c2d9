//! Backup manifest: integrity record stored next to each archive.

use crate::error::{KemptError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const MANIFEST_SUFFIX: &str = ".archive.manifest.json";
pub const ARCHIVE_SUFFIX: &str = ".archive";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the archive bytes.
    pub fingerprint: String,
    pub hash_algorithm: String,
    pub root: PathBuf,
    pub file_count: usize,
    /// Relative path → size in bytes.
    pub files: BTreeMap<String, u64>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write atomically next to the archive.
    pub fn save(&self, path: &Path) -> Result<()> {
        let encoded = serde_json::to_vec_pretty(self)?;
        let temp = path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp)?;
        file.write_all(&encoded)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            KemptError::Io(e)
        })
    }
}

pub fn archive_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}{}", name, ARCHIVE_SUFFIX))
}

pub fn manifest_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}{}", name, MANIFEST_SUFFIX))
}

/// Classification of a file in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupFile {
    Archive(String),
    Manifest(String),
}

impl BackupFile {
    pub fn classify(file_name: &str) -> Option<Self> {
        if let Some(name) = file_name.strip_suffix(MANIFEST_SUFFIX) {
            Some(BackupFile::Manifest(name.to_string()))
        } else {
            file_name
                .strip_suffix(ARCHIVE_SUFFIX)
                .map(|name| BackupFile::Archive(name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_classify() {
        assert_eq!(
            BackupFile::classify("backup-1.archive"),
            Some(BackupFile::Archive("backup-1".to_string()))
        );
        assert_eq!(
            BackupFile::classify("backup-1.archive.manifest.json"),
            Some(BackupFile::Manifest("backup-1".to_string()))
        );
        assert_eq!(BackupFile::classify("audit.log"), None);
        assert_eq!(BackupFile::classify("backup-1.archive.tmp"), None);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let manifest = Manifest {
            created_at: Utc::now(),
            fingerprint: "abc".to_string(),
            hash_algorithm: "sha256".to_string(),
            root: PathBuf::from("/p"),
            file_count: 1,
            files: BTreeMap::from([("a.js".to_string(), 3)]),
        };
        let path = manifest_path(temp.path(), "b");
        manifest.save(&path).unwrap();
        assert_eq!(Manifest::load(&path).unwrap(), manifest);
    }
}
