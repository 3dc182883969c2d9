//! Recovery copies of original content, kept outside the project tree.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct RecoveryStore {
    root: PathBuf,
    dir: PathBuf,
}

impl RecoveryStore {
    /// `dir` is the session's recovery directory.
    pub fn new(root: &Path, dir: PathBuf) -> Self {
        Self {
            root: root.to_path_buf(),
            dir,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the copy of `path` lands: its root-relative path under the
    /// recovery directory.
    pub fn location_for(&self, path: &Path) -> PathBuf {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        let mut dest = self.dir.clone();
        for component in rel.components() {
            if let Component::Normal(part) = component {
                dest.push(part);
            }
        }
        dest
    }

    /// Persist `original` for `path`, returning the copy's location.
    pub fn save(&self, path: &Path, original: &[u8]) -> io::Result<PathBuf> {
        let dest = self.location_for(path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, original)?;
        info!(file = %path.display(), recovery = %dest.display(), "Saved recovery copy of original content");
        Ok(dest)
    }
}
