//! File I/O used by the processor
//!
//! Reads and writes go through [`FsIo`] so the write path can be intercepted
//! (integrity tests substitute a writer that corrupts content).

use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Size and modification time of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub len: u64,
    pub modified_ms: i64,
}

#[async_trait]
pub trait FsIo: Send + Sync {
    async fn stat(&self, path: &Path) -> io::Result<FileStat>;
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    async fn write(&self, path: &Path, content: &[u8]) -> io::Result<()>;
}

/// Direct `tokio::fs` access.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFsIo;

#[async_trait]
impl FsIo for LocalFsIo {
    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(FileStat {
            len: meta.len(),
            modified_ms: modified_ms(&meta),
        })
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, content).await
    }
}

/// Modification time in milliseconds since the Unix epoch (0 if unavailable).
pub fn modified_ms(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
