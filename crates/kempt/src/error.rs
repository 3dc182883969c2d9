//! Error types for kempt

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Kempt error type
#[derive(Error, Debug)]
pub enum KemptError {
    /// Bad syntax or size. Per-file, recorded, never fatal to the run.
    #[error("Validation failed for {path}: {reason}")]
    Validation { path: PathBuf, reason: String },

    /// A fingerprint comparison failed after a write or against a manifest.
    #[error("Integrity check failed for {subject}: expected {expected}, found {actual}")]
    IntegrityMismatch {
        subject: String,
        expected: String,
        actual: String,
    },

    #[error("Manifest not found for backup '{0}'")]
    ManifestNotFound(String),

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Processing {path} timed out after {timeout:?}")]
    Timeout { path: PathBuf, timeout: Duration },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to load extension '{id}': {reason}")]
    ExtensionLoad { id: String, reason: String },

    /// An extension listener returned an error while handling an event.
    #[error("Extension error during '{event}': {message}")]
    Extension { event: String, message: String },

    #[error("Shutdown initiated, refusing to process {0}")]
    ShutdownAborted(PathBuf),

    #[error("Formatter error: {0}")]
    Formatter(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl KemptError {
    /// Whether a failed attempt may be retried.
    ///
    /// Validation, integrity and shutdown failures are deterministic or
    /// deliberate, so repeating the attempt cannot change the outcome.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            KemptError::Validation { .. }
                | KemptError::IntegrityMismatch { .. }
                | KemptError::ShutdownAborted(_)
                | KemptError::Configuration(_)
                | KemptError::Extension { .. }
        )
    }

    /// Short machine-readable classification used in run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            KemptError::Validation { .. } => "validation",
            KemptError::IntegrityMismatch { .. } => "integrity_mismatch",
            KemptError::ManifestNotFound(_) => "manifest_not_found",
            KemptError::BackupNotFound(_) => "backup_not_found",
            KemptError::Timeout { .. } => "timeout",
            KemptError::Configuration(_) => "configuration",
            KemptError::ExtensionLoad { .. } => "extension_load",
            KemptError::Extension { .. } => "extension",
            KemptError::ShutdownAborted(_) => "shutdown_aborted",
            KemptError::Formatter(_) => "formatter",
            KemptError::Io(_) => "io",
            KemptError::Json(_) => "json",
            KemptError::Zip(_) => "archive",
            KemptError::Watch(_) => "watch",
            KemptError::InvalidState(_) => "invalid_state",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, KemptError>;
