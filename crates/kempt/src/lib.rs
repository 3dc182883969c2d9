//! kempt - incremental file formatting orchestrator
//!
//! Scans a project tree, skips files whose content has not changed since the
//! last successful pass, runs each remaining file through a formatter with
//! bounded concurrency, and verifies every write by reading it back.
//!
//! Entry point for embedding is [`Orchestrator`]; the CLI is a thin layer
//! over it.

pub mod backup;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod extension;
pub mod formatter;
pub mod fs_io;
pub mod hasher;
pub mod ignore_rules;
pub mod limiter;
pub mod orchestrator;
pub mod paths;
pub mod processor;
pub mod scanner;
pub mod session;
pub mod shutdown;
pub mod summary;
pub mod validator;
pub mod watch;

pub use backup::{BackupArchiver, BackupHandle, BackupInfo, RestoreReport, VerifyReport};
pub use cache::{CacheEntry, CacheState, CacheStore};
pub use config::Config;
pub use error::{KemptError, Result};
pub use events::{Event, EventBus, FileData, ProcessingContext};
pub use extension::{ExtensionContext, ExtensionRegistry};
pub use formatter::{CommandFormatter, FormatOptions, Formatter, PassthroughFormatter};
pub use fs_io::{FileStat, FsIo, LocalFsIo};
pub use ignore_rules::{IgnoreMatch, IgnoreMatcher};
pub use orchestrator::Orchestrator;
pub use processor::{FileProcessor, ProcessorDeps, RetryPolicy};
pub use scanner::{ScanResult, Scanner};
pub use session::{Session, SessionState};
pub use shutdown::ShutdownToken;
pub use summary::{FileOutcome, FileStatus, RunSummary};
