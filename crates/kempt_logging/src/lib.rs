//! Shared logging utilities for the kempt binary and its tests.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "kempt=info";
const LOG_FILTER_ENV: &str = "KEMPT_LOG";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration for the kempt binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror the file filter on stderr instead of warnings only.
    pub verbose: bool,
    /// Override for the log directory (defaults to `<home>/logs`).
    pub log_dir: Option<PathBuf>,
}

/// Initialize tracing with a size-rotated log file and stderr output.
///
/// The filter is read from `KEMPT_LOG`, then `RUST_LOG`, then falls back to
/// `kempt=info`. Stderr only shows warnings unless `verbose` is set.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = match config.log_dir {
        Some(dir) => dir,
        None => ensure_logs_dir().context("Failed to ensure log directory")?,
    };
    let log_file = SizeRotatedFile::open(log_dir, config.app_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
        .with_context(|| format!("Failed to open log file for {}", config.app_name))?;

    let console_filter = if config.verbose {
        resolve_filter()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(log_file))
                .with_ansi(false)
                .with_filter(resolve_filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

fn resolve_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Get the kempt home directory.
///
/// Priority:
/// 1) KEMPT_HOME
/// 2) the user's home directory + `.kempt`
/// 3) ./.kempt
pub fn kempt_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("KEMPT_HOME") {
        return PathBuf::from(override_path);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".kempt"),
        None => PathBuf::from(".").join(".kempt"),
    }
}

/// Get the logs directory: ~/.kempt/logs
pub fn logs_dir() -> PathBuf {
    kempt_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// `<name>.log`, shifted to `<name>.log.1 .. <name>.log.<keep-1>` when a
/// write would push it past `max_size`. The oldest generation is dropped.
struct SizeRotatedFile {
    dir: PathBuf,
    name: String,
    keep: usize,
    max_size: u64,
    file: File,
    written: u64,
}

impl SizeRotatedFile {
    fn open(dir: PathBuf, name: &str, keep: usize, max_size: u64) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let name: String = name
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
            .collect();
        let path = dir.join(format!("{}.log", name));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        let mut rotated = Self {
            dir,
            name,
            keep: keep.max(1),
            max_size,
            file,
            written,
        };
        if rotated.written > rotated.max_size {
            rotated.rotate()?;
        }
        Ok(rotated)
    }

    fn generation(&self, index: usize) -> PathBuf {
        match index {
            0 => self.dir.join(format!("{}.log", self.name)),
            n => self.dir.join(format!("{}.log.{}", self.name, n)),
        }
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let oldest = self.keep - 1;
        if oldest > 0 {
            match fs::remove_file(self.generation(oldest)) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
                _ => {}
            }
            for index in (0..oldest).rev() {
                let from = self.generation(index);
                if from.exists() {
                    fs::rename(&from, self.generation(index + 1))?;
                }
            }
        }
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.generation(0))?;
        self.written = 0;
        Ok(())
    }
}

impl Write for SizeRotatedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
