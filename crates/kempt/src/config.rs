//! Configuration for a kempt session
//!
//! Loaded once from `kempt.toml` (or an explicit path), layered with CLI
//! overrides, then resolved and validated. The resolved [`Config`] is
//! read-only for the rest of the session and shared behind an `Arc`.

use crate::error::{KemptError, Result};
use crate::hasher::{hash_bytes, HashAlgorithm};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Config file looked up in the project root when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "kempt.toml";

/// Project formatter config looked up in the root when none is configured.
pub const DEFAULT_PROJECT_FORMATTER_CONFIG: &str = ".formatterrc.json";

/// Bump when the cache file layout changes.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Default exclusions, matched with gitignore semantics.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[".git/", "node_modules/", "target/"];

pub const DEFAULT_FILE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "mjs", "cjs", "ts", "tsx", "json", "css", "scss", "md", "yaml", "yml", "toml",
];

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project root. Relative paths are resolved against the working directory.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// File extensions (without the dot) eligible for processing.
    #[serde(default = "default_file_extensions")]
    pub file_extensions: Vec<String>,

    /// Exclusion patterns (gitignore syntax), checked before `.gitignore`.
    #[serde(default = "default_ignore_patterns")]
    pub ignore: Vec<String>,

    #[serde(default)]
    pub formatter: FormatterSection,

    /// Maximum number of files processed at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Additional attempts after a retryable failure.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Per-attempt budget in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Files larger than this are rejected without being read.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,

    #[serde(default)]
    pub backup: BackupSection,

    #[serde(default = "default_cache_schema_version")]
    pub cache_schema_version: u32,

    /// Extensions to load, in registration order.
    #[serde(default)]
    pub extensions: Vec<ExtensionSpec>,

    /// Report what would change without writing.
    #[serde(default)]
    pub dry_run: bool,

    /// Coalescing window for watch mode notifications.
    #[serde(default = "default_debounce_ms")]
    pub watch_debounce_ms: u64,

    /// Override for the state directory (cache, backups, recovery).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,

    /// Contents of the project formatter config, filled in by [`Config::resolve`].
    #[serde(skip)]
    pub project_formatter_options: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormatterSection {
    /// External formatter invocation. `{path}` is replaced by the file path;
    /// content is piped through stdin/stdout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    /// Explicit option overrides; these win over project config.
    #[serde(default)]
    pub options: Map<String, Value>,

    /// Project formatter config file (defaults to `.formatterrc.json` in root).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSection {
    #[serde(default)]
    pub enabled: bool,

    /// Number of backups kept after each new one.
    #[serde(default = "default_backup_retention")]
    pub retention: usize,

    /// Backup directory (defaults to `<home>/backups/<project key>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Default for BackupSection {
    fn default() -> Self {
        Self {
            enabled: false,
            retention: default_backup_retention(),
            dir: None,
        }
    }
}

/// One configured extension: an identifier resolved by the extension
/// registry, plus an opaque options blob handed to its initializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionSpec {
    #[serde(alias = "path")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub options: Value,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_file_extensions() -> Vec<String> {
    DEFAULT_FILE_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

fn default_ignore_patterns() -> Vec<String> {
    DEFAULT_IGNORE_PATTERNS.iter().map(|s| s.to_string()).collect()
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

fn default_retries() -> u32 {
    2
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024
}

fn default_hash_algorithm() -> String {
    HashAlgorithm::Sha256.as_str().to_string()
}

fn default_backup_retention() -> usize {
    5
}

fn default_cache_schema_version() -> u32 {
    CACHE_SCHEMA_VERSION
}

fn default_debounce_ms() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: default_root(),
            file_extensions: default_file_extensions(),
            ignore: default_ignore_patterns(),
            formatter: FormatterSection::default(),
            concurrency: default_concurrency(),
            retries: default_retries(),
            timeout_ms: default_timeout_ms(),
            max_file_size: default_max_file_size(),
            hash_algorithm: default_hash_algorithm(),
            backup: BackupSection::default(),
            cache_schema_version: default_cache_schema_version(),
            extensions: Vec::new(),
            dry_run: false,
            watch_debounce_ms: default_debounce_ms(),
            home: None,
            project_formatter_options: Map::new(),
        }
    }
}

impl Config {
    /// Default configuration rooted at `root`.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| KemptError::Configuration(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// A relative `root` inside the file is interpreted relative to the file's
    /// directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KemptError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if config.root.is_relative() {
            if let Some(parent) = path.parent() {
                config.root = parent.join(&config.root);
            }
        }
        info!(config_path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Load `kempt.toml` from `dir` if present, else defaults rooted at `dir`.
    pub fn discover(dir: &Path) -> Result<Self> {
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            debug!(dir = %dir.display(), "No config file found, using defaults");
            Ok(Self::for_root(dir))
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| KemptError::Configuration(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Canonicalize the root, load the project formatter config, and validate.
    /// Any failure here is fatal to session startup.
    pub fn resolve(mut self) -> Result<Self> {
        self.root = self.root.canonicalize().map_err(|e| {
            KemptError::Configuration(format!(
                "Root directory {} is not accessible: {}",
                self.root.display(),
                e
            ))
        })?;
        self.file_extensions = self
            .file_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self.project_formatter_options = self.load_project_formatter_options()?;
        self.validate()?;
        self.trace_loaded();
        Ok(self)
    }

    /// Check value ranges and pattern syntax.
    pub fn validate(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(KemptError::Configuration(format!(
                "Root {} is not a directory",
                self.root.display()
            )));
        }
        if self.concurrency == 0 {
            return Err(KemptError::Configuration(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.file_extensions.is_empty() {
            return Err(KemptError::Configuration(
                "at least one file extension is required".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(KemptError::Configuration(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        if HashAlgorithm::parse(&self.hash_algorithm).is_none() {
            return Err(KemptError::Configuration(format!(
                "unknown hash algorithm '{}'",
                self.hash_algorithm
            )));
        }
        if let Some(command) = &self.formatter.command {
            if command.is_empty() || command[0].trim().is_empty() {
                return Err(KemptError::Configuration(
                    "formatter.command must name a program".to_string(),
                ));
            }
        }
        crate::ignore_rules::IgnoreMatcher::validate_patterns(&self.root, &self.ignore)?;
        Ok(())
    }

    fn load_project_formatter_options(&self) -> Result<Map<String, Value>> {
        let path = match &self.formatter.project_config {
            Some(p) if p.is_relative() => self.root.join(p),
            Some(p) => p.clone(),
            None => self.root.join(DEFAULT_PROJECT_FORMATTER_CONFIG),
        };
        if !path.is_file() {
            if self.formatter.project_config.is_some() {
                return Err(KemptError::Configuration(format!(
                    "Project formatter config {} not found",
                    path.display()
                )));
            }
            return Ok(Map::new());
        }
        let content = std::fs::read_to_string(&path)?;
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => {
                debug!(path = %path.display(), keys = map.len(), "Loaded project formatter config");
                Ok(map)
            }
            Ok(_) => Err(KemptError::Configuration(format!(
                "{} must contain a JSON object",
                path.display()
            ))),
            Err(e) => Err(KemptError::Configuration(format!(
                "Failed to parse {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            root = %self.root.display(),
            extensions = self.file_extensions.len(),
            concurrency = self.concurrency,
            dry_run = self.dry_run,
            backup = self.backup.enabled,
            "Configuration resolved"
        );
        debug!(?self, "Configuration (full debug)");
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::select(&self.hash_algorithm)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    pub fn home_dir(&self) -> PathBuf {
        self.home.clone().unwrap_or_else(crate::paths::kempt_home)
    }

    pub fn backup_dir(&self) -> PathBuf {
        match &self.backup.dir {
            Some(dir) if dir.is_relative() => self.home_dir().join(dir),
            Some(dir) => dir.clone(),
            None => crate::paths::backup_dir(&self.home_dir(), &self.root),
        }
    }

    pub fn cache_file(&self) -> PathBuf {
        crate::paths::cache_file(&self.home_dir(), &self.root)
    }

    /// Whether `path` has one of the target extensions.
    pub fn is_target(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.file_extensions.iter().any(|t| *t == e)
            })
            .unwrap_or(false)
    }

    /// Deterministic fingerprint over the fields that change processing output.
    ///
    /// Extension ids and options are included. Executable and run-mode fields
    /// (formatter command, concurrency, retries, timeouts, dry-run, backup
    /// settings) are excluded.
    pub fn fingerprint(&self) -> String {
        let mut extensions = self.file_extensions.clone();
        extensions.sort();
        // Order matters: extensions rewrite content in registration order.
        let loaded: Vec<Value> = self
            .extensions
            .iter()
            .map(|spec| serde_json::json!({ "id": spec.id, "options": spec.options }))
            .collect();
        let functional = serde_json::json!({
            "file_extensions": extensions,
            "extensions": loaded,
            "ignore": self.ignore,
            "formatter_options": Value::Object(self.formatter.options.clone()),
            "project_formatter_options": Value::Object(self.project_formatter_options.clone()),
            "max_file_size": self.max_file_size,
            "hash_algorithm": self.hash_algorithm().as_str(),
            "cache_schema_version": self.cache_schema_version,
        });
        hash_bytes(functional.to_string().as_bytes(), HashAlgorithm::Sha256)
    }
}
