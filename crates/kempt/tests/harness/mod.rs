//! Shared fixtures for orchestrator integration tests.
//!
//! Every project lives in its own temp dir with a private kempt home, so
//! cache, backups and recovery copies never leak between tests.

#![allow(dead_code)]

use async_trait::async_trait;
use kempt::config::ExtensionSpec;
use kempt::{
    Config, ExtensionRegistry, FileStat, FormatOptions, Formatter, FsIo, LocalFsIo,
    Orchestrator, ProcessorDeps, RetryPolicy,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Uppercases content. Counts calls and can be slowed down.
#[derive(Default)]
pub struct UpperFormatter {
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
}

impl UpperFormatter {
    pub fn slow(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Formatter for UpperFormatter {
    fn name(&self) -> &str {
        "upper"
    }

    async fn format(&self, text: &str, _path: &Path, _options: &FormatOptions) -> kempt::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(text.to_uppercase())
    }
}

/// Writes something other than what it was asked to write.
pub struct CorruptingFsIo;

#[async_trait]
impl FsIo for CorruptingFsIo {
    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        LocalFsIo.stat(path).await
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        LocalFsIo.read(path).await
    }

    async fn write(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        let mut mangled = content.to_vec();
        mangled.extend_from_slice(b"\0garbage");
        LocalFsIo.write(path, &mangled).await
    }
}

/// A temp project with its own kempt home.
pub struct Project {
    pub temp: TempDir,
    pub root: PathBuf,
    pub home: PathBuf,
}

impl Project {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("project");
        fs::create_dir(&root).unwrap();
        let root = root.canonicalize().unwrap();
        let home = temp.path().join("home");
        Self { temp, root, home }
    }

    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root.join(rel)).unwrap()
    }

    /// Defaults for tests: no retries, no backup.
    pub fn config(&self) -> Config {
        let mut config = Config::for_root(&self.root);
        config.home = Some(self.home.clone());
        config.retries = 0;
        config.backup.enabled = false;
        config
    }

    pub async fn orchestrator(&self, config: Config, deps: ProcessorDeps) -> Orchestrator {
        self.orchestrator_with(config, &ExtensionRegistry::with_builtins(), deps).await
    }

    pub async fn orchestrator_with(
        &self,
        config: Config,
        registry: &ExtensionRegistry,
        deps: ProcessorDeps,
    ) -> Orchestrator {
        Orchestrator::initialize(config, registry, deps)
            .await
            .unwrap()
            .with_retry_policy(RetryPolicy::new(0).with_base(Duration::from_millis(1)))
    }
}

pub fn upper_deps(formatter: Arc<UpperFormatter>) -> ProcessorDeps {
    ProcessorDeps::default().with_formatter(formatter)
}

/// Registers a `recorder` extension that logs every event name.
pub fn recording_registry() -> (ExtensionRegistry, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ExtensionRegistry::with_builtins();
    let sink = Arc::clone(&seen);
    registry.register("recorder", move |ctx| {
        let sink = Arc::clone(&sink);
        ctx.on("*", move |event| {
            sink.lock().unwrap().push(event.name().to_string());
            Ok(())
        });
        Ok(())
    });
    (registry, seen)
}

pub fn enable(config: &mut Config, id: &str) {
    config.extensions.push(ExtensionSpec {
        id: id.to_string(),
        options: serde_json::Value::Null,
    });
}
