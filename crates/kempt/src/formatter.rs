//! Formatter abstraction
//!
//! The processor only needs `format(text, path, options) -> text`. Two
//! implementations ship with the crate:
//!
//! - [`CommandFormatter`] pipes content through an external program.
//! - [`PassthroughFormatter`] returns content unchanged (no formatter
//!   configured, or tests).
//!
//! Options are merged per file by [`merge_options`]; the formatter can
//! contribute file-specific defaults through [`Formatter::resolve_config`].

use crate::config::Config;
use crate::error::{KemptError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Placeholder replaced by the file path in command arguments.
pub const PATH_PLACEHOLDER: &str = "{path}";

/// Environment variable carrying the merged options (JSON) to a command.
pub const OPTIONS_ENV_VAR: &str = "KEMPT_FORMATTER_OPTIONS";

pub type FormatOptions = Map<String, Value>;

#[async_trait]
pub trait Formatter: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// File-specific options the formatter would apply on its own
    /// (e.g. an editorconfig lookup). Lowest precedence.
    async fn resolve_config(&self, _path: &Path) -> Result<FormatOptions> {
        Ok(FormatOptions::new())
    }

    async fn format(&self, text: &str, path: &Path, options: &FormatOptions) -> Result<String>;
}

/// Merge option layers. Later layers win key by key:
/// file-specific < project config < explicit overrides.
pub fn merge_options(
    file_specific: FormatOptions,
    project: &FormatOptions,
    overrides: &FormatOptions,
) -> FormatOptions {
    let mut merged = file_specific;
    for (key, value) in project.iter().chain(overrides.iter()) {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Runs an external formatter: content on stdin, formatted content on stdout.
#[derive(Debug, Clone)]
pub struct CommandFormatter {
    program: String,
    args: Vec<String>,
}

impl CommandFormatter {
    /// Build from a `[program, args...]` list.
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command.split_first().ok_or_else(|| {
            KemptError::Configuration("formatter command is empty".to_string())
        })?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn args_for(&self, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(PATH_PLACEHOLDER, &path))
            .collect()
    }
}

#[async_trait]
impl Formatter for CommandFormatter {
    fn name(&self) -> &str {
        &self.program
    }

    async fn format(&self, text: &str, path: &Path, options: &FormatOptions) -> Result<String> {
        let options_json = serde_json::to_string(options)?;
        let mut child = Command::new(&self.program)
            .args(self.args_for(path))
            .env(OPTIONS_ENV_VAR, options_json)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                KemptError::Formatter(format!("Failed to spawn '{}': {}", self.program, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A formatter that exits without reading closes the pipe; its exit
            // status below is the more useful error.
            let written = match stdin.write_all(text.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            };
            match written {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e.into()),
                _ => {}
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KemptError::Formatter(format!(
                "'{}' failed with exit code {:?}: {}",
                self.program,
                output.status.code(),
                stderr.trim()
            )));
        }

        debug!(formatter = %self.program, file = %path.display(), bytes = output.stdout.len(), "Formatter finished");
        String::from_utf8(output.stdout)
            .map_err(|_| KemptError::Formatter(format!("'{}' produced non-UTF-8 output", self.program)))
    }
}

/// Returns input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFormatter;

#[async_trait]
impl Formatter for PassthroughFormatter {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn format(&self, text: &str, _path: &Path, _options: &FormatOptions) -> Result<String> {
        Ok(text.to_string())
    }
}

/// Formatter selected by configuration.
pub fn from_config(config: &Config) -> Result<std::sync::Arc<dyn Formatter>> {
    match &config.formatter.command {
        Some(command) => Ok(std::sync::Arc::new(CommandFormatter::new(command)?)),
        None => Ok(std::sync::Arc::new(PassthroughFormatter)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> FormatOptions {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_merge_precedence() {
        let file = map(json!({"tabWidth": 8, "semi": true, "endOfLine": "crlf"}));
        let project = map(json!({"tabWidth": 4, "semi": false}));
        let overrides = map(json!({"tabWidth": 2}));

        let merged = merge_options(file, &project, &overrides);
        assert_eq!(merged["tabWidth"], json!(2));
        assert_eq!(merged["semi"], json!(false));
        assert_eq!(merged["endOfLine"], json!("crlf"));
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(
            CommandFormatter::new(&[]),
            Err(KemptError::Configuration(_))
        ));
    }

    #[test]
    fn test_path_placeholder_substitution() {
        let formatter = CommandFormatter::new(&[
            "fmt".to_string(),
            "--stdin-filepath".to_string(),
            "{path}".to_string(),
        ])
        .unwrap();
        assert_eq!(
            formatter.args_for(Path::new("/p/a.js")),
            vec!["--stdin-filepath", "/p/a.js"]
        );
    }

    #[tokio::test]
    async fn test_passthrough_returns_input() {
        let out = PassthroughFormatter
            .format("x = 1", Path::new("a.js"), &FormatOptions::new())
            .await
            .unwrap();
        assert_eq!(out, "x = 1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_formatter_pipes_stdin_to_stdout() {
        let formatter = CommandFormatter::new(&["tr".to_string(), "a-z".to_string(), "A-Z".to_string()]).unwrap();
        let out = formatter
            .format("let a = 1;", Path::new("a.js"), &FormatOptions::new())
            .await
            .unwrap();
        assert_eq!(out, "LET A = 1;");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_formatter_failure_is_formatter_error() {
        let formatter = CommandFormatter::new(&["false".to_string()]).unwrap();
        let err = formatter
            .format("x", Path::new("a.js"), &FormatOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KemptError::Formatter(_)));
    }
}
