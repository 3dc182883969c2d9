//! Errors with context and suggestions for CLI output

use kempt::KemptError;
use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Root directory missing or not a directory
    pub fn root_not_found(path: &Path) -> Self {
        Self::new(format!("Project root not found: {}", path.display()))
            .with_context("kempt needs an existing directory to process")
            .with_suggestion(format!("TRY: Check the path: ls -la {}", path.display()))
            .with_suggestion("TRY: Pass --root or run from inside the project")
    }

    /// Map engine errors that have an obvious next step.
    pub fn from_kempt(err: KemptError) -> anyhow::Error {
        match err {
            KemptError::BackupNotFound(name) => Self::new(format!("Backup not found: {}", name))
                .with_suggestion("TRY: kempt backup list   # Show available backups")
                .into(),
            KemptError::ManifestNotFound(name) => {
                Self::new(format!("Backup {} has no manifest", name))
                    .with_context("Restore refuses archives it cannot verify")
                    .with_suggestion("TRY: kempt backup verify   # Check every backup")
                    .into()
            }
            KemptError::IntegrityMismatch { subject, .. } => {
                Self::new(format!("Integrity check failed for {}", subject))
                    .with_context("The archive does not match its recorded fingerprint")
                    .with_suggestion("TRY: kempt backup list   # Pick an older backup")
                    .into()
            }
            KemptError::Configuration(reason) => Self::new("Invalid configuration")
                .with_context(reason)
                .with_suggestion("TRY: kempt init   # Write a default kempt.toml")
                .into(),
            other => anyhow::Error::new(other),
        }
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}
