//! Syntax validators for structured-text files
//!
//! Validators are looked up by file extension. Files with no registered
//! validator are accepted as-is.

use std::collections::HashMap;
use std::sync::Arc;

/// Checks that text parses. Returns a human-readable reason on failure.
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, text: &str) -> Result<(), String>;
}

pub struct JsonValidator;

impl Validator for JsonValidator {
    fn name(&self) -> &'static str {
        "json"
    }

    fn validate(&self, text: &str) -> Result<(), String> {
        serde_json::from_str::<serde_json::Value>(text)
            .map(|_| ())
            .map_err(|e| format!("invalid JSON: {}", e))
    }
}

pub struct TomlValidator;

impl Validator for TomlValidator {
    fn name(&self) -> &'static str {
        "toml"
    }

    fn validate(&self, text: &str) -> Result<(), String> {
        text.parse::<toml::Table>()
            .map(|_| ())
            .map_err(|e| format!("invalid TOML: {}", e.message()))
    }
}

/// Extension → validator lookup.
#[derive(Clone)]
pub struct ValidatorSet {
    by_extension: HashMap<String, Arc<dyn Validator>>,
}

impl ValidatorSet {
    pub fn empty() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    pub fn register(&mut self, extension: &str, validator: Arc<dyn Validator>) {
        self.by_extension
            .insert(extension.to_ascii_lowercase(), validator);
    }

    pub fn for_extension(&self, extension: &str) -> Option<&Arc<dyn Validator>> {
        self.by_extension.get(&extension.to_ascii_lowercase())
    }

    /// Validate `text` as a file with `extension`.
    pub fn check(&self, extension: &str, text: &str) -> Result<(), String> {
        match self.for_extension(extension) {
            Some(validator) => validator.validate(text),
            None => Ok(()),
        }
    }
}

impl Default for ValidatorSet {
    fn default() -> Self {
        let mut set = Self::empty();
        set.register("json", Arc::new(JsonValidator));
        set.register("toml", Arc::new(TomlValidator));
        set
    }
}

impl std::fmt::Debug for ValidatorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<_> = self.by_extension.keys().collect();
        extensions.sort();
        f.debug_struct("ValidatorSet")
            .field("extensions", &extensions)
            .finish()
    }
}
