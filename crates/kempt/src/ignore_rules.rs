//! Path exclusion rules with source attribution
//!
//! Two rule sources are consulted, in order:
//! 1. patterns from configuration
//! 2. the project's `.gitignore`, when present
//!
//! Both use gitignore syntax. The first source with a matching rule decides;
//! a negated rule (`!pattern`) counts as a match that keeps the path.
//!
//! Config patterns are tried one by one in the order given and the first hit
//! wins. The `.gitignore` keeps git's own semantics: its last matching line
//! decides.

use crate::error::{KemptError, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const VCS_IGNORE_FILE: &str = ".gitignore";

/// Where a matching rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSource {
    Config,
    Gitignore,
}

impl RuleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleSource::Config => "config",
            RuleSource::Gitignore => "gitignore",
        }
    }
}

/// The rule that decided a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IgnoreMatch {
    pub pattern: String,
    pub source: RuleSource,
    /// True when the rule re-includes the path (`!pattern`).
    pub negated: bool,
}

impl IgnoreMatch {
    pub fn is_ignored(&self) -> bool {
        !self.negated
    }

    /// Human-readable reason for `file:ignored` events.
    pub fn reason(&self) -> String {
        format!("{} rule '{}'", self.source.as_str(), self.pattern)
    }
}

/// Evaluates exclusion rules relative to a project root.
pub struct IgnoreMatcher {
    root: PathBuf,
    config_rules: Vec<Gitignore>,
    vcs_rules: Option<Gitignore>,
    vcs_path: Option<PathBuf>,
}

impl IgnoreMatcher {
    /// Build a matcher from config patterns and `<root>/.gitignore`.
    pub fn new(root: &Path, patterns: &[String]) -> Result<Self> {
        let config_rules = build_config_rules(root, patterns)?;

        let candidate = root.join(VCS_IGNORE_FILE);
        let (vcs_rules, vcs_path) = if candidate.is_file() {
            let (rules, partial_err) = Gitignore::new(&candidate);
            if let Some(err) = partial_err {
                warn!(path = %candidate.display(), error = %err, "Some .gitignore lines could not be parsed");
            }
            debug!(path = %candidate.display(), rules = rules.num_ignores(), "Loaded VCS ignore file");
            (Some(rules), Some(candidate))
        } else {
            debug!(root = %root.display(), "No VCS ignore file, using config rules only");
            (None, None)
        };

        Ok(Self {
            root: root.to_path_buf(),
            config_rules,
            vcs_rules,
            vcs_path,
        })
    }

    /// Matcher with config rules only, ignoring any `.gitignore`.
    pub fn from_patterns(root: &Path, patterns: &[String]) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            config_rules: build_config_rules(root, patterns)?,
            vcs_rules: None,
            vcs_path: None,
        })
    }

    /// Check that every pattern compiles.
    pub fn validate_patterns(root: &Path, patterns: &[String]) -> Result<()> {
        build_config_rules(root, patterns).map(|_| ())
    }

    /// Path of the loaded `.gitignore`, if one was found.
    pub fn vcs_ignore_path(&self) -> Option<&Path> {
        self.vcs_path.as_deref()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `rel_path` (relative to root) is excluded.
    pub fn is_ignored(&self, rel_path: &Path, is_dir: bool) -> bool {
        self.explain(rel_path, is_dir)
            .map(|m| m.is_ignored())
            .unwrap_or(false)
    }

    /// First rule matching `rel_path`, with its source.
    ///
    /// Only the path itself is tested; callers walking a tree prune ignored
    /// directories so descendants are never asked about.
    pub fn explain(&self, rel_path: &Path, is_dir: bool) -> Option<IgnoreMatch> {
        let rel_path = self.relative(rel_path);
        let from_config = self
            .config_rules
            .iter()
            .find_map(|rule| rule_match(rule, rel_path, is_dir, RuleSource::Config));
        if from_config.is_some() {
            return from_config;
        }
        self.vcs_rules
            .as_ref()
            .and_then(|rules| rule_match(rules, rel_path, is_dir, RuleSource::Gitignore))
    }

    /// Like [`explain`](Self::explain), but also consults every parent
    /// directory. Used for paths that did not come from a pruning walk, such
    /// as filesystem notifications.
    pub fn explain_with_parents(&self, rel_path: &Path, is_dir: bool) -> Option<IgnoreMatch> {
        let rel_path = self.relative(rel_path);
        let mut ancestors: Vec<&Path> = rel_path
            .ancestors()
            .skip(1)
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
        ancestors.reverse();
        for dir in ancestors {
            if let Some(m) = self.explain(dir, true) {
                if m.is_ignored() {
                    return Some(m);
                }
            }
        }
        self.explain(rel_path, is_dir)
    }

    fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

/// One single-pattern matcher per config entry, in order.
fn build_config_rules(root: &Path, patterns: &[String]) -> Result<Vec<Gitignore>> {
    patterns
        .iter()
        .map(|pattern| {
            let mut builder = GitignoreBuilder::new(root);
            builder.add_line(None, pattern).map_err(|e| {
                KemptError::Configuration(format!("Invalid ignore pattern '{}': {}", pattern, e))
            })?;
            builder.build().map_err(|e| {
                KemptError::Configuration(format!("Invalid ignore pattern '{}': {}", pattern, e))
            })
        })
        .collect()
}

fn rule_match(
    rules: &Gitignore,
    rel_path: &Path,
    is_dir: bool,
    source: RuleSource,
) -> Option<IgnoreMatch> {
    match rules.matched(rel_path, is_dir) {
        Match::None => None,
        Match::Ignore(glob) => Some(IgnoreMatch {
            pattern: glob.original().to_string(),
            source,
            negated: false,
        }),
        Match::Whitelist(glob) => Some(IgnoreMatch {
            pattern: glob.original().to_string(),
            source,
            negated: true,
        }),
    }
}
