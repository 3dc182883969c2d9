//! Run summary types

use crate::error::KemptError;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Terminal classification of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// New content written and verified.
    Formatted,
    /// Formatter output equalled the input; nothing written.
    Unchanged,
    /// Cache hit; not reprocessed.
    Skipped,
    /// Dry run: content would have been rewritten.
    WouldFormat,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Formatted => "formatted",
            FileStatus::Unchanged => "unchanged",
            FileStatus::Skipped => "skipped",
            FileStatus::WouldFormat => "would_format",
            FileStatus::Failed => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, FileStatus::Failed)
    }
}

/// Why a file failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureInfo {
    /// Error class, see [`KemptError::kind`].
    pub kind: &'static str,
    pub message: String,
}

impl From<&KemptError> for FailureInfo {
    fn from(err: &KemptError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureInfo>,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// Where the original content was saved after a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_path: Option<PathBuf>,
}

impl FileOutcome {
    pub fn success(path: PathBuf, status: FileStatus) -> Self {
        Self {
            path,
            status,
            error: None,
            attempts: 1,
            duration: Duration::ZERO,
            recovery_path: None,
        }
    }

    pub fn failure(path: PathBuf, err: &KemptError) -> Self {
        Self {
            path,
            status: FileStatus::Failed,
            error: Some(err.into()),
            attempts: 1,
            duration: Duration::ZERO,
            recovery_path: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunTimings {
    #[serde(serialize_with = "serialize_millis")]
    pub scan: Duration,
    #[serde(serialize_with = "serialize_millis")]
    pub backup: Duration,
    #[serde(serialize_with = "serialize_millis")]
    pub processing: Duration,
    #[serde(serialize_with = "serialize_millis")]
    pub total: Duration,
}

/// Aggregate result of one processing pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub formatted: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub would_format: usize,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
    /// In submission order.
    pub outcomes: Vec<FileOutcome>,
    pub timings: RunTimings,
}

impl RunSummary {
    /// Tally `outcomes`, preserving their order.
    pub fn from_outcomes(outcomes: Vec<FileOutcome>, dry_run: bool) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            dry_run,
            ..Self::default()
        };
        for outcome in &outcomes {
            match outcome.status {
                FileStatus::Formatted => summary.formatted += 1,
                FileStatus::Unchanged => summary.unchanged += 1,
                FileStatus::Skipped => summary.skipped += 1,
                FileStatus::WouldFormat => summary.would_format += 1,
                FileStatus::Failed => summary.failed += 1,
            }
        }
        summary.succeeded = summary.total - summary.failed;
        summary.outcomes = outcomes;
        summary
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn outcome(&self, path: &std::path::Path) -> Option<&FileOutcome> {
        self.outcomes.iter().find(|o| o.path == path)
    }

    /// One-line plain text summary.
    pub fn headline(&self) -> String {
        let mut line = format!(
            "{} files: {} formatted, {} unchanged, {} skipped, {} failed",
            self.total, self.formatted, self.unchanged, self.skipped, self.failed
        );
        if self.dry_run {
            line.push_str(&format!(", {} would be formatted (dry run)", self.would_format));
        }
        line.push_str(&format!(" in {}ms", self.timings.total.as_millis()));
        line
    }
}

fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_order() {
        let err = KemptError::Validation {
            path: PathBuf::from("b.json"),
            reason: "invalid JSON".to_string(),
        };
        let summary = RunSummary::from_outcomes(
            vec![
                FileOutcome::success(PathBuf::from("a.js"), FileStatus::Formatted),
                FileOutcome::failure(PathBuf::from("b.json"), &err),
                FileOutcome::success(PathBuf::from("c.js"), FileStatus::Skipped),
                FileOutcome::success(PathBuf::from("d.js"), FileStatus::Unchanged),
            ],
            false,
        );

        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.formatted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.outcomes[1].path, PathBuf::from("b.json"));
        assert_eq!(summary.failures().count(), 1);
        assert_eq!(
            summary.outcome(std::path::Path::new("b.json")).unwrap().error.as_ref().unwrap().kind,
            "validation"
        );
    }

    #[test]
    fn test_serializes_durations_as_millis() {
        let mut outcome = FileOutcome::success(PathBuf::from("a.js"), FileStatus::WouldFormat);
        outcome.duration = Duration::from_millis(42);
        let json = serde_json::to_value(RunSummary::from_outcomes(vec![outcome], true)).unwrap();

        assert_eq!(json["outcomes"][0]["duration"], 42);
        assert_eq!(json["outcomes"][0]["status"], "would_format");
        assert_eq!(json["would_format"], 1);
        assert!(json["outcomes"][0].get("error").is_none());
    }

    #[test]
    fn test_headline_mentions_dry_run() {
        let summary = RunSummary::from_outcomes(Vec::new(), true);
        assert!(summary.headline().contains("dry run"));
    }
}
