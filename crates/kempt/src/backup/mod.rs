//! Backup archiver
//!
//! Snapshots a file set into a deflate zip archive with a JSON manifest that
//! records the archive fingerprint. Restore refuses to touch the working tree
//! unless the manifest exists and the archive still matches it, and takes a
//! safety snapshot of the current tree before extracting.
//!
//! Layout of the backup directory:
//!
//! ```text
//! <dir>/backup-20250101T120000.000-1a2b3c4d.archive
//! <dir>/backup-20250101T120000.000-1a2b3c4d.archive.manifest.json
//! <dir>/audit.log
//! ```
//!
//! All operations are blocking; async callers use `spawn_blocking`.

pub mod audit;
pub mod manifest;

use crate::error::{KemptError, Result};
use crate::hasher::{hash_file, HashAlgorithm};
use crate::scanner::Scanner;
use audit::{AuditAction, AuditEntry, AuditLog, AuditOutcome};
use chrono::{DateTime, Utc};
use manifest::{archive_path, manifest_path, BackupFile, Manifest};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Result of a successful create.
#[derive(Debug, Clone, Serialize)]
pub struct BackupHandle {
    pub name: String,
    pub archive_path: PathBuf,
    pub manifest_path: PathBuf,
    pub file_count: usize,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub name: String,
    /// Manifest creation time, or archive mtime when the manifest is missing.
    pub created_at: DateTime<Utc>,
    /// Archive size in bytes.
    pub size: u64,
    pub file_count: Option<usize>,
    pub has_manifest: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub name: String,
    pub files_restored: usize,
    /// Snapshot of the tree taken before extraction.
    pub safety_backup: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    pub removed: Vec<String>,
    pub kept: usize,
    /// Manifests deleted because their archive no longer exists.
    pub orphaned_manifests: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptBackup {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub healthy: Vec<String>,
    pub corrupt: Vec<CorruptBackup>,
    pub orphaned_archives: Vec<String>,
    pub orphaned_manifests: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.corrupt.is_empty() && self.orphaned_archives.is_empty() && self.orphaned_manifests.is_empty()
    }
}

/// Backup operations for one project.
#[derive(Clone)]
pub struct BackupArchiver {
    dir: PathBuf,
    scanner: Scanner,
    algorithm: HashAlgorithm,
    audit: AuditLog,
}

impl BackupArchiver {
    pub fn new(dir: PathBuf, scanner: Scanner, algorithm: HashAlgorithm) -> Self {
        let audit = AuditLog::new(&dir);
        Self {
            dir,
            scanner,
            algorithm,
            audit,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Scanner used for safety snapshots.
    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    fn root(&self) -> &Path {
        self.scanner.root()
    }

    /// Archive exactly `files` (absolute paths under the root).
    pub fn create_backup(&self, files: &[PathBuf]) -> Result<BackupHandle> {
        let start = Instant::now();
        let name = new_backup_name();
        let result = self.write_backup(&name, files);

        let entry = match &result {
            Ok(handle) => AuditEntry::new(AuditAction::Create, AuditOutcome::Success, start.elapsed())
                .file_count(handle.file_count),
            Err(e) => AuditEntry::new(AuditAction::Create, AuditOutcome::Failure, start.elapsed())
                .file_count(files.len())
                .error(e),
        };
        self.audit.record(&entry.backup(&name));

        match &result {
            Ok(handle) => info!(
                backup = %handle.name,
                files = handle.file_count,
                duration_ms = start.elapsed().as_millis() as u64,
                "Backup created"
            ),
            Err(e) => warn!(backup = %name, error = %e, "Backup failed"),
        }
        result
    }

    fn write_backup(&self, name: &str, files: &[PathBuf]) -> Result<BackupHandle> {
        fs::create_dir_all(&self.dir)?;
        let archive = archive_path(&self.dir, name);
        let manifest_file = manifest_path(&self.dir, name);
        let temp = archive.with_extension("archive.tmp");

        let sizes = match self.write_archive(&temp, files) {
            Ok(sizes) => sizes,
            Err(e) => {
                let _ = fs::remove_file(&temp);
                return Err(e);
            }
        };
        fs::rename(&temp, &archive)?;

        let fingerprint = hash_file(&archive, self.algorithm)?;
        let manifest = Manifest {
            created_at: Utc::now(),
            fingerprint: fingerprint.clone(),
            hash_algorithm: self.algorithm.as_str().to_string(),
            root: self.root().to_path_buf(),
            file_count: sizes.len(),
            files: sizes,
        };
        if let Err(e) = manifest.save(&manifest_file) {
            let _ = fs::remove_file(&archive);
            return Err(e);
        }

        Ok(BackupHandle {
            name: name.to_string(),
            archive_path: archive,
            manifest_path: manifest_file,
            file_count: manifest.file_count,
            fingerprint,
        })
    }

    fn write_archive(&self, dest: &Path, files: &[PathBuf]) -> Result<BTreeMap<String, u64>> {
        let mut zip = ZipWriter::new(fs::File::create(dest)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut sizes = BTreeMap::new();

        for path in files {
            let rel = path.strip_prefix(self.root()).map_err(|_| {
                KemptError::InvalidState(format!(
                    "{} is outside the project root {}",
                    path.display(),
                    self.root().display()
                ))
            })?;
            let entry_name = archive_entry_name(rel);
            if sizes.contains_key(&entry_name) {
                continue;
            }
            let content = fs::read(path)?;
            zip.start_file(entry_name.as_str(), options)?;
            zip.write_all(&content)?;
            sizes.insert(entry_name, content.len() as u64);
        }

        let file = zip.finish()?;
        file.sync_all()?;
        Ok(sizes)
    }

    /// All backups, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let (archives, manifests) = self.catalog()?;
        let mut infos = Vec::with_capacity(archives.len());
        for name in archives {
            let archive = archive_path(&self.dir, &name);
            let meta = fs::metadata(&archive)?;
            let has_manifest = manifests.contains(&name);
            let manifest = if has_manifest {
                Manifest::load(&manifest_path(&self.dir, &name)).ok()
            } else {
                None
            };
            let created_at = manifest
                .as_ref()
                .map(|m| m.created_at)
                .or_else(|| meta.modified().ok().map(DateTime::<Utc>::from))
                .unwrap_or_else(Utc::now);
            infos.push(BackupInfo {
                name,
                created_at,
                size: meta.len(),
                file_count: manifest.as_ref().map(|m| m.file_count),
                has_manifest,
            });
        }
        infos.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.name.cmp(&a.name)));
        Ok(infos)
    }

    /// Restore `name` over the project root.
    ///
    /// Fails without touching the tree when the archive or manifest is
    /// missing, the fingerprint does not match, or an entry would land
    /// outside the root.
    pub fn restore_backup(&self, name: &str) -> Result<RestoreReport> {
        let start = Instant::now();
        let result = self.restore_inner(name);

        let entry = match &result {
            Ok(report) => AuditEntry::new(AuditAction::Restore, AuditOutcome::Success, start.elapsed())
                .file_count(report.files_restored),
            Err(e) => AuditEntry::new(AuditAction::Restore, AuditOutcome::Failure, start.elapsed()).error(e),
        };
        self.audit.record(&entry.backup(name));
        result
    }

    fn restore_inner(&self, name: &str) -> Result<RestoreReport> {
        let archive = archive_path(&self.dir, name);
        if !archive.is_file() {
            return Err(KemptError::BackupNotFound(name.to_string()));
        }
        let manifest_file = manifest_path(&self.dir, name);
        if !manifest_file.is_file() {
            return Err(KemptError::ManifestNotFound(name.to_string()));
        }
        let manifest = Manifest::load(&manifest_file)?;

        let algorithm = HashAlgorithm::select(&manifest.hash_algorithm);
        let actual = hash_file(&archive, algorithm)?;
        if actual != manifest.fingerprint {
            return Err(KemptError::IntegrityMismatch {
                subject: format!("backup '{}'", name),
                expected: manifest.fingerprint,
                actual,
            });
        }

        let mut zip = ZipArchive::new(fs::File::open(&archive)?)?;
        let entries = checked_entries(&mut zip)?;

        let current = self.scanner.scan();
        let safety = self.create_backup(&current.files)?;
        info!(backup = %name, safety_backup = %safety.name, "Safety snapshot taken, restoring");

        for (index, rel) in &entries {
            let mut file = zip.by_index(*index)?;
            let dest = self.root().join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = fs::File::create(&dest)?;
            io::copy(&mut file, &mut out)?;
            debug!(file = %dest.display(), "Restored file");
        }

        info!(backup = %name, files = entries.len(), "Backup restored");
        Ok(RestoreReport {
            name: name.to_string(),
            files_restored: entries.len(),
            safety_backup: safety.name,
        })
    }

    /// Keep the `keep` newest backups and delete the rest.
    pub fn clean_backups(&self, keep: usize) -> Result<CleanReport> {
        let start = Instant::now();
        let result = self.clean_inner(keep);

        let entry = match &result {
            Ok(report) => AuditEntry::new(AuditAction::Clean, AuditOutcome::Success, start.elapsed())
                .file_count(report.removed.len()),
            Err(e) => AuditEntry::new(AuditAction::Clean, AuditOutcome::Failure, start.elapsed()).error(e),
        };
        self.audit.record(&entry);
        result
    }

    fn clean_inner(&self, keep: usize) -> Result<CleanReport> {
        let (archives, manifests) = self.catalog()?;
        let backups = self.list_backups()?;
        let mut report = CleanReport {
            kept: backups.len().min(keep),
            ..CleanReport::default()
        };
        for info in backups.into_iter().skip(keep) {
            remove_if_exists(&archive_path(&self.dir, &info.name))?;
            remove_if_exists(&manifest_path(&self.dir, &info.name))?;
            debug!(backup = %info.name, "Removed old backup");
            report.removed.push(info.name);
        }
        for name in manifests.difference(&archives) {
            remove_if_exists(&manifest_path(&self.dir, name))?;
            debug!(backup = %name, "Removed manifest without archive");
            report.orphaned_manifests.push(name.clone());
        }
        if !report.removed.is_empty() || !report.orphaned_manifests.is_empty() {
            info!(
                removed = report.removed.len(),
                orphaned_manifests = report.orphaned_manifests.len(),
                kept = report.kept,
                "Old backups cleaned"
            );
        }
        Ok(report)
    }

    /// Check every archive against its manifest.
    pub fn verify_backups(&self) -> Result<VerifyReport> {
        let (archives, manifests) = self.catalog()?;
        let mut report = VerifyReport::default();

        for name in &archives {
            if !manifests.contains(name) {
                report.orphaned_archives.push(name.clone());
                continue;
            }
            match self.verify_one(name) {
                Ok(()) => report.healthy.push(name.clone()),
                Err(reason) => {
                    warn!(backup = %name, reason = %reason, "Corrupt backup");
                    report.corrupt.push(CorruptBackup {
                        name: name.clone(),
                        reason,
                    });
                }
            }
        }
        report.orphaned_manifests = manifests.difference(&archives).cloned().collect();

        info!(
            healthy = report.healthy.len(),
            corrupt = report.corrupt.len(),
            orphaned_archives = report.orphaned_archives.len(),
            orphaned_manifests = report.orphaned_manifests.len(),
            "Backups verified"
        );
        Ok(report)
    }

    fn verify_one(&self, name: &str) -> std::result::Result<(), String> {
        let manifest = Manifest::load(&manifest_path(&self.dir, name))
            .map_err(|e| format!("unreadable manifest: {}", e))?;
        let algorithm = HashAlgorithm::select(&manifest.hash_algorithm);
        let actual = hash_file(&archive_path(&self.dir, name), algorithm)
            .map_err(|e| format!("unreadable archive: {}", e))?;
        if actual != manifest.fingerprint {
            return Err(format!(
                "fingerprint mismatch: expected {}, found {}",
                manifest.fingerprint, actual
            ));
        }
        Ok(())
    }

    /// Archive and manifest names present in the backup directory.
    fn catalog(&self) -> Result<(BTreeSet<String>, BTreeSet<String>)> {
        let mut archives = BTreeSet::new();
        let mut manifests = BTreeSet::new();
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((archives, manifests)),
            Err(e) => return Err(e.into()),
        };
        for entry in read_dir {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match BackupFile::classify(&entry.file_name().to_string_lossy()) {
                Some(BackupFile::Archive(name)) => {
                    archives.insert(name);
                }
                Some(BackupFile::Manifest(name)) => {
                    manifests.insert(name);
                }
                None => {}
            }
        }
        Ok((archives, manifests))
    }
}

impl std::fmt::Debug for BackupArchiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupArchiver")
            .field("dir", &self.dir)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// `backup-<UTC timestamp>-<8 hex>`
fn new_backup_name() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "backup-{}-{}",
        Utc::now().format("%Y%m%dT%H%M%S%.3f"),
        &suffix[..8]
    )
}

/// Zip entry names always use `/`.
fn archive_entry_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Entry indexes and safe relative paths. Any entry that would resolve
/// outside the root rejects the whole archive.
fn checked_entries(zip: &mut ZipArchive<fs::File>) -> Result<Vec<(usize, PathBuf)>> {
    let mut entries = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let file = zip.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        let rel = file
            .enclosed_name()
            .filter(|p| p.components().all(|c| matches!(c, Component::Normal(_))))
            .ok_or_else(|| {
                KemptError::InvalidState(format!(
                    "Archive entry '{}' escapes the project root",
                    file.name()
                ))
            })?;
        entries.push((index, rel));
    }
    Ok(entries)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
