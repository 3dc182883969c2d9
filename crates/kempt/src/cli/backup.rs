//! `kempt backup` - inspect and manage pre-run snapshots.

use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;
use comfy_table::{Cell, Color};
use kempt::{BackupArchiver, Config, IgnoreMatcher, Scanner};
use std::sync::Arc;

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_age, format_size, print_table};
use crate::cli::ProjectArgs;

#[derive(Debug, Subcommand)]
pub enum BackupAction {
    /// List backups, newest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Snapshot every target file now
    Create,
    /// Restore a backup over the project (a safety snapshot is taken first)
    Restore {
        /// Backup name as shown by `kempt backup list`
        name: String,
    },
    /// Delete all but the newest backups
    Clean {
        /// How many to keep (defaults to the configured retention)
        #[arg(long)]
        keep: Option<usize>,
    },
    /// Check every archive against its manifest
    Verify {
        #[arg(long)]
        json: bool,
    },
}

fn archiver(config: &Config) -> Result<BackupArchiver> {
    let matcher = IgnoreMatcher::new(&config.root, &config.ignore).map_err(HelpfulError::from_kempt)?;
    let scanner = Scanner::new(config, Arc::new(matcher));
    Ok(BackupArchiver::new(config.backup_dir(), scanner, config.hash_algorithm()))
}

pub fn run(project: &ProjectArgs, action: BackupAction) -> Result<()> {
    let config = project.resolve()?;
    let archiver = archiver(&config)?;

    match action {
        BackupAction::List { json } => {
            let backups = archiver.list_backups().map_err(HelpfulError::from_kempt)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&backups)?);
                return Ok(());
            }
            if backups.is_empty() {
                println!("No backups in {}", archiver.dir().display());
                return Ok(());
            }
            let now = Utc::now();
            let rows: Vec<Vec<Cell>> = backups
                .iter()
                .map(|b| {
                    let manifest = if b.has_manifest {
                        Cell::new("ok").fg(Color::Green)
                    } else {
                        Cell::new("missing").fg(Color::Red)
                    };
                    vec![
                        Cell::new(&b.name),
                        Cell::new(format_age(b.created_at, now)),
                        Cell::new(b.file_count.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())),
                        Cell::new(format_size(b.size)),
                        manifest,
                    ]
                })
                .collect();
            print_table(&["NAME", "CREATED", "FILES", "SIZE", "MANIFEST"], rows);
        }
        BackupAction::Create => {
            let scan = archiver.scanner().scan();
            let handle = archiver.create_backup(&scan.files).map_err(HelpfulError::from_kempt)?;
            println!("Created {} ({} files)", handle.name, handle.file_count);
        }
        BackupAction::Restore { name } => {
            let report = archiver.restore_backup(&name).map_err(HelpfulError::from_kempt)?;
            println!(
                "Restored {} files from {} (previous state saved as {})",
                report.files_restored, report.name, report.safety_backup
            );
        }
        BackupAction::Clean { keep } => {
            let keep = keep.unwrap_or(config.backup.retention);
            let report = archiver.clean_backups(keep).map_err(HelpfulError::from_kempt)?;
            for name in &report.removed {
                println!("Removed {}", name);
            }
            for name in &report.orphaned_manifests {
                println!("Removed manifest {} (archive missing)", name);
            }
            println!("{} removed, {} kept", report.removed.len(), report.kept);
        }
        BackupAction::Verify { json } => {
            let report = archiver.verify_backups().map_err(HelpfulError::from_kempt)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for name in &report.healthy {
                    println!("ok       {}", name);
                }
                for corrupt in &report.corrupt {
                    println!("CORRUPT  {}: {}", corrupt.name, corrupt.reason);
                }
                for name in &report.orphaned_archives {
                    println!("ORPHAN   {} (no manifest)", name);
                }
                for name in &report.orphaned_manifests {
                    println!("ORPHAN   {} (no archive)", name);
                }
            }
            if !report.is_clean() {
                return Err(HelpfulError::new("Backup verification found problems")
                    .with_suggestion("TRY: kempt backup clean   # Drop old or broken backups")
                    .into());
            }
        }
    }
    Ok(())
}
