//! `kempt ignore explain` - show which rule decides a path.

use anyhow::Result;
use clap::Subcommand;
use kempt::IgnoreMatcher;
use std::path::PathBuf;

use crate::cli::ProjectArgs;

#[derive(Debug, Subcommand)]
pub enum IgnoreAction {
    /// Explain whether a path would be processed
    Explain {
        /// Path, absolute or relative to the project root
        path: PathBuf,
    },
}

pub fn run(project: &ProjectArgs, action: IgnoreAction) -> Result<()> {
    let config = project.resolve()?;
    let matcher = IgnoreMatcher::new(&config.root, &config.ignore)?;

    match action {
        IgnoreAction::Explain { path } => {
            let abs = if path.is_absolute() { path } else { config.root.join(path) };
            let rel = abs.strip_prefix(&config.root).unwrap_or(&abs).to_path_buf();
            let is_dir = abs.is_dir();

            match matcher.explain_with_parents(&rel, is_dir) {
                Some(rule) if rule.is_ignored() => {
                    println!("{}: ignored by {}", rel.display(), rule.reason());
                    return Ok(());
                }
                Some(rule) => println!("{}: re-included by {}", rel.display(), rule.reason()),
                None => println!("{}: no ignore rule matches", rel.display()),
            }
            if !is_dir && !config.is_target(&abs) {
                println!("{}: extension is not in file_extensions", rel.display());
            }
        }
    }
    Ok(())
}
