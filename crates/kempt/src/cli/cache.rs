//! `kempt cache` - inspect or reset the processing cache.

use anyhow::{Context, Result};
use clap::Subcommand;
use kempt::CacheStore;

use crate::cli::ProjectArgs;

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show where the cache lives and how many entries it holds
    Info,
    /// Delete the cache so the next run reprocesses every file
    Clear,
}

pub fn run(project: &ProjectArgs, action: CacheAction) -> Result<()> {
    let config = project.resolve()?;
    let store = CacheStore::new(config.cache_file(), config.cache_schema_version, &config.fingerprint());

    match action {
        CacheAction::Info => {
            let state = store.load();
            println!("Cache: {}", store.path().display());
            println!("Entries: {}", state.len());
        }
        CacheAction::Clear => {
            store
                .clear()
                .with_context(|| format!("Failed to remove {}", store.path().display()))?;
            println!("Cleared {}", store.path().display());
        }
    }
    Ok(())
}
