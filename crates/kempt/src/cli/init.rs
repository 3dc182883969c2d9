//! `kempt init` - write a default `kempt.toml`.

use anyhow::Result;
use clap::Args;
use kempt::config::DEFAULT_CONFIG_FILE;
use kempt::Config;
use std::path::PathBuf;

use crate::cli::error::HelpfulError;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Directory to initialize (defaults to the current directory)
    pub dir: Option<PathBuf>,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    let dir = match args.dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    if !dir.is_dir() {
        return Err(HelpfulError::root_not_found(&dir).into());
    }
    let path = dir.join(DEFAULT_CONFIG_FILE);
    if path.exists() && !args.force {
        return Err(HelpfulError::new(format!("{} already exists", path.display()))
            .with_suggestion("TRY: kempt init --force   # Overwrite it")
            .into());
    }

    // Root stays relative so the file can move with the project.
    let config = Config::for_root(".");
    config.save(&path).map_err(HelpfulError::from_kempt)?;
    println!("Wrote {}", path.display());
    Ok(())
}
