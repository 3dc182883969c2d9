//! Command-line interface
//!
//! Each subcommand lives in its own module and returns `anyhow::Result`.
//! Engine errors with an obvious next step are converted to
//! [`error::HelpfulError`] on the way out.

pub mod backup;
pub mod cache;
pub mod error;
pub mod ignore;
pub mod init;
pub mod output;
pub mod run;

use anyhow::Result;
use clap::Args;
use kempt::Config;
use std::path::PathBuf;

use crate::cli::error::HelpfulError;

/// Where to find the project and its configuration.
#[derive(Debug, Clone, Args)]
pub struct ProjectArgs {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true, env = "KEMPT_ROOT")]
    pub root: Option<PathBuf>,

    /// Config file (defaults to <root>/kempt.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

impl ProjectArgs {
    fn root_dir(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    /// Load the unresolved configuration.
    pub fn load(&self) -> Result<Config> {
        let root = self.root_dir()?;
        let mut config = match &self.config {
            Some(path) => Config::load(path).map_err(HelpfulError::from_kempt)?,
            None => {
                if !root.is_dir() {
                    return Err(HelpfulError::root_not_found(&root).into());
                }
                Config::discover(&root).map_err(HelpfulError::from_kempt)?
            }
        };
        if self.root.is_some() {
            config.root = root;
        }
        Ok(config)
    }

    /// Load and resolve, for commands that need canonical paths.
    pub fn resolve(&self) -> Result<Config> {
        self.load()?.resolve().map_err(HelpfulError::from_kempt)
    }
}

/// Runtime for commands that drive the async engine.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread().enable_all().build()?)
}
