//! kempt command-line entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use kempt_logging::{init_logging, LogConfig};
use std::process::ExitCode;

mod cli;

use cli::backup::BackupAction;
use cli::cache::CacheAction;
use cli::ignore::IgnoreAction;
use cli::init::InitArgs;
use cli::run::RunArgs;
use cli::ProjectArgs;

#[derive(Parser, Debug)]
#[command(name = "kempt", version, about = "Incremental, cache-aware file formatting")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Format every changed file in the project
    Run(RunArgs),

    /// Write a default kempt.toml
    Init(InitArgs),

    /// Manage pre-run backups
    Backup {
        #[command(flatten)]
        project: ProjectArgs,
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Inspect ignore rules
    Ignore {
        #[command(flatten)]
        project: ProjectArgs,
        #[command(subcommand)]
        action: IgnoreAction,
    },

    /// Inspect or reset the processing cache
    Cache {
        #[command(flatten)]
        project: ProjectArgs,
        #[command(subcommand)]
        action: CacheAction,
    },
}

fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => cli::run::run(args, cli.verbose),
        Commands::Init(args) => cli::init::run(args),
        Commands::Backup { project, action } => cli::backup::run(&project, action),
        Commands::Ignore { project, action } => cli::ignore::run(&project, action),
        Commands::Cache { project, action } => cli::cache::run(&project, action),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "kempt",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<cli::error::HelpfulError>() {
                Some(helpful) => eprint!("{}", helpful),
                None => eprintln!("ERROR: {:#}", err),
            }
            ExitCode::from(1)
        }
    }
}
