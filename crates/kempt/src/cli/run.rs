//! `kempt run` - format the project once, or keep watching it.

use anyhow::{Context, Result};
use clap::Args;
use kempt::{ExtensionRegistry, Orchestrator, ProcessorDeps, RunSummary};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::error::HelpfulError;
use crate::cli::output::print_summary;
use crate::cli::{runtime, ProjectArgs};

/// Upper bound on waiting for in-flight files after an interrupt.
const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Report what would change without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Keep running and process files as they change
    #[arg(short, long)]
    pub watch: bool,

    /// Skip the pre-run backup snapshot
    #[arg(long)]
    pub no_backup: bool,

    /// Maximum files processed at once
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: RunArgs, verbose: bool) -> Result<()> {
    let mut config = args.project.load()?;
    if args.dry_run {
        config.dry_run = true;
    }
    if args.no_backup {
        config.backup.enabled = false;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    let deps = ProcessorDeps::from_config(&config).map_err(HelpfulError::from_kempt)?;
    let registry = ExtensionRegistry::with_builtins();

    let rt = runtime()?;
    rt.block_on(async move {
        let orchestrator = Arc::new(
            Orchestrator::initialize(config, &registry, deps)
                .await
                .map_err(HelpfulError::from_kempt)?,
        );

        let signal = {
            let shutdown = orchestrator.session().shutdown().clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, finishing in-flight files");
                    shutdown.trigger();
                }
            })
        };

        let print = |summary: &RunSummary| {
            if args.json {
                match serde_json::to_string_pretty(summary) {
                    Ok(text) => println!("{}", text),
                    Err(e) => warn!(error = %e, "Failed to serialize summary"),
                }
            } else {
                print_summary(summary, verbose);
            }
        };

        let mut failed = 0;
        let outcome = if args.watch {
            orchestrator
                .watch(|summary| {
                    failed = summary.failed;
                    print(summary);
                })
                .await
        } else {
            orchestrator.run_once().await.map(|summary| {
                failed = summary.failed;
                print(&summary);
            })
        };

        let stopped = tokio::time::timeout(
            Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
            orchestrator.graceful_shutdown(),
        )
        .await;
        signal.abort();
        match stopped {
            Ok(result) => result.context("Shutdown did not complete cleanly")?,
            Err(_) => warn!(timeout_secs = SHUTDOWN_TIMEOUT_SECS, "Timed out waiting for in-flight files"),
        }

        outcome.map_err(HelpfulError::from_kempt)?;
        if failed > 0 && !args.watch {
            anyhow::bail!("{} file(s) failed", failed);
        }
        Ok(())
    })
}
