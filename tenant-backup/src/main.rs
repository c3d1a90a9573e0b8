//! Tenant Backup - Main entry point
//!
//! Backs up every tenant database once (`run`) or on a schedule (`daemon`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tenant_backup::daemon::scheduler::{self, BackupScheduler};
use tenant_backup::daemon::shutdown::ShutdownCoordinator;
use tenant_backup::{utils, Config};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Back up every tenant once and exit
    Run(RunArgs),

    /// Back up on a cron schedule until interrupted
    Daemon {
        /// Cron expression with seconds (overrides config)
        #[arg(long)]
        cron: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Local generations to keep
    #[arg(long)]
    keep: Option<usize>,

    /// Pages copied per backup step
    #[arg(long)]
    step_pages: Option<u32>,

    /// Archive root directory
    #[arg(long, value_name = "DIR")]
    sweep_root: Option<PathBuf>,

    /// Archive retention in days
    #[arg(long)]
    retention_days: Option<u64>,

    /// Deployment environment name
    #[arg(short, long)]
    environment: Option<String>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(keep) = self.keep {
            config.backup.keep = keep;
        }
        if let Some(step_pages) = self.step_pages {
            config.backup.step_pages = step_pages;
        }
        if let Some(sweep_root) = &self.sweep_root {
            config.backup.sweep_root = sweep_root.clone();
        }
        if let Some(days) = self.retention_days {
            config.backup.retention_days = days;
        }
        if let Some(environment) = &self.environment {
            config.backup.environment = environment.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(cli.config.as_deref())?;
    if let Command::Run(args) = &cli.command {
        args.apply(&mut config);
        config.validate()?;
    }

    // Initialize logging
    let log_level = cli.log_level.clone().unwrap_or_else(|| config.log.level.clone());
    utils::logger::init(&log_level)?;

    tracing::info!(
        "Starting tenant-backup v{} (environment: {})",
        env!("CARGO_PKG_VERSION"),
        config.backup.environment
    );

    let shutdown = ShutdownCoordinator::default();

    match cli.command {
        Command::Run(args) => run_once(config, shutdown, args.json).await,
        Command::Daemon { cron } => run_daemon(config, shutdown, cron).await,
    }
}

async fn run_once(config: Config, shutdown: ShutdownCoordinator, json: bool) -> Result<()> {
    let cancel = shutdown.token();
    let signal_handle = tokio::spawn(async move {
        shutdown.wait_for_signal().await;
    });

    let report = scheduler::run_blocking(Arc::new(config), cancel.clone()).await;

    // Release the signal listener
    cancel.cancel();
    let _ = signal_handle.await;

    let report = report?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    let report = report.into_result()?;
    tracing::info!(run_id = %report.run_id, tenants = report.succeeded.len(), "All tenants backed up");
    Ok(())
}

async fn run_daemon(config: Config, shutdown: ShutdownCoordinator, cron: Option<String>) -> Result<()> {
    let cron = cron.unwrap_or_else(|| config.schedule.cron.clone());

    let scheduler = BackupScheduler::new(Arc::new(config), shutdown.token()).await?;
    scheduler.schedule(&cron).await?;
    scheduler.start().await?;
    tracing::info!(cron = %cron, "Scheduler started");

    // Wait for shutdown signal
    shutdown.wait_for_signal().await;

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler shutdown error: {}", e);
    }
    tracing::info!("Daemon stopped");
    Ok(())
}
