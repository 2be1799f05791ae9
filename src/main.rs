//! immich-jobs-rs: scheduled maintenance jobs for an Immich photo server.
//!
//! The only job today is the asset timezone fixer, which rewrites the capture
//! time of assets whose EXIF timezone was recorded as `UTC` into a configured
//! local timezone. Progress is checkpointed per asset in `last_created.json`,
//! so every run only looks at assets created since the previous one.

#![warn(clippy::all)]

mod checkpoint;
mod cli;
mod config;
mod immich;
mod jobs;
mod scheduler;
mod shutdown;
mod systemd;
mod types;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use checkpoint::{CheckpointStore, JsonCheckpointStore};
use cli::Command;
use config::{DaemonConfig, JobConfig};
use immich::ImmichClient;
use jobs::TimezoneFixer;
use scheduler::{CronSchedule, FireOutcome, GuardedJob, RunGate, Scheduler};
use systemd::SystemdNotifier;

fn build_fixer(config: &JobConfig) -> anyhow::Result<Arc<TimezoneFixer>> {
    let client = ImmichClient::new(
        &config.api.base_url,
        &config.api.api_key,
        config.api.request_timeout,
    )?;
    let store = JsonCheckpointStore::new(&config.checkpoint_dir);
    tracing::debug!(
        checkpoint_file = %store.path().display(),
        client = ?client,
        "Configured timezone fixer"
    );
    Ok(Arc::new(TimezoneFixer::new(
        Arc::new(client),
        Arc::new(store),
        config.fixer.clone(),
    )))
}

async fn log_next_firing(scheduler: &mut Scheduler, ids: &[Uuid], schedule: &CronSchedule) {
    match scheduler.next_firing(ids).await {
        Ok(Some(next)) => tracing::info!(
            schedule = schedule.as_str(),
            zone = %schedule.zone(),
            next = %next.format("%Y-%m-%d %H:%M:%S UTC"),
            "Next run scheduled"
        ),
        Ok(None) => tracing::warn!(
            schedule = schedule.as_str(),
            "Schedule has no upcoming firing"
        ),
        Err(e) => tracing::debug!(error = format!("{e:#}"), "Could not compute next firing"),
    }
}

/// Install the cron schedule and block until a shutdown signal.
async fn run_daemon(args: cli::DaemonArgs) -> anyhow::Result<()> {
    let config = DaemonConfig::from_args(&args)?;
    tracing::info!(
        schedule = config.schedule.as_str(),
        schedule_zone = %config.schedule.zone(),
        target_timezone = %config.job.fixer.target_timezone,
        checkpoint_dir = %config.job.checkpoint_dir.display(),
        "Starting immich-jobs-rs"
    );

    let fixer = build_fixer(&config.job)?;
    let shutdown_token = shutdown::install_signal_handler()?;
    let notifier = SystemdNotifier::new(config.notify_systemd);

    let mut scheduler = Scheduler::new(shutdown_token.clone(), notifier).await?;
    let job_ids = scheduler.schedule(&config.schedule, fixer).await?;
    scheduler.start().await?;
    log_next_firing(&mut scheduler, &job_ids, &config.schedule).await;

    notifier.notify_ready();
    notifier.notify_status("Waiting for the next scheduled run");

    shutdown_token.cancelled().await;
    tracing::info!("Shutdown requested, stopping scheduler...");
    notifier.notify_stopping();
    scheduler.shutdown().await?;
    tracing::info!("Stopped");
    Ok(())
}

/// Execute every job once through the run gate.
async fn run_once(args: cli::RunOnceArgs) -> anyhow::Result<()> {
    let config = JobConfig::try_from(&args)?;
    let fixer = build_fixer(&config)?;
    let shutdown_token = shutdown::install_signal_handler()?;

    let job = GuardedJob::new(
        fixer,
        RunGate::default(),
        shutdown_token,
        SystemdNotifier::new(false),
    );
    match job.fire().await {
        FireOutcome::Completed => Ok(()),
        FireOutcome::Skipped => {
            tracing::info!("Run skipped");
            Ok(())
        }
        FireOutcome::Failed(e) => Err(e),
    }
}

/// Print every stored checkpoint.
async fn run_status(args: cli::StatusArgs) -> anyhow::Result<()> {
    let store = JsonCheckpointStore::new(config::checkpoint_dir(&args.store));
    let checkpoints = store.all().await?;

    println!("Checkpoint file: {}", store.path().display());
    println!();
    if checkpoints.is_empty() {
        println!("No checkpoints recorded yet.");
        return Ok(());
    }

    println!("Jobs:");
    for (job, last_created) in &checkpoints {
        match last_created {
            Some(at) => println!("  {:<28} {}", job, at.to_rfc3339()),
            None => println!("  {:<28} (full history on next run)", job),
        }
    }
    Ok(())
}

/// Clear one job's checkpoint after confirmation.
async fn run_reset_checkpoint(args: cli::ResetArgs) -> anyhow::Result<()> {
    let store = JsonCheckpointStore::new(config::checkpoint_dir(&args.store));

    if !args.yes {
        println!("This will clear the checkpoint of '{}' in:", args.job);
        println!("  {}", store.path().display());
        println!("Its next run will rescan the full asset history.");
        println!();
        print!("Are you sure? [y/N] ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .context("reading confirmation")?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    if store.clear(&args.job).await? {
        println!("Checkpoint of '{}' cleared.", args.job);
    } else {
        println!("'{}' had no checkpoint; nothing changed.", args.job);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = config::load_env_file();
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();
    if let Some(path) = env_file {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    match cli.effective_command() {
        Command::Daemon(args) => run_daemon(args).await,
        Command::RunOnce(args) => run_once(args).await,
        Command::Status(args) => run_status(args).await,
        Command::ResetCheckpoint(args) => run_reset_checkpoint(args).await,
    }
}
