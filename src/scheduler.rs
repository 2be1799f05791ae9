//! Cron-driven job trigger with skip-if-still-running semantics.
//!
//! Every firing passes through a [`RunGate`]. When the previous run has not
//! returned yet, the firing is dropped (not queued): overlapping runs would
//! race on the checkpoint file.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::systemd::SystemdNotifier;

/// A unit of work the scheduler can fire.
#[async_trait]
pub(crate) trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;

    /// Run once. Errors are logged by the caller; they never stop the
    /// schedule.
    async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()>;
}

#[derive(Error, Debug)]
#[error("Invalid schedule '{expr}': {reason}")]
pub(crate) struct ScheduleParseError {
    pub expr: String,
    pub reason: String,
}

/// Zone cron fields are evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScheduleZone {
    /// The process's local time (`TZ` or `/etc/localtime`).
    Local,
    Named(Tz),
}

impl fmt::Display for ScheduleZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleZone::Local => f.write_str("local"),
            ScheduleZone::Named(tz) => write!(f, "{tz}"),
        }
    }
}

/// A validated cron expression.
///
/// Accepts the classic 5-field form (`min hour dom month dow`), the
/// seconds-first 6-field form, and `@daily`-style descriptors. 5-field
/// expressions get a `0` seconds field so every form is evaluated the same
/// way.
///
/// When both day-of-month and day-of-week are restricted, the schedule fires
/// on days matching either field, as classic cron does. The underlying
/// parser requires both to match, so such an expression is split into one
/// trigger per day field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CronSchedule {
    expr: String,
    triggers: Vec<String>,
    zone: ScheduleZone,
}

fn restricts_days(field: &str) -> bool {
    field != "*" && field != "?"
}

impl CronSchedule {
    pub(crate) fn parse(input: &str) -> Result<Self, ScheduleParseError> {
        let trimmed = input.trim();
        let expr = if !trimmed.starts_with('@') && trimmed.split_whitespace().count() == 5 {
            format!("0 {}", trimmed)
        } else {
            trimmed.to_string()
        };
        let invalid = |reason: String| ScheduleParseError {
            expr: input.to_string(),
            reason,
        };
        if expr.is_empty() {
            return Err(invalid("expression is empty".to_string()));
        }

        let fields: Vec<&str> = expr.split_whitespace().collect();
        let triggers = match fields.as_slice() {
            [sec, min, hour, dom, month, dow] if restricts_days(dom) && restricts_days(dow) => vec![
                format!("{sec} {min} {hour} {dom} {month} *"),
                format!("{sec} {min} {hour} * {month} {dow}"),
            ],
            _ => vec![expr.clone()],
        };

        // Validate with the same parser the scheduler uses.
        for trigger in &triggers {
            Job::new_async(trigger.as_str(), |_uuid, _scheduler| Box::pin(async {}))
                .map_err(|e| invalid(e.to_string()))?;
        }
        Ok(Self {
            expr,
            triggers,
            zone: ScheduleZone::Local,
        })
    }

    /// Evaluate the fields in `tz` instead of local time.
    pub(crate) fn in_zone(mut self, tz: Tz) -> Self {
        self.zone = ScheduleZone::Named(tz);
        self
    }

    /// Normalized (seconds-first) expression.
    pub(crate) fn as_str(&self) -> &str {
        &self.expr
    }

    /// Expressions actually registered with the scheduler.
    pub(crate) fn triggers(&self) -> &[String] {
        &self.triggers
    }

    pub(crate) fn zone(&self) -> ScheduleZone {
        self.zone
    }
}

/// Single-flight flag: at most one guard exists at a time.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunGate {
    running: Arc<AtomicBool>,
    released: Arc<Notify>,
}

impl RunGate {
    /// Claim the gate, or `None` if a run is already active.
    pub(crate) fn try_enter(&self) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                running: Arc::clone(&self.running),
                released: Arc::clone(&self.released),
            })
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Resolve once no run holds the gate.
    pub(crate) async fn idle(&self) {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            // Register before checking so a release in between is not missed.
            released.as_mut().enable();
            if !self.is_running() {
                return;
            }
            released.await;
        }
    }
}

/// Releases the gate on drop, including when the run panics.
#[derive(Debug)]
pub(crate) struct RunGuard {
    running: Arc<AtomicBool>,
    released: Arc<Notify>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.released.notify_waiters();
    }
}

/// What happened to one firing.
#[derive(Debug)]
pub(crate) enum FireOutcome {
    /// A previous run still held the gate.
    Skipped,
    Completed,
    Failed(anyhow::Error),
}

/// A job bound to its gate. Cheap to clone into each firing.
#[derive(Clone)]
pub(crate) struct GuardedJob {
    job: Arc<dyn ScheduledJob>,
    gate: RunGate,
    shutdown: CancellationToken,
    notifier: SystemdNotifier,
}

impl GuardedJob {
    pub(crate) fn new(
        job: Arc<dyn ScheduledJob>,
        gate: RunGate,
        shutdown: CancellationToken,
        notifier: SystemdNotifier,
    ) -> Self {
        Self {
            job,
            gate,
            shutdown,
            notifier,
        }
    }

    /// Run the job unless another run is active.
    pub(crate) async fn fire(&self) -> FireOutcome {
        let name = self.job.name();
        let Some(_guard) = self.gate.try_enter() else {
            tracing::warn!(job = name, "Previous run still in progress, skipping this firing");
            return FireOutcome::Skipped;
        };

        if self.shutdown.is_cancelled() {
            tracing::debug!(job = name, "Shutdown in progress, not starting a run");
            return FireOutcome::Skipped;
        }

        self.notifier.notify_status(&format!("{name}: running"));
        let started = std::time::Instant::now();
        let outcome = match self.job.run(self.shutdown.clone()).await {
            Ok(()) => {
                self.notifier.notify_status(&format!(
                    "{name}: last run succeeded at {}",
                    Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
                ));
                FireOutcome::Completed
            }
            Err(e) => {
                tracing::error!(job = name, error = format!("{e:#}"), "Run failed");
                self.notifier.notify_status(&format!(
                    "{name}: last run failed at {}",
                    Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
                ));
                FireOutcome::Failed(e)
            }
        };
        tracing::debug!(
            job = name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Run returned"
        );
        outcome
    }
}

type FireFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

fn cron_job(expr: &str, zone: ScheduleZone, guarded: GuardedJob) -> Result<Job, JobSchedulerError> {
    let run = move |_uuid: Uuid, _scheduler| -> FireFuture {
        let guarded = guarded.clone();
        Box::pin(async move {
            guarded.fire().await;
        })
    };
    match zone {
        ScheduleZone::Local => Job::new_async_tz(expr, Local, run),
        ScheduleZone::Named(tz) => Job::new_async_tz(expr, tz, run),
    }
}

/// Cron trigger for gated jobs, backed by `tokio-cron-scheduler`.
pub(crate) struct Scheduler {
    inner: JobScheduler,
    gate: RunGate,
    shutdown: CancellationToken,
    notifier: SystemdNotifier,
}

impl Scheduler {
    pub(crate) async fn new(
        shutdown: CancellationToken,
        notifier: SystemdNotifier,
    ) -> anyhow::Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("creating job scheduler")?;
        Ok(Self {
            inner,
            gate: RunGate::default(),
            shutdown,
            notifier,
        })
    }

    /// Register `job` to fire on `schedule`, returning one id per trigger.
    /// All jobs on one scheduler share the gate, so at most one of them runs
    /// at a time.
    pub(crate) async fn schedule(
        &self,
        schedule: &CronSchedule,
        job: Arc<dyn ScheduledJob>,
    ) -> anyhow::Result<Vec<Uuid>> {
        let guarded = GuardedJob::new(job, self.gate.clone(), self.shutdown.clone(), self.notifier);
        let mut ids = Vec::with_capacity(schedule.triggers().len());
        for trigger in schedule.triggers() {
            let cron_job = cron_job(trigger, schedule.zone(), guarded.clone())
                .with_context(|| format!("creating scheduler job for cron {trigger}"))?;
            let id = self
                .inner
                .add(cron_job)
                .await
                .context("adding scheduler job")?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Earliest upcoming firing among `ids`.
    pub(crate) async fn next_firing(
        &mut self,
        ids: &[Uuid],
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        let mut earliest: Option<DateTime<Utc>> = None;
        for id in ids {
            let next = self
                .inner
                .next_tick_for_job(*id)
                .await
                .context("querying next firing")?;
            earliest = match (earliest, next) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        Ok(earliest)
    }

    pub(crate) async fn start(&self) -> anyhow::Result<()> {
        self.inner
            .start()
            .await
            .context("starting job scheduler")
    }

    pub(crate) fn is_running(&self) -> bool {
        self.gate.is_running()
    }

    /// Stop firing and wait for the in-flight run (if any) to return.
    pub(crate) async fn shutdown(mut self) -> anyhow::Result<()> {
        self.inner
            .shutdown()
            .await
            .context("stopping job scheduler")?;

        if self.is_running() {
            tracing::info!("Waiting for the current run to finish...");
        }
        self.gate.idle().await;
        Ok(())
    }
}
