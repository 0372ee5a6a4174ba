//! Durable cron-like job scheduler (spec §4.6).
//!
//! Grounded on the teacher's `runtime/schedule_runner.rs` tick/spawn shape,
//! simplified per spec §5 ("tick runs are serial per scheduler instance;
//! jobs within a tick execute sequentially... concurrent job runs for the
//! same job id are forbidden") — no concurrency guard, no catch-up of
//! missed windows, jobs run one at a time within a tick.

pub mod cron;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use sa_domain::error::Result;
use sa_domain::trace::TraceEvent;

pub use store::{CronJob, CronRunRow, CronStore, NewCronJob, PayloadKind, RunStatus, ScheduleKind};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(15);

/// Runs one due job's payload. Implemented by the orchestrator glue: a
/// `system_event` payload injects a synthetic message into the target
/// location's session, an `agent_turn` payload runs an isolated turn via
/// the sub-agent path (§2 "Scheduler fires jobs into the Orchestrator's
/// sub-agent path").
#[async_trait]
pub trait ScheduledJobExecutor: Send + Sync {
    async fn execute(&self, job: &CronJob) -> Result<String>;
}

pub struct Scheduler {
    store: Arc<CronStore>,
    executor: Arc<dyn ScheduledJobExecutor>,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(store: Arc<CronStore>, executor: Arc<dyn ScheduledJobExecutor>) -> Self {
        Self {
            store,
            executor,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Computes the schedule-kind-appropriate `next_run` (epoch seconds)
    /// after a job has just run at `after`.
    pub fn compute_next_run(job: &CronJob, after: chrono::DateTime<Utc>) -> Option<i64> {
        match job.schedule_kind {
            ScheduleKind::At => None,
            ScheduleKind::Every => {
                let interval_ms = job.schedule_every_ms.unwrap_or(0).max(0);
                Some(after.timestamp() + interval_ms / 1000)
            }
            ScheduleKind::Cron => {
                let expr = job.cron_expr.as_deref()?;
                cron::next_cron_time(expr, &after).map(|dt| dt.timestamp())
            }
        }
    }

    /// Runs the tick loop until `cancel` is triggered.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("scheduler tick loop stopping");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "scheduler tick failed, continuing");
                    }
                }
            }
        }
    }

    /// One tick: fetch due jobs, run each serially, record outcomes.
    /// Per §4.6/§7, an executor error never aborts the tick; it's recorded
    /// as a CronRun and the loop continues to the next due job.
    pub async fn tick(&self) -> Result<()> {
        let now = Utc::now();
        let due = self.store.due_jobs(now.timestamp())?;

        for job in due {
            self.run_job(&job, now).await;
        }
        Ok(())
    }

    async fn run_job(&self, job: &CronJob, now: chrono::DateTime<Utc>) {
        let started_at = Utc::now();
        let timeout = Duration::from_secs(job.payload_timeout_s.max(1) as u64);

        let scheduled_for = job.next_run.and_then(|ts| chrono::DateTime::<Utc>::from_timestamp(ts, 0));
        TraceEvent::CronFired {
            job_id: job.id.to_string(),
            scheduled_for: scheduled_for.map(|dt| dt.to_rfc3339()).unwrap_or_default(),
            late_by_ms: scheduled_for
                .map(|dt| (started_at - dt).num_milliseconds())
                .unwrap_or(0),
        }
        .emit();

        let outcome = tokio::time::timeout(timeout, self.executor.execute(job)).await;

        let finished_at = Utc::now();
        let (status, result_text, error_text) = match outcome {
            Ok(Ok(result)) => (RunStatus::Ok, Some(result), None),
            Ok(Err(e)) => (RunStatus::Error, None, Some(e.to_string())),
            Err(_) => (
                RunStatus::Timeout,
                None,
                Some(format!("job timed out after {}s", job.payload_timeout_s)),
            ),
        };

        if let Err(e) = self.store.record_run(
            job.id,
            started_at,
            finished_at,
            status,
            result_text.as_deref(),
            error_text.as_deref(),
        ) {
            tracing::error!(job_id = job.id, error = %e, "failed to record cron run");
        }

        let next_run = Self::compute_next_run(job, now);
        let disable = job.schedule_kind == ScheduleKind::At;
        if let Err(e) = self
            .store
            .record_completion(job.id, now.timestamp(), next_run, disable)
        {
            tracing::error!(job_id = job.id, error = %e, "failed to record job completion");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExecutor {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ScheduledJobExecutor for CountingExecutor {
        async fn execute(&self, _job: &CronJob) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(sa_domain::error::Error::Other("boom".into()))
            } else {
                Ok("done".into())
            }
        }
    }

    fn at_job(store: &CronStore, due_at: i64) -> i64 {
        store
            .create_job(NewCronJob {
                name: "once".into(),
                schedule_kind: ScheduleKind::At,
                schedule_at: Some(due_at),
                schedule_every_ms: None,
                cron_expr: None,
                timezone: None,
                payload_kind: PayloadKind::AgentTurn,
                payload_text: "do it".into(),
                payload_model: None,
                payload_timeout_s: 5,
                target_location: Some("loc-1".into()),
                next_run: Some(due_at),
            })
            .unwrap()
    }

    #[tokio::test]
    async fn tick_runs_due_job_and_disables_at_job() {
        let store = Arc::new(CronStore::open_in_memory().unwrap());
        let due_at = Utc::now().timestamp() - 10;
        let job_id = at_job(&store, due_at);

        let executor = Arc::new(CountingExecutor {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let scheduler = Scheduler::new(store.clone(), executor.clone());
        scheduler.tick().await.unwrap();

        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        let job = store.get_job(job_id).unwrap().unwrap();
        assert!(!job.enabled, "at job must disable after its single run (I4)");
        assert_eq!(job.run_count, 1);

        let runs = store.runs_for(job_id, 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, "ok");
    }

    #[tokio::test]
    async fn failed_job_is_recorded_and_tick_continues() {
        let store = Arc::new(CronStore::open_in_memory().unwrap());
        let due_at = Utc::now().timestamp() - 10;
        let job_id = at_job(&store, due_at);

        let executor = Arc::new(CountingExecutor {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let scheduler = Scheduler::new(store.clone(), executor);
        scheduler.tick().await.unwrap();

        let runs = store.runs_for(job_id, 10).unwrap();
        assert_eq!(runs[0].status, "error");
        assert!(runs[0].error_text.is_some());
    }

    #[tokio::test]
    async fn not_yet_due_job_is_skipped() {
        let store = Arc::new(CronStore::open_in_memory().unwrap());
        let due_at = Utc::now().timestamp() + 10_000;
        at_job(&store, due_at);

        let executor = Arc::new(CountingExecutor {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let scheduler = Scheduler::new(store.clone(), executor.clone());
        scheduler.tick().await.unwrap();
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn compute_next_run_every_adds_interval() {
        let job = CronJob {
            id: 1,
            name: "x".into(),
            enabled: true,
            schedule_kind: ScheduleKind::Every,
            schedule_at: None,
            schedule_every_ms: Some(60_000),
            cron_expr: None,
            timezone: None,
            payload_kind: PayloadKind::SystemEvent,
            payload_text: "x".into(),
            payload_model: None,
            payload_timeout_s: 120,
            target_location: None,
            next_run: None,
            last_run: None,
            run_count: 0,
            created_at: Utc::now(),
        };
        let now = Utc::now();
        let next = Scheduler::compute_next_run(&job, now).unwrap();
        assert_eq!(next, now.timestamp() + 60);
    }

    #[test]
    fn compute_next_run_at_is_none() {
        let job = CronJob {
            id: 1,
            name: "x".into(),
            enabled: true,
            schedule_kind: ScheduleKind::At,
            schedule_at: Some(1),
            schedule_every_ms: None,
            cron_expr: None,
            timezone: None,
            payload_kind: PayloadKind::SystemEvent,
            payload_text: "x".into(),
            payload_model: None,
            payload_timeout_s: 120,
            target_location: None,
            next_run: None,
            last_run: None,
            run_count: 0,
            created_at: Utc::now(),
        };
        assert!(Scheduler::compute_next_run(&job, Utc::now()).is_none());
    }
}
