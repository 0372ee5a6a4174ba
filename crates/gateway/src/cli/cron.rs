//! `serialagent cron` — manage durable scheduled jobs (spec §4.6).

use chrono::Utc;

use crate::scheduler::cron::next_cron_time;
use crate::scheduler::{CronStore, NewCronJob, PayloadKind, ScheduleKind};

/// List every cron job with its schedule and next run time.
pub fn list(store: &CronStore) -> anyhow::Result<()> {
    let jobs = store.list_jobs()?;
    if jobs.is_empty() {
        println!("No cron jobs.");
        return Ok(());
    }

    for job in jobs {
        let status = if job.enabled { "enabled" } else { "disabled" };
        let next = job
            .next_run
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "#{:<4} {:<20} [{status}] kind={:?} payload={:?} next_run={next} runs={}",
            job.id, job.name, job.payload_kind, job.schedule_kind, job.run_count,
        );
    }
    Ok(())
}

/// Create a one-shot (`at`), periodic (`every`), or cron-expression job
/// that injects a system event into `target_location` (or runs an
/// isolated agent turn, per `agent_turn`).
#[allow(clippy::too_many_arguments)]
pub fn add(
    store: &CronStore,
    name: String,
    schedule: String,
    payload_text: String,
    target_location: Option<String>,
    agent_turn: bool,
    timeout_s: i64,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let (schedule_kind, schedule_at, schedule_every_ms, cron_expr, next_run) =
        parse_schedule(&schedule, now)?;

    let job = NewCronJob {
        name,
        schedule_kind,
        schedule_at,
        schedule_every_ms,
        cron_expr,
        timezone: None,
        payload_kind: if agent_turn {
            PayloadKind::AgentTurn
        } else {
            PayloadKind::SystemEvent
        },
        payload_text,
        payload_model: None,
        payload_timeout_s: timeout_s.max(1),
        target_location,
        next_run,
    };

    let id = store.create_job(job)?;
    println!("Created cron job #{id}.");
    Ok(())
}

/// Remove a cron job by id.
pub fn remove(store: &CronStore, id: i64) -> anyhow::Result<()> {
    if store.delete_job(id)? {
        println!("Deleted cron job #{id}.");
    } else {
        println!("No cron job with id #{id}.");
    }
    Ok(())
}

/// Print recent run history for a job.
pub fn runs(store: &CronStore, id: i64, limit: i64) -> anyhow::Result<()> {
    let rows = store.runs_for(id, limit)?;
    if rows.is_empty() {
        println!("No runs recorded for job #{id}.");
        return Ok(());
    }
    for r in rows {
        println!(
            "run #{} started={} finished={} status={}{}",
            r.id,
            r.started_at,
            r.finished_at,
            r.status,
            r.error_text
                .as_deref()
                .map(|e| format!(" error={e}"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

/// Parse a `schedule` CLI argument: `at:<unix_epoch_s>`,
/// `every:<milliseconds>`, or a bare 5-field cron expression.
fn parse_schedule(
    schedule: &str,
    now: chrono::DateTime<Utc>,
) -> anyhow::Result<(ScheduleKind, Option<i64>, Option<i64>, Option<String>, Option<i64>)> {
    if let Some(rest) = schedule.strip_prefix("at:") {
        let at: i64 = rest
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid 'at:' schedule, expected unix epoch seconds"))?;
        return Ok((ScheduleKind::At, Some(at), None, None, Some(at)));
    }
    if let Some(rest) = schedule.strip_prefix("every:") {
        let ms: i64 = rest
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid 'every:' schedule, expected milliseconds"))?;
        let next_run = now.timestamp() + ms / 1000;
        return Ok((ScheduleKind::Every, None, Some(ms), None, Some(next_run)));
    }
    // Otherwise treat the whole string as a 5-field cron expression.
    let next_run = next_cron_time(schedule, &now)
        .ok_or_else(|| anyhow::anyhow!("cron expression '{schedule}' never matches"))?;
    Ok((
        ScheduleKind::Cron,
        None,
        None,
        Some(schedule.to_string()),
        Some(next_run.timestamp()),
    ))
}
