//! Durable cron job store (spec §3 `CronJob`/`CronRun`, §6 schema/pragmas).
//!
//! Grounded on `sa_sessions::store::SessionStore`'s rusqlite-WAL shape
//! (single connection behind a `parking_lot::Mutex`, schema created on
//! open), applied to the teacher's `runtime/schedules/store.rs` job/run
//! table split.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use sa_domain::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    At,
    Every,
    Cron,
}

impl ScheduleKind {
    fn as_str(self) -> &'static str {
        match self {
            ScheduleKind::At => "at",
            ScheduleKind::Every => "every",
            ScheduleKind::Cron => "cron",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "at" => Ok(ScheduleKind::At),
            "every" => Ok(ScheduleKind::Every),
            "cron" => Ok(ScheduleKind::Cron),
            other => Err(Error::Storage(format!("unknown schedule_kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    SystemEvent,
    AgentTurn,
}

impl PayloadKind {
    fn as_str(self) -> &'static str {
        match self {
            PayloadKind::SystemEvent => "system_event",
            PayloadKind::AgentTurn => "agent_turn",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "system_event" => Ok(PayloadKind::SystemEvent),
            "agent_turn" => Ok(PayloadKind::AgentTurn),
            other => Err(Error::Storage(format!("unknown payload_kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Ok,
    Timeout,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Timeout => "timeout",
            RunStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CronJob {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub schedule_kind: ScheduleKind,
    pub schedule_at: Option<i64>,
    pub schedule_every_ms: Option<i64>,
    pub cron_expr: Option<String>,
    pub timezone: Option<String>,
    pub payload_kind: PayloadKind,
    pub payload_text: String,
    pub payload_model: Option<String>,
    pub payload_timeout_s: i64,
    pub target_location: Option<String>,
    pub next_run: Option<i64>,
    pub last_run: Option<i64>,
    pub run_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create a job; `next_run` is computed by the scheduler
/// from the schedule kind before insertion.
pub struct NewCronJob {
    pub name: String,
    pub schedule_kind: ScheduleKind,
    pub schedule_at: Option<i64>,
    pub schedule_every_ms: Option<i64>,
    pub cron_expr: Option<String>,
    pub timezone: Option<String>,
    pub payload_kind: PayloadKind,
    pub payload_text: String,
    pub payload_model: Option<String>,
    pub payload_timeout_s: i64,
    pub target_location: Option<String>,
    pub next_run: Option<i64>,
}

pub struct CronStore {
    conn: Mutex<Connection>,
}

impl CronStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(storage_err)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(storage_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(storage_err)?;
        conn.execute_batch(SCHEMA).map_err(storage_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn create_job(&self, job: NewCronJob) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO cron_jobs (
                name, enabled, schedule_kind, schedule_at, schedule_every_ms,
                cron_expr, timezone, payload_kind, payload_text, payload_model,
                payload_timeout_s, target_location, next_run, last_run, run_count, created_at
            ) VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, NULL, 0, ?13)",
            params![
                job.name,
                job.schedule_kind.as_str(),
                job.schedule_at,
                job.schedule_every_ms,
                job.cron_expr,
                job.timezone,
                job.payload_kind.as_str(),
                job.payload_text,
                job.payload_model,
                job.payload_timeout_s,
                job.target_location,
                job.next_run,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(storage_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_job(&self, id: i64) -> Result<Option<CronJob>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{SELECT_JOB} WHERE id = ?1"),
            params![id],
            row_to_job,
        )
        .optional()
        .map_err(storage_err)
    }

    pub fn list_jobs(&self) -> Result<Vec<CronJob>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("{SELECT_JOB} ORDER BY id ASC"))
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], row_to_job)
            .map_err(storage_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    /// Jobs due to run: `enabled = true` and `next_run <= now_epoch_s`.
    pub fn due_jobs(&self, now_epoch_s: i64) -> Result<Vec<CronJob>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_JOB} WHERE enabled = 1 AND next_run IS NOT NULL AND next_run <= ?1 ORDER BY id ASC"
            ))
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![now_epoch_s], row_to_job)
            .map_err(storage_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    pub fn delete_job(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn
            .execute("DELETE FROM cron_jobs WHERE id = ?1", params![id])
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    /// Applied after a tick run completes (spec §4.6 step 3): records
    /// `last_run`, increments `run_count`, sets the next `next_run`, and
    /// for `at` jobs disables further runs (I4).
    pub fn record_completion(
        &self,
        job_id: i64,
        now_epoch_s: i64,
        next_run: Option<i64>,
        disable: bool,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE cron_jobs SET last_run = ?1, run_count = run_count + 1, next_run = ?2,
             enabled = CASE WHEN ?3 THEN 0 ELSE enabled END WHERE id = ?4",
            params![now_epoch_s, next_run, disable, job_id],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    pub fn record_run(
        &self,
        job_id: i64,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        status: RunStatus,
        result_text: Option<&str>,
        error_text: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO cron_runs (job_id, started_at, finished_at, status, result_text, error_text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                job_id,
                started_at.to_rfc3339(),
                finished_at.to_rfc3339(),
                status.as_str(),
                result_text,
                error_text,
            ],
        )
        .map_err(storage_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn runs_for(&self, job_id: i64, limit: usize) -> Result<Vec<CronRunRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, job_id, started_at, finished_at, status, result_text, error_text
                 FROM cron_runs WHERE job_id = ?1 ORDER BY started_at DESC LIMIT ?2",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![job_id, limit as i64], |row| {
                Ok(CronRunRow {
                    id: row.get(0)?,
                    job_id: row.get(1)?,
                    started_at: row.get::<_, String>(2)?,
                    finished_at: row.get::<_, String>(3)?,
                    status: row.get(4)?,
                    result_text: row.get(5)?,
                    error_text: row.get(6)?,
                })
            })
            .map_err(storage_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err)?;
        Ok(rows)
    }
}

#[derive(Debug, Clone)]
pub struct CronRunRow {
    pub id: i64,
    pub job_id: i64,
    pub started_at: String,
    pub finished_at: String,
    pub status: String,
    pub result_text: Option<String>,
    pub error_text: Option<String>,
}

const SELECT_JOB: &str = "SELECT id, name, enabled, schedule_kind, schedule_at, schedule_every_ms,
    cron_expr, timezone, payload_kind, payload_text, payload_model, payload_timeout_s,
    target_location, next_run, last_run, run_count, created_at FROM cron_jobs";

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<CronJob> {
    let schedule_kind: String = row.get(3)?;
    let payload_kind: String = row.get(8)?;
    let created_at: String = row.get(16)?;
    Ok(CronJob {
        id: row.get(0)?,
        name: row.get(1)?,
        enabled: row.get(2)?,
        schedule_kind: ScheduleKind::parse(&schedule_kind).unwrap_or(ScheduleKind::Cron),
        schedule_at: row.get(4)?,
        schedule_every_ms: row.get(5)?,
        cron_expr: row.get(6)?,
        timezone: row.get(7)?,
        payload_kind: PayloadKind::parse(&payload_kind).unwrap_or(PayloadKind::SystemEvent),
        payload_text: row.get(9)?,
        payload_model: row.get(10)?,
        payload_timeout_s: row.get(11)?,
        target_location: row.get(12)?,
        next_run: row.get(13)?,
        last_run: row.get(14)?,
        run_count: row.get(15)?,
        created_at: created_at
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
    })
}

fn storage_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cron_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    schedule_kind TEXT NOT NULL,
    schedule_at INTEGER,
    schedule_every_ms INTEGER,
    cron_expr TEXT,
    timezone TEXT,
    payload_kind TEXT NOT NULL,
    payload_text TEXT NOT NULL,
    payload_model TEXT,
    payload_timeout_s INTEGER NOT NULL DEFAULT 120,
    target_location TEXT,
    next_run INTEGER,
    last_run INTEGER,
    run_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cron_jobs_enabled_next_run ON cron_jobs(enabled, next_run);

CREATE TABLE IF NOT EXISTS cron_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES cron_jobs(id) ON DELETE CASCADE,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    status TEXT NOT NULL,
    result_text TEXT,
    error_text TEXT
);
CREATE INDEX IF NOT EXISTS idx_cron_runs_job_started ON cron_runs(job_id, started_at);
";
