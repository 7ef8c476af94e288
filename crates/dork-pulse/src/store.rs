//! Persistence for schedules and runs: two tables sharing the connection
//! pool the rest of the system draws from.

use chrono::{DateTime, Utc};
use dork_core::{PulseError, RunId, ScheduleId};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use dork_db::{ConnectionPool, PooledConnection};

use crate::state::{RunStatus, RunTrigger, ScheduleStatus};

const MIGRATION: &str = "
CREATE TABLE IF NOT EXISTS schedules (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    prompt TEXT NOT NULL,
    cron TEXT NOT NULL,
    timezone TEXT,
    cwd TEXT,
    enabled INTEGER NOT NULL,
    status TEXT NOT NULL,
    permission_mode TEXT NOT NULL,
    max_runtime_ms INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    schedule_id TEXT NOT NULL REFERENCES schedules(id),
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    duration_ms INTEGER,
    output_summary TEXT,
    error TEXT,
    session_id TEXT,
    trigger TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_runs_schedule ON runs(schedule_id);
CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
";

/// Persisted schedule record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Schedule {
    /// Unique, lexicographically sortable id.
    pub id: ScheduleId,
    /// Display name.
    pub name: String,
    /// Prompt sent to the agent on each run.
    pub prompt: String,
    /// Standard 5-field cron expression.
    pub cron: String,
    /// IANA timezone name; defaults to UTC when absent.
    pub timezone: Option<String>,
    /// Working directory runs execute in.
    pub cwd: Option<String>,
    /// Whether the schedule's cron job is currently registered.
    pub enabled: bool,
    /// Lifecycle status.
    pub status: ScheduleStatus,
    /// Permission mode runs are opened with.
    pub permission_mode: String,
    /// Optional per-run timeout, in milliseconds.
    pub max_runtime_ms: Option<i64>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted by [`PulseStore::create_schedule`].
#[derive(Clone, Debug)]
pub struct NewSchedule {
    /// Display name.
    pub name: String,
    /// Prompt sent to the agent on each run.
    pub prompt: String,
    /// Standard 5-field cron expression.
    pub cron: String,
    /// IANA timezone name.
    pub timezone: Option<String>,
    /// Working directory runs execute in.
    pub cwd: Option<String>,
    /// Permission mode runs are opened with.
    pub permission_mode: String,
    /// Optional per-run timeout, in milliseconds.
    pub max_runtime_ms: Option<i64>,
    /// Whether this schedule was proposed by an agent rather than a human;
    /// agent-created schedules are forced into `pending_approval`.
    pub created_by_agent: bool,
}

/// Partial update accepted by [`PulseStore::update_schedule`].
#[derive(Clone, Debug, Default)]
pub struct ScheduleUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New prompt.
    pub prompt: Option<String>,
    /// New cron expression.
    pub cron: Option<String>,
    /// New timezone.
    pub timezone: Option<Option<String>>,
    /// New working directory.
    pub cwd: Option<Option<String>>,
    /// New enabled flag.
    pub enabled: Option<bool>,
    /// New status.
    pub status: Option<ScheduleStatus>,
    /// New permission mode.
    pub permission_mode: Option<String>,
    /// New per-run timeout.
    pub max_runtime_ms: Option<Option<i64>>,
}

/// Persisted run record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Run {
    /// Unique, lexicographically sortable id.
    pub id: RunId,
    /// Owning schedule.
    pub schedule_id: ScheduleId,
    /// Lifecycle status.
    pub status: RunStatus,
    /// When the run began.
    pub started_at: DateTime<Utc>,
    /// When the run ended, once terminal.
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock duration, once terminal.
    pub duration_ms: Option<i64>,
    /// First 500 characters of emitted text.
    pub output_summary: Option<String>,
    /// Error message, when the run failed or was cancelled.
    pub error: Option<String>,
    /// Session id opened for this run.
    pub session_id: Option<String>,
    /// What fired this run.
    pub trigger: RunTrigger,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Patch accepted by [`PulseStore::update_run`].
#[derive(Clone, Debug, Default)]
pub struct RunUpdate {
    /// New status.
    pub status: Option<RunStatus>,
    /// New finish timestamp.
    pub finished_at: Option<DateTime<Utc>>,
    /// New duration.
    pub duration_ms: Option<i64>,
    /// New output summary.
    pub output_summary: Option<String>,
    /// New error message.
    pub error: Option<String>,
    /// New session id.
    pub session_id: Option<String>,
}

/// Filter + pagination for [`PulseStore::list_runs`].
#[derive(Clone, Debug, Default)]
pub struct RunFilter {
    /// Restrict to a single schedule.
    pub schedule_id: Option<ScheduleId>,
    /// Restrict to a single status.
    pub status: Option<RunStatus>,
    /// Maximum rows returned.
    pub limit: i64,
    /// Rows skipped before the window starts.
    pub offset: i64,
}

/// `SQLite`-backed store for schedules and runs.
pub struct PulseStore {
    pool: ConnectionPool,
}

impl PulseStore {
    /// Wrap an existing pool, running the schedule/run migration.
    pub fn new(pool: ConnectionPool) -> Result<Self, PulseError> {
        let store = Self { pool };
        let conn = store.conn()?;
        conn.execute_batch(MIGRATION).map_err(PulseError::Store)?;
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection, PulseError> {
        self.pool
            .get()
            .map_err(|e| PulseError::Store(rusqlite::Error::ModuleError(e.to_string())))
    }

    /// Create a new schedule. Agent-created schedules are always forced
    /// into `pending_approval` regardless of any status the caller implies.
    pub fn create_schedule(&self, input: NewSchedule) -> Result<Schedule, PulseError> {
        let now = Utc::now();
        let status = if input.created_by_agent {
            ScheduleStatus::PendingApproval
        } else {
            ScheduleStatus::Active
        };
        let schedule = Schedule {
            id: ScheduleId::new(),
            name: input.name,
            prompt: input.prompt,
            cron: input.cron,
            timezone: input.timezone,
            cwd: input.cwd,
            enabled: true,
            status,
            permission_mode: input.permission_mode,
            max_runtime_ms: input.max_runtime_ms,
            created_at: now,
            updated_at: now,
        };

        self.conn()?.execute(
            "INSERT INTO schedules (id, name, prompt, cron, timezone, cwd, enabled, status, permission_mode, max_runtime_ms, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                schedule.id.to_string(),
                schedule.name,
                schedule.prompt,
                schedule.cron,
                schedule.timezone,
                schedule.cwd,
                i64::from(schedule.enabled),
                schedule.status.as_str(),
                schedule.permission_mode,
                schedule.max_runtime_ms,
                schedule.created_at.to_rfc3339(),
                schedule.updated_at.to_rfc3339(),
            ],
        )
        .map_err(PulseError::Store)?;
        Ok(schedule)
    }

    /// Fetch a schedule by id.
    pub fn get_schedule(&self, id: &ScheduleId) -> Result<Option<Schedule>, PulseError> {
        self.conn()?
            .query_row(
                "SELECT id, name, prompt, cron, timezone, cwd, enabled, status, permission_mode, max_runtime_ms, created_at, updated_at
                 FROM schedules WHERE id = ?1",
                params![id.to_string()],
                row_to_schedule,
            )
            .optional()
            .map_err(PulseError::Store)
    }

    /// List every schedule, most recently created first.
    pub fn list_schedules(&self) -> Result<Vec<Schedule>, PulseError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, prompt, cron, timezone, cwd, enabled, status, permission_mode, max_runtime_ms, created_at, updated_at
                 FROM schedules ORDER BY created_at DESC",
            )
            .map_err(PulseError::Store)?;
        let rows = stmt.query_map([], row_to_schedule).map_err(PulseError::Store)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(PulseError::Store)
    }

    /// List every schedule currently enabled and active, for startup
    /// cron registration.
    pub fn list_active_enabled_schedules(&self) -> Result<Vec<Schedule>, PulseError> {
        Ok(self
            .list_schedules()?
            .into_iter()
            .filter(|s| s.enabled && s.status == ScheduleStatus::Active)
            .collect())
    }

    /// Apply a partial update, returning the updated row.
    pub fn update_schedule(
        &self,
        id: &ScheduleId,
        patch: ScheduleUpdate,
    ) -> Result<Option<Schedule>, PulseError> {
        let Some(mut schedule) = self.get_schedule(id)? else { return Ok(None) };

        if let Some(name) = patch.name {
            schedule.name = name;
        }
        if let Some(prompt) = patch.prompt {
            schedule.prompt = prompt;
        }
        if let Some(cron) = patch.cron {
            schedule.cron = cron;
        }
        if let Some(timezone) = patch.timezone {
            schedule.timezone = timezone;
        }
        if let Some(cwd) = patch.cwd {
            schedule.cwd = cwd;
        }
        if let Some(enabled) = patch.enabled {
            schedule.enabled = enabled;
        }
        if let Some(status) = patch.status {
            schedule.status = status;
        }
        if let Some(permission_mode) = patch.permission_mode {
            schedule.permission_mode = permission_mode;
        }
        if let Some(max_runtime_ms) = patch.max_runtime_ms {
            schedule.max_runtime_ms = max_runtime_ms;
        }
        schedule.updated_at = Utc::now();

        self.conn()?.execute(
            "UPDATE schedules SET name = ?2, prompt = ?3, cron = ?4, timezone = ?5, cwd = ?6,
             enabled = ?7, status = ?8, permission_mode = ?9, max_runtime_ms = ?10, updated_at = ?11
             WHERE id = ?1",
            params![
                schedule.id.to_string(),
                schedule.name,
                schedule.prompt,
                schedule.cron,
                schedule.timezone,
                schedule.cwd,
                i64::from(schedule.enabled),
                schedule.status.as_str(),
                schedule.permission_mode,
                schedule.max_runtime_ms,
                schedule.updated_at.to_rfc3339(),
            ],
        )
        .map_err(PulseError::Store)?;
        Ok(Some(schedule))
    }

    /// Delete a schedule, returning whether a row was removed.
    pub fn delete_schedule(&self, id: &ScheduleId) -> Result<bool, PulseError> {
        let changed = self
            .conn()?
            .execute("DELETE FROM schedules WHERE id = ?1", params![id.to_string()])
            .map_err(PulseError::Store)?;
        Ok(changed > 0)
    }

    /// Create a new run for a schedule.
    pub fn create_run(&self, schedule_id: &ScheduleId, trigger: RunTrigger) -> Result<Run, PulseError> {
        let now = Utc::now();
        let run = Run {
            id: RunId::new(),
            schedule_id: schedule_id.clone(),
            status: RunStatus::Running,
            started_at: now,
            finished_at: None,
            duration_ms: None,
            output_summary: None,
            error: None,
            session_id: None,
            trigger,
            created_at: now,
        };

        self.conn()?.execute(
            "INSERT INTO runs (id, schedule_id, status, started_at, finished_at, duration_ms, output_summary, error, session_id, trigger, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                run.id.to_string(),
                run.schedule_id.to_string(),
                run.status.as_str(),
                run.started_at.to_rfc3339(),
                run.finished_at.map(|t| t.to_rfc3339()),
                run.duration_ms,
                run.output_summary,
                run.error,
                run.session_id,
                run.trigger.as_str(),
                run.created_at.to_rfc3339(),
            ],
        )
        .map_err(PulseError::Store)?;
        Ok(run)
    }

    /// Apply a patch to a run, returning the updated row.
    pub fn update_run(&self, id: &RunId, patch: RunUpdate) -> Result<Option<Run>, PulseError> {
        let Some(mut run) = self.get_run(id)? else { return Ok(None) };

        if let Some(status) = patch.status {
            run.status = status;
        }
        if let Some(finished_at) = patch.finished_at {
            run.finished_at = Some(finished_at);
        }
        if let Some(duration_ms) = patch.duration_ms {
            run.duration_ms = Some(duration_ms);
        }
        if let Some(output_summary) = patch.output_summary {
            run.output_summary = Some(output_summary);
        }
        if let Some(error) = patch.error {
            run.error = Some(error);
        }
        if let Some(session_id) = patch.session_id {
            run.session_id = Some(session_id);
        }

        self.conn()?.execute(
            "UPDATE runs SET status = ?2, finished_at = ?3, duration_ms = ?4, output_summary = ?5,
             error = ?6, session_id = ?7 WHERE id = ?1",
            params![
                run.id.to_string(),
                run.status.as_str(),
                run.finished_at.map(|t| t.to_rfc3339()),
                run.duration_ms,
                run.output_summary,
                run.error,
                run.session_id,
            ],
        )
        .map_err(PulseError::Store)?;
        Ok(Some(run))
    }

    /// Fetch a single run by id.
    pub fn get_run(&self, id: &RunId) -> Result<Option<Run>, PulseError> {
        self.conn()?
            .query_row(
                "SELECT id, schedule_id, status, started_at, finished_at, duration_ms, output_summary, error, session_id, trigger, created_at
                 FROM runs WHERE id = ?1",
                params![id.to_string()],
                row_to_run,
            )
            .optional()
            .map_err(PulseError::Store)
    }

    /// List runs matching `filter`, most recently started first.
    pub fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>, PulseError> {
        let conn = self.conn()?;
        let mut sql = String::from(
            "SELECT id, schedule_id, status, started_at, finished_at, duration_ms, output_summary, error, session_id, trigger, created_at FROM runs WHERE 1=1",
        );
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(schedule_id) = &filter.schedule_id {
            sql.push_str(" AND schedule_id = ?");
            bound.push(Box::new(schedule_id.to_string()));
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            bound.push(Box::new(status.as_str().to_owned()));
        }
        sql.push_str(" ORDER BY started_at DESC LIMIT ? OFFSET ?");
        bound.push(Box::new(filter.limit));
        bound.push(Box::new(filter.offset));

        let mut stmt = conn.prepare(&sql).map_err(PulseError::Store)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = bound.iter().map(std::convert::AsRef::as_ref).collect();
        let rows = stmt
            .query_map(params_ref.as_slice(), row_to_run)
            .map_err(PulseError::Store)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(PulseError::Store)
    }

    /// Delete all but the `keep_most_recent_n` newest runs for a schedule,
    /// returning the number deleted.
    pub fn prune_runs(&self, schedule_id: &ScheduleId, keep_most_recent_n: i64) -> Result<usize, PulseError> {
        let changed = self.conn()?.execute(
            "DELETE FROM runs WHERE schedule_id = ?1 AND id NOT IN (
                SELECT id FROM runs WHERE schedule_id = ?1 ORDER BY started_at DESC LIMIT ?2
             )",
            params![schedule_id.to_string(), keep_most_recent_n],
        )
        .map_err(PulseError::Store)?;
        Ok(changed)
    }

    /// Mark every run still `running` as `failed`, for startup crash
    /// recovery. Returns the number of rows changed.
    pub fn mark_running_as_failed(&self) -> Result<usize, PulseError> {
        let changed = self.conn()?.execute(
            "UPDATE runs SET status = ?1, error = ?2, finished_at = ?3 WHERE status = ?4",
            params![
                RunStatus::Failed.as_str(),
                "Interrupted by server restart",
                Utc::now().to_rfc3339(),
                RunStatus::Running.as_str(),
            ],
        )
        .map_err(PulseError::Store)?;
        Ok(changed)
    }
}

fn row_to_schedule(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    let id: String = row.get(0)?;
    let enabled: i64 = row.get(6)?;
    let status: String = row.get(7)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;
    Ok(Schedule {
        id: id.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        name: row.get(1)?,
        prompt: row.get(2)?,
        cron: row.get(3)?,
        timezone: row.get(4)?,
        cwd: row.get(5)?,
        enabled: enabled != 0,
        status: ScheduleStatus::from_str_lossy(&status),
        permission_mode: row.get(8)?,
        max_runtime_ms: row.get(9)?,
        created_at: parse_rfc3339(&created_at)?,
        updated_at: parse_rfc3339(&updated_at)?,
    })
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<Run> {
    let id: String = row.get(0)?;
    let schedule_id: String = row.get(1)?;
    let status: String = row.get(2)?;
    let started_at: String = row.get(3)?;
    let finished_at: Option<String> = row.get(4)?;
    let trigger: String = row.get(9)?;
    let created_at: String = row.get(10)?;
    Ok(Run {
        id: id.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        schedule_id: schedule_id.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        status: RunStatus::from_str_lossy(&status),
        started_at: parse_rfc3339(&started_at)?,
        finished_at: finished_at.map(|t| parse_rfc3339(&t)).transpose()?,
        duration_ms: row.get(5)?,
        output_summary: row.get(6)?,
        error: row.get(7)?,
        session_id: row.get(8)?,
        trigger: RunTrigger::from_str_lossy(&trigger),
        created_at: parse_rfc3339(&created_at)?,
    })
}

fn parse_rfc3339(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| rusqlite::Error::InvalidQuery)
}
