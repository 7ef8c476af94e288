//! Registers each active schedule's cron job and drives unattended runs:
//! fires on the cron tick, opens a session keyed to the run, and records
//! the outcome.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use dashmap::{DashMap, DashSet};
use dork_core::{PulseError, RunId, ScheduleId, SessionId};
use dork_session::{PermissionMode, SessionManager, StreamEvent};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};
use ulid::Ulid;

use crate::context::{build_context_suffix, PulseContext};
use crate::state::{RunStatus, RunTrigger, ScheduleStatus};
use crate::store::{PulseStore, Run, RunUpdate, Schedule};

/// Global cap on runs executing at once, across every schedule.
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 4;

/// How many of a schedule's most recent runs are kept once a run finishes.
pub const DEFAULT_RETENTION_PER_SCHEDULE: i64 = 100;

/// How long [`Scheduler::stop`] waits for in-flight runs to finish before
/// giving up on a clean drain.
const SHUTDOWN_DRAIN_SECS: u64 = 30;

/// How often the drain loop in [`Scheduler::stop`] polls remaining runs.
const DRAIN_POLL_MS: u64 = 200;

/// Truncate a captured run transcript to this many characters for storage
/// as `Run::output_summary`.
const OUTPUT_SUMMARY_CHARS: usize = 500;

/// A schedule's live cron job: the background task driving it plus the
/// cron expression it was registered with, so [`Scheduler::get_next_run`]
/// can answer without re-parsing.
struct CronJob {
    handle: JoinHandle<()>,
    cancellation: CancellationToken,
    cron_schedule: CronSchedule,
    tz: Tz,
}

/// Cron-driven dispatch of unattended agent runs against schedules
/// persisted in a [`PulseStore`].
pub struct Scheduler {
    store: Arc<PulseStore>,
    session_manager: Arc<SessionManager>,
    jobs: DashMap<ScheduleId, CronJob>,
    active_runs: DashMap<RunId, CancellationToken>,
    running_schedules: DashSet<ScheduleId>,
    max_concurrent_runs: usize,
    retention_per_schedule: i64,
}

impl Scheduler {
    /// Build a scheduler over `store`, dispatching runs through
    /// `session_manager`.
    #[must_use]
    pub fn new(store: Arc<PulseStore>, session_manager: Arc<SessionManager>) -> Self {
        Self {
            store,
            session_manager,
            jobs: DashMap::new(),
            active_runs: DashMap::new(),
            running_schedules: DashSet::new(),
            max_concurrent_runs: DEFAULT_MAX_CONCURRENT_RUNS,
            retention_per_schedule: DEFAULT_RETENTION_PER_SCHEDULE,
        }
    }

    /// Reclaim runs orphaned by a prior crash, then register a cron job
    /// for every schedule that is both enabled and active.
    #[instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) -> Result<(), PulseError> {
        let reclaimed = self.store.mark_running_as_failed()?;
        if reclaimed > 0 {
            warn!(reclaimed, "reclaimed runs left running by a prior restart");
        }

        for schedule in self.store.list_active_enabled_schedules()? {
            self.store.prune_runs(&schedule.id, self.retention_per_schedule)?;
            if let Err(e) = self.register_schedule(&schedule) {
                warn!(schedule_id = %schedule.id, error = %e, "failed to register schedule");
            }
        }
        Ok(())
    }

    /// Parse `schedule`'s cron expression and spawn its cron loop.
    /// Idempotent: re-registering an already-running schedule is a no-op.
    ///
    /// The `cron` crate requires a leading seconds field; the stored
    /// expression is the standard 5-field form, so a literal `"0 "` is
    /// prepended before parsing.
    #[instrument(skip(self, schedule), fields(schedule_id = %schedule.id))]
    pub fn register_schedule(self: &Arc<Self>, schedule: &Schedule) -> Result<(), PulseError> {
        if self.jobs.contains_key(&schedule.id) {
            return Ok(());
        }

        let six_field = format!("0 {}", schedule.cron);
        let cron_schedule = CronSchedule::from_str(&six_field).map_err(|e| PulseError::InvalidCron {
            expression: schedule.cron.clone(),
            reason: e.to_string(),
        })?;
        let tz: Tz = schedule
            .timezone
            .as_deref()
            .and_then(|name| name.parse().ok())
            .unwrap_or(Tz::UTC);

        let cancellation = CancellationToken::new();
        let schedule_id = schedule.id;
        let this = Arc::clone(self);
        let loop_cron_schedule = cron_schedule.clone();
        let loop_cancellation = cancellation.clone();
        let handle = tokio::spawn(async move {
            this.cron_loop(schedule_id, loop_cron_schedule, tz, loop_cancellation).await;
        });

        self.jobs.insert(schedule_id, CronJob { handle, cancellation, cron_schedule, tz });
        Ok(())
    }

    /// Stop dispatching a schedule's cron job, without touching runs
    /// already in flight.
    pub fn unregister_schedule(&self, schedule_id: &ScheduleId) {
        if let Some((_, job)) = self.jobs.remove(schedule_id) {
            job.cancellation.cancel();
            job.handle.abort();
        }
    }

    async fn cron_loop(
        self: Arc<Self>,
        schedule_id: ScheduleId,
        cron_schedule: CronSchedule,
        tz: Tz,
        cancellation: CancellationToken,
    ) {
        loop {
            let Some(next) = cron_schedule.upcoming(tz).take(1).next() else {
                return;
            };
            let until = next.with_timezone(&Utc) - Utc::now();
            let sleep_for = until.to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                () = cancellation.cancelled() => return,
                () = tokio::time::sleep(sleep_for) => {}
            }
            if cancellation.is_cancelled() {
                return;
            }

            self.on_tick(schedule_id).await;
        }
    }

    async fn on_tick(self: &Arc<Self>, schedule_id: ScheduleId) {
        let Ok(Some(schedule)) = self.store.get_schedule(&schedule_id) else {
            self.unregister_schedule(&schedule_id);
            return;
        };
        if !schedule.enabled || schedule.status != ScheduleStatus::Active {
            self.unregister_schedule(&schedule_id);
            return;
        }
        if self.active_runs.len() >= self.max_concurrent_runs {
            warn!(schedule_id = %schedule_id, "skipping cron fire: global run concurrency cap reached");
            return;
        }
        if !self.running_schedules.insert(schedule_id) {
            warn!(schedule_id = %schedule_id, "skipping cron fire: previous run still in flight");
            return;
        }

        let run = match self.store.create_run(&schedule_id, RunTrigger::Scheduled) {
            Ok(run) => run,
            Err(e) => {
                warn!(schedule_id = %schedule_id, error = %e, "failed to create scheduled run");
                self.running_schedules.remove(&schedule_id);
                return;
            }
        };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.execute_run(schedule, run).await;
            this.running_schedules.remove(&schedule_id);
        });
    }

    /// Open a schedule's run outside the cron loop, for a human- or
    /// agent-initiated manual trigger. Returns the created run
    /// immediately; the agent continues executing in the background.
    #[instrument(skip(self))]
    pub fn trigger_manual_run(self: &Arc<Self>, schedule_id: &ScheduleId) -> Result<Run, PulseError> {
        let schedule = self.store.get_schedule(schedule_id)?.ok_or(PulseError::NotFound {
            entity: "schedule",
            id: schedule_id.to_string(),
        })?;
        let run = self.store.create_run(schedule_id, RunTrigger::Manual)?;

        let this = Arc::clone(self);
        let run_for_task = run.clone();
        tokio::spawn(async move {
            this.execute_run(schedule, run_for_task).await;
        });
        Ok(run)
    }

    /// Run an agent turn for `run`, recording its terminal status.
    ///
    /// 1. Register a cancellation token in `active_runs`, composed with a
    ///    `max_runtime_ms` deadline when the schedule sets one.
    /// 2. Open (or reuse) a session keyed to the run's own id.
    /// 3. Append the unattended-run context suffix to the schedule's prompt.
    /// 4. Dispatch and consume the stream, capturing the first
    ///    [`OUTPUT_SUMMARY_CHARS`] characters of emitted text.
    /// 5. Persist the terminal status, freeing the run's slot regardless of
    ///    outcome.
    async fn execute_run(self: &Arc<Self>, schedule: Schedule, run: Run) {
        let cancellation = CancellationToken::new();
        self.active_runs.insert(run.id, cancellation.clone());

        let timeout_guard = schedule.max_runtime_ms.map(|ms| {
            let token = cancellation.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(u64::try_from(ms).unwrap_or(u64::MAX))).await;
                token.cancel();
            })
        });

        let session_id = SessionId::from(Ulid::from(run.id));
        let permission_mode = PermissionMode::from_str_lossy(&schedule.permission_mode);
        self.session_manager
            .ensure_session(session_id.clone(), permission_mode, schedule.cwd.clone());

        let context = build_context_suffix(&PulseContext {
            job_name: &schedule.name,
            cron: &schedule.cron,
            cwd: schedule.cwd.as_deref(),
            run_id: &run.id.to_string(),
            trigger: run.trigger,
        });
        let prompt = format!("{}{context}", schedule.prompt);

        let stream = self.session_manager.send_message(
            session_id,
            prompt,
            schedule.cwd.clone(),
            cancellation.clone(),
        );
        tokio::pin!(stream);

        let mut output_summary = String::new();
        let mut failure: Option<String> = None;
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::TextDelta { text } => {
                    if output_summary.len() < OUTPUT_SUMMARY_CHARS {
                        output_summary.push_str(&text);
                    }
                }
                StreamEvent::Error { message, .. } => failure = Some(message),
                StreamEvent::Done { .. } => break,
                _ => {}
            }
        }
        if output_summary.len() > OUTPUT_SUMMARY_CHARS {
            output_summary.truncate(OUTPUT_SUMMARY_CHARS);
        }

        if let Some(guard) = timeout_guard {
            guard.abort();
        }

        let status = if cancellation.is_cancelled() {
            RunStatus::Cancelled
        } else if failure.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        let finished_at = Utc::now();
        let duration_ms = (finished_at - run.started_at).num_milliseconds();

        if let Err(e) = self.store.update_run(
            &run.id,
            RunUpdate {
                status: Some(status),
                finished_at: Some(finished_at),
                duration_ms: Some(duration_ms),
                output_summary: Some(output_summary),
                error: failure,
                ..Default::default()
            },
        ) {
            warn!(run_id = %run.id, error = %e, "failed to record run outcome");
        }
        if let Err(e) = self.store.prune_runs(&schedule.id, self.retention_per_schedule) {
            warn!(schedule_id = %schedule.id, error = %e, "failed to prune old runs");
        }

        self.active_runs.remove(&run.id);
    }

    /// Cancel an in-flight run. Returns `false` if the run is not active.
    #[instrument(skip(self))]
    pub fn cancel_run(&self, run_id: &RunId) -> bool {
        if let Some(token) = self.active_runs.get(run_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Number of runs currently executing across every schedule.
    #[must_use]
    pub fn get_active_run_count(&self) -> usize {
        self.active_runs.len()
    }

    /// The next time a registered schedule is due to fire, if it has a
    /// live cron job.
    #[must_use]
    pub fn get_next_run(&self, schedule_id: &ScheduleId) -> Option<DateTime<Utc>> {
        let job = self.jobs.get(schedule_id)?;
        job.cron_schedule.upcoming(job.tz).take(1).next().map(|dt| dt.with_timezone(&Utc))
    }

    /// Cancel every active run and cron job, waiting up to
    /// [`SHUTDOWN_DRAIN_SECS`] seconds for runs to actually finish.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        for job in self.jobs.iter() {
            job.cancellation.cancel();
            job.handle.abort();
        }
        self.jobs.clear();

        for entry in self.active_runs.iter() {
            entry.value().cancel();
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(SHUTDOWN_DRAIN_SECS);
        while !self.active_runs.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(DRAIN_POLL_MS)).await;
        }
        if !self.active_runs.is_empty() {
            warn!(
                remaining = self.active_runs.len(),
                "shutdown drain window elapsed with runs still active"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dork_db::ConnectionConfig;
    use dork_session::{AgentBackend, BackendEvent, BackendStream, DispatchRequest};

    struct EchoBackend;

    #[async_trait::async_trait]
    impl AgentBackend for EchoBackend {
        async fn dispatch(
            &self,
            request: DispatchRequest,
            _cancellation: CancellationToken,
        ) -> Result<BackendStream, dork_core::SessionError> {
            let text = request.message;
            let stream = async_stream::stream! {
                yield BackendEvent::TextDelta(format!("ran: {text}"));
                yield BackendEvent::Done;
            };
            Ok(Box::pin(stream))
        }
    }

    fn scheduler() -> (Arc<Scheduler>, tempfile::TempDir) {
        let pool = dork_db::new_in_memory(&ConnectionConfig::default()).unwrap();
        let store = Arc::new(PulseStore::new(pool).unwrap());
        let dir = tempfile::tempdir().unwrap();
        let session_manager = Arc::new(SessionManager::new(Arc::new(EchoBackend), dir.path().to_path_buf()));
        (Arc::new(Scheduler::new(store, session_manager)), dir)
    }

    fn new_schedule(store: &PulseStore) -> Schedule {
        store
            .create_schedule(crate::store::NewSchedule {
                name: "nightly cleanup".into(),
                prompt: "clean up stale branches".into(),
                cron: "* * * * *".into(),
                timezone: Some("UTC".into()),
                cwd: None,
                permission_mode: "default".into(),
                max_runtime_ms: None,
                created_by_agent: false,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn trigger_manual_run_completes_and_records_output() {
        let (scheduler, _dir) = scheduler();
        let schedule = new_schedule(&scheduler.store);
        let run = scheduler.trigger_manual_run(&schedule.id).unwrap();
        assert_eq!(run.trigger, RunTrigger::Manual);

        for _ in 0..50 {
            if scheduler.get_active_run_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let stored = scheduler.store.get_run(&run.id).unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
        assert!(stored.output_summary.unwrap().contains("clean up stale branches"));
    }

    #[test]
    fn register_schedule_rejects_invalid_cron() {
        let (scheduler, _dir) = scheduler();
        let mut schedule = new_schedule(&scheduler.store);
        schedule.cron = "not a cron expression".into();
        let err = scheduler.register_schedule(&schedule).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[test]
    fn register_schedule_is_idempotent() {
        let (scheduler, _dir) = scheduler();
        let schedule = new_schedule(&scheduler.store);
        scheduler.register_schedule(&schedule).unwrap();
        scheduler.register_schedule(&schedule).unwrap();
        assert_eq!(scheduler.jobs.len(), 1);
    }

    #[test]
    fn cancel_run_reports_whether_a_run_was_active() {
        let (scheduler, _dir) = scheduler();
        assert!(!scheduler.cancel_run(&RunId::new()));
    }

    #[tokio::test]
    async fn stop_cancels_registered_jobs() {
        let (scheduler, _dir) = scheduler();
        let schedule = new_schedule(&scheduler.store);
        scheduler.register_schedule(&schedule).unwrap();
        scheduler.stop().await;
        assert!(scheduler.jobs.is_empty());
    }
}
