//! `get_schedule_status` tool — reports a schedule's current state and recent runs.

use std::sync::Arc;

use async_trait::async_trait;
use dork_core::ScheduleId;
use dork_pulse::{PulseStore, RunFilter, Scheduler};
use serde_json::{json, Value};
use tron_core::tools::{error_result, Tool, ToolCategory, ToolParameterSchema, ToolResultBody, TronToolResult};
use tron_tools::errors::ToolError;
use tron_tools::traits::{ToolContext, TronTool};
use tron_tools::utils::validation::{get_optional_u64, validate_required_string};

const DEFAULT_RECENT_RUNS: i64 = 5;

/// Reports a schedule's lifecycle status, next fire time, and recent runs.
pub struct GetScheduleStatusTool {
    store: Arc<PulseStore>,
    scheduler: Arc<Scheduler>,
}

impl GetScheduleStatusTool {
    /// Create a new `get_schedule_status` tool over `store` and `scheduler`.
    #[must_use]
    pub fn new(store: Arc<PulseStore>, scheduler: Arc<Scheduler>) -> Self {
        Self { store, scheduler }
    }
}

#[async_trait]
impl TronTool for GetScheduleStatusTool {
    fn name(&self) -> &str {
        "get_schedule_status"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Custom
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "get_schedule_status".into(),
            description: "Get a schedule's current status, next run time, and recent run history.".into(),
            parameters: ToolParameterSchema {
                schema_type: "object".into(),
                properties: Some({
                    let mut m = serde_json::Map::new();
                    let _ = m.insert("scheduleId".into(), json!({"type": "string", "description": "Id of the schedule to inspect"}));
                    let _ = m.insert("recentRuns".into(), json!({"type": "integer", "description": "Number of recent runs to include (default 5)"}));
                    m
                }),
                required: Some(vec!["scheduleId".into()]),
                description: None,
                extra: serde_json::Map::new(),
            },
        }
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<TronToolResult, ToolError> {
        let schedule_id = match validate_required_string(&params, "scheduleId", "schedule id") {
            Ok(v) => v,
            Err(e) => return Ok(e),
        };
        let schedule_id = match ScheduleId::parse(&schedule_id) {
            Ok(id) => id,
            Err(_) => return Ok(error_result(format!("Invalid schedule id: {schedule_id}"))),
        };
        let recent_runs = get_optional_u64(&params, "recentRuns").map_or(DEFAULT_RECENT_RUNS, |n| n as i64);

        let schedule = match self.store.get_schedule(&schedule_id) {
            Ok(Some(schedule)) => schedule,
            Ok(None) => return Ok(error_result(format!("No schedule found with id {}", schedule_id.as_str()))),
            Err(e) => return Ok(error_result(format!("Failed to load schedule: {e}"))),
        };

        let runs = match self.store.list_runs(&RunFilter {
            schedule_id: Some(schedule_id.clone()),
            status: None,
            limit: recent_runs,
            offset: 0,
        }) {
            Ok(runs) => runs,
            Err(e) => return Ok(error_result(format!("Failed to load runs: {e}"))),
        };

        let next_run = self.scheduler.get_next_run(&schedule_id);
        let active_run_count = self.scheduler.get_active_run_count();

        let summary = format!(
            "Schedule '{}' is {} (enabled: {}). Next run: {}. {} recent run(s).",
            schedule.name,
            schedule.status.as_str(),
            schedule.enabled,
            next_run.map_or_else(|| "not scheduled".to_string(), |t| t.to_rfc3339()),
            runs.len()
        );

        Ok(TronToolResult {
            content: ToolResultBody::Blocks(vec![tron_core::content::ToolResultContent::text(summary)]),
            details: Some(json!({
                "schedule": schedule,
                "nextRun": next_run.map(|t| t.to_rfc3339()),
                "activeRunCount": active_run_count,
                "recentRuns": runs,
            })),
            is_error: None,
            stop_turn: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dork_db::ConnectionConfig;
    use dork_pulse::NewSchedule;
    use dork_session::{AgentBackend, BackendEvent, BackendStream, DispatchRequest, SessionManager};

    struct EchoBackend;

    #[async_trait::async_trait]
    impl AgentBackend for EchoBackend {
        async fn dispatch(
            &self,
            request: DispatchRequest,
            _cancellation: tokio_util::sync::CancellationToken,
        ) -> Result<BackendStream, dork_core::SessionError> {
            let text = request.message;
            let stream = async_stream::stream! {
                yield BackendEvent::TextDelta(format!("ran: {text}"));
                yield BackendEvent::Done;
            };
            Ok(Box::pin(stream))
        }
    }

    fn make_ctx() -> ToolContext {
        ToolContext {
            tool_call_id: "call-1".into(),
            session_id: "sess-1".into(),
            working_directory: "/tmp".into(),
            cancellation: tokio_util::sync::CancellationToken::new(),
            subagent_depth: 0,
            subagent_max_depth: 0,
        }
    }

    fn scheduler_and_store() -> (Arc<Scheduler>, Arc<PulseStore>) {
        let pool = dork_db::new_in_memory(&ConnectionConfig::default()).unwrap();
        let store = Arc::new(PulseStore::new(pool).unwrap());
        let dir = tempfile::tempdir().unwrap();
        let session_manager = Arc::new(SessionManager::new(Arc::new(EchoBackend), dir.path().to_path_buf()));
        let scheduler = Arc::new(Scheduler::new(store.clone(), session_manager));
        (scheduler, store)
    }

    #[tokio::test]
    async fn invalid_schedule_id_is_surfaced_as_error_result() {
        let (scheduler, store) = scheduler_and_store();
        let tool = GetScheduleStatusTool::new(store, scheduler);
        let result = tool.execute(json!({"scheduleId": "not-a-ulid"}), &make_ctx()).await.unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn unknown_schedule_is_surfaced_as_error_result() {
        let (scheduler, store) = scheduler_and_store();
        let tool = GetScheduleStatusTool::new(store, scheduler);
        let missing = dork_core::ScheduleId::new();
        let result = tool.execute(json!({"scheduleId": missing.as_str()}), &make_ctx()).await.unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn reports_status_for_known_schedule() {
        let (scheduler, store) = scheduler_and_store();
        let schedule = store
            .create_schedule(NewSchedule {
                name: "nightly digest".into(),
                prompt: "summarize the day".into(),
                cron: "0 2 * * *".into(),
                timezone: Some("UTC".into()),
                cwd: None,
                permission_mode: "default".into(),
                max_runtime_ms: None,
                created_by_agent: false,
            })
            .unwrap();

        let tool = GetScheduleStatusTool::new(store, scheduler);
        let result = tool
            .execute(json!({"scheduleId": schedule.id.as_str()}), &make_ctx())
            .await
            .unwrap();
        assert_ne!(result.is_error, Some(true));
        let details = result.details.unwrap();
        assert_eq!(details["recentRuns"].as_array().unwrap().len(), 0);
    }
}
