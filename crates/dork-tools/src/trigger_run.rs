//! `trigger_run` tool — manually fires a registered schedule.

use std::sync::Arc;

use async_trait::async_trait;
use dork_core::ScheduleId;
use dork_pulse::Scheduler;
use serde_json::{json, Value};
use tron_core::tools::{error_result, Tool, ToolCategory, ToolParameterSchema, ToolResultBody, TronToolResult};
use tron_tools::errors::ToolError;
use tron_tools::traits::{ToolContext, TronTool};
use tron_tools::utils::validation::validate_required_string;

/// Manually triggers a run of a schedule outside its cron cadence.
pub struct TriggerRunTool {
    scheduler: Arc<Scheduler>,
}

impl TriggerRunTool {
    /// Create a new `trigger_run` tool over `scheduler`.
    #[must_use]
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl TronTool for TriggerRunTool {
    fn name(&self) -> &str {
        "trigger_run"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Custom
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "trigger_run".into(),
            description: "Manually trigger a run of an existing schedule.".into(),
            parameters: ToolParameterSchema {
                schema_type: "object".into(),
                properties: Some({
                    let mut m = serde_json::Map::new();
                    let _ = m.insert("scheduleId".into(), json!({"type": "string", "description": "Id of the schedule to run"}));
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

        match self.scheduler.trigger_manual_run(&schedule_id) {
            Ok(run) => Ok(TronToolResult {
                content: ToolResultBody::Blocks(vec![tron_core::content::ToolResultContent::text(format!(
                    "Started run {} for schedule {} (status: {})",
                    run.id.as_str(),
                    schedule_id.as_str(),
                    run.status.as_str()
                ))]),
                details: Some(json!({
                    "runId": run.id.as_str(),
                    "status": run.status,
                })),
                is_error: None,
                stop_turn: None,
            }),
            Err(e) => Ok(error_result(format!("Failed to trigger run: {e}"))),
        }
    }
}
