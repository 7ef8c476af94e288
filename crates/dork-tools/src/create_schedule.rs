//! `create_schedule` tool — proposes a new Pulse schedule.
//!
//! Every schedule created through this tool is agent-authored, so it is
//! always forced into `pending_approval` — a human must approve it before
//! Pulse ever dispatches a run.

use std::sync::Arc;

use async_trait::async_trait;
use dork_pulse::{NewSchedule, PulseStore};
use serde_json::{json, Value};
use tron_core::tools::{error_result, Tool, ToolCategory, ToolParameterSchema, ToolResultBody, TronToolResult};
use tron_tools::errors::ToolError;
use tron_tools::traits::{ToolContext, TronTool};
use tron_tools::utils::validation::{get_optional_string, validate_required_string};

const DEFAULT_PERMISSION_MODE: &str = "default";

/// Proposes a cron-driven schedule. The schedule is created disabled and
/// `pending_approval`; it only starts dispatching once a human approves it.
pub struct CreateScheduleTool {
    store: Arc<PulseStore>,
}

impl CreateScheduleTool {
    /// Create a new `create_schedule` tool over `store`.
    #[must_use]
    pub fn new(store: Arc<PulseStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TronTool for CreateScheduleTool {
    fn name(&self) -> &str {
        "create_schedule"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Custom
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "create_schedule".into(),
            description: "Propose a cron-driven schedule; requires human approval before it runs.".into(),
            parameters: ToolParameterSchema {
                schema_type: "object".into(),
                properties: Some({
                    let mut m = serde_json::Map::new();
                    let _ = m.insert("name".into(), json!({"type": "string", "description": "Display name for the schedule"}));
                    let _ = m.insert("prompt".into(), json!({"type": "string", "description": "Prompt sent to the agent on each run"}));
                    let _ = m.insert("cron".into(), json!({"type": "string", "description": "Standard 5-field cron expression"}));
                    let _ = m.insert("timezone".into(), json!({"type": "string", "description": "IANA timezone name (default: UTC)"}));
                    let _ = m.insert("cwd".into(), json!({"type": "string", "description": "Working directory each run executes in"}));
                    m
                }),
                required: Some(vec!["name".into(), "prompt".into(), "cron".into()]),
                description: None,
                extra: serde_json::Map::new(),
            },
        }
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<TronToolResult, ToolError> {
        let name = match validate_required_string(&params, "name", "schedule name") {
            Ok(v) => v,
            Err(e) => return Ok(e),
        };
        let prompt = match validate_required_string(&params, "prompt", "prompt to run") {
            Ok(v) => v,
            Err(e) => return Ok(e),
        };
        let cron = match validate_required_string(&params, "cron", "cron expression") {
            Ok(v) => v,
            Err(e) => return Ok(e),
        };

        let input = NewSchedule {
            name,
            prompt,
            cron,
            timezone: get_optional_string(&params, "timezone"),
            cwd: get_optional_string(&params, "cwd"),
            permission_mode: DEFAULT_PERMISSION_MODE.to_string(),
            max_runtime_ms: None,
            created_by_agent: true,
        };

        match self.store.create_schedule(input) {
            Ok(schedule) => Ok(TronToolResult {
                content: ToolResultBody::Blocks(vec![tron_core::content::ToolResultContent::text(format!(
                    "Created schedule {} ({}), status: {} — awaiting approval",
                    schedule.name,
                    schedule.id.as_str(),
                    schedule.status.as_str()
                ))]),
                details: Some(json!({
                    "id": schedule.id.as_str(),
                    "status": schedule.status,
                    "enabled": schedule.enabled,
                })),
                is_error: None,
                stop_turn: None,
            }),
            Err(e) => Ok(error_result(format!("Failed to create schedule: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dork_db::ConnectionConfig;

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

    fn extract_text(result: &TronToolResult) -> String {
        match &result.content {
            ToolResultBody::Text(t) => t.clone(),
            ToolResultBody::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    tron_core::content::ToolResultContent::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    fn store() -> Arc<PulseStore> {
        let pool = dork_db::new_in_memory(&ConnectionConfig::default()).unwrap();
        Arc::new(PulseStore::new(pool).unwrap())
    }

    #[tokio::test]
    async fn created_schedule_is_pending_approval() {
        let tool = CreateScheduleTool::new(store());
        let result = tool
            .execute(json!({"name": "nightly-report", "prompt": "summarize", "cron": "0 3 * * *"}), &make_ctx())
            .await
            .unwrap();
        assert!(!result.is_error.unwrap_or(false));
        assert!(extract_text(&result).contains("awaiting approval"));
    }

    #[tokio::test]
    async fn missing_cron_is_validation_error() {
        let tool = CreateScheduleTool::new(store());
        let result = tool.execute(json!({"name": "x", "prompt": "y"}), &make_ctx()).await.unwrap();
        assert_eq!(result.is_error, Some(true));
    }
}
