//! `register_endpoint` tool — registers a subject as an inbox endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use dork_relay::RelayCore;
use serde_json::{json, Value};
use tron_core::tools::{error_result, Tool, ToolCategory, ToolParameterSchema, ToolResultBody, TronToolResult};
use tron_tools::errors::ToolError;
use tron_tools::traits::{ToolContext, TronTool};
use tron_tools::utils::validation::validate_required_string;

/// Registers a subject so the relay creates a maildir for it and future
/// publishes to it are delivered rather than silently dropped.
pub struct RegisterEndpointTool {
    relay: Arc<RelayCore>,
}

impl RegisterEndpointTool {
    /// Create a new `register_endpoint` tool over `relay`.
    #[must_use]
    pub fn new(relay: Arc<RelayCore>) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl TronTool for RegisterEndpointTool {
    fn name(&self) -> &str {
        "register_endpoint"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Custom
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "register_endpoint".into(),
            description: "Register a subject as an inbox endpoint on the relay.".into(),
            parameters: ToolParameterSchema {
                schema_type: "object".into(),
                properties: Some({
                    let mut m = serde_json::Map::new();
                    let _ = m.insert("subject".into(), json!({"type": "string", "description": "Subject pattern to register, e.g. agent.backend"}));
                    m
                }),
                required: Some(vec!["subject".into()]),
                description: None,
                extra: serde_json::Map::new(),
            },
        }
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<TronToolResult, ToolError> {
        let subject = match validate_required_string(&params, "subject", "subject to register") {
            Ok(s) => s,
            Err(e) => return Ok(e),
        };

        match self.relay.register_endpoint(&subject) {
            Ok(info) => Ok(TronToolResult {
                content: ToolResultBody::Blocks(vec![tron_core::content::ToolResultContent::text(format!(
                    "Registered endpoint {} (maildir: {})",
                    info.subject, info.maildir_path
                ))]),
                details: Some(json!({
                    "subject": info.subject,
                    "hash": info.hash,
                    "maildirPath": info.maildir_path,
                })),
                is_error: None,
                stop_turn: None,
            }),
            Err(e) => Ok(error_result(format!("Failed to register endpoint: {e}"))),
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

    fn relay() -> Arc<RelayCore> {
        let pool = dork_db::new_in_memory(&ConnectionConfig::default()).unwrap();
        Arc::new(RelayCore::new("/tmp/dork-mailboxes-test-register", pool).unwrap())
    }

    #[tokio::test]
    async fn registers_a_subject() {
        let tool = RegisterEndpointTool::new(relay());
        let result = tool.execute(json!({"subject": "agent.backend"}), &make_ctx()).await.unwrap();
        assert!(!result.is_error.unwrap_or(false));
        assert!(extract_text(&result).contains("agent.backend"));
    }

    #[tokio::test]
    async fn invalid_subject_is_surfaced_as_error_result() {
        let tool = RegisterEndpointTool::new(relay());
        let result = tool.execute(json!({"subject": ""}), &make_ctx()).await.unwrap();
        assert_eq!(result.is_error, Some(true));
    }
}
