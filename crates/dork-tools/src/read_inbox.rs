//! `read_inbox` tool — pages through an endpoint's indexed messages.

use std::sync::Arc;

use async_trait::async_trait;
use dork_relay::RelayCore;
use dork_relay_store::MessageStatus;
use serde_json::{json, Value};
use tron_core::tools::{error_result, Tool, ToolCategory, ToolParameterSchema, ToolResultBody, TronToolResult};
use tron_tools::errors::ToolError;
use tron_tools::traits::{ToolContext, TronTool};
use tron_tools::utils::validation::{get_optional_string, get_optional_u64, validate_required_string};

const DEFAULT_LIMIT: u64 = 50;

/// Reads a page of messages addressed to an endpoint subject.
pub struct ReadInboxTool {
    relay: Arc<RelayCore>,
}

impl ReadInboxTool {
    /// Create a new `read_inbox` tool over `relay`.
    #[must_use]
    pub fn new(relay: Arc<RelayCore>) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl TronTool for ReadInboxTool {
    fn name(&self) -> &str {
        "read_inbox"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Custom
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "read_inbox".into(),
            description: "Read a page of messages addressed to an endpoint subject.".into(),
            parameters: ToolParameterSchema {
                schema_type: "object".into(),
                properties: Some({
                    let mut m = serde_json::Map::new();
                    let _ = m.insert("subject".into(), json!({"type": "string", "description": "Endpoint subject to read"}));
                    let _ = m.insert("limit".into(), json!({"type": "number", "description": "Maximum messages to return (default: 50)"}));
                    let _ = m.insert("status".into(), json!({"type": "string", "description": "Filter by status: pending, delivered, or failed"}));
                    let _ = m.insert("cursor".into(), json!({"type": "string", "description": "Pagination cursor from a previous call"}));
                    m
                }),
                required: Some(vec!["subject".into()]),
                description: None,
                extra: serde_json::Map::new(),
            },
        }
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<TronToolResult, ToolError> {
        let subject = match validate_required_string(&params, "subject", "endpoint subject") {
            Ok(s) => s,
            Err(e) => return Ok(e),
        };
        let limit = get_optional_u64(&params, "limit").unwrap_or(DEFAULT_LIMIT) as usize;
        let status = get_optional_string(&params, "status").map(|s| MessageStatus::from_str_lossy(&s));
        let cursor = get_optional_string(&params, "cursor");

        match self.relay.read_inbox(&subject, limit, status, cursor) {
            Ok(page) => {
                let summary = page
                    .messages
                    .iter()
                    .map(|m| format!("{} [{}] {}", m.id, m.status.as_str(), m.created_at))
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(TronToolResult {
                    content: ToolResultBody::Blocks(vec![tron_core::content::ToolResultContent::text(if summary.is_empty() {
                        "No messages.".to_string()
                    } else {
                        summary
                    })]),
                    details: Some(json!({
                        "messages": page.messages,
                        "nextCursor": page.next_cursor,
                    })),
                    is_error: None,
                    stop_turn: None,
                })
            }
            Err(e) => Ok(error_result(format!("Failed to read inbox: {e}"))),
        }
    }
}
