//! `publish_message` tool — publishes an envelope onto the relay.

use std::sync::Arc;

use async_trait::async_trait;
use dork_relay::RelayCore;
use dork_relay_types::Budget;
use serde_json::{json, Value};
use tron_core::tools::{error_result, Tool, ToolCategory, ToolParameterSchema, ToolResultBody, TronToolResult};
use tron_tools::errors::ToolError;
use tron_tools::traits::{ToolContext, TronTool};
use tron_tools::utils::validation::{get_optional_string, validate_required_string};

/// Sends a message to an endpoint subject through the relay's publish
/// pipeline.
pub struct PublishMessageTool {
    relay: Arc<RelayCore>,
}

impl PublishMessageTool {
    /// Create a new `publish_message` tool over `relay`.
    #[must_use]
    pub fn new(relay: Arc<RelayCore>) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl TronTool for PublishMessageTool {
    fn name(&self) -> &str {
        "publish_message"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Custom
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "publish_message".into(),
            description: "Publish a message to a subject on the relay.".into(),
            parameters: ToolParameterSchema {
                schema_type: "object".into(),
                properties: Some({
                    let mut m = serde_json::Map::new();
                    let _ = m.insert("subject".into(), json!({"type": "string", "description": "Target subject to publish to"}));
                    let _ = m.insert("payload".into(), json!({"type": "object", "description": "Message payload"}));
                    let _ = m.insert("from".into(), json!({"type": "string", "description": "Sending subject (defaults to the current session)"}));
                    let _ = m.insert("replyTo".into(), json!({"type": "string", "description": "Optional reply-to subject"}));
                    m
                }),
                required: Some(vec!["subject".into(), "payload".into()]),
                description: None,
                extra: serde_json::Map::new(),
            },
        }
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<TronToolResult, ToolError> {
        let subject = match validate_required_string(&params, "subject", "target subject") {
            Ok(s) => s,
            Err(e) => return Ok(e),
        };
        let payload = match params.get("payload") {
            Some(p) => p.clone(),
            None => return Ok(error_result("Missing required parameter: payload")),
        };
        let from = get_optional_string(&params, "from").unwrap_or_else(|| ctx.session_id.clone());
        let reply_to = get_optional_string(&params, "replyTo");

        let opts = dork_relay::PublishOptions {
            from,
            reply_to,
            budget: Some(Budget::default_for_now()),
            trace_id: None,
            parent_span_id: None,
        };

        match self.relay.publish(&subject, payload, opts).await {
            Ok(result) => Ok(TronToolResult {
                content: ToolResultBody::Blocks(vec![tron_core::content::ToolResultContent::text(format!(
                    "Published message {} to {} ({} deliveries)",
                    result.message_id, subject, result.delivered_to
                ))]),
                details: Some(json!({
                    "messageId": result.message_id,
                    "deliveredTo": result.delivered_to,
                })),
                is_error: None,
                stop_turn: None,
            }),
            Err(e) => Ok(error_result(format!("Failed to publish message: {e}"))),
        }
    }
}
