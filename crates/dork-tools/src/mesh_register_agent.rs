//! `mesh_register_agent` tool — adds or updates an agent manifest.

use std::sync::Arc;

use async_trait::async_trait;
use dork_core::AgentId;
use dork_mesh::{AgentBudget, Behavior, MeshService, NewAgent, Runtime};
use serde_json::{json, Value};
use tron_core::tools::{error_result, Tool, ToolCategory, ToolParameterSchema, ToolResultBody, TronToolResult};
use tron_tools::errors::ToolError;
use tron_tools::traits::{ToolContext, TronTool};
use tron_tools::utils::validation::{get_optional_string, validate_required_string};

fn parse_runtime(s: &str) -> Runtime {
    match s {
        "cursor" => Runtime::Cursor,
        "codex" => Runtime::Codex,
        "claude-code" => Runtime::ClaudeCode,
        _ => Runtime::Other,
    }
}

/// Registers (or updates, if the project path already exists) an agent
/// manifest in the mesh catalogue.
pub struct MeshRegisterAgentTool {
    mesh: Arc<MeshService>,
}

impl MeshRegisterAgentTool {
    /// Create a new `mesh_register_agent` tool over `mesh`.
    #[must_use]
    pub fn new(mesh: Arc<MeshService>) -> Self {
        Self { mesh }
    }
}

#[async_trait]
impl TronTool for MeshRegisterAgentTool {
    fn name(&self) -> &str {
        "mesh_register_agent"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Custom
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "mesh_register_agent".into(),
            description: "Register or update an agent manifest in the mesh catalogue.".into(),
            parameters: ToolParameterSchema {
                schema_type: "object".into(),
                properties: Some({
                    let mut m = serde_json::Map::new();
                    let _ = m.insert("name".into(), json!({"type": "string", "description": "Display name"}));
                    let _ = m.insert("projectPath".into(), json!({"type": "string", "description": "Unique filesystem path of the agent's project"}));
                    let _ = m.insert("runtime".into(), json!({"type": "string", "description": "One of: claude-code, cursor, codex, other"}));
                    let _ = m.insert("description".into(), json!({"type": "string", "description": "Human-readable description"}));
                    let _ = m.insert("namespace".into(), json!({"type": "string", "description": "Optional namespace grouping"}));
                    m
                }),
                required: Some(vec!["name".into(), "projectPath".into(), "runtime".into()]),
                description: None,
                extra: serde_json::Map::new(),
            },
        }
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<TronToolResult, ToolError> {
        let name = match validate_required_string(&params, "name", "display name") {
            Ok(v) => v,
            Err(e) => return Ok(e),
        };
        let project_path = match validate_required_string(&params, "projectPath", "project path") {
            Ok(v) => v,
            Err(e) => return Ok(e),
        };
        let runtime = match validate_required_string(&params, "runtime", "agent runtime") {
            Ok(v) => parse_runtime(&v),
            Err(e) => return Ok(e),
        };

        let agent = NewAgent {
            id: AgentId::new(),
            name,
            description: get_optional_string(&params, "description"),
            runtime,
            capabilities: Vec::new(),
            project_path,
            namespace: get_optional_string(&params, "namespace"),
            behavior: Behavior::Always,
            budget: AgentBudget::default(),
            scan_root: None,
            registered_by: ctx.session_id.clone(),
        };

        match self.mesh.register_agent(agent) {
            Ok(manifest) => Ok(TronToolResult {
                content: ToolResultBody::Blocks(vec![tron_core::content::ToolResultContent::text(format!(
                    "Registered agent {} ({}) at {}",
                    manifest.name,
                    manifest.id.as_str(),
                    manifest.project_path
                ))]),
                details: Some(json!({
                    "id": manifest.id.as_str(),
                    "name": manifest.name,
                    "projectPath": manifest.project_path,
                })),
                is_error: None,
                stop_turn: None,
            }),
            Err(e) => Ok(error_result(format!("Failed to register agent: {e}"))),
        }
    }
}
