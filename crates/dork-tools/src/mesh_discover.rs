//! `mesh_discover` tool — walks the filesystem for undiscovered agents.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dork_mesh::{MeshService, DEFAULT_MAX_DEPTH};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tron_core::tools::{error_result, Tool, ToolCategory, ToolParameterSchema, ToolResultBody, TronToolResult};
use tron_tools::errors::ToolError;
use tron_tools::traits::{ToolContext, TronTool};
use tron_tools::utils::validation::{get_optional_u64, validate_required_string};

/// Walks one or more roots for agent-bearing projects not yet in the
/// catalogue.
pub struct MeshDiscoverTool {
    mesh: Arc<MeshService>,
}

impl MeshDiscoverTool {
    /// Create a new `mesh_discover` tool over `mesh`.
    #[must_use]
    pub fn new(mesh: Arc<MeshService>) -> Self {
        Self { mesh }
    }
}

#[async_trait]
impl TronTool for MeshDiscoverTool {
    fn name(&self) -> &str {
        "mesh_discover"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Custom
    }

    fn definition(&self) -> Tool {
        Tool {
            name: "mesh_discover".into(),
            description: "Walk a directory root for agent projects not yet registered in the mesh.".into(),
            parameters: ToolParameterSchema {
                schema_type: "object".into(),
                properties: Some({
                    let mut m = serde_json::Map::new();
                    let _ = m.insert("root".into(), json!({"type": "string", "description": "Directory to scan"}));
                    let _ = m.insert("maxDepth".into(), json!({"type": "number", "description": "Maximum directory depth to descend (default: 4)"}));
                    m
                }),
                required: Some(vec!["root".into()]),
                description: None,
                extra: serde_json::Map::new(),
            },
        }
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<TronToolResult, ToolError> {
        let root = match validate_required_string(&params, "root", "directory to scan") {
            Ok(r) => r,
            Err(e) => return Ok(e),
        };
        let max_depth = get_optional_u64(&params, "maxDepth").map_or(DEFAULT_MAX_DEPTH, |d| d as u32);

        let stream = match self.mesh.discover(vec![PathBuf::from(&root)], max_depth, ctx.cancellation.clone()) {
            Ok(s) => s,
            Err(e) => return Ok(error_result(format!("Failed to discover agents: {e}"))),
        };
        tokio::pin!(stream);

        let mut candidates = Vec::new();
        while let Some(candidate) = stream.next().await {
            candidates.push(candidate);
        }

        let summary = if candidates.is_empty() {
            format!("No undiscovered agent projects found under {root}")
        } else {
            candidates
                .iter()
                .map(|c| format!("{} ({:?})", c.project_path, c.detected_runtime))
                .collect::<Vec<_>>()
                .join("\n")
        };

        Ok(TronToolResult {
            content: ToolResultBody::Blocks(vec![tron_core::content::ToolResultContent::text(summary)]),
            details: Some(json!({ "candidates": candidates.iter().map(|c| json!({
                "projectPath": c.project_path,
                "suggestedName": c.suggested_name,
                "hints": c.hints,
            })).collect::<Vec<_>>() })),
            is_error: None,
            stop_turn: None,
        })
    }
}
