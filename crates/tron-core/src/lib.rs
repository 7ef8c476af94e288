//! # tron-core
//!
//! Foundation tool-schema vocabulary shared by tool implementations and the
//! crates that expose them to an agent runtime.
//!
//! - **Content blocks**: `ToolResultContent` covering text and image blocks
//! - **Tool definitions**: `Tool`/`ToolParameterSchema`, the schema sent to the LLM
//! - **Tool results**: `TronToolResult` with content, details, error/stop flags

#![deny(unsafe_code)]

pub mod content;
pub mod tools;
