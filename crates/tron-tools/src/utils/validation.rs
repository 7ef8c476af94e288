//! Parameter validation helpers.
//!
//! Typed extraction from [`serde_json::Value`] with user-friendly error messages
//! returned as [`TronToolResult`] (not panics or unwraps).

use serde_json::Value;
use tron_core::tools::{error_result, TronToolResult};

/// Extract a required string parameter.
///
/// Returns `Err(TronToolResult)` with `is_error=true` if the parameter is
/// missing, null, empty, or the wrong type.
pub fn validate_required_string(
    args: &Value,
    param: &str,
    description: &str,
) -> Result<String, TronToolResult> {
    match args.get(param) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_) | Value::Null) | None => Err(error_result(format!(
            "Missing required parameter: {param} ({description})"
        ))),
        Some(_) => Err(error_result(format!(
            "Invalid type for parameter: {param} (expected string)"
        ))),
    }
}

/// Validate that a path is not a root/dangerous path.
///
/// Blocks `/`, `.`, and empty string.
pub fn validate_path_not_root(path: &str, param: &str) -> Result<(), TronToolResult> {
    if path.is_empty() || path == "/" || path == "." {
        return Err(error_result(format!(
            "Invalid path for {param}: \"{path}\" (must be a specific file path)"
        )));
    }
    Ok(())
}

/// Extract an optional string parameter.
pub fn get_optional_string(args: &Value, param: &str) -> Option<String> {
    args.get(param).and_then(Value::as_str).map(String::from)
}

/// Extract an optional boolean parameter.
pub fn get_optional_bool(args: &Value, param: &str) -> Option<bool> {
    args.get(param).and_then(Value::as_bool)
}

/// Extract an optional integer parameter.
pub fn get_optional_u64(args: &Value, param: &str) -> Option<u64> {
    args.get(param).and_then(Value::as_u64)
}
