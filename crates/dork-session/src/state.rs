//! Permission modes and the tool-gate classification they drive.

use serde::{Deserialize, Serialize};

/// Governs whether a proposed tool call runs immediately or waits for an
/// explicit decision. Mirrors the modes a coding-agent CLI typically offers,
/// per the gating rules below.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    /// Every tool call is gated unless it is read-only.
    #[default]
    Default,
    /// File edits are auto-approved; everything else is gated as in
    /// `Default`.
    AcceptEdits,
    /// All tool calls auto-approve; only `AskUserQuestion` still gates.
    BypassPermissions,
    /// No tool calls execute; the agent may only propose a plan.
    Plan,
}

impl PermissionMode {
    /// The stored/wire value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "accept_edits",
            Self::BypassPermissions => "bypass_permissions",
            Self::Plan => "plan",
        }
    }

    /// Parse the stored value, defaulting to [`PermissionMode::Default`] if
    /// unrecognised.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "accept_edits" => Self::AcceptEdits,
            "bypass_permissions" => Self::BypassPermissions,
            "plan" => Self::Plan,
            _ => Self::Default,
        }
    }
}

/// Tool names treated as read-only and therefore never gated for approval
/// under [`PermissionMode::Default`].
const READ_ONLY_TOOLS: &[&str] = &["Read", "Glob", "Grep", "WebFetch", "WebSearch"];

/// Tool names that edit the filesystem, auto-approved under
/// [`PermissionMode::AcceptEdits`].
const EDIT_TOOLS: &[&str] = &["Edit", "Write", "MultiEdit", "NotebookEdit"];

/// How a proposed tool call should be gated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateKind {
    /// Runs immediately, no user decision required.
    Auto,
    /// Must wait for an explicit approve/deny decision.
    PendingApproval,
    /// Must wait for `AskUserQuestion` answers.
    PendingAnswer,
}

/// Classify how `tool_name` should be gated under `mode`.
///
/// `AskUserQuestion` always requires an answer regardless of mode; `Plan`
/// mode gates everything else for approval since no tool may actually
/// execute.
#[must_use]
pub fn classify_gate(mode: PermissionMode, tool_name: &str) -> GateKind {
    if tool_name == "AskUserQuestion" {
        return GateKind::PendingAnswer;
    }

    match mode {
        PermissionMode::BypassPermissions => GateKind::Auto,
        PermissionMode::Plan => GateKind::PendingApproval,
        PermissionMode::AcceptEdits => {
            if READ_ONLY_TOOLS.contains(&tool_name) || EDIT_TOOLS.contains(&tool_name) {
                GateKind::Auto
            } else {
                GateKind::PendingApproval
            }
        }
        PermissionMode::Default => {
            if READ_ONLY_TOOLS.contains(&tool_name) {
                GateKind::Auto
            } else {
                GateKind::PendingApproval
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_user_question_always_needs_answer() {
        for mode in [
            PermissionMode::Default,
            PermissionMode::AcceptEdits,
            PermissionMode::BypassPermissions,
            PermissionMode::Plan,
        ] {
            assert_eq!(classify_gate(mode, "AskUserQuestion"), GateKind::PendingAnswer);
        }
    }

    #[test]
    fn default_mode_gates_writes_but_not_reads() {
        assert_eq!(classify_gate(PermissionMode::Default, "Read"), GateKind::Auto);
        assert_eq!(
            classify_gate(PermissionMode::Default, "Write"),
            GateKind::PendingApproval
        );
    }

    #[test]
    fn accept_edits_auto_approves_writes() {
        assert_eq!(
            classify_gate(PermissionMode::AcceptEdits, "Write"),
            GateKind::Auto
        );
        assert_eq!(
            classify_gate(PermissionMode::AcceptEdits, "Bash"),
            GateKind::PendingApproval
        );
    }

    #[test]
    fn bypass_permissions_auto_approves_everything_but_questions() {
        assert_eq!(
            classify_gate(PermissionMode::BypassPermissions, "Bash"),
            GateKind::Auto
        );
    }

    #[test]
    fn plan_mode_gates_everything() {
        assert_eq!(classify_gate(PermissionMode::Plan, "Read"), GateKind::PendingApproval);
    }

    #[test]
    fn permission_mode_round_trips() {
        for mode in [
            PermissionMode::Default,
            PermissionMode::AcceptEdits,
            PermissionMode::BypassPermissions,
            PermissionMode::Plan,
        ] {
            assert_eq!(PermissionMode::from_str_lossy(mode.as_str()), mode);
        }
    }
}
