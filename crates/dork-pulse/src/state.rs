//! Schedule and run lifecycle enums, stored as lowercase strings.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a schedule. Agent-created schedules start in
/// `PendingApproval`; only a human transitions one to `Active`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// Registered and cron-dispatching.
    Active,
    /// Proposed by an agent; awaiting human approval.
    PendingApproval,
    /// Manually disabled.
    Disabled,
}

impl ScheduleStatus {
    /// The stored column value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PendingApproval => "pending_approval",
            Self::Disabled => "disabled",
        }
    }

    /// Parse the column value, defaulting to [`ScheduleStatus::Disabled`] if
    /// unrecognised.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "pending_approval" => Self::PendingApproval,
            _ => Self::Disabled,
        }
    }
}

/// Lifecycle status of a single run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Currently executing.
    Running,
    /// Finished without error.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl RunStatus {
    /// The stored column value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the column value, defaulting to [`RunStatus::Failed`] if
    /// unrecognised.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "completed" => Self::Completed,
            "cancelled" => Self::Cancelled,
            _ => Self::Failed,
        }
    }
}

/// What caused a run to start.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    /// Fired by the cron schedule.
    Scheduled,
    /// Kicked off via `triggerManualRun`.
    Manual,
}

impl RunTrigger {
    /// The stored column value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }

    /// Parse the column value, defaulting to [`RunTrigger::Manual`] if
    /// unrecognised.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "scheduled" => Self::Scheduled,
            _ => Self::Manual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_status_round_trips() {
        for status in [ScheduleStatus::Active, ScheduleStatus::PendingApproval, ScheduleStatus::Disabled] {
            assert_eq!(ScheduleStatus::from_str_lossy(status.as_str()), status);
        }
    }

    #[test]
    fn run_status_round_trips() {
        for status in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
            assert_eq!(RunStatus::from_str_lossy(status.as_str()), status);
        }
    }

    #[test]
    fn unrecognised_schedule_status_defaults_to_disabled() {
        assert_eq!(ScheduleStatus::from_str_lossy("bogus"), ScheduleStatus::Disabled);
    }
}
