//! Builds the prompt suffix appended to every unattended run, reminding the
//! agent of its context and that no one is present to answer questions.

use crate::state::RunTrigger;

/// Parameters describing the run a context suffix is built for.
#[derive(Clone, Debug)]
pub struct PulseContext<'a> {
    /// The schedule's display name.
    pub job_name: &'a str,
    /// The schedule's cron expression.
    pub cron: &'a str,
    /// Working directory the run executes in, when set.
    pub cwd: Option<&'a str>,
    /// The run's id.
    pub run_id: &'a str,
    /// What triggered this run.
    pub trigger: RunTrigger,
}

/// Render the suffix appended after the schedule's own prompt.
#[must_use]
pub fn build_context_suffix(ctx: &PulseContext<'_>) -> String {
    let cwd = ctx.cwd.unwrap_or("(unset)");
    let trigger = match ctx.trigger {
        RunTrigger::Scheduled => "scheduled",
        RunTrigger::Manual => "manual",
    };
    format!(
        "\n\n---\nUnattended run context:\n\
         - job: {job_name}\n\
         - cron: {cron}\n\
         - cwd: {cwd}\n\
         - runId: {run_id}\n\
         - trigger: {trigger}\n\n\
         No one is watching this session. Do not call AskUserQuestion or wait \
         for input — make a reasonable decision and proceed, or end the turn \
         with a summary of what you could not determine.",
        job_name = ctx.job_name,
        cron = ctx.cron,
        run_id = ctx.run_id,
    )
}
