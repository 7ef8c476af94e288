//! `/api/pulse` — cron schedule CRUD and the run history/control surface
//! that parallels [`dork_pulse::Scheduler`] and [`dork_pulse::PulseStore`]'s
//! in-process contracts.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use dork_core::{DorkError, RunId, ScheduleId};
use dork_pulse::{NewSchedule, Run, RunFilter, RunStatus, Schedule, ScheduleUpdate};
use serde::{Deserialize, Serialize};

use crate::error::{bad_request, ApiError};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/pulse/schedules", get(list_schedules).post(create_schedule))
        .route(
            "/api/pulse/schedules/{id}",
            get(get_schedule).patch(update_schedule).delete(delete_schedule),
        )
        .route("/api/pulse/schedules/{id}/runs", get(list_runs))
        .route("/api/pulse/schedules/{id}/trigger", axum::routing::post(trigger_manual_run))
        .route("/api/pulse/schedules/{id}/next-run", get(get_next_run))
        .route("/api/pulse/runs/{id}/cancel", axum::routing::post(cancel_run))
        .route("/api/pulse/runs/active-count", get(get_active_run_count))
}

fn parse_schedule_id(raw: &str) -> Result<ScheduleId, ApiError> {
    ScheduleId::from_str(raw).map_err(|_| bad_request(format!("invalid schedule id {raw:?}")))
}

fn parse_run_id(raw: &str) -> Result<RunId, ApiError> {
    RunId::from_str(raw).map_err(|_| bad_request(format!("invalid run id {raw:?}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateScheduleRequest {
    name: String,
    prompt: String,
    cron: String,
    timezone: Option<String>,
    cwd: Option<String>,
    permission_mode: Option<String>,
    max_runtime_ms: Option<i64>,
    #[serde(default)]
    created_by_agent: bool,
}

async fn create_schedule(
    State(state): State<AppState>,
    Json(body): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<Schedule>), ApiError> {
    if body.name.is_empty() || body.prompt.is_empty() || body.cron.is_empty() {
        return Err(bad_request("name, prompt, and cron are required"));
    }

    let schedule = state.pulse_store.create_schedule(NewSchedule {
        name: body.name,
        prompt: body.prompt,
        cron: body.cron,
        timezone: body.timezone,
        cwd: body.cwd,
        permission_mode: body.permission_mode.unwrap_or_else(|| "default".to_owned()),
        max_runtime_ms: body.max_runtime_ms,
        created_by_agent: body.created_by_agent,
    })?;

    if schedule.enabled && schedule.status == dork_pulse::ScheduleStatus::Active {
        if let Err(e) = state.scheduler.register_schedule(&schedule) {
            state.pulse_store.delete_schedule(&schedule.id)?;
            return Err(e.into());
        }
    }

    Ok((StatusCode::CREATED, Json(schedule)))
}

async fn list_schedules(State(state): State<AppState>) -> Result<Json<Vec<Schedule>>, ApiError> {
    Ok(Json(state.pulse_store.list_schedules()?))
}

async fn get_schedule(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Schedule>, ApiError> {
    let id = parse_schedule_id(&id)?;
    let schedule = state.pulse_store.get_schedule(&id)?.ok_or_else(|| DorkError::not_found("schedule", id.to_string()))?;
    Ok(Json(schedule))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UpdateScheduleRequest {
    name: Option<String>,
    prompt: Option<String>,
    cron: Option<String>,
    timezone: Option<Option<String>>,
    cwd: Option<Option<String>>,
    enabled: Option<bool>,
    status: Option<String>,
    permission_mode: Option<String>,
    max_runtime_ms: Option<Option<i64>>,
}

async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateScheduleRequest>,
) -> Result<Json<Schedule>, ApiError> {
    let id = parse_schedule_id(&id)?;
    let status = body
        .status
        .as_deref()
        .map(|raw| match raw {
            "active" => Ok(dork_pulse::ScheduleStatus::Active),
            "pending_approval" => Ok(dork_pulse::ScheduleStatus::PendingApproval),
            "disabled" => Ok(dork_pulse::ScheduleStatus::Disabled),
            other => Err(bad_request(format!("unknown schedule status {other:?}"))),
        })
        .transpose()?;

    let patch = ScheduleUpdate {
        name: body.name,
        prompt: body.prompt,
        cron: body.cron,
        timezone: body.timezone,
        cwd: body.cwd,
        enabled: body.enabled,
        status,
        permission_mode: body.permission_mode,
        max_runtime_ms: body.max_runtime_ms,
    };
    let schedule = state
        .pulse_store
        .update_schedule(&id, patch)?
        .ok_or_else(|| DorkError::not_found("schedule", id.to_string()))?;

    state.scheduler.unregister_schedule(&id);
    if schedule.enabled && schedule.status == dork_pulse::ScheduleStatus::Active {
        state.scheduler.register_schedule(&schedule)?;
    }

    Ok(Json(schedule))
}

#[derive(Debug, Serialize)]
struct SuccessResponse {
    success: bool,
}

async fn delete_schedule(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SuccessResponse>, ApiError> {
    let id = parse_schedule_id(&id)?;
    state.scheduler.unregister_schedule(&id);
    if !state.pulse_store.delete_schedule(&id)? {
        return Err(DorkError::not_found("schedule", id.to_string()).into());
    }
    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Debug, Deserialize, Default)]
struct ListRunsQuery {
    status: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_runs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<Run>>, ApiError> {
    let id = parse_schedule_id(&id)?;
    let status = query
        .status
        .as_deref()
        .map(|raw| match raw {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(bad_request(format!("unknown run status {other:?}"))),
        })
        .transpose()?;

    let filter = RunFilter {
        schedule_id: Some(id),
        status,
        limit: query.limit.unwrap_or(50),
        offset: query.offset.unwrap_or(0),
    };
    Ok(Json(state.pulse_store.list_runs(&filter)?))
}

async fn trigger_manual_run(State(state): State<AppState>, Path(id): Path<String>) -> Result<(StatusCode, Json<Run>), ApiError> {
    let id = parse_schedule_id(&id)?;
    let run = state.scheduler.trigger_manual_run(&id)?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

async fn get_next_run(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Option<chrono::DateTime<chrono::Utc>>>, ApiError> {
    let id = parse_schedule_id(&id)?;
    Ok(Json(state.scheduler.get_next_run(&id)))
}

async fn cancel_run(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SuccessResponse>, ApiError> {
    let id = parse_run_id(&id)?;
    let cancelled = state.scheduler.cancel_run(&id);
    Ok(Json(SuccessResponse { success: cancelled }))
}

#[derive(Debug, Serialize)]
struct ActiveRunCount {
    active: usize,
}

async fn get_active_run_count(State(state): State<AppState>) -> Json<ActiveRunCount> {
    Json(ActiveRunCount { active: state.scheduler.get_active_run_count() })
}
