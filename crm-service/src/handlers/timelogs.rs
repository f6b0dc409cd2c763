use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;

use super::{ensure_project, not_found};
use crate::middleware::AuthUser;
use crate::models::{
    elapsed_seconds, PageParams, Paginated, StartTimerRequest, TimeLog, TimeLogFields,
    TimeLogInput, TimeLogStats,
};
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn list_time_logs(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Paginated<TimeLog>>, AppError> {
    let logs = state
        .storage
        .list_time_logs(user.tenant_id, params.limit(), params.offset())
        .await?;
    let total = state.storage.count_time_logs(user.tenant_id).await?;
    Ok(Json(Paginated::new(logs, &params, total)))
}

pub async fn list_project_time_logs(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<TimeLog>>, AppError> {
    let logs = state
        .storage
        .list_time_logs_by_project(user.tenant_id, project_id)
        .await?;
    Ok(Json(logs))
}

/// Tracked seconds overall, in the trailing seven days, and billable.
pub async fn time_log_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<TimeLogStats>, AppError> {
    let week_start = Utc::now() - Duration::days(7);
    Ok(Json(
        state
            .storage
            .time_log_stats(user.tenant_id, week_start)
            .await?,
    ))
}

/// The running timer, or `null`.
pub async fn active_time_log(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Option<TimeLog>>, AppError> {
    Ok(Json(state.storage.active_time_log(user.tenant_id).await?))
}

fn stopped(log: &TimeLog) -> TimeLogFields {
    let end = Utc::now();
    TimeLogFields {
        project_id: log.project_id,
        description: log.description.clone(),
        start_time: log.start_time,
        end_time: Some(end),
        duration: Some(elapsed_seconds(log.start_time, end)),
        billable: log.billable,
    }
}

/// Start a timer. A timer that is already running is stopped first.
pub async fn start_timer(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<StartTimerRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_project(&state, user.tenant_id, req.project_id).await?;

    if let Some(running) = state.storage.active_time_log(user.tenant_id).await? {
        state
            .storage
            .update_time_log(user.tenant_id, running.time_log_id, &stopped(&running))
            .await?;
    }

    let log = state
        .storage
        .create_time_log(
            user.tenant_id,
            &TimeLogFields {
                project_id: req.project_id,
                description: req.description,
                start_time: Utc::now(),
                end_time: None,
                duration: None,
                billable: req.billable.unwrap_or(true),
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(log)))
}

/// Stop a timer. Stopping one that is already stopped returns it unchanged.
pub async fn stop_timer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TimeLog>, AppError> {
    let log = state
        .storage
        .get_time_log(user.tenant_id, id)
        .await?
        .ok_or_else(|| not_found("Time log"))?;

    if !log.is_running() {
        return Ok(Json(log));
    }

    state
        .storage
        .update_time_log(user.tenant_id, id, &stopped(&log))
        .await?
        .map(Json)
        .ok_or_else(|| not_found("Time log"))
}

/// Manual entry; `duration` in seconds is required.
pub async fn create_time_log(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(input): ValidatedJson<TimeLogInput>,
) -> Result<impl IntoResponse, AppError> {
    let duration = input
        .duration
        .filter(|d| *d > 0)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Duration is required")))?;
    ensure_project(&state, user.tenant_id, input.project_id).await?;

    let start_time = input.start_time.unwrap_or_else(Utc::now);
    let log = state
        .storage
        .create_time_log(
            user.tenant_id,
            &TimeLogFields {
                project_id: input.project_id,
                description: input.description,
                start_time,
                end_time: Some(start_time + Duration::seconds(duration)),
                duration: Some(duration),
                billable: input.billable.unwrap_or(true),
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(log)))
}

/// Partial update; omitted fields keep their stored values.
pub async fn update_time_log(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<TimeLogInput>,
) -> Result<Json<TimeLog>, AppError> {
    let existing = state
        .storage
        .get_time_log(user.tenant_id, id)
        .await?
        .ok_or_else(|| not_found("Time log"))?;
    ensure_project(&state, user.tenant_id, input.project_id).await?;

    let fields = TimeLogFields {
        project_id: input.project_id.or(existing.project_id),
        description: input.description.or(existing.description),
        start_time: input.start_time.unwrap_or(existing.start_time),
        end_time: input.end_time.or(existing.end_time),
        duration: input.duration.or(existing.duration),
        billable: input.billable.unwrap_or(existing.billable),
    };

    state
        .storage
        .update_time_log(user.tenant_id, id, &fields)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("Time log"))
}

pub async fn delete_time_log(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !state.storage.delete_time_log(user.tenant_id, id).await? {
        return Err(not_found("Time log"));
    }
    Ok(Json(json!({ "message": "Time log deleted successfully" })))
}
