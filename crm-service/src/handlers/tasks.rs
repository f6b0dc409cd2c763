use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;

use super::{ensure_project, not_found};
use crate::middleware::AuthUser;
use crate::models::{PageParams, Paginated, Task, TaskInput, TaskStats, TaskStatusUpdate};
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn list_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Paginated<Task>>, AppError> {
    let tasks = state
        .storage
        .list_tasks(user.tenant_id, params.limit(), params.offset())
        .await?;
    let total = state.storage.count_tasks(user.tenant_id).await?;
    Ok(Json(Paginated::new(tasks, &params, total)))
}

pub async fn list_project_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = state
        .storage
        .list_tasks_by_project(user.tenant_id, project_id)
        .await?;
    Ok(Json(tasks))
}

pub async fn task_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<TaskStats>, AppError> {
    Ok(Json(state.storage.task_stats(user.tenant_id).await?))
}

pub async fn get_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, AppError> {
    state
        .storage
        .get_task(user.tenant_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("Task"))
}

pub async fn create_task(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(input): ValidatedJson<TaskInput>,
) -> Result<impl IntoResponse, AppError> {
    ensure_project(&state, user.tenant_id, input.project_id).await?;
    let task = state.storage.create_task(user.tenant_id, &input).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<TaskInput>,
) -> Result<Json<Task>, AppError> {
    ensure_project(&state, user.tenant_id, input.project_id).await?;
    state
        .storage
        .update_task(user.tenant_id, id, &input)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("Task"))
}

pub async fn update_task_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<TaskStatusUpdate>,
) -> Result<Json<Task>, AppError> {
    state
        .storage
        .update_task_status(user.tenant_id, id, body.status)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("Task"))
}

pub async fn delete_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !state.storage.delete_task(user.tenant_id, id).await? {
        return Err(not_found("Task"));
    }
    Ok(Json(json!({ "message": "Task deleted successfully" })))
}
