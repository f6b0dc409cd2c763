use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;

use super::{ensure_client, not_found};
use crate::middleware::AuthUser;
use crate::models::{PageParams, Paginated, Project, ProjectInput, ProjectStats};
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn list_projects(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Paginated<Project>>, AppError> {
    let projects = state
        .storage
        .list_projects(user.tenant_id, params.limit(), params.offset())
        .await?;
    let total = state.storage.count_projects(user.tenant_id).await?;
    Ok(Json(Paginated::new(projects, &params, total)))
}

/// Active and completed counts, with the budget summed over every project.
pub async fn project_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ProjectStats>, AppError> {
    Ok(Json(state.storage.project_stats(user.tenant_id).await?))
}

pub async fn get_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, AppError> {
    state
        .storage
        .get_project(user.tenant_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("Project"))
}

pub async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(input): ValidatedJson<ProjectInput>,
) -> Result<impl IntoResponse, AppError> {
    ensure_client(&state, user.tenant_id, input.client_id).await?;
    let project = state.storage.create_project(user.tenant_id, &input).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<ProjectInput>,
) -> Result<Json<Project>, AppError> {
    ensure_client(&state, user.tenant_id, input.client_id).await?;
    state
        .storage
        .update_project(user.tenant_id, id, &input)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("Project"))
}

pub async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !state.storage.delete_project(user.tenant_id, id).await? {
        return Err(not_found("Project"));
    }
    Ok(Json(json!({ "message": "Project deleted successfully" })))
}
