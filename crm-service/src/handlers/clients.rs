use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;

use super::not_found;
use crate::middleware::AuthUser;
use crate::models::{Client, ClientInput, ClientStats, PageParams, Paginated};
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn list_clients(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Paginated<Client>>, AppError> {
    let clients = state
        .storage
        .list_clients(user.tenant_id, params.limit(), params.offset())
        .await?;
    let total = state.storage.count_clients(user.tenant_id).await?;
    Ok(Json(Paginated::new(clients, &params, total)))
}

pub async fn client_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ClientStats>, AppError> {
    Ok(Json(state.storage.client_stats(user.tenant_id).await?))
}

pub async fn get_client(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Client>, AppError> {
    state
        .storage
        .get_client(user.tenant_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("Client"))
}

pub async fn create_client(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(input): ValidatedJson<ClientInput>,
) -> Result<impl IntoResponse, AppError> {
    let client = state.storage.create_client(user.tenant_id, &input).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn update_client(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<ClientInput>,
) -> Result<Json<Client>, AppError> {
    state
        .storage
        .update_client(user.tenant_id, id, &input)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("Client"))
}

/// Clients that still have invoices cannot be deleted.
pub async fn delete_client(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if !state.storage.delete_client(user.tenant_id, id).await? {
        return Err(not_found("Client"));
    }
    Ok(Json(json!({ "message": "Client deleted successfully" })))
}
