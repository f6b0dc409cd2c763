use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use service_core::error::AppError;

use super::not_found;
use crate::middleware::AuthUser;
use crate::services::backup::{export_tenant, restore_tenant};
use crate::startup::AppState;

/// Download everything the tenant owns as one JSON document.
pub async fn export_backup(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let tenant = state
        .storage
        .get_tenant(user.tenant_id)
        .await?
        .ok_or_else(|| not_found("User"))?;

    let backup = export_tenant(&*state.storage, tenant).await?;
    let disposition = format!("attachment; filename=\"{}\"", backup.file_name());

    Ok((
        StatusCode::OK,
        [(header::CONTENT_DISPOSITION, disposition)],
        Json(backup),
    ))
}

pub async fn restore_backup(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let results = restore_tenant(&*state.storage, user.tenant_id, body).await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Restore completed",
            "results": results,
        })),
    ))
}
