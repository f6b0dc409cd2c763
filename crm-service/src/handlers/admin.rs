//! Account administration. Every route here sits behind the admin check.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use super::not_found;
use crate::middleware::AuthUser;
use crate::models::{Role, RoleUpdate, TenantProfile};
use crate::startup::AppState;

pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<TenantProfile>>, AppError> {
    let users = state
        .storage
        .list_tenants()
        .await?
        .into_iter()
        .map(TenantProfile::from)
        .collect();
    Ok(Json(users))
}

pub async fn update_user_role(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<RoleUpdate>,
) -> Result<Json<TenantProfile>, AppError> {
    let role = Role::parse(&req.role)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid role")))?;

    let tenant = state
        .storage
        .update_tenant_role(id, role)
        .await?
        .ok_or_else(|| not_found("User"))?;

    tracing::info!(
        admin_id = %admin.tenant_id,
        tenant_id = %id,
        role = role.as_str(),
        "Role updated"
    );
    Ok(Json(tenant.into()))
}

/// Delete an account together with everything it owns.
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if id == admin.tenant_id {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Cannot delete your own account"
        )));
    }

    if !state.storage.delete_tenant(id).await? {
        return Err(not_found("User"));
    }

    tracing::info!(admin_id = %admin.tenant_id, tenant_id = %id, "User deleted");
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "message": "User deleted successfully" })),
    ))
}
