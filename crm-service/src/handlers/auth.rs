use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use service_core::error::AppError;

use crate::middleware::AuthUser;
use crate::models::{
    ChangePasswordRequest, LoginRequest, NewTenant, RegisterRequest, Role, TenantProfile,
    UpdateProfileRequest,
};
use crate::startup::AppState;
use crate::utils::{hash_password, verify_password, Password, PasswordHashString, ValidatedJson};

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: TenantProfile,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn issue(state: &AppState, user: TenantProfile) -> Result<AuthResponse, AppError> {
    let token = state.jwt.generate_access_token(user.id, &user.email)?;
    Ok(AuthResponse {
        token,
        token_type: "Bearer",
        expires_in: state.jwt.expiry_seconds(),
        user,
    })
}

pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = normalize_email(&req.email);

    if state.storage.find_tenant_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "An account with this email already exists"
        )));
    }

    let password_hash = hash_password(&Password::new(req.password))?;
    let tenant = state
        .storage
        .create_tenant(&NewTenant {
            email,
            password_hash: password_hash.into_string(),
            name: req.name.trim().to_string(),
            role: Role::User,
            company_name: req.company_name,
        })
        .await?;

    tracing::info!(tenant_id = %tenant.tenant_id, "Tenant registered");

    let response = issue(&state, tenant.into())?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let invalid = || AppError::Unauthorized(anyhow::anyhow!("Invalid email or password"));

    let tenant = state
        .storage
        .find_tenant_by_email(&normalize_email(&req.email))
        .await?
        .ok_or_else(invalid)?;

    verify_password(
        &Password::new(req.password),
        &PasswordHashString::new(tenant.password_hash.clone()),
    )
    .map_err(|_| invalid())?;

    tracing::info!(tenant_id = %tenant.tenant_id, "Tenant logged in");

    let response = issue(&state, tenant.into())?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.blacklist.revoke(&user.claims);
    tracing::info!(tenant_id = %user.tenant_id, "Tenant logged out");
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "Logged out successfully"
        })),
    ))
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<TenantProfile>, AppError> {
    let tenant = state
        .storage
        .get_tenant(user.tenant_id)
        .await?
        .ok_or_else(|| super::not_found("User"))?;
    Ok(Json(tenant.into()))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<TenantProfile>, AppError> {
    let company_name = req
        .company_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    let tenant = state
        .storage
        .update_tenant_profile(user.tenant_id, req.name.trim(), company_name)
        .await?
        .ok_or_else(|| super::not_found("User"))?;

    tracing::info!(tenant_id = %user.tenant_id, "Profile updated");
    Ok(Json(tenant.into()))
}

/// Replace the password after checking the current one. Issued tokens stay
/// valid.
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tenant = state
        .storage
        .get_tenant(user.tenant_id)
        .await?
        .ok_or_else(|| super::not_found("User"))?;

    verify_password(
        &Password::new(req.current_password),
        &PasswordHashString::new(tenant.password_hash),
    )
    .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Current password is incorrect")))?;

    let password_hash = hash_password(&Password::new(req.new_password))?;
    state
        .storage
        .update_tenant_password(user.tenant_id, password_hash.as_str())
        .await?;

    tracing::info!(tenant_id = %user.tenant_id, "Password changed");
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "Password updated successfully"
        })),
    ))
}
