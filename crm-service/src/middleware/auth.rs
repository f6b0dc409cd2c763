use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::services::AccessTokenClaims;
use crate::startup::AppState;

/// Middleware to require a valid, unrevoked bearer token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req).ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
    })?;

    let claims = state.jwt.validate_access_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
    })?;

    if state.blacklist.is_revoked(&claims.jti) {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Token has been revoked"
        )));
    }

    // Store claims in request extensions so handlers can access them
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Middleware to restrict routes to admin accounts. Must run after
/// [`auth_middleware`]. The role is read from storage on every request.
pub async fn admin_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let tenant_id = req
        .extensions()
        .get::<AccessTokenClaims>()
        .and_then(|claims| claims.tenant_id().ok())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token")))?;

    let is_admin = state
        .storage
        .get_tenant(tenant_id)
        .await?
        .is_some_and(|tenant| tenant.is_admin());
    if !is_admin {
        tracing::warn!(tenant_id = %tenant_id, "Admin route refused");
        return Err(AppError::Forbidden(anyhow::anyhow!("Admin access required")));
    }

    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// The authenticated tenant. Its id is the only tenant scope handlers use.
pub struct AuthUser {
    pub tenant_id: Uuid,
    pub claims: AccessTokenClaims,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<AccessTokenClaims>()
            .cloned()
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Auth claims missing from request extensions"
                ))
            })?;

        let tenant_id = claims
            .tenant_id()
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token")))?;

        Ok(AuthUser { tenant_id, claims })
    }
}
