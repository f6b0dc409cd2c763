pub mod admin;
pub mod auth;
pub mod backup;
pub mod clients;
pub mod health;
pub mod invoices;
pub mod projects;
pub mod recurring;
pub mod tasks;
pub mod timelogs;

use service_core::error::AppError;
use uuid::Uuid;

use crate::startup::AppState;

/// Referenced client must exist for this tenant.
pub(crate) async fn ensure_client(
    state: &AppState,
    tenant_id: Uuid,
    client_id: Option<Uuid>,
) -> Result<(), AppError> {
    if let Some(client_id) = client_id {
        if state.storage.get_client(tenant_id, client_id).await?.is_none() {
            return Err(AppError::BadRequest(anyhow::anyhow!("Client not found")));
        }
    }
    Ok(())
}

/// Referenced project must exist for this tenant.
pub(crate) async fn ensure_project(
    state: &AppState,
    tenant_id: Uuid,
    project_id: Option<Uuid>,
) -> Result<(), AppError> {
    if let Some(project_id) = project_id {
        if state
            .storage
            .get_project(tenant_id, project_id)
            .await?
            .is_none()
        {
            return Err(AppError::BadRequest(anyhow::anyhow!("Project not found")));
        }
    }
    Ok(())
}

pub(crate) fn not_found(what: &str) -> AppError {
    AppError::NotFound(anyhow::anyhow!("{} not found", what))
}
