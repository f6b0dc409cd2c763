//! Tenant export and restore.

use chrono::Utc;
use serde_json::Value;
use service_core::error::AppError;
use tracing::instrument;

use crate::models::{
    Backup, BackupContents, BackupOwner, InvoiceResponse, RecurringInvoiceResponse,
    RestoreRequest, RestoreSummary, Tenant, BACKUP_VERSION,
};
use crate::services::storage::Storage;

/// Page size that covers every row a tenant owns.
const ALL_ROWS: i64 = i64::MAX;

/// Collect every record the tenant owns into one export document.
#[instrument(skip(storage, tenant), fields(tenant_id = %tenant.tenant_id))]
pub async fn export_tenant(storage: &dyn Storage, tenant: Tenant) -> Result<Backup, AppError> {
    let tenant_id = tenant.tenant_id;

    let clients = storage.list_clients(tenant_id, ALL_ROWS, 0).await?;
    let projects = storage.list_projects(tenant_id, ALL_ROWS, 0).await?;
    let tasks = storage.list_tasks(tenant_id, ALL_ROWS, 0).await?;
    let invoices = storage
        .list_invoices(tenant_id, ALL_ROWS, 0)
        .await?
        .into_iter()
        .map(InvoiceResponse::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let time_logs = storage.list_time_logs(tenant_id, ALL_ROWS, 0).await?;
    let recurring_invoices = storage
        .list_recurring_invoices(tenant_id)
        .await?
        .into_iter()
        .map(RecurringInvoiceResponse::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(
        clients = clients.len(),
        invoices = invoices.len(),
        "Backup exported"
    );

    Ok(Backup {
        version: BACKUP_VERSION,
        export_date: Utc::now(),
        user: BackupOwner {
            id: tenant_id,
            email: tenant.email,
            name: tenant.name,
        },
        data: BackupContents {
            clients,
            projects,
            tasks,
            invoices,
            time_logs,
            recurring_invoices,
        },
    })
}

/// Validate an uploaded backup and write it for the tenant. Nothing is
/// written when any record is invalid.
#[instrument(skip(storage, body), fields(tenant_id = %tenant_id))]
pub async fn restore_tenant(
    storage: &dyn Storage,
    tenant_id: uuid::Uuid,
    body: Value,
) -> Result<RestoreSummary, AppError> {
    let restore = RestoreRequest::from_json(body)?.prepare(tenant_id, Utc::now().date_naive())?;
    storage.restore_backup(tenant_id, &restore).await
}
