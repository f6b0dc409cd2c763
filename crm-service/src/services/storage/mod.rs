//! Tenant-scoped storage.
//!
//! Two interchangeable SQL backends implement the same traits: [`PgStorage`]
//! over a networked PostgreSQL server and [`SqliteStorage`] over an embedded
//! database file. Every method that touches tenant data takes the tenant id
//! and filters on it in SQL; a record owned by another tenant is simply not
//! found.

mod postgres;
mod sqlite;

pub use postgres::PgStorage;
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::{
    Client, ClientInput, ClientStats, Invoice, InvoiceChanges, InvoiceStats, InvoiceStatus,
    NewInvoice, NewTenant, Project, ProjectInput, ProjectStats, RecurringInvoice,
    RecurringInvoiceFields, RestoreSummary, Role, Task, TaskInput, TaskStats, TaskStatus, Tenant,
    TenantRestore, TimeLog, TimeLogFields, TimeLogStats,
};

/// The narrow contract recurring generation depends on.
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Every tenant known to the system.
    async fn list_tenant_ids(&self) -> Result<Vec<Uuid>, AppError>;

    /// Active templates with `next_invoice_date <= as_of`, oldest due date first.
    async fn list_due_recurring_invoices(
        &self,
        tenant_id: Uuid,
        as_of: NaiveDate,
    ) -> Result<Vec<RecurringInvoice>, AppError>;

    async fn get_recurring_invoice(
        &self,
        tenant_id: Uuid,
        recurring_invoice_id: Uuid,
    ) -> Result<Option<RecurringInvoice>, AppError>;

    /// Fails with `NotFound` when the template does not belong to the tenant.
    async fn set_next_invoice_date(
        &self,
        tenant_id: Uuid,
        recurring_invoice_id: Uuid,
        next_invoice_date: NaiveDate,
    ) -> Result<(), AppError>;

    /// Insert an invoice. The client (and project, when given) must belong to
    /// `invoice.tenant_id`, otherwise nothing is written and `BadRequest` is
    /// returned. A duplicate number for the tenant yields `Conflict`.
    async fn insert_invoice(&self, invoice: &NewInvoice) -> Result<Invoice, AppError>;

    /// Number of the tenant's most recently created invoice.
    async fn latest_invoice_number(&self, tenant_id: Uuid) -> Result<Option<String>, AppError>;
}

/// Full data-access surface used by the HTTP handlers.
#[async_trait]
pub trait Storage: BillingStore {
    fn backend_name(&self) -> &'static str;

    async fn health_check(&self) -> Result<(), AppError>;

    // Tenants
    async fn create_tenant(&self, tenant: &NewTenant) -> Result<Tenant, AppError>;
    async fn find_tenant_by_email(&self, email: &str) -> Result<Option<Tenant>, AppError>;
    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError>;
    async fn list_tenants(&self) -> Result<Vec<Tenant>, AppError>;
    async fn update_tenant_profile(
        &self,
        tenant_id: Uuid,
        name: &str,
        company_name: Option<&str>,
    ) -> Result<Option<Tenant>, AppError>;
    async fn update_tenant_password(
        &self,
        tenant_id: Uuid,
        password_hash: &str,
    ) -> Result<bool, AppError>;
    async fn update_tenant_role(
        &self,
        tenant_id: Uuid,
        role: Role,
    ) -> Result<Option<Tenant>, AppError>;
    /// Remove the tenant and every record it owns, in one transaction.
    async fn delete_tenant(&self, tenant_id: Uuid) -> Result<bool, AppError>;

    // Clients
    async fn list_clients(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Client>, AppError>;
    async fn count_clients(&self, tenant_id: Uuid) -> Result<i64, AppError>;
    async fn get_client(&self, tenant_id: Uuid, client_id: Uuid)
        -> Result<Option<Client>, AppError>;
    async fn create_client(&self, tenant_id: Uuid, input: &ClientInput)
        -> Result<Client, AppError>;
    async fn update_client(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
        input: &ClientInput,
    ) -> Result<Option<Client>, AppError>;
    async fn delete_client(&self, tenant_id: Uuid, client_id: Uuid) -> Result<bool, AppError>;
    async fn client_stats(&self, tenant_id: Uuid) -> Result<ClientStats, AppError>;

    // Projects
    async fn list_projects(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Project>, AppError>;
    async fn count_projects(&self, tenant_id: Uuid) -> Result<i64, AppError>;
    async fn get_project(
        &self,
        tenant_id: Uuid,
        project_id: Uuid,
    ) -> Result<Option<Project>, AppError>;
    async fn create_project(
        &self,
        tenant_id: Uuid,
        input: &ProjectInput,
    ) -> Result<Project, AppError>;
    async fn update_project(
        &self,
        tenant_id: Uuid,
        project_id: Uuid,
        input: &ProjectInput,
    ) -> Result<Option<Project>, AppError>;
    async fn delete_project(&self, tenant_id: Uuid, project_id: Uuid) -> Result<bool, AppError>;
    async fn project_stats(&self, tenant_id: Uuid) -> Result<ProjectStats, AppError>;

    // Tasks
    async fn list_tasks(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>, AppError>;
    async fn count_tasks(&self, tenant_id: Uuid) -> Result<i64, AppError>;
    async fn list_tasks_by_project(
        &self,
        tenant_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<Task>, AppError>;
    async fn get_task(&self, tenant_id: Uuid, task_id: Uuid) -> Result<Option<Task>, AppError>;
    async fn create_task(&self, tenant_id: Uuid, input: &TaskInput) -> Result<Task, AppError>;
    async fn update_task(
        &self,
        tenant_id: Uuid,
        task_id: Uuid,
        input: &TaskInput,
    ) -> Result<Option<Task>, AppError>;
    async fn update_task_status(
        &self,
        tenant_id: Uuid,
        task_id: Uuid,
        status: TaskStatus,
    ) -> Result<Option<Task>, AppError>;
    async fn delete_task(&self, tenant_id: Uuid, task_id: Uuid) -> Result<bool, AppError>;
    async fn task_stats(&self, tenant_id: Uuid) -> Result<TaskStats, AppError>;

    // Invoices
    async fn list_invoices(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Invoice>, AppError>;
    async fn count_invoices(&self, tenant_id: Uuid) -> Result<i64, AppError>;
    async fn get_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError>;
    async fn update_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        changes: &InvoiceChanges,
    ) -> Result<Option<Invoice>, AppError>;
    async fn update_invoice_status(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Option<Invoice>, AppError>;
    async fn delete_invoice(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<bool, AppError>;
    async fn invoice_stats(&self, tenant_id: Uuid) -> Result<InvoiceStats, AppError>;

    // Time logs
    async fn list_time_logs(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TimeLog>, AppError>;
    async fn count_time_logs(&self, tenant_id: Uuid) -> Result<i64, AppError>;
    /// Newest first.
    async fn list_time_logs_by_project(
        &self,
        tenant_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<TimeLog>, AppError>;
    async fn get_time_log(
        &self,
        tenant_id: Uuid,
        time_log_id: Uuid,
    ) -> Result<Option<TimeLog>, AppError>;
    async fn active_time_log(&self, tenant_id: Uuid) -> Result<Option<TimeLog>, AppError>;
    async fn create_time_log(
        &self,
        tenant_id: Uuid,
        fields: &TimeLogFields,
    ) -> Result<TimeLog, AppError>;
    async fn update_time_log(
        &self,
        tenant_id: Uuid,
        time_log_id: Uuid,
        fields: &TimeLogFields,
    ) -> Result<Option<TimeLog>, AppError>;
    async fn delete_time_log(&self, tenant_id: Uuid, time_log_id: Uuid)
        -> Result<bool, AppError>;
    async fn time_log_stats(
        &self,
        tenant_id: Uuid,
        week_start: DateTime<Utc>,
    ) -> Result<TimeLogStats, AppError>;

    // Recurring templates
    async fn list_recurring_invoices(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<RecurringInvoice>, AppError>;
    async fn create_recurring_invoice(
        &self,
        tenant_id: Uuid,
        fields: &RecurringInvoiceFields,
    ) -> Result<RecurringInvoice, AppError>;
    async fn update_recurring_invoice(
        &self,
        tenant_id: Uuid,
        recurring_invoice_id: Uuid,
        fields: &RecurringInvoiceFields,
    ) -> Result<Option<RecurringInvoice>, AppError>;
    async fn delete_recurring_invoice(
        &self,
        tenant_id: Uuid,
        recurring_invoice_id: Uuid,
    ) -> Result<bool, AppError>;

    // Backup
    /// Write a validated backup for the tenant in one transaction. See
    /// [`crate::models::place`] for how exported ids are reused.
    async fn restore_backup(
        &self,
        tenant_id: Uuid,
        restore: &TenantRestore,
    ) -> Result<RestoreSummary, AppError>;
}

/// Tables holding tenant data, dependents before the rows they reference.
pub(crate) const TENANT_TABLES: [&str; 6] = [
    "invoices",
    "recurring_invoices",
    "time_logs",
    "tasks",
    "projects",
    "clients",
];

/// Open the backend selected by the database URL scheme and apply migrations.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn Storage>, AppError> {
    let storage: Arc<dyn Storage> = if is_postgres_url(&config.url) {
        Arc::new(PgStorage::new(&config.url, config.max_connections, config.min_connections).await?)
    } else {
        Arc::new(SqliteStorage::new(&config.url, config.max_connections).await?)
    };
    Ok(storage)
}

pub fn is_postgres_url(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://")
}

/// Map a driver error, turning unique-constraint violations into `Conflict`.
pub(crate) fn map_write_error(err: sqlx::Error, context: &str) -> AppError {
    match err {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(anyhow::anyhow!("{}: {}", context, db_err.message()))
        }
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            AppError::Conflict(anyhow::anyhow!(
                "{}: record is still referenced by other records",
                context
            ))
        }
        other => AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, other)),
    }
}

pub(crate) fn map_read_error(err: sqlx::Error, context: &str) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, err))
}

pub(crate) fn missing_client_or_project() -> AppError {
    AppError::BadRequest(anyhow::anyhow!(
        "Client not found, or project does not belong to this account"
    ))
}
