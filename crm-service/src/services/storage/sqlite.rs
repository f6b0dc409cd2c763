//! Embedded SQLite backend.
//!
//! Uuids are stored as 16-byte blobs, dates and timestamps as text. Timestamps
//! are always written by the service so that text ordering matches time
//! ordering.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use prometheus::HistogramTimer;
use service_core::error::AppError;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{
    map_read_error, map_write_error, missing_client_or_project, BillingStore, Storage,
    TENANT_TABLES,
};
use crate::models::{
    place, Client, ClientInput, ClientStats, IdMap, Invoice, InvoiceChanges, InvoiceStats,
    InvoiceStatus, NewInvoice, NewTenant, Project, ProjectInput, ProjectStats, ProjectStatus,
    RecurringInvoice, RecurringInvoiceFields, RestoreIds, RestoreSummary, Role, Task, TaskInput,
    TaskPriority, TaskStats, TaskStatus, Tenant, TenantRestore, TimeLog, TimeLogFields,
    TimeLogStats,
};
use crate::services::metrics::DB_QUERY_DURATION;

const TENANT_COLUMNS: &str =
    "tenant_id, email, password_hash, name, role, company_name, created_at, updated_at";
const CLIENT_COLUMNS: &str =
    "client_id, tenant_id, name, email, phone, company, address, notes, created_at, updated_at";
const PROJECT_COLUMNS: &str = "project_id, tenant_id, client_id, name, description, status, budget, deadline, progress, created_at, updated_at";
const TASK_COLUMNS: &str = "task_id, tenant_id, project_id, title, description, status, priority, due_date, created_at, updated_at";
const INVOICE_COLUMNS: &str = "invoice_id, tenant_id, client_id, project_id, invoice_number, items, subtotal, tax_rate, tax_amount, total, status, issue_date, due_date, notes, recurring_invoice_id, created_at, updated_at";
const TIME_LOG_COLUMNS: &str = "time_log_id, tenant_id, project_id, description, start_time, end_time, duration, billable, created_at, updated_at";
const RECURRING_COLUMNS: &str = "recurring_invoice_id, tenant_id, client_id, project_id, items, tax_rate, frequency, next_invoice_date, status, notes, created_at, updated_at";

fn query_timer(operation: &str) -> HistogramTimer {
    DB_QUERY_DURATION
        .with_label_values(&["sqlite", operation])
        .start_timer()
}

fn encode_items(items: &crate::models::LineItems) -> Result<String, AppError> {
    items.to_stored().map_err(|e| AppError::InternalError(e.into()))
}

/// Tenant currently owning `id` in `table`, if any.
async fn owner_of(
    conn: &mut SqliteConnection,
    table: &str,
    id_column: &str,
    id: Uuid,
) -> Result<Option<Uuid>, AppError> {
    let sql = format!("SELECT tenant_id FROM {table} WHERE {id_column} = ?1");
    sqlx::query_scalar::<_, Uuid>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_read_error(e, "Failed to look up restored record"))
}

/// Id to write a restored record under, or `None` when the tenant already
/// has it.
async fn settle(
    conn: &mut SqliteConnection,
    tenant_id: Uuid,
    table: &str,
    id_column: &str,
    wanted: Option<Uuid>,
    ids: &mut IdMap,
) -> Result<Option<Uuid>, AppError> {
    let owner = match wanted {
        Some(id) => owner_of(conn, table, id_column, id).await?,
        None => None,
    };
    Ok(ids.settle(wanted, place(tenant_id, wanted, owner)))
}

/// Stored id for a reference made inside a backup. Unknown references, and
/// references to another tenant's records, resolve to `None`.
async fn resolve(
    conn: &mut SqliteConnection,
    tenant_id: Uuid,
    table: &str,
    id_column: &str,
    ids: &IdMap,
    reference: Option<Uuid>,
) -> Result<Option<Uuid>, AppError> {
    let Some(old) = reference else {
        return Ok(None);
    };
    if let Some(id) = ids.get(old) {
        return Ok(Some(id));
    }
    let owner = owner_of(conn, table, id_column, old).await?;
    Ok((owner == Some(tenant_id)).then_some(old))
}

/// File path part of a `sqlite:` URL, or `None` for in-memory databases.
fn database_file(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(path)
    }
}

/// SQLite connection pool wrapper.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if needed) the database file and apply migrations.
    #[instrument(skip(database_url), fields(backend = "sqlite"))]
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        if let Some(file) = database_file(database_url) {
            if let Some(parent) = Path::new(file).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            debug!(path = %file, "Using SQLite database file");
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid DATABASE_URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!(max_connections = max_connections, "SQLite connection pool established");

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same database.
    pub async fn new_in_memory() -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid DATABASE_URL: {}", e)))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[instrument(skip(self))]
    async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl BillingStore for SqliteStorage {
    #[instrument(skip(self))]
    async fn list_tenant_ids(&self) -> Result<Vec<Uuid>, AppError> {
        let _timer = query_timer("list_tenant_ids");
        sqlx::query_scalar::<_, Uuid>("SELECT tenant_id FROM tenants ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to list tenants"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, as_of = %as_of))]
    async fn list_due_recurring_invoices(
        &self,
        tenant_id: Uuid,
        as_of: NaiveDate,
    ) -> Result<Vec<RecurringInvoice>, AppError> {
        let _timer = query_timer("list_due_recurring_invoices");
        let sql = format!(
            "SELECT {RECURRING_COLUMNS} FROM recurring_invoices \
             WHERE tenant_id = ?1 AND status = 'active' AND next_invoice_date <= ?2 \
             ORDER BY next_invoice_date ASC, created_at ASC"
        );
        sqlx::query_as::<_, RecurringInvoice>(&sql)
            .bind(tenant_id)
            .bind(as_of)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to list due recurring invoices"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, recurring_invoice_id = %recurring_invoice_id))]
    async fn get_recurring_invoice(
        &self,
        tenant_id: Uuid,
        recurring_invoice_id: Uuid,
    ) -> Result<Option<RecurringInvoice>, AppError> {
        let _timer = query_timer("get_recurring_invoice");
        let sql = format!(
            "SELECT {RECURRING_COLUMNS} FROM recurring_invoices \
             WHERE tenant_id = ?1 AND recurring_invoice_id = ?2"
        );
        sqlx::query_as::<_, RecurringInvoice>(&sql)
            .bind(tenant_id)
            .bind(recurring_invoice_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to get recurring invoice"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, recurring_invoice_id = %recurring_invoice_id))]
    async fn set_next_invoice_date(
        &self,
        tenant_id: Uuid,
        recurring_invoice_id: Uuid,
        next_invoice_date: NaiveDate,
    ) -> Result<(), AppError> {
        let _timer = query_timer("set_next_invoice_date");
        let result = sqlx::query(
            r#"
            UPDATE recurring_invoices
            SET next_invoice_date = ?3, updated_at = ?4
            WHERE tenant_id = ?1 AND recurring_invoice_id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(recurring_invoice_id)
        .bind(next_invoice_date)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "Failed to advance recurring invoice"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Recurring invoice not found"
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, invoice), fields(tenant_id = %invoice.tenant_id, invoice_number = %invoice.invoice_number))]
    async fn insert_invoice(&self, invoice: &NewInvoice) -> Result<Invoice, AppError> {
        let _timer = query_timer("insert_invoice");
        let items = encode_items(&invoice.items)?;
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO invoices ({INVOICE_COLUMNS}) \
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16 \
             WHERE EXISTS (SELECT 1 FROM clients WHERE client_id = ?3 AND tenant_id = ?2) \
               AND (?4 IS NULL \
                    OR EXISTS (SELECT 1 FROM projects WHERE project_id = ?4 AND tenant_id = ?2)) \
             RETURNING {INVOICE_COLUMNS}"
        );

        let inserted = sqlx::query_as::<_, Invoice>(&sql)
            .bind(Uuid::new_v4())
            .bind(invoice.tenant_id)
            .bind(invoice.client_id)
            .bind(invoice.project_id)
            .bind(&invoice.invoice_number)
            .bind(items)
            .bind(invoice.totals.subtotal)
            .bind(invoice.tax_rate)
            .bind(invoice.totals.tax_amount)
            .bind(invoice.totals.total)
            .bind(invoice.status.as_str())
            .bind(invoice.issue_date)
            .bind(invoice.due_date)
            .bind(invoice.notes.as_deref())
            .bind(invoice.recurring_invoice_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    AppError::Conflict(anyhow::anyhow!(
                        "Invoice number {} already exists",
                        invoice.invoice_number
                    ))
                }
                _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)),
            })?;

        inserted.ok_or_else(missing_client_or_project)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn latest_invoice_number(&self, tenant_id: Uuid) -> Result<Option<String>, AppError> {
        let _timer = query_timer("latest_invoice_number");
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT invoice_number FROM invoices
            WHERE tenant_id = ?1
            ORDER BY created_at DESC, invoice_number DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_read_error(e, "Failed to read latest invoice number"))
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Tenants
    // -------------------------------------------------------------------------

    #[instrument(skip(self, tenant), fields(email = %tenant.email))]
    async fn create_tenant(&self, tenant: &NewTenant) -> Result<Tenant, AppError> {
        let _timer = query_timer("create_tenant");
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO tenants ({TENANT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
             RETURNING {TENANT_COLUMNS}"
        );
        sqlx::query_as::<_, Tenant>(&sql)
            .bind(Uuid::new_v4())
            .bind(&tenant.email)
            .bind(&tenant.password_hash)
            .bind(&tenant.name)
            .bind(tenant.role.as_str())
            .bind(tenant.company_name.as_deref())
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "An account with this email already exists"))
    }

    #[instrument(skip(self, email))]
    async fn find_tenant_by_email(&self, email: &str) -> Result<Option<Tenant>, AppError> {
        let _timer = query_timer("find_tenant_by_email");
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE email = ?1");
        sqlx::query_as::<_, Tenant>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to find tenant"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError> {
        let _timer = query_timer("get_tenant");
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE tenant_id = ?1");
        sqlx::query_as::<_, Tenant>(&sql)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to get tenant"))
    }

    #[instrument(skip(self))]
    async fn list_tenants(&self) -> Result<Vec<Tenant>, AppError> {
        let _timer = query_timer("list_tenants");
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants ORDER BY created_at DESC");
        sqlx::query_as::<_, Tenant>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to list tenants"))
    }

    #[instrument(skip(self, name, company_name), fields(tenant_id = %tenant_id))]
    async fn update_tenant_profile(
        &self,
        tenant_id: Uuid,
        name: &str,
        company_name: Option<&str>,
    ) -> Result<Option<Tenant>, AppError> {
        let _timer = query_timer("update_tenant_profile");
        let sql = format!(
            "UPDATE tenants SET name = ?2, company_name = ?3, updated_at = ?4 \
             WHERE tenant_id = ?1 RETURNING {TENANT_COLUMNS}"
        );
        sqlx::query_as::<_, Tenant>(&sql)
            .bind(tenant_id)
            .bind(name)
            .bind(company_name)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to update profile"))
    }

    #[instrument(skip(self, password_hash), fields(tenant_id = %tenant_id))]
    async fn update_tenant_password(
        &self,
        tenant_id: Uuid,
        password_hash: &str,
    ) -> Result<bool, AppError> {
        let _timer = query_timer("update_tenant_password");
        let result = sqlx::query(
            "UPDATE tenants SET password_hash = ?2, updated_at = ?3 WHERE tenant_id = ?1",
        )
        .bind(tenant_id)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "Failed to update password"))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, role = role.as_str()))]
    async fn update_tenant_role(
        &self,
        tenant_id: Uuid,
        role: Role,
    ) -> Result<Option<Tenant>, AppError> {
        let _timer = query_timer("update_tenant_role");
        let sql = format!(
            "UPDATE tenants SET role = ?2, updated_at = ?3 \
             WHERE tenant_id = ?1 RETURNING {TENANT_COLUMNS}"
        );
        sqlx::query_as::<_, Tenant>(&sql)
            .bind(tenant_id)
            .bind(role.as_str())
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to update role"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn delete_tenant(&self, tenant_id: Uuid) -> Result<bool, AppError> {
        let _timer = query_timer("delete_tenant");
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_write_error(e, "Failed to delete account"))?;

        for table in TENANT_TABLES {
            sqlx::query(&format!("DELETE FROM {table} WHERE tenant_id = ?1"))
                .bind(tenant_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_write_error(e, "Failed to delete account data"))?;
        }
        let result = sqlx::query("DELETE FROM tenants WHERE tenant_id = ?1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_write_error(e, "Failed to delete account"))?;

        tx.commit()
            .await
            .map_err(|e| map_write_error(e, "Failed to delete account"))?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!("Tenant and its records deleted");
        }
        Ok(deleted)
    }

    // -------------------------------------------------------------------------
    // Clients
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_clients(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Client>, AppError> {
        let _timer = query_timer("list_clients");
        let sql = format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE tenant_id = ?1 \
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
        );
        sqlx::query_as::<_, Client>(&sql)
            .bind(tenant_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to list clients"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn count_clients(&self, tenant_id: Uuid) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clients WHERE tenant_id = ?1")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to count clients"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, client_id = %client_id))]
    async fn get_client(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<Client>, AppError> {
        let _timer = query_timer("get_client");
        let sql =
            format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE tenant_id = ?1 AND client_id = ?2");
        sqlx::query_as::<_, Client>(&sql)
            .bind(tenant_id)
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to get client"))
    }

    #[instrument(skip(self, input), fields(tenant_id = %tenant_id))]
    async fn create_client(
        &self,
        tenant_id: Uuid,
        input: &ClientInput,
    ) -> Result<Client, AppError> {
        let _timer = query_timer("create_client");
        let sql = format!(
            "INSERT INTO clients ({CLIENT_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) RETURNING {CLIENT_COLUMNS}"
        );
        let client = sqlx::query_as::<_, Client>(&sql)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(&input.name)
            .bind(input.email.as_deref())
            .bind(input.phone.as_deref())
            .bind(input.company.as_deref())
            .bind(input.address.as_deref())
            .bind(input.notes.as_deref())
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to create client"))?;

        info!(client_id = %client.client_id, "Client created");
        Ok(client)
    }

    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, client_id = %client_id))]
    async fn update_client(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
        input: &ClientInput,
    ) -> Result<Option<Client>, AppError> {
        let _timer = query_timer("update_client");
        let sql = format!(
            "UPDATE clients SET name = ?3, email = ?4, phone = ?5, company = ?6, address = ?7, \
             notes = ?8, updated_at = ?9 \
             WHERE tenant_id = ?1 AND client_id = ?2 RETURNING {CLIENT_COLUMNS}"
        );
        sqlx::query_as::<_, Client>(&sql)
            .bind(tenant_id)
            .bind(client_id)
            .bind(&input.name)
            .bind(input.email.as_deref())
            .bind(input.phone.as_deref())
            .bind(input.company.as_deref())
            .bind(input.address.as_deref())
            .bind(input.notes.as_deref())
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to update client"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, client_id = %client_id))]
    async fn delete_client(&self, tenant_id: Uuid, client_id: Uuid) -> Result<bool, AppError> {
        let _timer = query_timer("delete_client");
        let result = sqlx::query("DELETE FROM clients WHERE tenant_id = ?1 AND client_id = ?2")
            .bind(tenant_id)
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Cannot delete client with invoices"))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn client_stats(&self, tenant_id: Uuid) -> Result<ClientStats, AppError> {
        let _timer = query_timer("client_stats");
        let total = self.count_clients(tenant_id).await?;
        Ok(ClientStats { total })
    }

    // -------------------------------------------------------------------------
    // Projects
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_projects(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Project>, AppError> {
        let _timer = query_timer("list_projects");
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE tenant_id = ?1 \
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
        );
        sqlx::query_as::<_, Project>(&sql)
            .bind(tenant_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to list projects"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn count_projects(&self, tenant_id: Uuid) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM projects WHERE tenant_id = ?1")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to count projects"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, project_id = %project_id))]
    async fn get_project(
        &self,
        tenant_id: Uuid,
        project_id: Uuid,
    ) -> Result<Option<Project>, AppError> {
        let _timer = query_timer("get_project");
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE tenant_id = ?1 AND project_id = ?2"
        );
        sqlx::query_as::<_, Project>(&sql)
            .bind(tenant_id)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to get project"))
    }

    #[instrument(skip(self, input), fields(tenant_id = %tenant_id))]
    async fn create_project(
        &self,
        tenant_id: Uuid,
        input: &ProjectInput,
    ) -> Result<Project, AppError> {
        let _timer = query_timer("create_project");
        let sql = format!(
            "INSERT INTO projects ({PROJECT_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10) RETURNING {PROJECT_COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&sql)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(input.client_id)
            .bind(&input.name)
            .bind(input.description.as_deref())
            .bind(input.status.unwrap_or(ProjectStatus::Active).as_str())
            .bind(input.budget)
            .bind(input.deadline)
            .bind(input.progress.unwrap_or(0))
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to create project"))
    }

    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, project_id = %project_id))]
    async fn update_project(
        &self,
        tenant_id: Uuid,
        project_id: Uuid,
        input: &ProjectInput,
    ) -> Result<Option<Project>, AppError> {
        let _timer = query_timer("update_project");
        let sql = format!(
            "UPDATE projects SET client_id = ?3, name = ?4, description = ?5, \
             status = COALESCE(?6, status), budget = ?7, deadline = ?8, \
             progress = COALESCE(?9, progress), updated_at = ?10 \
             WHERE tenant_id = ?1 AND project_id = ?2 RETURNING {PROJECT_COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&sql)
            .bind(tenant_id)
            .bind(project_id)
            .bind(input.client_id)
            .bind(&input.name)
            .bind(input.description.as_deref())
            .bind(input.status.map(|s| s.as_str()))
            .bind(input.budget)
            .bind(input.deadline)
            .bind(input.progress)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to update project"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, project_id = %project_id))]
    async fn delete_project(&self, tenant_id: Uuid, project_id: Uuid) -> Result<bool, AppError> {
        let _timer = query_timer("delete_project");
        let result = sqlx::query("DELETE FROM projects WHERE tenant_id = ?1 AND project_id = ?2")
            .bind(tenant_id)
            .bind(project_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to delete project"))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn project_stats(&self, tenant_id: Uuid) -> Result<ProjectStats, AppError> {
        let _timer = query_timer("project_stats");
        let (total, active, completed, total_budget) =
            sqlx::query_as::<_, (i64, i64, i64, f64)>(
                r#"
                SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(budget), 0.0)
                FROM projects
                WHERE tenant_id = ?1
                "#,
            )
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to compute project stats"))?;

        Ok(ProjectStats {
            total,
            active,
            completed,
            total_budget,
        })
    }

    // -------------------------------------------------------------------------
    // Tasks
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_tasks(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>, AppError> {
        let _timer = query_timer("list_tasks");
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE tenant_id = ?1 \
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
        );
        sqlx::query_as::<_, Task>(&sql)
            .bind(tenant_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to list tasks"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn count_tasks(&self, tenant_id: Uuid) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tasks WHERE tenant_id = ?1")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to count tasks"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, project_id = %project_id))]
    async fn list_tasks_by_project(
        &self,
        tenant_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<Task>, AppError> {
        let _timer = query_timer("list_tasks_by_project");
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE tenant_id = ?1 AND project_id = ?2 \
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, Task>(&sql)
            .bind(tenant_id)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to list project tasks"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, task_id = %task_id))]
    async fn get_task(&self, tenant_id: Uuid, task_id: Uuid) -> Result<Option<Task>, AppError> {
        let _timer = query_timer("get_task");
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE tenant_id = ?1 AND task_id = ?2");
        sqlx::query_as::<_, Task>(&sql)
            .bind(tenant_id)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to get task"))
    }

    #[instrument(skip(self, input), fields(tenant_id = %tenant_id))]
    async fn create_task(&self, tenant_id: Uuid, input: &TaskInput) -> Result<Task, AppError> {
        let _timer = query_timer("create_task");
        let sql = format!(
            "INSERT INTO tasks ({TASK_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) RETURNING {TASK_COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&sql)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(input.project_id)
            .bind(&input.title)
            .bind(input.description.as_deref())
            .bind(input.status.unwrap_or(TaskStatus::Todo).as_str())
            .bind(input.priority.unwrap_or(TaskPriority::Medium).as_str())
            .bind(input.due_date)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to create task"))
    }

    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, task_id = %task_id))]
    async fn update_task(
        &self,
        tenant_id: Uuid,
        task_id: Uuid,
        input: &TaskInput,
    ) -> Result<Option<Task>, AppError> {
        let _timer = query_timer("update_task");
        let sql = format!(
            "UPDATE tasks SET project_id = ?3, title = ?4, description = ?5, \
             status = COALESCE(?6, status), priority = COALESCE(?7, priority), due_date = ?8, \
             updated_at = ?9 \
             WHERE tenant_id = ?1 AND task_id = ?2 RETURNING {TASK_COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&sql)
            .bind(tenant_id)
            .bind(task_id)
            .bind(input.project_id)
            .bind(&input.title)
            .bind(input.description.as_deref())
            .bind(input.status.map(|s| s.as_str()))
            .bind(input.priority.map(|p| p.as_str()))
            .bind(input.due_date)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to update task"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, task_id = %task_id))]
    async fn update_task_status(
        &self,
        tenant_id: Uuid,
        task_id: Uuid,
        status: TaskStatus,
    ) -> Result<Option<Task>, AppError> {
        let _timer = query_timer("update_task_status");
        let sql = format!(
            "UPDATE tasks SET status = ?3, updated_at = ?4 \
             WHERE tenant_id = ?1 AND task_id = ?2 RETURNING {TASK_COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&sql)
            .bind(tenant_id)
            .bind(task_id)
            .bind(status.as_str())
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to update task status"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, task_id = %task_id))]
    async fn delete_task(&self, tenant_id: Uuid, task_id: Uuid) -> Result<bool, AppError> {
        let _timer = query_timer("delete_task");
        let result = sqlx::query("DELETE FROM tasks WHERE tenant_id = ?1 AND task_id = ?2")
            .bind(tenant_id)
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to delete task"))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn task_stats(&self, tenant_id: Uuid) -> Result<TaskStats, AppError> {
        let _timer = query_timer("task_stats");
        let (total, todo, in_progress, done) = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'todo' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'in_progress' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'done' THEN 1 ELSE 0 END), 0)
            FROM tasks
            WHERE tenant_id = ?1
            "#,
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_read_error(e, "Failed to compute task stats"))?;

        Ok(TaskStats {
            total,
            todo,
            in_progress,
            done,
        })
    }

    // -------------------------------------------------------------------------
    // Invoices
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_invoices(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Invoice>, AppError> {
        let _timer = query_timer("list_invoices");
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE tenant_id = ?1 \
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
        );
        sqlx::query_as::<_, Invoice>(&sql)
            .bind(tenant_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to list invoices"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn count_invoices(&self, tenant_id: Uuid) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM invoices WHERE tenant_id = ?1")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to count invoices"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    async fn get_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let _timer = query_timer("get_invoice");
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE tenant_id = ?1 AND invoice_id = ?2"
        );
        sqlx::query_as::<_, Invoice>(&sql)
            .bind(tenant_id)
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to get invoice"))
    }

    #[instrument(skip(self, changes), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    async fn update_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        changes: &InvoiceChanges,
    ) -> Result<Option<Invoice>, AppError> {
        let _timer = query_timer("update_invoice");
        let items = encode_items(&changes.items)?;
        let sql = format!(
            "UPDATE invoices SET client_id = ?3, project_id = ?4, items = ?5, subtotal = ?6, \
             tax_rate = ?7, tax_amount = ?8, total = ?9, status = ?10, due_date = ?11, \
             notes = ?12, updated_at = ?13 \
             WHERE tenant_id = ?1 AND invoice_id = ?2 \
               AND EXISTS (SELECT 1 FROM clients WHERE client_id = ?3 AND tenant_id = ?1) \
               AND (?4 IS NULL \
                    OR EXISTS (SELECT 1 FROM projects WHERE project_id = ?4 AND tenant_id = ?1)) \
             RETURNING {INVOICE_COLUMNS}"
        );
        sqlx::query_as::<_, Invoice>(&sql)
            .bind(tenant_id)
            .bind(invoice_id)
            .bind(changes.client_id)
            .bind(changes.project_id)
            .bind(items)
            .bind(changes.totals.subtotal)
            .bind(changes.tax_rate)
            .bind(changes.totals.tax_amount)
            .bind(changes.totals.total)
            .bind(changes.status.as_str())
            .bind(changes.due_date)
            .bind(changes.notes.as_deref())
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to update invoice"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    async fn update_invoice_status(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Option<Invoice>, AppError> {
        let _timer = query_timer("update_invoice_status");
        let sql = format!(
            "UPDATE invoices SET status = ?3, updated_at = ?4 \
             WHERE tenant_id = ?1 AND invoice_id = ?2 RETURNING {INVOICE_COLUMNS}"
        );
        sqlx::query_as::<_, Invoice>(&sql)
            .bind(tenant_id)
            .bind(invoice_id)
            .bind(status.as_str())
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to update invoice status"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    async fn delete_invoice(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<bool, AppError> {
        let _timer = query_timer("delete_invoice");
        let result = sqlx::query("DELETE FROM invoices WHERE tenant_id = ?1 AND invoice_id = ?2")
            .bind(tenant_id)
            .bind(invoice_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to delete invoice"))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn invoice_stats(&self, tenant_id: Uuid) -> Result<InvoiceStats, AppError> {
        let _timer = query_timer("invoice_stats");
        let (total, paid, paid_amount, pending, pending_amount, overdue, overdue_amount) =
            sqlx::query_as::<_, (i64, i64, f64, i64, f64, i64, f64)>(
                r#"
                SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'paid' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'paid' THEN total ELSE 0.0 END), 0.0),
                    COALESCE(SUM(CASE WHEN status IN ('draft', 'sent') THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status IN ('draft', 'sent') THEN total ELSE 0.0 END), 0.0),
                    COALESCE(SUM(CASE WHEN status = 'overdue' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'overdue' THEN total ELSE 0.0 END), 0.0)
                FROM invoices
                WHERE tenant_id = ?1
                "#,
            )
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to compute invoice stats"))?;

        Ok(InvoiceStats {
            total,
            paid,
            paid_amount,
            pending,
            pending_amount,
            overdue,
            overdue_amount,
        })
    }

    // -------------------------------------------------------------------------
    // Time logs
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_time_logs(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TimeLog>, AppError> {
        let _timer = query_timer("list_time_logs");
        let sql = format!(
            "SELECT {TIME_LOG_COLUMNS} FROM time_logs WHERE tenant_id = ?1 \
             ORDER BY start_time DESC LIMIT ?2 OFFSET ?3"
        );
        sqlx::query_as::<_, TimeLog>(&sql)
            .bind(tenant_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to list time logs"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn count_time_logs(&self, tenant_id: Uuid) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM time_logs WHERE tenant_id = ?1")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to count time logs"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, project_id = %project_id))]
    async fn list_time_logs_by_project(
        &self,
        tenant_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<TimeLog>, AppError> {
        let _timer = query_timer("list_time_logs_by_project");
        let sql = format!(
            "SELECT {TIME_LOG_COLUMNS} FROM time_logs WHERE tenant_id = ?1 AND project_id = ?2 \
             ORDER BY start_time DESC"
        );
        sqlx::query_as::<_, TimeLog>(&sql)
            .bind(tenant_id)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to list project time logs"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, time_log_id = %time_log_id))]
    async fn get_time_log(
        &self,
        tenant_id: Uuid,
        time_log_id: Uuid,
    ) -> Result<Option<TimeLog>, AppError> {
        let _timer = query_timer("get_time_log");
        let sql = format!(
            "SELECT {TIME_LOG_COLUMNS} FROM time_logs WHERE tenant_id = ?1 AND time_log_id = ?2"
        );
        sqlx::query_as::<_, TimeLog>(&sql)
            .bind(tenant_id)
            .bind(time_log_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to get time log"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn active_time_log(&self, tenant_id: Uuid) -> Result<Option<TimeLog>, AppError> {
        let _timer = query_timer("active_time_log");
        let sql = format!(
            "SELECT {TIME_LOG_COLUMNS} FROM time_logs WHERE tenant_id = ?1 AND end_time IS NULL \
             ORDER BY start_time DESC LIMIT 1"
        );
        sqlx::query_as::<_, TimeLog>(&sql)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to get active time log"))
    }

    #[instrument(skip(self, fields), fields(tenant_id = %tenant_id))]
    async fn create_time_log(
        &self,
        tenant_id: Uuid,
        fields: &TimeLogFields,
    ) -> Result<TimeLog, AppError> {
        let _timer = query_timer("create_time_log");
        let sql = format!(
            "INSERT INTO time_logs ({TIME_LOG_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) RETURNING {TIME_LOG_COLUMNS}"
        );
        sqlx::query_as::<_, TimeLog>(&sql)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(fields.project_id)
            .bind(fields.description.as_deref())
            .bind(fields.start_time)
            .bind(fields.end_time)
            .bind(fields.duration)
            .bind(fields.billable)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to create time log"))
    }

    #[instrument(skip(self, fields), fields(tenant_id = %tenant_id, time_log_id = %time_log_id))]
    async fn update_time_log(
        &self,
        tenant_id: Uuid,
        time_log_id: Uuid,
        fields: &TimeLogFields,
    ) -> Result<Option<TimeLog>, AppError> {
        let _timer = query_timer("update_time_log");
        let sql = format!(
            "UPDATE time_logs SET project_id = ?3, description = ?4, start_time = ?5, \
             end_time = ?6, duration = ?7, billable = ?8, updated_at = ?9 \
             WHERE tenant_id = ?1 AND time_log_id = ?2 RETURNING {TIME_LOG_COLUMNS}"
        );
        sqlx::query_as::<_, TimeLog>(&sql)
            .bind(tenant_id)
            .bind(time_log_id)
            .bind(fields.project_id)
            .bind(fields.description.as_deref())
            .bind(fields.start_time)
            .bind(fields.end_time)
            .bind(fields.duration)
            .bind(fields.billable)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to update time log"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, time_log_id = %time_log_id))]
    async fn delete_time_log(
        &self,
        tenant_id: Uuid,
        time_log_id: Uuid,
    ) -> Result<bool, AppError> {
        let _timer = query_timer("delete_time_log");
        let result =
            sqlx::query("DELETE FROM time_logs WHERE tenant_id = ?1 AND time_log_id = ?2")
                .bind(tenant_id)
                .bind(time_log_id)
                .execute(&self.pool)
                .await
                .map_err(|e| map_write_error(e, "Failed to delete time log"))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn time_log_stats(
        &self,
        tenant_id: Uuid,
        week_start: DateTime<Utc>,
    ) -> Result<TimeLogStats, AppError> {
        let _timer = query_timer("time_log_stats");
        let (total, this_week, billable) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                COALESCE(SUM(duration), 0),
                COALESCE(SUM(CASE WHEN start_time >= ?2 THEN duration ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN billable THEN duration ELSE 0 END), 0)
            FROM time_logs
            WHERE tenant_id = ?1
            "#,
        )
        .bind(tenant_id)
        .bind(week_start)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_read_error(e, "Failed to compute time log stats"))?;

        Ok(TimeLogStats {
            total,
            this_week,
            billable,
        })
    }

    // -------------------------------------------------------------------------
    // Recurring templates
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_recurring_invoices(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<RecurringInvoice>, AppError> {
        let _timer = query_timer("list_recurring_invoices");
        let sql = format!(
            "SELECT {RECURRING_COLUMNS} FROM recurring_invoices WHERE tenant_id = ?1 \
             ORDER BY next_invoice_date ASC, created_at ASC"
        );
        sqlx::query_as::<_, RecurringInvoice>(&sql)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_read_error(e, "Failed to list recurring invoices"))
    }

    #[instrument(skip(self, fields), fields(tenant_id = %tenant_id))]
    async fn create_recurring_invoice(
        &self,
        tenant_id: Uuid,
        fields: &RecurringInvoiceFields,
    ) -> Result<RecurringInvoice, AppError> {
        let _timer = query_timer("create_recurring_invoice");
        let items = encode_items(&fields.items)?;
        let sql = format!(
            "INSERT INTO recurring_invoices ({RECURRING_COLUMNS}) \
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11 \
             WHERE EXISTS (SELECT 1 FROM clients WHERE client_id = ?3 AND tenant_id = ?2) \
               AND (?4 IS NULL \
                    OR EXISTS (SELECT 1 FROM projects WHERE project_id = ?4 AND tenant_id = ?2)) \
             RETURNING {RECURRING_COLUMNS}"
        );
        let created = sqlx::query_as::<_, RecurringInvoice>(&sql)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(fields.client_id)
            .bind(fields.project_id)
            .bind(items)
            .bind(fields.tax_rate)
            .bind(fields.frequency.as_str())
            .bind(fields.next_invoice_date)
            .bind(fields.status.as_str())
            .bind(fields.notes.as_deref())
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to create recurring invoice"))?;

        let created = created.ok_or_else(missing_client_or_project)?;
        info!(recurring_invoice_id = %created.recurring_invoice_id, "Recurring invoice created");
        Ok(created)
    }

    #[instrument(skip(self, fields), fields(tenant_id = %tenant_id, recurring_invoice_id = %recurring_invoice_id))]
    async fn update_recurring_invoice(
        &self,
        tenant_id: Uuid,
        recurring_invoice_id: Uuid,
        fields: &RecurringInvoiceFields,
    ) -> Result<Option<RecurringInvoice>, AppError> {
        let _timer = query_timer("update_recurring_invoice");
        let items = encode_items(&fields.items)?;
        let sql = format!(
            "UPDATE recurring_invoices SET client_id = ?3, project_id = ?4, items = ?5, \
             tax_rate = ?6, frequency = ?7, next_invoice_date = ?8, status = ?9, notes = ?10, \
             updated_at = ?11 \
             WHERE tenant_id = ?1 AND recurring_invoice_id = ?2 \
               AND EXISTS (SELECT 1 FROM clients WHERE client_id = ?3 AND tenant_id = ?1) \
               AND (?4 IS NULL \
                    OR EXISTS (SELECT 1 FROM projects WHERE project_id = ?4 AND tenant_id = ?1)) \
             RETURNING {RECURRING_COLUMNS}"
        );
        sqlx::query_as::<_, RecurringInvoice>(&sql)
            .bind(tenant_id)
            .bind(recurring_invoice_id)
            .bind(fields.client_id)
            .bind(fields.project_id)
            .bind(items)
            .bind(fields.tax_rate)
            .bind(fields.frequency.as_str())
            .bind(fields.next_invoice_date)
            .bind(fields.status.as_str())
            .bind(fields.notes.as_deref())
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to update recurring invoice"))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, recurring_invoice_id = %recurring_invoice_id))]
    async fn delete_recurring_invoice(
        &self,
        tenant_id: Uuid,
        recurring_invoice_id: Uuid,
    ) -> Result<bool, AppError> {
        let _timer = query_timer("delete_recurring_invoice");
        let result = sqlx::query(
            "DELETE FROM recurring_invoices WHERE tenant_id = ?1 AND recurring_invoice_id = ?2",
        )
        .bind(tenant_id)
        .bind(recurring_invoice_id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "Failed to delete recurring invoice"))?;
        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Backup
    // -------------------------------------------------------------------------

    #[instrument(skip(self, restore), fields(tenant_id = %tenant_id))]
    async fn restore_backup(
        &self,
        tenant_id: Uuid,
        restore: &TenantRestore,
    ) -> Result<RestoreSummary, AppError> {
        let _timer = query_timer("restore_backup");
        let now = Utc::now();
        let mut summary = RestoreSummary::default();
        let mut ids = RestoreIds::default();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_write_error(e, "Failed to start restore"))?;

        let sql = format!(
            "INSERT INTO clients ({CLIENT_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) ON CONFLICT DO NOTHING"
        );
        for client in &restore.clients {
            let wanted = client.id;
            let Some(id) =
                settle(&mut tx, tenant_id, "clients", "client_id", wanted, &mut ids.clients).await?
            else {
                summary.skipped += 1;
                continue;
            };
            let input = &client.record;
            let written = sqlx::query(&sql)
                .bind(id)
                .bind(tenant_id)
                .bind(&input.name)
                .bind(input.email.as_deref())
                .bind(input.phone.as_deref())
                .bind(input.company.as_deref())
                .bind(input.address.as_deref())
                .bind(input.notes.as_deref())
                .bind(client.created_at.unwrap_or(now))
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_write_error(e, "Failed to restore client"))?
                .rows_affected();
            if written > 0 {
                summary.clients += 1;
            } else {
                summary.skipped += 1;
            }
        }

        let sql = format!(
            "INSERT INTO projects ({PROJECT_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) ON CONFLICT DO NOTHING"
        );
        for project in &restore.projects {
            let input = &project.record;
            let client_id =
                resolve(&mut tx, tenant_id, "clients", "client_id", &ids.clients, input.client_id)
                    .await?;
            let wanted = project.id;
            let Some(id) =
                settle(&mut tx, tenant_id, "projects", "project_id", wanted, &mut ids.projects)
                    .await?
            else {
                summary.skipped += 1;
                continue;
            };
            let written = sqlx::query(&sql)
                .bind(id)
                .bind(tenant_id)
                .bind(client_id)
                .bind(&input.name)
                .bind(input.description.as_deref())
                .bind(input.status.unwrap_or(ProjectStatus::Active).as_str())
                .bind(input.budget)
                .bind(input.deadline)
                .bind(input.progress.unwrap_or(0))
                .bind(project.created_at.unwrap_or(now))
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_write_error(e, "Failed to restore project"))?
                .rows_affected();
            if written > 0 {
                summary.projects += 1;
            } else {
                summary.skipped += 1;
            }
        }

        let sql = format!(
            "INSERT INTO tasks ({TASK_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) ON CONFLICT DO NOTHING"
        );
        for task in &restore.tasks {
            let input = &task.record;
            let project_id = resolve(
                &mut tx,
                tenant_id,
                "projects",
                "project_id",
                &ids.projects,
                input.project_id,
            )
            .await?;
            let Some(id) =
                settle(&mut tx, tenant_id, "tasks", "task_id", task.id, &mut ids.tasks).await?
            else {
                summary.skipped += 1;
                continue;
            };
            let written = sqlx::query(&sql)
                .bind(id)
                .bind(tenant_id)
                .bind(project_id)
                .bind(&input.title)
                .bind(input.description.as_deref())
                .bind(input.status.unwrap_or(TaskStatus::Todo).as_str())
                .bind(input.priority.unwrap_or(TaskPriority::Medium).as_str())
                .bind(input.due_date)
                .bind(task.created_at.unwrap_or(now))
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_write_error(e, "Failed to restore task"))?
                .rows_affected();
            if written > 0 {
                summary.tasks += 1;
            } else {
                summary.skipped += 1;
            }
        }

        let sql = format!(
            "INSERT INTO recurring_invoices ({RECURRING_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) ON CONFLICT DO NOTHING"
        );
        for template in &restore.recurring_invoices {
            let fields = &template.record;
            let client_id = resolve(
                &mut tx,
                tenant_id,
                "clients",
                "client_id",
                &ids.clients,
                Some(fields.client_id),
            )
            .await?;
            let Some(client_id) = client_id else {
                summary.skipped += 1;
                continue;
            };
            let project_id = resolve(
                &mut tx,
                tenant_id,
                "projects",
                "project_id",
                &ids.projects,
                fields.project_id,
            )
            .await?;
            let Some(id) = settle(
                &mut tx,
                tenant_id,
                "recurring_invoices",
                "recurring_invoice_id",
                template.id,
                &mut ids.recurring_invoices,
            )
            .await?
            else {
                summary.skipped += 1;
                continue;
            };
            let written = sqlx::query(&sql)
                .bind(id)
                .bind(tenant_id)
                .bind(client_id)
                .bind(project_id)
                .bind(encode_items(&fields.items)?)
                .bind(fields.tax_rate)
                .bind(fields.frequency.as_str())
                .bind(fields.next_invoice_date)
                .bind(fields.status.as_str())
                .bind(fields.notes.as_deref())
                .bind(template.created_at.unwrap_or(now))
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_write_error(e, "Failed to restore recurring invoice"))?
                .rows_affected();
            if written > 0 {
                summary.recurring_invoices += 1;
            } else {
                summary.skipped += 1;
            }
        }

        let sql = format!(
            "INSERT INTO invoices ({INVOICE_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17) \
             ON CONFLICT DO NOTHING"
        );
        for invoice in &restore.invoices {
            let draft = &invoice.record;
            let client_id = resolve(
                &mut tx,
                tenant_id,
                "clients",
                "client_id",
                &ids.clients,
                Some(draft.client_id),
            )
            .await?;
            let Some(client_id) = client_id else {
                summary.skipped += 1;
                continue;
            };
            let project_id = resolve(
                &mut tx,
                tenant_id,
                "projects",
                "project_id",
                &ids.projects,
                draft.project_id,
            )
            .await?;
            let recurring_invoice_id = resolve(
                &mut tx,
                tenant_id,
                "recurring_invoices",
                "recurring_invoice_id",
                &ids.recurring_invoices,
                draft.recurring_invoice_id,
            )
            .await?;
            let Some(id) = settle(
                &mut tx,
                tenant_id,
                "invoices",
                "invoice_id",
                invoice.id,
                &mut ids.invoices,
            )
            .await?
            else {
                summary.skipped += 1;
                continue;
            };
            let written = sqlx::query(&sql)
                .bind(id)
                .bind(tenant_id)
                .bind(client_id)
                .bind(project_id)
                .bind(&draft.invoice_number)
                .bind(encode_items(&draft.items)?)
                .bind(draft.totals.subtotal)
                .bind(draft.tax_rate)
                .bind(draft.totals.tax_amount)
                .bind(draft.totals.total)
                .bind(draft.status.as_str())
                .bind(draft.issue_date)
                .bind(draft.due_date)
                .bind(draft.notes.as_deref())
                .bind(recurring_invoice_id)
                .bind(invoice.created_at.unwrap_or(now))
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_write_error(e, "Failed to restore invoice"))?
                .rows_affected();
            // A number the tenant already uses leaves the invoice out.
            if written > 0 {
                summary.invoices += 1;
            } else {
                summary.skipped += 1;
            }
        }

        let sql = format!(
            "INSERT INTO time_logs ({TIME_LOG_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) ON CONFLICT DO NOTHING"
        );
        for log in &restore.time_logs {
            let fields = &log.record;
            let project_id = resolve(
                &mut tx,
                tenant_id,
                "projects",
                "project_id",
                &ids.projects,
                fields.project_id,
            )
            .await?;
            let Some(id) = settle(
                &mut tx,
                tenant_id,
                "time_logs",
                "time_log_id",
                log.id,
                &mut ids.time_logs,
            )
            .await?
            else {
                summary.skipped += 1;
                continue;
            };
            let written = sqlx::query(&sql)
                .bind(id)
                .bind(tenant_id)
                .bind(project_id)
                .bind(fields.description.as_deref())
                .bind(fields.start_time)
                .bind(fields.end_time)
                .bind(fields.duration)
                .bind(fields.billable)
                .bind(log.created_at.unwrap_or(now))
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_write_error(e, "Failed to restore time log"))?
                .rows_affected();
            if written > 0 {
                summary.time_logs += 1;
            } else {
                summary.skipped += 1;
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_write_error(e, "Failed to commit restore"))?;

        info!(
            clients = summary.clients,
            projects = summary.projects,
            tasks = summary.tasks,
            invoices = summary.invoices,
            time_logs = summary.time_logs,
            recurring_invoices = summary.recurring_invoices,
            skipped = summary.skipped,
            "Backup restored"
        );
        Ok(summary)
    }
}
