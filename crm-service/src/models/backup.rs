//! Per-tenant JSON backup and restore.
//!
//! An export carries every record a tenant owns. A restore writes those
//! records back for the restoring tenant: ids the tenant already owns are
//! skipped, ids held by another tenant are replaced with fresh ones, and
//! references between restored records follow the replacements. Creation
//! times are kept, so restored invoices do not move ahead of newer ones in
//! the numbering sequence.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use service_core::error::AppError;
use std::collections::HashMap;
use std::fmt::Display;
use uuid::Uuid;
use validator::Validate;

use super::{
    elapsed_seconds, validate_tax_rate, Client, ClientInput, InvoiceResponse, InvoiceStatus,
    LineItemInput, LineItems, NewInvoice, Project, ProjectInput, RecurringInvoiceFields,
    RecurringInvoiceInput, RecurringInvoiceResponse, Task, TaskInput, TemplateStatus, TimeLog,
    TimeLogFields, TimeLogInput,
};
use crate::services::totals::calculate_totals;

pub const BACKUP_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize)]
pub struct BackupOwner {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupContents {
    pub clients: Vec<Client>,
    pub projects: Vec<Project>,
    pub tasks: Vec<Task>,
    pub invoices: Vec<InvoiceResponse>,
    pub time_logs: Vec<TimeLog>,
    pub recurring_invoices: Vec<RecurringInvoiceResponse>,
}

/// Downloadable export document.
#[derive(Debug, Clone, Serialize)]
pub struct Backup {
    pub version: &'static str,
    pub export_date: DateTime<Utc>,
    pub user: BackupOwner,
    pub data: BackupContents,
}

impl Backup {
    pub fn file_name(&self) -> String {
        format!("crm-backup-{}.json", self.export_date.format("%Y-%m-%d"))
    }
}

/// A record as found in a backup, with the id and creation time it was
/// exported under.
#[derive(Debug, Clone, Deserialize)]
pub struct Restored<T> {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub record: T,
}

/// Invoice as it appears in an export.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceRecord {
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub invoice_number: String,
    pub items: Vec<LineItemInput>,
    pub tax_rate: Option<f64>,
    pub status: Option<InvoiceStatus>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub recurring_invoice_id: Option<Uuid>,
}

/// Uploaded backup data, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RestoreRequest {
    pub clients: Vec<Restored<ClientInput>>,
    #[serde(default)]
    pub projects: Vec<Restored<ProjectInput>>,
    #[serde(default)]
    pub tasks: Vec<Restored<TaskInput>>,
    #[serde(default)]
    pub invoices: Vec<Restored<InvoiceRecord>>,
    #[serde(default, alias = "timelogs")]
    pub time_logs: Vec<Restored<TimeLogInput>>,
    #[serde(default)]
    pub recurring_invoices: Vec<Restored<RecurringInvoiceInput>>,
}

/// Validated records, ready to be written for one tenant.
///
/// Invoices carry the restoring tenant's id; their numbers are kept as
/// exported.
#[derive(Debug, Clone)]
pub struct TenantRestore {
    pub clients: Vec<Restored<ClientInput>>,
    pub projects: Vec<Restored<ProjectInput>>,
    pub tasks: Vec<Restored<TaskInput>>,
    pub recurring_invoices: Vec<Restored<RecurringInvoiceFields>>,
    pub invoices: Vec<Restored<NewInvoice>>,
    pub time_logs: Vec<Restored<TimeLogFields>>,
}

fn invalid(section: &str, index: usize, err: impl Display) -> AppError {
    AppError::BadRequest(anyhow::anyhow!(
        "Invalid backup data: {}[{}]: {}",
        section,
        index,
        err
    ))
}

impl RestoreRequest {
    /// Accepts either a full export document or its bare `data` object.
    pub fn from_json(mut body: Value) -> Result<Self, AppError> {
        let data = match body.get_mut("data") {
            Some(data) if data.is_object() => data.take(),
            _ => body,
        };
        serde_json::from_value(data)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid backup data: {}", e)))
    }

    pub fn prepare(self, tenant_id: Uuid, today: NaiveDate) -> Result<TenantRestore, AppError> {
        for (i, client) in self.clients.iter().enumerate() {
            client.record.validate().map_err(|e| invalid("clients", i, e))?;
        }
        for (i, project) in self.projects.iter().enumerate() {
            project.record.validate().map_err(|e| invalid("projects", i, e))?;
        }
        for (i, task) in self.tasks.iter().enumerate() {
            task.record.validate().map_err(|e| invalid("tasks", i, e))?;
        }

        let recurring_invoices = self
            .recurring_invoices
            .into_iter()
            .enumerate()
            .map(|(i, template)| {
                let (id, created_at) = (template.id, template.created_at);
                recurring_fields(template.record)
                    .map(|record| Restored { id, created_at, record })
                    .map_err(|e| invalid("recurring_invoices", i, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let invoices = self
            .invoices
            .into_iter()
            .enumerate()
            .map(|(i, invoice)| {
                let (id, created_at) = (invoice.id, invoice.created_at);
                new_invoice(tenant_id, invoice.record, today)
                    .map(|record| Restored { id, created_at, record })
                    .map_err(|e| invalid("invoices", i, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let time_logs = self
            .time_logs
            .into_iter()
            .enumerate()
            .map(|(i, log)| {
                let (id, created_at) = (log.id, log.created_at);
                time_log_fields(log.record)
                    .map(|record| Restored { id, created_at, record })
                    .map_err(|e| invalid("time_logs", i, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TenantRestore {
            clients: self.clients,
            projects: self.projects,
            tasks: self.tasks,
            recurring_invoices,
            invoices,
            time_logs,
        })
    }
}

fn recurring_fields(input: RecurringInvoiceInput) -> Result<RecurringInvoiceFields, String> {
    let (client_id, raw_items, frequency, next_invoice_date) = match (
        input.client_id,
        input.items.as_deref(),
        input.frequency,
        input.next_invoice_date,
    ) {
        (Some(client_id), Some(items), Some(frequency), Some(date)) => {
            (client_id, items, frequency, date)
        }
        _ => return Err("Client, items, frequency, and next invoice date are required".into()),
    };
    Ok(RecurringInvoiceFields {
        client_id,
        project_id: input.project_id.flatten(),
        items: LineItems::from_inputs(raw_items).map_err(|e| e.to_string())?,
        tax_rate: validate_tax_rate(input.tax_rate).map_err(|e| e.to_string())?,
        frequency,
        next_invoice_date,
        status: input.status.unwrap_or(TemplateStatus::Active),
        notes: input.notes.flatten(),
    })
}

fn new_invoice(
    tenant_id: Uuid,
    record: InvoiceRecord,
    today: NaiveDate,
) -> Result<NewInvoice, String> {
    if record.invoice_number.trim().is_empty() {
        return Err("Invoice number is required".into());
    }
    let items = LineItems::from_inputs(&record.items).map_err(|e| e.to_string())?;
    let tax_rate = validate_tax_rate(record.tax_rate).map_err(|e| e.to_string())?;
    let totals = calculate_totals(items.as_slice(), tax_rate);
    Ok(NewInvoice {
        tenant_id,
        client_id: record.client_id,
        project_id: record.project_id,
        invoice_number: record.invoice_number,
        items,
        tax_rate,
        totals,
        status: record.status.unwrap_or(InvoiceStatus::Draft),
        issue_date: record.issue_date.unwrap_or(today),
        due_date: record.due_date,
        notes: record.notes,
        recurring_invoice_id: record.recurring_invoice_id,
    })
}

fn time_log_fields(input: TimeLogInput) -> Result<TimeLogFields, String> {
    input.validate().map_err(|e| e.to_string())?;
    let start_time = input.start_time.ok_or("Start time is required")?;
    let duration = match (input.duration, input.end_time) {
        (Some(duration), _) => Some(duration),
        (None, Some(end)) => Some(elapsed_seconds(start_time, end)),
        (None, None) => None,
    };
    Ok(TimeLogFields {
        project_id: input.project_id,
        description: input.description,
        start_time,
        end_time: input.end_time,
        duration,
        billable: input.billable.unwrap_or(true),
    })
}

/// Where a restored record lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The tenant already has this record.
    Existing(Uuid),
    /// Write a new row under this id.
    Insert(Uuid),
}

/// Decide a record's placement from the id it was exported under and the
/// tenant currently owning that id, if any.
pub fn place(tenant_id: Uuid, wanted: Option<Uuid>, owner: Option<Uuid>) -> Placement {
    match (wanted, owner) {
        (Some(id), Some(owner)) if owner == tenant_id => Placement::Existing(id),
        (Some(_), Some(_)) | (None, _) => Placement::Insert(Uuid::new_v4()),
        (Some(id), None) => Placement::Insert(id),
    }
}

/// Exported id to stored id, for one kind of record.
#[derive(Debug, Default)]
pub struct IdMap(HashMap<Uuid, Uuid>);

impl IdMap {
    /// Remember where a record went. Returns the stored id, or `None` when
    /// the record already existed.
    pub fn settle(&mut self, wanted: Option<Uuid>, placement: Placement) -> Option<Uuid> {
        let (stored, fresh) = match placement {
            Placement::Existing(id) => (id, None),
            Placement::Insert(id) => (id, Some(id)),
        };
        if let Some(old) = wanted {
            self.0.insert(old, stored);
        }
        fresh
    }

    pub fn get(&self, old: Uuid) -> Option<Uuid> {
        self.0.get(&old).copied()
    }
}

/// Id maps for one restore, per record kind.
#[derive(Debug, Default)]
pub struct RestoreIds {
    pub clients: IdMap,
    pub projects: IdMap,
    pub tasks: IdMap,
    pub recurring_invoices: IdMap,
    pub invoices: IdMap,
    pub time_logs: IdMap,
}

/// Rows written per kind, plus records that were not written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreSummary {
    pub clients: u64,
    pub projects: u64,
    pub tasks: u64,
    pub invoices: u64,
    pub time_logs: u64,
    pub recurring_invoices: u64,
    pub skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn placement_follows_the_current_owner() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let id = Uuid::new_v4();

        assert_eq!(place(me, Some(id), Some(me)), Placement::Existing(id));
        assert_eq!(place(me, Some(id), None), Placement::Insert(id));
        match place(me, Some(id), Some(other)) {
            Placement::Insert(fresh) => assert_ne!(fresh, id),
            p => panic!("unexpected placement {:?}", p),
        }
        assert!(matches!(place(me, None, None), Placement::Insert(_)));
    }

    #[test]
    fn id_map_records_both_outcomes() {
        let mut ids = IdMap::default();
        let (kept, moved, fresh) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        assert_eq!(ids.settle(Some(kept), Placement::Existing(kept)), None);
        assert_eq!(ids.settle(Some(moved), Placement::Insert(fresh)), Some(fresh));

        assert_eq!(ids.get(kept), Some(kept));
        assert_eq!(ids.get(moved), Some(fresh));
        assert_eq!(ids.get(Uuid::new_v4()), None);
    }

    #[test]
    fn accepts_export_document_or_bare_data() {
        let data = json!({ "clients": [{ "name": "Acme" }], "timelogs": [] });
        let bare = RestoreRequest::from_json(data.clone()).unwrap();
        let wrapped = RestoreRequest::from_json(json!({ "version": "1.0", "data": data })).unwrap();
        assert_eq!(bare.clients.len(), 1);
        assert_eq!(wrapped.clients[0].record.name, "Acme");
    }

    #[test]
    fn clients_are_required() {
        let err = RestoreRequest::from_json(json!({ "projects": [] })).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn exported_invoice_totals_are_recomputed() {
        let tenant = Uuid::new_v4();
        let request = RestoreRequest::from_json(json!({
            "clients": [],
            "invoices": [{
                "id": Uuid::new_v4(),
                "client_id": Uuid::new_v4(),
                "invoice_number": "INV-0007",
                "items": [{ "description": "Work", "quantity": 2, "price": 50 }],
                "tax_rate": 10,
                "subtotal": 1,
                "total": 1,
                "status": "paid"
            }]
        }))
        .unwrap();

        let restore = request.prepare(tenant, today()).unwrap();
        let invoice = &restore.invoices[0].record;
        assert_eq!(invoice.tenant_id, tenant);
        assert_eq!(invoice.totals.total, 110.0);
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.issue_date, today());
    }

    #[test]
    fn bad_record_names_its_position() {
        let request = RestoreRequest::from_json(json!({
            "clients": [{ "name": "Acme" }, { "name": "" }]
        }))
        .unwrap();
        let err = request.prepare(Uuid::new_v4(), today()).unwrap_err();
        assert!(err.to_string().contains("clients[1]"));
    }

    #[test]
    fn finished_time_log_gets_a_duration() {
        let request = RestoreRequest::from_json(json!({
            "clients": [],
            "time_logs": [{
                "start_time": "2026-10-01T09:00:00Z",
                "end_time": "2026-10-01T10:30:00Z"
            }]
        }))
        .unwrap();
        let restore = request.prepare(Uuid::new_v4(), today()).unwrap();
        assert_eq!(restore.time_logs[0].record.duration, Some(5400));
        assert!(restore.time_logs[0].record.billable);
    }
}
