//! In-memory `BillingStore` with failure injection.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use crm_service::models::{
    Frequency, Invoice, LineItem, LineItems, NewInvoice, RecurringInvoice, TemplateStatus,
};
use crm_service::services::storage::BillingStore;
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    tenants: Vec<Uuid>,
    templates: Vec<RecurringInvoice>,
    invoices: Vec<Invoice>,
    failing_tenants: HashSet<Uuid>,
    failing_advances: HashSet<Uuid>,
    forced_conflicts: u32,
    fail_tenant_listing: bool,
    advances: HashMap<Uuid, usize>,
}

#[derive(Default)]
pub struct FakeStore {
    inner: Mutex<Inner>,
    tenant_listings: AtomicUsize,
}

pub fn sample_line_items() -> LineItems {
    LineItems::new(vec![
        LineItem {
            description: "Design".to_string(),
            quantity: 2.0,
            price: 50.0,
        },
        LineItem {
            description: "Hosting".to_string(),
            quantity: 1.0,
            price: 20.0,
        },
    ])
    .unwrap()
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tenant(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().tenants.push(id);
        id
    }

    pub fn add_template(
        &self,
        tenant_id: Uuid,
        frequency: Frequency,
        next_invoice_date: NaiveDate,
        status: TemplateStatus,
    ) -> Uuid {
        let items = sample_line_items().to_stored().unwrap();
        self.add_raw_template(tenant_id, frequency, next_invoice_date, status, &items)
    }

    /// Template whose stored items are taken verbatim.
    pub fn add_raw_template(
        &self,
        tenant_id: Uuid,
        frequency: Frequency,
        next_invoice_date: NaiveDate,
        status: TemplateStatus,
        items: &str,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.inner.lock().unwrap().templates.push(RecurringInvoice {
            recurring_invoice_id: id,
            tenant_id,
            client_id: Uuid::new_v4(),
            project_id: None,
            items: items.to_string(),
            tax_rate: 10.0,
            frequency: frequency.as_str().to_string(),
            next_invoice_date,
            status: status.as_str().to_string(),
            notes: Some("Monthly retainer".to_string()),
            created_at: now,
            updated_at: now,
        });
        id
    }

    pub fn fail_due_listing_for(&self, tenant_id: Uuid) {
        self.inner.lock().unwrap().failing_tenants.insert(tenant_id);
    }

    pub fn fail_advance_for(&self, template_id: Uuid) {
        self.inner.lock().unwrap().failing_advances.insert(template_id);
    }

    pub fn fail_tenant_listing(&self) {
        self.inner.lock().unwrap().fail_tenant_listing = true;
    }

    /// The next `n` inserts report a number conflict.
    pub fn force_conflicts(&self, n: u32) {
        self.inner.lock().unwrap().forced_conflicts = n;
    }

    pub fn next_date(&self, template_id: Uuid) -> NaiveDate {
        self.inner
            .lock()
            .unwrap()
            .templates
            .iter()
            .find(|t| t.recurring_invoice_id == template_id)
            .map(|t| t.next_invoice_date)
            .unwrap()
    }

    /// Successful `set_next_invoice_date` calls for the template.
    pub fn advances_for(&self, template_id: Uuid) -> usize {
        self.inner
            .lock()
            .unwrap()
            .advances
            .get(&template_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn invoices(&self) -> Vec<Invoice> {
        self.inner.lock().unwrap().invoices.clone()
    }

    pub fn invoices_for(&self, template_id: Uuid) -> Vec<Invoice> {
        self.invoices()
            .into_iter()
            .filter(|i| i.recurring_invoice_id == Some(template_id))
            .collect()
    }

    pub fn tenant_listings(&self) -> usize {
        self.tenant_listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BillingStore for FakeStore {
    async fn list_tenant_ids(&self) -> Result<Vec<Uuid>, AppError> {
        self.tenant_listings.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock().unwrap();
        if inner.fail_tenant_listing {
            return Err(AppError::DatabaseError(anyhow::anyhow!("tenants unavailable")));
        }
        Ok(inner.tenants.clone())
    }

    async fn list_due_recurring_invoices(
        &self,
        tenant_id: Uuid,
        as_of: NaiveDate,
    ) -> Result<Vec<RecurringInvoice>, AppError> {
        let inner = self.inner.lock().unwrap();
        if inner.failing_tenants.contains(&tenant_id) {
            return Err(AppError::DatabaseError(anyhow::anyhow!("connection reset")));
        }
        let mut due: Vec<RecurringInvoice> = inner
            .templates
            .iter()
            .filter(|t| t.tenant_id == tenant_id && t.is_due(as_of))
            .cloned()
            .collect();
        due.sort_by_key(|t| (t.next_invoice_date, t.created_at));
        Ok(due)
    }

    async fn get_recurring_invoice(
        &self,
        tenant_id: Uuid,
        recurring_invoice_id: Uuid,
    ) -> Result<Option<RecurringInvoice>, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .templates
            .iter()
            .find(|t| t.tenant_id == tenant_id && t.recurring_invoice_id == recurring_invoice_id)
            .cloned())
    }

    async fn set_next_invoice_date(
        &self,
        tenant_id: Uuid,
        recurring_invoice_id: Uuid,
        next_invoice_date: NaiveDate,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_advances.contains(&recurring_invoice_id) {
            return Err(AppError::DatabaseError(anyhow::anyhow!("write failed")));
        }
        let template = inner
            .templates
            .iter_mut()
            .find(|t| t.tenant_id == tenant_id && t.recurring_invoice_id == recurring_invoice_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Recurring invoice not found")))?;
        template.next_invoice_date = next_invoice_date;
        *inner.advances.entry(recurring_invoice_id).or_insert(0) += 1;
        Ok(())
    }

    async fn insert_invoice(&self, invoice: &NewInvoice) -> Result<Invoice, AppError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.forced_conflicts > 0 {
            inner.forced_conflicts -= 1;
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice number {} already exists",
                invoice.invoice_number
            )));
        }
        if inner.invoices.iter().any(|i| {
            i.tenant_id == invoice.tenant_id && i.invoice_number == invoice.invoice_number
        }) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice number {} already exists",
                invoice.invoice_number
            )));
        }

        let now = Utc::now();
        let created = Invoice {
            invoice_id: Uuid::new_v4(),
            tenant_id: invoice.tenant_id,
            client_id: invoice.client_id,
            project_id: invoice.project_id,
            invoice_number: invoice.invoice_number.clone(),
            items: invoice.items.to_stored().unwrap(),
            subtotal: invoice.totals.subtotal,
            tax_rate: invoice.tax_rate,
            tax_amount: invoice.totals.tax_amount,
            total: invoice.totals.total,
            status: invoice.status.as_str().to_string(),
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            notes: invoice.notes.clone(),
            recurring_invoice_id: invoice.recurring_invoice_id,
            created_at: now,
            updated_at: now,
        };
        inner.invoices.push(created.clone());
        Ok(created)
    }

    async fn latest_invoice_number(&self, tenant_id: Uuid) -> Result<Option<String>, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .invoices
            .iter()
            .rev()
            .find(|i| i.tenant_id == tenant_id)
            .map(|i| i.invoice_number.clone()))
    }
}
