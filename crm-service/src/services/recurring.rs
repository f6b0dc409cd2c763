//! Recurring invoice generation.
//!
//! A batch run walks every tenant, and for each tenant every active template
//! whose next invoice date has arrived, oldest first. Each template is turned
//! into a draft invoice and its next date moves forward by one period counted
//! from the run date. A failing tenant or template is logged and skipped.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::models::{Invoice, InvoiceResponse, InvoiceStatus, NewInvoice, RecurringInvoice};
use crate::services::metrics::{
    ERRORS_TOTAL, INVOICES_CREATED_TOTAL, INVOICE_AMOUNT_TOTAL, RECURRING_RUN_DURATION,
    RECURRING_TEMPLATES_TOTAL,
};
use crate::services::numbering::{create_invoice_with_retry, DEFAULT_MAX_ATTEMPTS};
use crate::services::storage::BillingStore;
use crate::services::totals::calculate_totals;

/// What caused a generation, used as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A tenant pressed "generate now".
    Manual,
    /// The scheduling driver.
    Scheduled,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Manual => "recurring_manual",
            Trigger::Scheduled => "recurring_scheduled",
        }
    }
}

/// Outcome counts of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub tenants: usize,
    pub generated: usize,
    pub failed_templates: usize,
    pub failed_tenants: usize,
}

pub struct RecurringInvoiceGenerator<S: BillingStore + ?Sized> {
    store: Arc<S>,
    max_number_attempts: u32,
}

impl<S: BillingStore + ?Sized> Clone for RecurringInvoiceGenerator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            max_number_attempts: self.max_number_attempts,
        }
    }
}

impl<S: BillingStore + ?Sized> RecurringInvoiceGenerator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            max_number_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_number_attempts(mut self, attempts: u32) -> Self {
        self.max_number_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run the batch for the current UTC date.
    pub async fn run_once(&self) -> RunSummary {
        self.run_once_as_of(Utc::now().date_naive()).await
    }

    /// Run the batch as if today were `today`. Never fails: errors are
    /// counted in the summary and logged with the tenant and template ids.
    #[instrument(skip(self), fields(as_of = %today))]
    pub async fn run_once_as_of(&self, today: NaiveDate) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        let tenant_ids = match self.store.list_tenant_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Failed to enumerate tenants for recurring run");
                ERRORS_TOTAL.with_label_values(&["recurring_run"]).inc();
                return summary;
            }
        };

        for tenant_id in tenant_ids {
            summary.tenants += 1;
            if let Err(e) = self.run_tenant(tenant_id, today, &mut summary).await {
                summary.failed_tenants += 1;
                RECURRING_TEMPLATES_TOTAL
                    .with_label_values(&["tenant_failed"])
                    .inc();
                error!(
                    tenant_id = %tenant_id,
                    error = %e,
                    "Recurring run failed for tenant, continuing with the next one"
                );
            }
        }

        RECURRING_RUN_DURATION
            .with_label_values(&[Trigger::Scheduled.as_str()])
            .observe(started.elapsed().as_secs_f64());

        info!(
            tenants = summary.tenants,
            generated = summary.generated,
            failed_templates = summary.failed_templates,
            failed_tenants = summary.failed_tenants,
            "Recurring invoice run completed"
        );

        summary
    }

    async fn run_tenant(
        &self,
        tenant_id: Uuid,
        today: NaiveDate,
        summary: &mut RunSummary,
    ) -> Result<(), AppError> {
        let due = self
            .store
            .list_due_recurring_invoices(tenant_id, today)
            .await?;

        for template in due {
            match self.materialize(&template, today, Trigger::Scheduled).await {
                Ok(invoice) => {
                    summary.generated += 1;
                    info!(
                        tenant_id = %tenant_id,
                        template_id = %template.recurring_invoice_id,
                        invoice_number = %invoice.invoice_number,
                        "Generated recurring invoice"
                    );
                }
                Err(e) => {
                    summary.failed_templates += 1;
                    RECURRING_TEMPLATES_TOTAL.with_label_values(&["failed"]).inc();
                    error!(
                        tenant_id = %tenant_id,
                        template_id = %template.recurring_invoice_id,
                        error = %e,
                        "Failed to generate recurring invoice, continuing"
                    );
                }
            }
        }

        Ok(())
    }

    /// Generate an invoice from one template now, whatever its next date.
    pub async fn generate_one(
        &self,
        tenant_id: Uuid,
        template_id: Uuid,
    ) -> Result<InvoiceResponse, AppError> {
        self.generate_one_as_of(tenant_id, template_id, Utc::now().date_naive())
            .await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, template_id = %template_id))]
    pub async fn generate_one_as_of(
        &self,
        tenant_id: Uuid,
        template_id: Uuid,
        today: NaiveDate,
    ) -> Result<InvoiceResponse, AppError> {
        let template = self
            .store
            .get_recurring_invoice(tenant_id, template_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Recurring invoice not found")))?;

        if !template.is_active() {
            return Err(AppError::PreconditionFailed(anyhow::anyhow!(
                "This recurring invoice is not active"
            )));
        }

        let invoice = self.materialize(&template, today, Trigger::Manual).await?;
        InvoiceResponse::try_from(invoice)
    }

    /// Create the draft invoice, then advance the template.
    async fn materialize(
        &self,
        template: &RecurringInvoice,
        today: NaiveDate,
        trigger: Trigger,
    ) -> Result<Invoice, AppError> {
        let items = template.line_items()?;
        let totals = calculate_totals(items.as_slice(), template.tax_rate);

        let draft = NewInvoice {
            tenant_id: template.tenant_id,
            client_id: template.client_id,
            project_id: template.project_id,
            invoice_number: String::new(),
            items,
            tax_rate: template.tax_rate,
            totals,
            status: InvoiceStatus::Draft,
            issue_date: today,
            due_date: None,
            notes: template.notes.clone(),
            recurring_invoice_id: Some(template.recurring_invoice_id),
        };

        let invoice =
            create_invoice_with_retry(&*self.store, draft, self.max_number_attempts)
                .await?;

        let next_date = template.frequency().advance_from(today);
        if let Err(e) = self
            .store
            .set_next_invoice_date(template.tenant_id, template.recurring_invoice_id, next_date)
            .await
        {
            warn!(
                tenant_id = %template.tenant_id,
                template_id = %template.recurring_invoice_id,
                invoice_number = %invoice.invoice_number,
                error = %e,
                "Invoice created but the template could not be advanced"
            );
            return Err(e);
        }

        RECURRING_TEMPLATES_TOTAL
            .with_label_values(&["generated"])
            .inc();
        INVOICES_CREATED_TOTAL
            .with_label_values(&[trigger.as_str()])
            .inc();
        INVOICE_AMOUNT_TOTAL
            .with_label_values(&[trigger.as_str()])
            .inc_by(invoice.total);

        Ok(invoice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_labels() {
        assert_eq!(Trigger::Manual.as_str(), "recurring_manual");
        assert_eq!(Trigger::Scheduled.as_str(), "recurring_scheduled");
    }
}
