//! Invoice model for crm-service.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;

use super::line_item::{LineItemInput, LineItems};
use crate::services::totals::Totals;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "sent" => InvoiceStatus::Sent,
            "paid" => InvoiceStatus::Paid,
            "overdue" => InvoiceStatus::Overdue,
            _ => InvoiceStatus::Draft,
        }
    }
}

/// Stored invoice row. `items` is the raw JSON snapshot.
#[derive(Debug, Clone, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub invoice_number: String,
    pub items: String,
    pub subtotal: f64,
    pub tax_rate: f64,
    pub tax_amount: f64,
    pub total: f64,
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub recurring_invoice_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn line_items(&self) -> Result<LineItems, AppError> {
        LineItems::from_stored(&self.items)
            .map_err(|e| e.into_corrupt_row("invoice", self.invoice_id))
    }

    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }
}

/// Invoice as returned to callers, with items decoded.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub invoice_number: String,
    pub items: LineItems,
    pub subtotal: f64,
    pub tax_rate: f64,
    pub tax_amount: f64,
    pub total: f64,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub recurring_invoice_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<Invoice> for InvoiceResponse {
    type Error = AppError;

    fn try_from(invoice: Invoice) -> Result<Self, Self::Error> {
        let items = invoice.line_items()?;
        let status = invoice.status();
        Ok(Self {
            id: invoice.invoice_id,
            tenant_id: invoice.tenant_id,
            client_id: invoice.client_id,
            project_id: invoice.project_id,
            invoice_number: invoice.invoice_number,
            items,
            subtotal: invoice.subtotal,
            tax_rate: invoice.tax_rate,
            tax_amount: invoice.tax_amount,
            total: invoice.total,
            status,
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            notes: invoice.notes,
            recurring_invoice_id: invoice.recurring_invoice_id,
            created_at: invoice.created_at,
            updated_at: invoice.updated_at,
        })
    }
}

/// Everything needed to insert an invoice. The number is set per attempt by
/// the numbering sequencer.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub tenant_id: Uuid,
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub invoice_number: String,
    pub items: LineItems,
    pub tax_rate: f64,
    pub totals: Totals,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub recurring_invoice_id: Option<Uuid>,
}

/// Validated replacement content for an existing invoice.
#[derive(Debug, Clone)]
pub struct InvoiceChanges {
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub items: LineItems,
    pub tax_rate: f64,
    pub totals: Totals,
    pub status: InvoiceStatus,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Create/update body. Fields are optional so that missing ones surface as
/// specific validation messages instead of a generic parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceInput {
    pub client_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub items: Option<Vec<LineItemInput>>,
    pub tax_rate: Option<f64>,
    pub status: Option<InvoiceStatus>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceStatusUpdate {
    pub status: InvoiceStatus,
}

/// Counts and amounts by payment state. Drafts and sent invoices are pending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceStats {
    pub total: i64,
    pub paid: i64,
    pub paid_amount: f64,
    pub pending: i64,
    pub pending_amount: f64,
    pub overdue: i64,
    pub overdue_amount: f64,
}

/// Validate a tax rate percentage.
pub fn validate_tax_rate(rate: Option<f64>) -> Result<f64, AppError> {
    let rate = rate.unwrap_or(0.0);
    if !rate.is_finite() || rate < 0.0 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Tax rate must be a number of 0 or more"
        )));
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_reads_as_draft() {
        assert_eq!(InvoiceStatus::from_string("paid"), InvoiceStatus::Paid);
        assert_eq!(InvoiceStatus::from_string("archived"), InvoiceStatus::Draft);
    }

    #[test]
    fn tax_rate_defaults_to_zero_and_rejects_negative() {
        assert_eq!(validate_tax_rate(None).unwrap(), 0.0);
        assert_eq!(validate_tax_rate(Some(12.5)).unwrap(), 12.5);
        assert!(validate_tax_rate(Some(-1.0)).is_err());
        assert!(validate_tax_rate(Some(f64::INFINITY)).is_err());
    }

    #[test]
    fn response_decodes_items() {
        let now = Utc::now();
        let invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            project_id: None,
            invoice_number: "INV-0001".to_string(),
            items: r#"[{"description":"Hosting","quantity":1,"price":25}]"#.to_string(),
            subtotal: 25.0,
            tax_rate: 0.0,
            tax_amount: 0.0,
            total: 25.0,
            status: "sent".to_string(),
            issue_date: now.date_naive(),
            due_date: None,
            notes: None,
            recurring_invoice_id: None,
            created_at: now,
            updated_at: now,
        };

        let response = InvoiceResponse::try_from(invoice.clone()).unwrap();
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.status, InvoiceStatus::Sent);

        let corrupt = Invoice {
            items: "{}".to_string(),
            ..invoice
        };
        assert!(matches!(
            InvoiceResponse::try_from(corrupt),
            Err(AppError::DatabaseError(_))
        ));
    }
}
