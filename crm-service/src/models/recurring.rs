//! Recurring invoice templates.

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;

use super::line_item::{LineItemInput, LineItems};

/// Billing cadence of a template.
///
/// Parsing never fails: any value that is not one of the five known names is
/// read as [`Frequency::Monthly`]. Stored rows with a stray value therefore
/// keep billing monthly instead of dropping out of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Biweekly,
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Yearly => "yearly",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" => Frequency::Weekly,
            "biweekly" => Frequency::Biweekly,
            "quarterly" => Frequency::Quarterly,
            "yearly" => Frequency::Yearly,
            _ => Frequency::Monthly,
        }
    }

    /// Next due date: the offset is added to `today`, not to the previous due
    /// date, so a template that fell behind skips the missed periods.
    ///
    /// Month arithmetic clamps to the end of the target month
    /// (Jan 31 + 1 month = Feb 28, or Feb 29 in a leap year).
    pub fn advance_from(&self, today: NaiveDate) -> NaiveDate {
        let next = match self {
            Frequency::Weekly => today.checked_add_days(Days::new(7)),
            Frequency::Biweekly => today.checked_add_days(Days::new(14)),
            Frequency::Monthly => today.checked_add_months(Months::new(1)),
            Frequency::Quarterly => today.checked_add_months(Months::new(3)),
            Frequency::Yearly => today.checked_add_months(Months::new(12)),
        };
        // Only overflows at the end of chrono's date range.
        next.unwrap_or(NaiveDate::MAX)
    }
}

impl<'de> Deserialize<'de> for Frequency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Frequency::from_string(&raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateStatus {
    Active,
    #[serde(alias = "inactive")]
    Paused,
}

impl TemplateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateStatus::Active => "active",
            TemplateStatus::Paused => "paused",
        }
    }

    /// Only the exact value `active` is eligible for generation.
    pub fn from_string(s: &str) -> Self {
        match s {
            "active" => TemplateStatus::Active,
            _ => TemplateStatus::Paused,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RecurringInvoice {
    pub recurring_invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub items: String,
    pub tax_rate: f64,
    pub frequency: String,
    pub next_invoice_date: NaiveDate,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringInvoice {
    pub fn frequency(&self) -> Frequency {
        Frequency::from_string(&self.frequency)
    }

    pub fn status(&self) -> TemplateStatus {
        TemplateStatus::from_string(&self.status)
    }

    pub fn is_active(&self) -> bool {
        self.status() == TemplateStatus::Active
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.is_active() && self.next_invoice_date <= today
    }

    pub fn line_items(&self) -> Result<LineItems, AppError> {
        LineItems::from_stored(&self.items)
            .map_err(|e| e.into_corrupt_row("recurring invoice", self.recurring_invoice_id))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecurringInvoiceResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub items: LineItems,
    pub tax_rate: f64,
    pub frequency: Frequency,
    pub next_invoice_date: NaiveDate,
    pub status: TemplateStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RecurringInvoice> for RecurringInvoiceResponse {
    type Error = AppError;

    fn try_from(template: RecurringInvoice) -> Result<Self, Self::Error> {
        let items = template.line_items()?;
        Ok(Self {
            id: template.recurring_invoice_id,
            tenant_id: template.tenant_id,
            client_id: template.client_id,
            project_id: template.project_id,
            items,
            tax_rate: template.tax_rate,
            frequency: template.frequency(),
            next_invoice_date: template.next_invoice_date,
            status: template.status(),
            notes: template.notes,
            created_at: template.created_at,
            updated_at: template.updated_at,
        })
    }
}

/// Validated template content, used for both create and replace.
#[derive(Debug, Clone)]
pub struct RecurringInvoiceFields {
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub items: LineItems,
    pub tax_rate: f64,
    pub frequency: Frequency,
    pub next_invoice_date: NaiveDate,
    pub status: TemplateStatus,
    pub notes: Option<String>,
}

/// Create/update body. `project_id` and `notes` distinguish an omitted field
/// (`None`) from an explicit `null` (`Some(None)`), which clears the value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecurringInvoiceInput {
    pub client_id: Option<Uuid>,
    #[serde(default, deserialize_with = "present")]
    pub project_id: Option<Option<Uuid>>,
    pub items: Option<Vec<LineItemInput>>,
    pub tax_rate: Option<f64>,
    pub frequency: Option<Frequency>,
    pub next_invoice_date: Option<NaiveDate>,
    pub status: Option<TemplateStatus>,
    #[serde(default, deserialize_with = "present")]
    pub notes: Option<Option<String>>,
}

/// Marks a field as present, keeping a `null` value as `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
