//! Per-tenant invoice numbering.
//!
//! Numbers look like `INV-0001`. The next number is derived from the tenant's
//! most recently created invoice, so two concurrent creations can pick the same
//! value; the storage layer's `(tenant_id, invoice_number)` uniqueness
//! constraint rejects the loser, which then re-reads and tries again.

use service_core::error::AppError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Invoice, NewInvoice};
use crate::services::metrics::INVOICE_NUMBER_CONFLICTS_TOTAL;
use crate::services::storage::BillingStore;

pub const INVOICE_NUMBER_PREFIX: &str = "INV-";

/// Attempts made before a creation gives up on number conflicts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Number that follows `last`.
///
/// Only a leading `INV-<digits>` is understood. Anything else, including no
/// previous invoice at all, restarts the sequence at 1. Values wider than four
/// digits are kept as-is (`INV-10000`).
pub fn next_invoice_number(last: Option<&str>) -> String {
    let previous = last.map(parse_sequence).unwrap_or(0);
    format!(
        "{}{:04}",
        INVOICE_NUMBER_PREFIX,
        previous.saturating_add(1)
    )
}

fn parse_sequence(number: &str) -> u64 {
    let Some(rest) = number.strip_prefix(INVOICE_NUMBER_PREFIX) else {
        return 0;
    };
    let digits: &str = rest
        .find(|c: char| !c.is_ascii_digit())
        .map(|end| &rest[..end])
        .unwrap_or(rest);
    digits.parse().unwrap_or(0)
}

/// Compute the next number for the tenant from storage.
pub async fn peek_next_number<S>(store: &S, tenant_id: Uuid) -> Result<String, AppError>
where
    S: BillingStore + ?Sized,
{
    let last = store.latest_invoice_number(tenant_id).await?;
    Ok(next_invoice_number(last.as_deref()))
}

/// Insert `invoice` under a freshly computed number, retrying on uniqueness
/// conflicts up to `max_attempts` times. Any other error is returned at once.
pub async fn create_invoice_with_retry<S>(
    store: &S,
    mut invoice: NewInvoice,
    max_attempts: u32,
) -> Result<Invoice, AppError>
where
    S: BillingStore + ?Sized,
{
    let max_attempts = max_attempts.max(1);

    for attempt in 1..=max_attempts {
        invoice.invoice_number = peek_next_number(store, invoice.tenant_id).await?;

        match store.insert_invoice(&invoice).await {
            Ok(created) => {
                debug!(
                    tenant_id = %invoice.tenant_id,
                    invoice_number = %created.invoice_number,
                    attempt = attempt,
                    "Invoice number assigned"
                );
                return Ok(created);
            }
            Err(AppError::Conflict(e)) => {
                warn!(
                    tenant_id = %invoice.tenant_id,
                    invoice_number = %invoice.invoice_number,
                    attempt = attempt,
                    error = %e,
                    "Invoice number already taken, retrying"
                );
                INVOICE_NUMBER_CONFLICTS_TOTAL
                    .with_label_values(&["retried"])
                    .inc();
            }
            Err(e) => return Err(e),
        }
    }

    INVOICE_NUMBER_CONFLICTS_TOTAL
        .with_label_values(&["exhausted"])
        .inc();
    Err(AppError::Conflict(anyhow::anyhow!(
        "Could not assign a unique invoice number after {} attempts",
        max_attempts
    )))
}
