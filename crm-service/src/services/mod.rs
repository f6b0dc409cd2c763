pub mod accounts;
pub mod auth;
pub mod backup;
pub mod metrics;
pub mod numbering;
pub mod recurring;
pub mod storage;
pub mod totals;

pub use auth::{AccessTokenClaims, JwtService, TokenBlacklist};
pub use numbering::{create_invoice_with_retry, next_invoice_number, peek_next_number};
pub use recurring::{RecurringInvoiceGenerator, RunSummary, Trigger};
pub use storage::{BillingStore, PgStorage, SqliteStorage, Storage};
pub use totals::{calculate_totals, Totals};
