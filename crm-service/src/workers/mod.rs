mod scheduler;

pub use scheduler::{RecurringInvoiceScheduler, SchedulerHandle};
