//! Domain models for crm-service.

pub mod backup;
pub mod client;
pub mod invoice;
pub mod line_item;
pub mod pagination;
pub mod project;
pub mod recurring;
pub mod task;
pub mod tenant;
pub mod time_log;

pub use backup::{
    place, Backup, BackupContents, BackupOwner, IdMap, Placement, RestoreIds, RestoreRequest,
    RestoreSummary, Restored, TenantRestore, BACKUP_VERSION,
};
pub use client::{Client, ClientInput, ClientStats};
pub use invoice::{
    validate_tax_rate, Invoice, InvoiceChanges, InvoiceInput, InvoiceResponse, InvoiceStats,
    InvoiceStatus, InvoiceStatusUpdate, NewInvoice,
};
pub use line_item::{LineItem, LineItemError, LineItemInput, LineItems};
pub use pagination::{PageParams, Paginated, Pagination};
pub use project::{Project, ProjectInput, ProjectStats, ProjectStatus};
pub use recurring::{
    Frequency, RecurringInvoice, RecurringInvoiceFields, RecurringInvoiceInput,
    RecurringInvoiceResponse, TemplateStatus,
};
pub use task::{Task, TaskInput, TaskPriority, TaskStats, TaskStatus, TaskStatusUpdate};
pub use tenant::{
    ChangePasswordRequest, LoginRequest, NewTenant, RegisterRequest, Role, RoleUpdate, Tenant,
    TenantProfile, UpdateProfileRequest,
};
pub use time_log::{
    elapsed_seconds, StartTimerRequest, TimeLog, TimeLogFields, TimeLogInput, TimeLogStats,
};
