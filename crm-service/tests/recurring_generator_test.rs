//! Batch and single-template generation against an in-memory store.

mod common;

use chrono::NaiveDate;
use common::fake_store::FakeStore;
use crm_service::models::{Frequency, InvoiceStatus, TemplateStatus};
use crm_service::services::{RecurringInvoiceGenerator, RunSummary};
use service_core::error::AppError;
use std::sync::Arc;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn generator(store: &Arc<FakeStore>) -> RecurringInvoiceGenerator<FakeStore> {
    RecurringInvoiceGenerator::new(Arc::clone(store))
}

#[tokio::test]
async fn due_template_yields_one_draft_and_advances_from_run_date() {
    let store = Arc::new(FakeStore::new());
    let tenant = store.add_tenant();
    let template = store.add_template(
        tenant,
        Frequency::Monthly,
        date(2026, 8, 3),
        TemplateStatus::Active,
    );
    let today = date(2026, 10, 16);

    let summary = generator(&store).run_once_as_of(today).await;

    assert_eq!(
        summary,
        RunSummary {
            tenants: 1,
            generated: 1,
            failed_templates: 0,
            failed_tenants: 0,
        }
    );
    let invoices = store.invoices_for(template);
    assert_eq!(invoices.len(), 1);
    let invoice = &invoices[0];
    assert_eq!(invoice.invoice_number, "INV-0001");
    assert_eq!(invoice.status(), InvoiceStatus::Draft);
    assert_eq!(invoice.issue_date, today);
    assert_eq!(invoice.due_date, None);
    assert_eq!(invoice.subtotal, 120.0);
    assert_eq!(invoice.tax_amount, 12.0);
    assert_eq!(invoice.total, 132.0);
    assert_eq!(invoice.notes.as_deref(), Some("Monthly retainer"));
    assert_eq!(invoice.line_items().unwrap().len(), 2);

    // Missed periods are skipped: the next date counts from the run date.
    assert_eq!(store.next_date(template), date(2026, 11, 16));
}

#[tokio::test]
async fn second_run_on_the_same_day_generates_nothing() {
    let store = Arc::new(FakeStore::new());
    let tenant = store.add_tenant();
    store.add_template(tenant, Frequency::Weekly, date(2026, 10, 16), TemplateStatus::Active);
    let generator = generator(&store);
    let today = date(2026, 10, 16);

    assert_eq!(generator.run_once_as_of(today).await.generated, 1);
    assert_eq!(generator.run_once_as_of(today).await.generated, 0);
    assert_eq!(store.invoices().len(), 1);
}

#[tokio::test]
async fn future_and_paused_templates_are_left_alone() {
    let store = Arc::new(FakeStore::new());
    let tenant = store.add_tenant();
    let future = store.add_template(
        tenant,
        Frequency::Monthly,
        date(2026, 10, 17),
        TemplateStatus::Active,
    );
    let paused = store.add_template(
        tenant,
        Frequency::Monthly,
        date(2026, 1, 1),
        TemplateStatus::Paused,
    );

    let summary = generator(&store)
        .run_once_as_of(date(2026, 10, 16))
        .await;

    assert_eq!(summary.generated, 0);
    assert!(store.invoices().is_empty());
    assert_eq!(store.next_date(future), date(2026, 10, 17));
    assert_eq!(store.next_date(paused), date(2026, 1, 1));
}

#[tokio::test]
async fn each_frequency_advances_by_its_period() {
    let store = Arc::new(FakeStore::new());
    let tenant = store.add_tenant();
    let today = date(2026, 1, 31);
    let cases = [
        (Frequency::Weekly, date(2026, 2, 7)),
        (Frequency::Biweekly, date(2026, 2, 14)),
        (Frequency::Monthly, date(2026, 2, 28)),
        (Frequency::Quarterly, date(2026, 4, 30)),
        (Frequency::Yearly, date(2027, 1, 31)),
    ];
    let templates: Vec<_> = cases
        .iter()
        .map(|(frequency, _)| store.add_template(tenant, *frequency, today, TemplateStatus::Active))
        .collect();

    let summary = generator(&store).run_once_as_of(today).await;

    assert_eq!(summary.generated, 5);
    for (template, (_, expected)) in templates.iter().zip(cases) {
        assert_eq!(store.next_date(*template), expected);
    }
    let mut numbers: Vec<String> = store
        .invoices()
        .into_iter()
        .map(|i| i.invoice_number)
        .collect();
    numbers.sort();
    assert_eq!(
        numbers,
        vec!["INV-0001", "INV-0002", "INV-0003", "INV-0004", "INV-0005"]
    );
}

#[tokio::test]
async fn failing_tenant_does_not_stop_the_others() {
    let store = Arc::new(FakeStore::new());
    let broken = store.add_tenant();
    let healthy = store.add_tenant();
    store.add_template(broken, Frequency::Monthly, date(2026, 10, 1), TemplateStatus::Active);
    let ok = store.add_template(healthy, Frequency::Monthly, date(2026, 10, 1), TemplateStatus::Active);
    store.fail_due_listing_for(broken);

    let summary = generator(&store)
        .run_once_as_of(date(2026, 10, 16))
        .await;

    assert_eq!(summary.tenants, 2);
    assert_eq!(summary.failed_tenants, 1);
    assert_eq!(summary.generated, 1);
    assert_eq!(store.invoices_for(ok).len(), 1);
}

#[tokio::test]
async fn corrupt_template_is_skipped_without_writing() {
    let store = Arc::new(FakeStore::new());
    let tenant = store.add_tenant();
    let corrupt = store.add_raw_template(
        tenant,
        Frequency::Monthly,
        date(2026, 9, 1),
        TemplateStatus::Active,
        r#"[{"description":"No price","quantity":1}]"#,
    );
    let healthy = store.add_template(tenant, Frequency::Monthly, date(2026, 10, 1), TemplateStatus::Active);

    let summary = generator(&store)
        .run_once_as_of(date(2026, 10, 16))
        .await;

    assert_eq!(summary.generated, 1);
    assert_eq!(summary.failed_templates, 1);
    assert!(store.invoices_for(corrupt).is_empty());
    assert_eq!(store.next_date(corrupt), date(2026, 9, 1));
    assert_eq!(store.invoices_for(healthy).len(), 1);
}

#[tokio::test]
async fn number_conflicts_are_retried() {
    let store = Arc::new(FakeStore::new());
    let tenant = store.add_tenant();
    let template = store.add_template(tenant, Frequency::Monthly, date(2026, 10, 1), TemplateStatus::Active);
    store.force_conflicts(3);

    let summary = generator(&store)
        .run_once_as_of(date(2026, 10, 16))
        .await;

    assert_eq!(summary.generated, 1);
    assert_eq!(store.invoices_for(template).len(), 1);
}

#[tokio::test]
async fn exhausted_retries_fail_the_template_and_leave_it_due() {
    let store = Arc::new(FakeStore::new());
    let tenant = store.add_tenant();
    let template = store.add_template(tenant, Frequency::Monthly, date(2026, 10, 1), TemplateStatus::Active);
    store.force_conflicts(10);

    let summary = generator(&store)
        .with_max_number_attempts(2)
        .run_once_as_of(date(2026, 10, 16))
        .await;

    assert_eq!(summary.generated, 0);
    assert_eq!(summary.failed_templates, 1);
    assert!(store.invoices().is_empty());
    assert_eq!(store.next_date(template), date(2026, 10, 1));
}

#[tokio::test]
async fn failed_advance_counts_as_failure_but_keeps_the_invoice() {
    let store = Arc::new(FakeStore::new());
    let tenant = store.add_tenant();
    let template = store.add_template(tenant, Frequency::Monthly, date(2026, 10, 1), TemplateStatus::Active);
    store.fail_advance_for(template);

    let summary = generator(&store)
        .run_once_as_of(date(2026, 10, 16))
        .await;

    assert_eq!(summary.failed_templates, 1);
    assert_eq!(summary.generated, 0);
    assert_eq!(store.invoices_for(template).len(), 1);
    assert_eq!(store.next_date(template), date(2026, 10, 1));
}

#[tokio::test]
async fn tenant_listing_failure_yields_an_empty_summary() {
    let store = Arc::new(FakeStore::new());
    store.add_tenant();
    store.fail_tenant_listing();

    let summary = generator(&store)
        .run_once_as_of(date(2026, 10, 16))
        .await;

    assert_eq!(summary, RunSummary::default());
}

#[tokio::test]
async fn generate_one_ignores_the_due_date() {
    let store = Arc::new(FakeStore::new());
    let tenant = store.add_tenant();
    let template = store.add_template(tenant, Frequency::Quarterly, date(2027, 6, 1), TemplateStatus::Active);
    let today = date(2026, 10, 16);

    let invoice = generator(&store)
        .generate_one_as_of(tenant, template, today)
        .await
        .unwrap();

    assert_eq!(invoice.recurring_invoice_id, Some(template));
    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.total, 132.0);
    assert_eq!(store.next_date(template), date(2027, 1, 16));
}

#[tokio::test]
async fn generate_one_rejects_inactive_and_foreign_templates() {
    let store = Arc::new(FakeStore::new());
    let tenant = store.add_tenant();
    let other = store.add_tenant();
    let paused = store.add_template(tenant, Frequency::Monthly, date(2026, 1, 1), TemplateStatus::Paused);
    let generator = generator(&store);
    let today = date(2026, 10, 16);

    let err = generator
        .generate_one_as_of(tenant, paused, today)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PreconditionFailed(_)));
    assert_eq!(err.status_code(), 422);

    let err = generator
        .generate_one_as_of(other, paused, today)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    assert!(store.invoices().is_empty());
}

#[tokio::test]
async fn generate_one_twice_yields_two_numbered_drafts() {
    let store = Arc::new(FakeStore::new());
    let tenant = store.add_tenant();
    let template = store.add_template(tenant, Frequency::Monthly, date(2026, 12, 1), TemplateStatus::Active);
    let generator = generator(&store);
    let today = date(2026, 10, 16);

    let first = generator
        .generate_one_as_of(tenant, template, today)
        .await
        .unwrap();
    assert_eq!(store.advances_for(template), 1);

    let second = generator
        .generate_one_as_of(tenant, template, today)
        .await
        .unwrap();
    assert_eq!(store.advances_for(template), 2);

    assert_eq!(first.invoice_number, "INV-0001");
    assert_eq!(second.invoice_number, "INV-0002");
    assert_ne!(first.id, second.id);
    assert_eq!(first.status, InvoiceStatus::Draft);
    assert_eq!(second.status, InvoiceStatus::Draft);
    assert_eq!(store.invoices_for(template).len(), 2);
    // Both calls count from the same day, so the second lands on the same date.
    assert_eq!(store.next_date(template), date(2026, 11, 16));
}

#[tokio::test]
async fn each_tenant_numbers_its_own_invoices() {
    let store = Arc::new(FakeStore::new());
    let first_tenant = store.add_tenant();
    let second_tenant = store.add_tenant();
    let first = store.add_template(first_tenant, Frequency::Monthly, date(2026, 10, 1), TemplateStatus::Active);
    let second = store.add_template(second_tenant, Frequency::Weekly, date(2026, 10, 10), TemplateStatus::Active);

    let summary = generator(&store).run_once_as_of(date(2026, 10, 16)).await;

    assert_eq!(
        summary,
        RunSummary {
            tenants: 2,
            generated: 2,
            failed_templates: 0,
            failed_tenants: 0,
        }
    );
    let first_invoices = store.invoices_for(first);
    let second_invoices = store.invoices_for(second);
    assert_eq!(first_invoices.len(), 1);
    assert_eq!(second_invoices.len(), 1);
    assert_eq!(first_invoices[0].tenant_id, first_tenant);
    assert_eq!(second_invoices[0].tenant_id, second_tenant);
    assert_eq!(first_invoices[0].invoice_number, "INV-0001");
    assert_eq!(second_invoices[0].invoice_number, "INV-0001");
    assert_eq!(store.advances_for(first), 1);
    assert_eq!(store.advances_for(second), 1);
}
