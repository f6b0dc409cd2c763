//! Recurring invoice template endpoints and "generate now".

mod common;

use chrono::{Days, Months, Utc};
use common::{sample_items, TestApp, TestTenant};
use serde_json::{json, Value};

async fn create_template(app: &TestApp, tenant: &TestTenant, body: Value) -> Value {
    let response = app.post("/api/recurring-invoices", &tenant.token, body).await;
    assert_eq!(response.status(), 201);
    response.json().await.unwrap()
}

#[tokio::test]
async fn create_requires_client_items_frequency_and_date() {
    let app = TestApp::spawn().await;
    let tenant = app.register("template-required@example.com").await;
    let client_id = app.create_client(&tenant.token, "Acme").await;

    for body in [
        json!({ "items": sample_items(), "frequency": "monthly", "next_invoice_date": "2026-11-01" }),
        json!({ "client_id": client_id, "frequency": "monthly", "next_invoice_date": "2026-11-01" }),
        json!({ "client_id": client_id, "items": sample_items(), "next_invoice_date": "2026-11-01" }),
        json!({ "client_id": client_id, "items": sample_items(), "frequency": "monthly" }),
    ] {
        let response = app.post("/api/recurring-invoices", &tenant.token, body).await;
        assert_eq!(response.status(), 400);
        let error: Value = response.json().await.unwrap();
        assert_eq!(
            error["error"],
            "Client, items, frequency, and next invoice date are required"
        );
    }
}

#[tokio::test]
async fn template_lifecycle() {
    let app = TestApp::spawn().await;
    let tenant = app.register("templates@example.com").await;
    let client_id = app.create_client(&tenant.token, "Acme").await;

    let template = create_template(
        &app,
        &tenant,
        json!({
            "client_id": client_id,
            "items": sample_items(),
            "tax_rate": 10,
            "frequency": "quarterly",
            "next_invoice_date": "2026-12-01",
            "notes": "Quarterly retainer"
        }),
    )
    .await;
    assert_eq!(template["status"], "active");
    assert_eq!(template["frequency"], "quarterly");
    let path = format!("/api/recurring-invoices/{}", template["id"].as_str().unwrap());

    let fetched: Value = app.get(&path, &tenant.token).await.json().await.unwrap();
    assert_eq!(fetched["notes"], "Quarterly retainer");
    assert_eq!(fetched["items"].as_array().unwrap().len(), 2);

    let paused = app
        .put(&path, &tenant.token, json!({ "status": "paused" }))
        .await;
    assert_eq!(paused.status(), 200);
    let paused: Value = paused.json().await.unwrap();
    assert_eq!(paused["status"], "paused");
    assert_eq!(paused["frequency"], "quarterly");
    assert_eq!(paused["tax_rate"], 10.0);
    assert_eq!(paused["next_invoice_date"], "2026-12-01");

    let list: Value = app
        .get("/api/recurring-invoices", &tenant.token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);

    let deleted = app.delete(&path, &tenant.token).await;
    assert_eq!(deleted.status(), 200);
    let gone = app.get(&path, &tenant.token).await;
    assert_eq!(gone.status(), 404);
    let body: Value = gone.json().await.unwrap();
    assert_eq!(body["error"], "Recurring invoice not found");
}

#[tokio::test]
async fn due_lists_only_active_templates_on_or_before_today() {
    let app = TestApp::spawn().await;
    let tenant = app.register("due@example.com").await;
    let client_id = app.create_client(&tenant.token, "Acme").await;
    let today = Utc::now().date_naive();

    let due = create_template(
        &app,
        &tenant,
        json!({
            "client_id": client_id,
            "items": sample_items(),
            "frequency": "monthly",
            "next_invoice_date": today.to_string()
        }),
    )
    .await;
    create_template(
        &app,
        &tenant,
        json!({
            "client_id": client_id,
            "items": sample_items(),
            "frequency": "monthly",
            "next_invoice_date": (today + Days::new(3)).to_string()
        }),
    )
    .await;
    create_template(
        &app,
        &tenant,
        json!({
            "client_id": client_id,
            "items": sample_items(),
            "frequency": "monthly",
            "next_invoice_date": (today - Days::new(3)).to_string(),
            "status": "paused"
        }),
    )
    .await;

    let listed: Value = app
        .get("/api/recurring-invoices/due", &tenant.token)
        .await
        .json()
        .await
        .unwrap();
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], due["id"]);
}

#[tokio::test]
async fn generate_creates_draft_and_advances_from_today() {
    let app = TestApp::spawn().await;
    let tenant = app.register("generate@example.com").await;
    let client_id = app.create_client(&tenant.token, "Acme").await;
    let today = Utc::now().date_naive();

    let template = create_template(
        &app,
        &tenant,
        json!({
            "client_id": client_id,
            "items": sample_items(),
            "tax_rate": 10,
            "frequency": "monthly",
            "next_invoice_date": "2030-01-01"
        }),
    )
    .await;
    let template_id = template["id"].as_str().unwrap();

    let response = app
        .post(
            &format!("/api/recurring-invoices/{}/generate", template_id),
            &tenant.token,
            json!({}),
        )
        .await;
    assert_eq!(response.status(), 201);
    let invoice: Value = response.json().await.unwrap();
    assert_eq!(invoice["invoice_number"], "INV-0001");
    assert_eq!(invoice["status"], "draft");
    assert_eq!(invoice["total"], 132.0);
    assert_eq!(invoice["recurring_invoice_id"], template_id);
    assert_eq!(invoice["issue_date"], today.to_string());
    assert!(invoice["due_date"].is_null());

    let advanced: Value = app
        .get(
            &format!("/api/recurring-invoices/{}", template_id),
            &tenant.token,
        )
        .await
        .json()
        .await
        .unwrap();
    let expected = today.checked_add_months(Months::new(1)).unwrap();
    assert_eq!(advanced["next_invoice_date"], expected.to_string());
}

#[tokio::test]
async fn generate_rejects_paused_template() {
    let app = TestApp::spawn().await;
    let tenant = app.register("paused@example.com").await;
    let client_id = app.create_client(&tenant.token, "Acme").await;
    let template = create_template(
        &app,
        &tenant,
        json!({
            "client_id": client_id,
            "items": sample_items(),
            "frequency": "weekly",
            "next_invoice_date": "2026-01-01",
            "status": "paused"
        }),
    )
    .await;

    let response = app
        .post(
            &format!(
                "/api/recurring-invoices/{}/generate",
                template["id"].as_str().unwrap()
            ),
            &tenant.token,
            json!({}),
        )
        .await;

    assert_eq!(response.status(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "This recurring invoice is not active");

    let invoices: Value = app.get("/api/invoices", &tenant.token).await.json().await.unwrap();
    assert_eq!(invoices["pagination"]["total"], 0);
}

#[tokio::test]
async fn generate_unknown_template_is_not_found() {
    let app = TestApp::spawn().await;
    let tenant = app.register("nothing@example.com").await;

    let response = app
        .post(
            &format!("/api/recurring-invoices/{}/generate", uuid::Uuid::new_v4()),
            &tenant.token,
            json!({}),
        )
        .await;

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn update_clears_project_and_notes_with_explicit_null() {
    let app = TestApp::spawn().await;
    let tenant = app.register("template-clear@example.com").await;
    let client_id = app.create_client(&tenant.token, "Acme").await;
    let project_id = app
        .create_project(&tenant.token, Some(&client_id), "Support")
        .await;

    let template = create_template(
        &app,
        &tenant,
        json!({
            "client_id": client_id,
            "project_id": project_id,
            "items": sample_items(),
            "frequency": "monthly",
            "next_invoice_date": "2026-12-01",
            "notes": "Support plan"
        }),
    )
    .await;
    let path = format!("/api/recurring-invoices/{}", template["id"].as_str().unwrap());

    // Omitting the fields keeps them.
    let kept: Value = app
        .put(&path, &tenant.token, json!({ "tax_rate": 5 }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(kept["project_id"], project_id.as_str());
    assert_eq!(kept["notes"], "Support plan");

    let cleared = app
        .put(&path, &tenant.token, json!({ "project_id": null, "notes": null }))
        .await;
    assert_eq!(cleared.status(), 200);
    let cleared: Value = cleared.json().await.unwrap();
    assert!(cleared["project_id"].is_null());
    assert!(cleared["notes"].is_null());
    assert_eq!(cleared["tax_rate"], 5.0);

    let fetched: Value = app.get(&path, &tenant.token).await.json().await.unwrap();
    assert!(fetched["project_id"].is_null());
    assert!(fetched["notes"].is_null());
}
