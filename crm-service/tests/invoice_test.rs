//! Invoice endpoints: numbering, totals, updates and statistics.

mod common;

use common::{sample_items, TestApp};
use serde_json::{json, Value};

#[tokio::test]
async fn create_invoice_assigns_number_and_totals() {
    let app = TestApp::spawn().await;
    let tenant = app.register("invoices@example.com").await;
    let client_id = app.create_client(&tenant.token, "Acme").await;

    let response = app
        .post(
            "/api/invoices",
            &tenant.token,
            json!({
                "client_id": client_id,
                "items": sample_items(),
                "tax_rate": 10.0,
                "due_date": "2026-11-30",
                "notes": "Thanks"
            }),
        )
        .await;

    assert_eq!(response.status(), 201);
    let invoice: Value = response.json().await.unwrap();
    assert_eq!(invoice["invoice_number"], "INV-0001");
    assert_eq!(invoice["status"], "draft");
    assert_eq!(invoice["subtotal"], 120.0);
    assert_eq!(invoice["tax_amount"], 12.0);
    assert_eq!(invoice["total"], 132.0);
    assert_eq!(invoice["items"].as_array().unwrap().len(), 2);
    assert_eq!(invoice["due_date"], "2026-11-30");
    assert!(invoice["recurring_invoice_id"].is_null());
}

#[tokio::test]
async fn numbers_increase_per_tenant() {
    let app = TestApp::spawn().await;
    let first = app.register("first@example.com").await;
    let second = app.register("second@example.com").await;
    let first_client = app.create_client(&first.token, "A").await;
    let second_client = app.create_client(&second.token, "B").await;

    for expected in ["INV-0001", "INV-0002", "INV-0003"] {
        let invoice: Value = app
            .post(
                "/api/invoices",
                &first.token,
                json!({ "client_id": first_client, "items": sample_items() }),
            )
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(invoice["invoice_number"], expected);
    }

    let next: Value = app
        .get("/api/invoices/next-number", &first.token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(next["invoice_number"], "INV-0004");

    let other: Value = app
        .post(
            "/api/invoices",
            &second.token,
            json!({ "client_id": second_client, "items": sample_items() }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(other["invoice_number"], "INV-0001");
}

#[tokio::test]
async fn invoice_requires_client_and_items() {
    let app = TestApp::spawn().await;
    let tenant = app.register("required@example.com").await;
    let client_id = app.create_client(&tenant.token, "Acme").await;

    for body in [
        json!({ "items": sample_items() }),
        json!({ "client_id": client_id }),
        json!({ "client_id": client_id, "items": [] }),
    ] {
        let response = app.post("/api/invoices", &tenant.token, body).await;
        assert_eq!(response.status(), 400);
        let error: Value = response.json().await.unwrap();
        assert_eq!(error["error"], "Client and at least one item are required");
    }
}

#[tokio::test]
async fn incomplete_items_are_rejected_before_writing() {
    let app = TestApp::spawn().await;
    let tenant = app.register("incomplete@example.com").await;
    let client_id = app.create_client(&tenant.token, "Acme").await;

    for items in [
        json!([{ "description": "No price", "quantity": 1 }]),
        json!([{ "description": "No quantity", "price": 10 }]),
        json!([{ "description": "Zero", "quantity": 0, "price": 10 }]),
        json!([{ "description": "Negative", "quantity": 1, "price": -5 }]),
    ] {
        let response = app
            .post(
                "/api/invoices",
                &tenant.token,
                json!({ "client_id": client_id, "items": items }),
            )
            .await;
        assert_eq!(response.status(), 400);
    }

    let negative_tax = app
        .post(
            "/api/invoices",
            &tenant.token,
            json!({ "client_id": client_id, "items": sample_items(), "tax_rate": -1 }),
        )
        .await;
    assert_eq!(negative_tax.status(), 400);

    let list: Value = app.get("/api/invoices", &tenant.token).await.json().await.unwrap();
    assert_eq!(list["pagination"]["total"], 0);
}

#[tokio::test]
async fn invoice_for_unknown_client_is_rejected() {
    let app = TestApp::spawn().await;
    let tenant = app.register("unknown-client@example.com").await;

    let response = app
        .post(
            "/api/invoices",
            &tenant.token,
            json!({ "client_id": uuid::Uuid::new_v4(), "items": sample_items() }),
        )
        .await;

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn update_recomputes_totals_and_keeps_number() {
    let app = TestApp::spawn().await;
    let tenant = app.register("update@example.com").await;
    let client_id = app.create_client(&tenant.token, "Acme").await;
    let created: Value = app
        .post(
            "/api/invoices",
            &tenant.token,
            json!({ "client_id": client_id, "items": sample_items(), "tax_rate": 10 }),
        )
        .await
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();

    let response = app
        .put(
            &format!("/api/invoices/{}", id),
            &tenant.token,
            json!({
                "items": [{ "description": "Retainer", "quantity": 3, "price": 100 }],
                "tax_rate": 20,
                "status": "sent"
            }),
        )
        .await;

    assert_eq!(response.status(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["invoice_number"], "INV-0001");
    assert_eq!(updated["client_id"], client_id.as_str());
    assert_eq!(updated["subtotal"], 300.0);
    assert_eq!(updated["tax_amount"], 60.0);
    assert_eq!(updated["total"], 360.0);
    assert_eq!(updated["status"], "sent");

    let without_items = app
        .put(
            &format!("/api/invoices/{}", id),
            &tenant.token,
            json!({ "tax_rate": 5 }),
        )
        .await;
    assert_eq!(without_items.status(), 400);
}

#[tokio::test]
async fn missing_invoice_is_not_found() {
    let app = TestApp::spawn().await;
    let tenant = app.register("missing@example.com").await;
    let path = format!("/api/invoices/{}", uuid::Uuid::new_v4());

    let response = app.get(&path, &tenant.token).await;
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invoice not found");

    let delete = app.delete(&path, &tenant.token).await;
    assert_eq!(delete.status(), 404);
}

#[tokio::test]
async fn status_patch_and_stats() {
    let app = TestApp::spawn().await;
    let tenant = app.register("stats@example.com").await;
    let client_id = app.create_client(&tenant.token, "Acme").await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let invoice: Value = app
            .post(
                "/api/invoices",
                &tenant.token,
                json!({ "client_id": client_id, "items": sample_items() }),
            )
            .await
            .json()
            .await
            .unwrap();
        ids.push(invoice["id"].as_str().unwrap().to_string());
    }

    for (id, status) in ids.iter().zip(["paid", "sent", "overdue"]) {
        let response = app
            .patch(
                &format!("/api/invoices/{}/status", id),
                &tenant.token,
                json!({ "status": status }),
            )
            .await;
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], status);
    }

    let stats: Value = app
        .get("/api/invoices/stats", &tenant.token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total"], 3);
    assert_eq!(stats["paid"], 1);
    assert_eq!(stats["paid_amount"], 120.0);
    assert_eq!(stats["pending"], 1);
    assert_eq!(stats["pending_amount"], 120.0);
    assert_eq!(stats["overdue"], 1);
    assert_eq!(stats["overdue_amount"], 120.0);
}

#[tokio::test]
async fn delete_invoice() {
    let app = TestApp::spawn().await;
    let tenant = app.register("delete@example.com").await;
    let client_id = app.create_client(&tenant.token, "Acme").await;
    let invoice: Value = app
        .post(
            "/api/invoices",
            &tenant.token,
            json!({ "client_id": client_id, "items": sample_items() }),
        )
        .await
        .json()
        .await
        .unwrap();

    let response = app
        .delete(
            &format!("/api/invoices/{}", invoice["id"].as_str().unwrap()),
            &tenant.token,
        )
        .await;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Invoice deleted successfully");
}
