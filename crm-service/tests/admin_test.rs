//! Account administration behind the admin role.

mod common;

use common::{TestApp, TEST_PASSWORD};
use crm_service::config::AdminSeed;
use crm_service::models::Role;
use serde_json::{json, Value};
use uuid::Uuid;

const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "admin-secret-password";

async fn spawn_with_admin() -> TestApp {
    TestApp::spawn_with(|config| {
        config.admin = Some(AdminSeed {
            email: ADMIN_EMAIL.to_string(),
            password: ADMIN_PASSWORD.to_string(),
            name: "Admin".to_string(),
        });
    })
    .await
}

async fn admin_token(app: &TestApp) -> String {
    let response = app
        .client()
        .post(app.url("/api/auth/login"))
        .json(&json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["user"]["role"], "admin");
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn regular_user_is_forbidden() {
    let app = TestApp::spawn().await;
    let tenant = app.register("plain@example.com").await;

    let response = app.get("/api/admin/users", &tenant.token).await;
    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Admin access required");
}

#[tokio::test]
async fn admin_routes_need_a_token() {
    let app = TestApp::spawn().await;

    let response = app
        .client()
        .get(app.url("/api/admin/users"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn seeded_admin_lists_every_account() {
    let app = spawn_with_admin().await;
    let token = admin_token(&app).await;
    app.register("first@example.com").await;
    app.register("second@example.com").await;

    let response = app.get("/api/admin/users", &token).await;
    assert_eq!(response.status(), 200);
    let users: Vec<Value> = response.json().await.unwrap();
    assert_eq!(users.len(), 3);
    assert!(users.iter().all(|u| u.get("password_hash").is_none()));
    let emails: Vec<&str> = users.iter().map(|u| u["email"].as_str().unwrap()).collect();
    assert!(emails.contains(&"first@example.com"));
    assert!(emails.contains(&ADMIN_EMAIL));
}

#[tokio::test]
async fn seeding_promotes_an_existing_account() {
    let app = TestApp::spawn().await;
    let tenant = app.register("promote-me@example.com").await;

    let seed = AdminSeed {
        email: "Promote-Me@example.com".to_string(),
        password: "ignored-password".to_string(),
        name: "Ignored".to_string(),
    };
    let promoted = crm_service::services::accounts::ensure_admin(&*app.storage, &seed)
        .await
        .unwrap();
    assert_eq!(promoted.tenant_id.to_string(), tenant.id);
    assert!(promoted.is_admin());

    // The existing password still works and the role now opens admin routes.
    let response = app.get("/api/admin/users", &tenant.token).await;
    assert_eq!(response.status(), 200);
    let login = app
        .client()
        .post(app.url("/api/auth/login"))
        .json(&json!({ "email": "promote-me@example.com", "password": TEST_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(login.status(), 200);
}

#[tokio::test]
async fn role_changes_take_effect_immediately() {
    let app = spawn_with_admin().await;
    let token = admin_token(&app).await;
    let tenant = app.register("rising@example.com").await;

    let response = app
        .put(
            &format!("/api/admin/users/{}/role", tenant.id),
            &token,
            json!({ "role": "admin" }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["role"], "admin");

    assert_eq!(app.get("/api/admin/users", &tenant.token).await.status(), 200);

    app.put(
        &format!("/api/admin/users/{}/role", tenant.id),
        &token,
        json!({ "role": "user" }),
    )
    .await;
    assert_eq!(app.get("/api/admin/users", &tenant.token).await.status(), 403);
}

#[tokio::test]
async fn unknown_role_is_rejected() {
    let app = spawn_with_admin().await;
    let token = admin_token(&app).await;
    let tenant = app.register("odd-role@example.com").await;

    let response = app
        .put(
            &format!("/api/admin/users/{}/role", tenant.id),
            &token,
            json!({ "role": "owner" }),
        )
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid role");

    let missing = app
        .put(
            &format!("/api/admin/users/{}/role", Uuid::new_v4()),
            &token,
            json!({ "role": "user" }),
        )
        .await;
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn admin_cannot_delete_own_account() {
    let app = spawn_with_admin().await;
    let token = admin_token(&app).await;
    let admin = app
        .storage
        .find_tenant_by_email(ADMIN_EMAIL)
        .await
        .unwrap()
        .unwrap();

    let response = app
        .delete(&format!("/api/admin/users/{}", admin.tenant_id), &token)
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Cannot delete your own account");
}

#[tokio::test]
async fn deleting_a_user_removes_their_records() {
    let app = spawn_with_admin().await;
    let token = admin_token(&app).await;
    let tenant = app.register("leaving@example.com").await;

    // An invoice keeps its client from being deleted on its own.
    let client_id = app.create_client(&tenant.token, "Acme").await;
    let invoice = app
        .post(
            "/api/invoices",
            &tenant.token,
            json!({ "client_id": client_id, "items": common::sample_items() }),
        )
        .await;
    assert_eq!(invoice.status(), 201);
    app.post(
        "/api/recurring-invoices",
        &tenant.token,
        json!({
            "client_id": client_id,
            "items": common::sample_items(),
            "frequency": "monthly",
            "next_invoice_date": "2030-01-01"
        }),
    )
    .await;

    let response = app
        .delete(&format!("/api/admin/users/{}", tenant.id), &token)
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "User deleted successfully");

    let tenant_id: Uuid = tenant.id.parse().unwrap();
    assert!(app.storage.get_tenant(tenant_id).await.unwrap().is_none());
    assert_eq!(app.storage.count_clients(tenant_id).await.unwrap(), 0);
    assert_eq!(app.storage.count_invoices(tenant_id).await.unwrap(), 0);
    assert!(app
        .storage
        .list_recurring_invoices(tenant_id)
        .await
        .unwrap()
        .is_empty());

    let again = app
        .delete(&format!("/api/admin/users/{}", tenant.id), &token)
        .await;
    assert_eq!(again.status(), 404);
}

#[tokio::test]
async fn stored_role_reads_back_as_admin() {
    let app = TestApp::spawn().await;
    let tenant = app.register("direct@example.com").await;
    let tenant_id: Uuid = tenant.id.parse().unwrap();

    let updated = app
        .storage
        .update_tenant_role(tenant_id, Role::Admin)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.role(), Role::Admin);

    let me: Value = app
        .get("/api/auth/me", &tenant.token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(me["role"], "admin");
}
