//! Test helpers for crm-service integration tests.
//!
//! Every `TestApp` owns a fresh SQLite database in a temporary directory and
//! serves on a random port.

#![allow(dead_code)]

use crm_service::config::{
    CrmConfig, DatabaseConfig, Environment, JwtConfig, RateLimitConfig, RecurringConfig,
};
use crm_service::services::storage::Storage;
use crm_service::services::SqliteStorage;
use crm_service::{AppState, Application};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub mod fake_store;

pub const TEST_PASSWORD: &str = "correct-horse-battery";

pub fn test_config(database_url: &str) -> CrmConfig {
    CrmConfig {
        common: service_core::config::Config {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        environment: Environment::Dev,
        service_name: "crm-service-test".to_string(),
        log_level: "warn".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: database_url.to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: "test-secret-key-that-is-long-enough-for-hs256".to_string(),
            expiry_hours: 1,
        },
        recurring: RecurringConfig {
            enabled: false,
            interval_secs: 3600,
            max_number_attempts: 5,
        },
        rate_limit: RateLimitConfig {
            requests: 10_000,
            auth_requests: 10_000,
            window_seconds: 900,
        },
        allowed_origins: vec![],
        static_dir: None,
        admin: None,
    }
}

/// A tenant registered through the API.
pub struct TestTenant {
    pub id: String,
    pub email: String,
    pub token: String,
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub state: AppState,
    pub storage: Arc<dyn Storage>,
    client: reqwest::Client,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn with a tweaked configuration.
    pub async fn spawn_with(customize: impl FnOnce(&mut CrmConfig)) -> Self {
        let db_dir = TempDir::new().expect("Failed to create temp dir");
        let url = format!("sqlite://{}", db_dir.path().join("crm.sqlite").display());

        let mut config = test_config(&url);
        customize(&mut config);

        let storage: Arc<dyn Storage> = Arc::new(
            SqliteStorage::new(&url, config.database.max_connections)
                .await
                .expect("Failed to open test database"),
        );

        let application = Application::build_with_storage(config, Arc::clone(&storage))
            .await
            .expect("Failed to build application");
        let port = application.port();
        let state = application.state();

        tokio::spawn(application.run_until(std::future::pending::<()>()));

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            port,
            state,
            storage,
            client: reqwest::Client::new(),
            _db_dir: db_dir,
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn register(&self, email: &str) -> TestTenant {
        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "email": email,
                "password": TEST_PASSWORD,
                "name": "Test Owner",
                "company_name": "Test Co"
            }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status(), 201, "registration failed for {}", email);

        let body: Value = response.json().await.expect("Failed to parse response");
        TestTenant {
            id: body["user"]["id"].as_str().unwrap().to_string(),
            email: email.to_string(),
            token: body["token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn patch(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .patch(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Create a client and return its id.
    pub async fn create_client(&self, token: &str, name: &str) -> String {
        let response = self
            .post("/api/clients", token, json!({ "name": name }))
            .await;
        assert_eq!(response.status(), 201);
        let body: Value = response.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn create_project(&self, token: &str, client_id: Option<&str>, name: &str) -> String {
        let response = self
            .post(
                "/api/projects",
                token,
                json!({ "name": name, "client_id": client_id }),
            )
            .await;
        assert_eq!(response.status(), 201);
        let body: Value = response.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }
}

pub fn sample_items() -> Value {
    json!([
        { "description": "Design", "quantity": 2, "price": 50.0 },
        { "description": "Hosting", "quantity": 1, "price": 20.0 }
    ])
}

/// Let the server finish a spawned background step.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
