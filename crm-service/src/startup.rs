//! Router assembly and server lifecycle.

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::config::CrmConfig;
use crate::handlers;
use crate::middleware::{admin_middleware, auth_middleware};
use crate::services::accounts::ensure_admin;
use crate::services::storage::{self, Storage};
use crate::services::{JwtService, RecurringInvoiceGenerator, TokenBlacklist};
use crate::workers::RecurringInvoiceScheduler;

/// Body limit for uploaded backups.
const RESTORE_BODY_LIMIT: usize = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: CrmConfig,
    pub storage: Arc<dyn Storage>,
    pub generator: RecurringInvoiceGenerator<dyn Storage>,
    pub jwt: JwtService,
    pub blacklist: TokenBlacklist,
    pub ip_rate_limiter: IpRateLimiter,
    pub auth_rate_limiter: IpRateLimiter,
}

impl AppState {
    pub fn new(config: CrmConfig, storage: Arc<dyn Storage>) -> Result<Self, AppError> {
        let jwt = JwtService::new(&config.jwt).map_err(AppError::ConfigError)?;
        let generator = RecurringInvoiceGenerator::new(Arc::clone(&storage))
            .with_max_number_attempts(config.recurring.max_number_attempts);

        let ip_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.requests,
            config.rate_limit.window_seconds,
        );
        let auth_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.auth_requests,
            config.rate_limit.window_seconds,
        );

        Ok(Self {
            config,
            storage,
            generator,
            jwt,
            blacklist: TokenBlacklist::new(),
            ip_rate_limiter,
            auth_rate_limiter,
        })
    }
}

/// Routes under `/api`. Unknown paths here answer with a JSON 404.
fn api_router(state: &AppState) -> Router<AppState> {
    let public_auth = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route_layer(from_fn_with_state(
            state.auth_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let protected = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/profile", put(handlers::auth::update_profile))
        .route("/auth/password", put(handlers::auth::change_password))
        // Clients
        .route(
            "/clients",
            get(handlers::clients::list_clients).post(handlers::clients::create_client),
        )
        .route("/clients/stats", get(handlers::clients::client_stats))
        .route(
            "/clients/:id",
            get(handlers::clients::get_client)
                .put(handlers::clients::update_client)
                .delete(handlers::clients::delete_client),
        )
        // Projects
        .route(
            "/projects",
            get(handlers::projects::list_projects).post(handlers::projects::create_project),
        )
        .route("/projects/stats", get(handlers::projects::project_stats))
        .route(
            "/projects/:id",
            get(handlers::projects::get_project)
                .put(handlers::projects::update_project)
                .delete(handlers::projects::delete_project),
        )
        // Tasks
        .route(
            "/tasks",
            get(handlers::tasks::list_tasks).post(handlers::tasks::create_task),
        )
        .route("/tasks/stats", get(handlers::tasks::task_stats))
        .route(
            "/tasks/project/:project_id",
            get(handlers::tasks::list_project_tasks),
        )
        .route(
            "/tasks/:id",
            get(handlers::tasks::get_task)
                .put(handlers::tasks::update_task)
                .delete(handlers::tasks::delete_task),
        )
        .route(
            "/tasks/:id/status",
            patch(handlers::tasks::update_task_status),
        )
        // Invoices
        .route(
            "/invoices",
            get(handlers::invoices::list_invoices).post(handlers::invoices::create_invoice),
        )
        .route("/invoices/stats", get(handlers::invoices::invoice_stats))
        .route(
            "/invoices/next-number",
            get(handlers::invoices::next_invoice_number),
        )
        .route(
            "/invoices/:id",
            get(handlers::invoices::get_invoice)
                .put(handlers::invoices::update_invoice)
                .delete(handlers::invoices::delete_invoice),
        )
        .route(
            "/invoices/:id/status",
            patch(handlers::invoices::update_invoice_status),
        )
        // Time logs
        .route(
            "/timelogs",
            get(handlers::timelogs::list_time_logs).post(handlers::timelogs::create_time_log),
        )
        .route("/timelogs/stats", get(handlers::timelogs::time_log_stats))
        .route("/timelogs/active", get(handlers::timelogs::active_time_log))
        .route("/timelogs/start", post(handlers::timelogs::start_timer))
        .route("/timelogs/stop/:id", post(handlers::timelogs::stop_timer))
        .route(
            "/timelogs/project/:project_id",
            get(handlers::timelogs::list_project_time_logs),
        )
        .route(
            "/timelogs/:id",
            put(handlers::timelogs::update_time_log)
                .delete(handlers::timelogs::delete_time_log),
        )
        // Recurring invoices
        .route(
            "/recurring-invoices",
            get(handlers::recurring::list_recurring_invoices)
                .post(handlers::recurring::create_recurring_invoice),
        )
        .route(
            "/recurring-invoices/due",
            get(handlers::recurring::list_due_recurring_invoices),
        )
        .route(
            "/recurring-invoices/:id",
            get(handlers::recurring::get_recurring_invoice)
                .put(handlers::recurring::update_recurring_invoice)
                .delete(handlers::recurring::delete_recurring_invoice),
        )
        .route(
            "/recurring-invoices/:id/generate",
            post(handlers::recurring::generate_invoice),
        )
        // Backup
        .route("/backup", get(handlers::backup::export_backup))
        .route(
            "/restore",
            post(handlers::backup::restore_backup)
                .layer(DefaultBodyLimit::max(RESTORE_BODY_LIMIT)),
        )
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    // The last route layer runs first: token, then role.
    let admin = Router::new()
        .route("/admin/users", get(handlers::admin::list_users))
        .route("/admin/users/:id/role", put(handlers::admin::update_user_role))
        .route("/admin/users/:id", delete(handlers::admin::delete_user))
        .route_layer(from_fn_with_state(state.clone(), admin_middleware))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(handlers::health::api_health))
        .merge(public_auth)
        .merge(protected)
        .merge(admin)
        .fallback(handlers::health::api_not_found)
}

fn cors_layer(config: &CrmConfig) -> CorsLayer {
    let origins = if config.allowed_origins.is_empty()
        || config.allowed_origins.iter().any(|o| o == "*")
    {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(config.allowed_origins.iter().filter_map(|o| {
            o.parse::<HeaderValue>()
                .map_err(|e| tracing::error!("Invalid CORS origin '{}': {}", o, e))
                .ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn build_router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::health::metrics_endpoint))
        .nest("/api", api_router(&state));

    // Single-page frontend: unknown non-API paths fall back to index.html.
    if let Some(dir) = state.config.static_dir.as_deref() {
        let index = Path::new(dir).join("index.html");
        app = app.fallback_service(ServeDir::new(dir).not_found_service(ServeFile::new(index)));
    }

    app.with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config))
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Connect the storage backend named by `DATABASE_URL` and bind.
    pub async fn build(config: CrmConfig) -> Result<Self, AppError> {
        let storage = storage::connect(&config.database).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize storage");
            e
        })?;
        tracing::info!(backend = storage.backend_name(), "Storage initialized");
        Self::build_with_storage(config, storage).await
    }

    pub async fn build_with_storage(
        config: CrmConfig,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, AppError> {
        if let Some(seed) = &config.admin {
            ensure_admin(&*storage, seed).await?;
        }
        let state = AppState::new(config, storage)?;

        // Port 0 = random port for testing
        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub async fn run_until_stopped(self) -> Result<(), AppError> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then stop the scheduler.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let recurring = &self.state.config.recurring;
        let scheduler = if recurring.enabled {
            Some(
                RecurringInvoiceScheduler::new(
                    self.state.generator.clone(),
                    Duration::from_secs(recurring.interval_secs),
                )
                .start(),
            )
        } else {
            tracing::info!("Recurring invoice scheduler disabled by configuration");
            None
        };

        tracing::info!(port = self.port, "Listening");

        let router = build_router(self.state);
        let served = axum::serve(
            self.listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }

        served.map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            AppError::from(e)
        })?;

        tracing::info!("Service shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
