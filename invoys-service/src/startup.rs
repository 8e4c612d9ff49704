//! Application startup and lifecycle management.

use crate::config::InvoysConfig;
use crate::handlers::{cron, customer, health, invoice, setting};
use crate::middleware::cron_secret_middleware;
use crate::services::{
    Database, HttpNotifier, InvoiceLifecycleService, InvoiceStore, MemoryStore, MockNotifier,
    Notifier,
};
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<InvoysConfig>,
    pub store: Arc<dyn InvoiceStore>,
    pub lifecycle: Arc<InvoiceLifecycleService>,
}

impl AppState {
    pub fn new(
        config: InvoysConfig,
        store: Arc<dyn InvoiceStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let lifecycle = Arc::new(InvoiceLifecycleService::new(
            store.clone(),
            notifier,
            config.app_base_url.clone(),
            config.product_name.clone(),
        ));
        Self {
            config: Arc::new(config),
            store,
            lifecycle,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/api/customers",
            get(customer::list_customers).post(customer::create_customer),
        )
        .route("/api/customers/:client_id", get(customer::get_customer))
        .route(
            "/api/invoices",
            get(invoice::list_invoices).post(invoice::create_invoice),
        )
        .route(
            "/api/invoices/overdues",
            post(invoice::batch_update_overdues),
        )
        .route(
            "/api/invoices/:invoice_id",
            get(invoice::get_invoice)
                .put(invoice::edit_invoice)
                .delete(invoice::delete_invoice),
        )
        .route(
            "/api/invoices/:invoice_id/status",
            patch(invoice::update_status),
        )
        .route(
            "/api/invoices/:invoice_id/send",
            post(invoice::send_invoice_email),
        )
        .route(
            "/api/settings",
            get(setting::get_settings).put(setting::update_settings),
        );

    let cron_routes = Router::new()
        .route("/api/cron/overdues", post(cron::run_overdue_sweep))
        .route_layer(from_fn_with_state(
            state.config.cron_secret.clone(),
            cron_secret_middleware,
        ));

    let cors = cors_layer(&state.config.app_base_url);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_endpoint))
        .merge(api_routes)
        .merge(cron_routes)
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
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
                    user_id = tracing::field::Empty,
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(cors)
}

/// Only the web app may call the API from a browser.
fn cors_layer(app_base_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-request-id"),
        ]);

    match app_base_url.trim_end_matches('/').parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            tracing::error!(origin = %app_base_url, error = %e, "Invalid CORS origin");
            layer
        }
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: InvoysConfig) -> Result<Self, AppError> {
        let store: Arc<dyn InvoiceStore> = match &config.database {
            Some(database) => {
                let db = Database::new(
                    database.url.expose_secret(),
                    database.max_connections,
                    database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to PostgreSQL: {}", e);
                    e
                })?;
                db.run_migrations().await?;
                Arc::new(db)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-process store; data is not persisted");
                Arc::new(MemoryStore::new())
            }
        };

        let notifier: Arc<dyn Notifier> = if config.notifier.enabled {
            tracing::info!(api_url = %config.notifier.api_url, "HTTP notifier initialized");
            let notifier = HttpNotifier::new(config.notifier.http())
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;
            Arc::new(notifier)
        } else {
            tracing::info!("Notifier disabled, using mock notifier");
            Arc::new(MockNotifier::new(false))
        };

        Self::build_with_state(AppState::new(config, store, notifier)).await
    }

    /// Bind a listener for an already assembled state.
    pub async fn build_with_state(state: AppState) -> Result<Self, AppError> {
        // Port 0 picks a random free port.
        let addr = state.config.common.socket_addr();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let http_port = listener.local_addr()?.port();

        tracing::info!("{} listening on port {}", state.config.service_name, http_port);

        Ok(Self {
            http_port,
            listener,
            router: build_router(state),
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Run the application until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
