//! Alert Bridge API Server
//!
//! HTTP adapter over the alerting core: Alertmanager webhooks, channel
//! acknowledgments, silences, summaries, and Prometheus metrics.

use alerting::{AlertManager, BridgeConfig, ChannelKind, LogConfig, StorageBackend};
use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use notify::{CancellationToken, Channel, LogChannel};
use serde::Serialize;
use std::sync::Arc;
use storage::{
    AlertRepository, InMemoryAlertRepository, InMemorySilenceRepository, SilenceRepository,
    SqliteStore,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod error;
mod routes;

pub use error::ApiError;

/// Application state shared across handlers
pub struct AppState {
    pub manager: Arc<AlertManager>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
    /// Renders `/metrics`, absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Cancelled on shutdown so pending channel retries stop waiting
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create new application state
    pub fn new(manager: Arc<AlertManager>) -> Self {
        Self {
            manager,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
            metrics: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
    pub channels: Vec<String>,
    pub active_alerts: usize,
}

/// Component status
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub storage: ComponentHealth,
}

/// Individual component health
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route(
            "/api/v1/webhook/alertmanager",
            post(routes::webhook::alertmanager),
        )
        .route("/api/v1/alerts", get(routes::alerts::list_alerts))
        .route("/api/v1/alerts/:id", get(routes::alerts::get_alert))
        .route("/api/v1/alerts/:id/ack", post(routes::alerts::ack_alert))
        .route(
            "/api/v1/channels/:channel/acks",
            post(routes::alerts::channel_ack),
        )
        .route(
            "/api/v1/silences",
            get(routes::silences::list_silences).post(routes::silences::create_silence),
        )
        .route(
            "/api/v1/silences/:id",
            get(routes::silences::get_silence).delete(routes::silences::delete_silence),
        )
        .route("/api/v1/summary", get(routes::summary::get_summary))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let (storage, active_alerts) = match state.manager.query_active(None).await {
        Ok(active) => (
            ComponentHealth {
                status: "ok".to_string(),
                error: None,
            },
            active.len(),
        ),
        Err(e) => {
            warn!("Health check could not reach storage: {}", e);
            (
                ComponentHealth {
                    status: "error".to_string(),
                    error: Some(e.to_string()),
                },
                0,
            )
        }
    };
    let healthy = storage.error.is_none();

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: ComponentStatus { storage },
        channels: state.manager.channel_names(),
        active_alerts,
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

/// Initialize logging. `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("invalid log level '{}'", config.level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!(e))
}

/// Wire repositories, channels, and retry policy from configuration
pub async fn build_manager(config: &BridgeConfig) -> anyhow::Result<AlertManager> {
    let (alerts, silences): (Arc<dyn AlertRepository>, Arc<dyn SilenceRepository>) =
        match config.storage.backend {
            StorageBackend::Memory => (
                Arc::new(InMemoryAlertRepository::new()) as Arc<dyn AlertRepository>,
                Arc::new(InMemorySilenceRepository::new()) as Arc<dyn SilenceRepository>,
            ),
            StorageBackend::Sqlite => {
                let store = Arc::new(
                    SqliteStore::connect(&config.storage.sqlite_url)
                        .await
                        .context("opening SQLite store")?,
                );
                (
                    store.clone() as Arc<dyn AlertRepository>,
                    store as Arc<dyn SilenceRepository>,
                )
            }
        };

    let channels: Vec<Arc<dyn Channel>> = config
        .channels
        .iter()
        .map(|c| match c.kind {
            ChannelKind::Log => Arc::new(LogChannel::new(c.name.clone())) as Arc<dyn Channel>,
        })
        .collect();
    let policy = config.retry.to_policy()?;

    info!(
        "Alert manager using {:?} storage and channels {:?}",
        config.storage.backend,
        config.channels.iter().map(|c| &c.name).collect::<Vec<_>>()
    );
    Ok(AlertManager::new(alerts, silences, channels, policy).with_top_n(config.summary.top_n))
}

/// Run the server until Ctrl-C
pub async fn run_server(config: BridgeConfig) -> anyhow::Result<()> {
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("installing Prometheus recorder")?;
    let manager = Arc::new(build_manager(&config).await?);
    let state = Arc::new(AppState::new(manager).with_metrics(metrics));
    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    info!("Starting API server on {}", config.server.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.server.bind_addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested, cancelling pending notifications");
    token.cancel();
}
