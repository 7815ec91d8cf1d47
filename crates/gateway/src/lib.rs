//! HTTP API gateway for docsmith.
//!
//! Exposes the health check and the v1 API: document generation from an
//! uploaded archive, template heading extraction, token estimates and
//! usage reporting.
//!
//! Built on Axum. Runs are serialized per process: the compute device holds
//! one model at a time, so a second upload while a run is in flight gets
//! `503 Service Unavailable` instead of queueing behind it.

pub mod api;
pub mod error;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, extract::State, response::Json, routing::get};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use docsmith_config::AppConfig;
use docsmith_pipeline::DocumentationService;
use docsmith_telemetry::TelemetryEngine;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub service: Arc<DocumentationService>,
    pub config: AppConfig,
    /// Held for the whole of a documentation run.
    pub(crate) device: Arc<Mutex<()>>,
}

impl GatewayState {
    pub fn new(service: Arc<DocumentationService>, config: AppConfig) -> Self {
        Self {
            service,
            config,
            device: Arc::new(Mutex::new(())),
        }
    }

    /// Whether a documentation run currently holds the device.
    pub fn is_busy(&self) -> bool {
        self.device.try_lock().is_err()
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router.
///
/// Layers applied:
/// - CORS from `gateway.allowed_origins` (any origin when empty)
/// - Request body size limit from `gateway.max_upload_bytes`
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let body_limit = state.config.gateway.max_upload_bytes;
    let cors = cors_layer(&state.config.gateway.allowed_origins);

    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .nest("/v1", api::v1_router(state))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Start the gateway HTTP server.
///
/// Builds the provider, telemetry engine and documentation service once and
/// shares them across requests.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = docsmith_providers::build_from_config(&config)?;
    let telemetry = Arc::new(TelemetryEngine::from_config(&config.telemetry));
    let service = Arc::new(DocumentationService::new(provider, &config, telemetry));
    let state = Arc::new(GatewayState::new(service, config));

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// --- Handlers ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub provider: String,
    pub models: Vec<String>,
    pub chat_model: String,
    pub busy: bool,
    pub telemetry: bool,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        provider: state.config.provider.kind.clone(),
        models: state
            .config
            .pipeline
            .models()
            .into_iter()
            .map(String::from)
            .collect(),
        chat_model: state.config.pipeline.chat_model.clone(),
        busy: state.is_busy(),
        telemetry: state.service.telemetry().is_enabled(),
    })
}
