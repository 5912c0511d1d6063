//! Axum route handlers for the defrag HTTP server.
//!
//! # Routes
//!
//! - `GET  /health`  : Returns `{"status": "ok", "version": "...", "service": "defrag"}`
//! - `POST /dispatch`: Runs a `RequestEnvelope` through the `DispatchRouter`
//! - `GET  /agents`  : Lists the capability registry

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, ConfigError};
use crate::contract::{DispatchRouter, EnvelopeError, ValidationIssue};
use crate::error::DispatchError;
use crate::insight::InsightEngine;
use crate::interfaces::AdapterGateway;
use crate::model::gemini::GeminiModel;
use crate::model::GenerativeModel;
use crate::policy::{LatencyRegime, Regime, RegimeSource, StaticRegime};
use crate::store::{DocumentStore, MemoryStore};
use crate::vector::NoEphemeris;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub router: DispatchRouter,
}

impl AppState {
    pub fn new(router: DispatchRouter) -> Self {
        Self { router }
    }

    /// Wire every component from configuration over an in-memory store.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let model: Option<Arc<dyn GenerativeModel>> = match GeminiModel::from_env(config.gemini_model.clone()) {
            Ok(Some(model)) => {
                tracing::info!("Generative model configured: {}", model.name());
                Some(Arc::new(model))
            }
            Ok(None) => {
                tracing::warn!("GEMINI_API_KEY / GOOGLE_API_KEY not set; deep dive runs offline");
                None
            }
            Err(e) => {
                tracing::warn!("Generative model unavailable: {}", e);
                None
            }
        };
        let engine = InsightEngine::new(model).with_timeout(config.model_timeout());

        let regime_source: Arc<dyn RegimeSource> = match config.latency_threshold_ms {
            Some(ms) => Arc::new(LatencyRegime::new(std::time::Duration::from_millis(ms))),
            None => Arc::new(StaticRegime(Regime::Nominal)),
        };
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());

        let router = DispatchRouter::new(
            config.registry()?,
            AdapterGateway::with_defaults(engine, Arc::new(NoEphemeris)),
            config.regime_table()?,
            regime_source,
            config.tone_gate()?,
            store,
        );
        Ok(Self::new(router))
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/dispatch", post(dispatch_handler))
        .route("/agents", get(agents_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health: liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "defrag",
    }))
}

/// POST /dispatch: governed agent dispatch.
///
/// The body is read raw so that malformed JSON gets the same 400 body as
/// a schema violation.
async fn dispatch_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Rejected unparseable dispatch body: {}", e);
            return DispatchError::Validation(EnvelopeError {
                details: vec![ValidationIssue {
                    code: "invalid_json".into(),
                    path: vec![],
                    message: e.to_string(),
                }],
            })
            .into_response();
        }
    };
    match state.router.dispatch(value).await {
        Ok(outcome) => outcome.into_response(),
        Err(e) => {
            tracing::debug!(status = %e.status_code(), "dispatch rejected: {}", e);
            e.into_response()
        }
    }
}

/// GET /agents: declared capabilities, sorted by name.
async fn agents_handler(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.router.registry();
    Json(serde_json::json!({
        "agentRegistryVersion": registry.version(),
        "agents": registry.list(),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
