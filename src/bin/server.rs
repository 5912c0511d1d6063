//! defrag HTTP server binary.
//!
//! Starts an axum HTTP server that exposes governed agent dispatch.
//!
//! # Environment Variables
//!
//! - `PORT`: HTTP port (default: 8080)
//! - `DEFRAG_CONFIG`: YAML config file
//! - `DEFRAG_REGISTRY` / `DEFRAG_REGIMES` / `DEFRAG_TONE`: table files
//! - `GEMINI_API_KEY` or `GOOGLE_API_KEY`: enables the deep-dive model
//! - `RUST_LOG`: Tracing filter (default: "info,defrag=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! ```

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use defrag::config::AppConfig;
use defrag::server::{app_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,defrag=debug".into()),
        )
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let state = AppState::from_config(&config).context("failed to build application state")?;

    if config.session_sweep_secs > 0 {
        let router = state.router.clone();
        let every = Duration::from_secs(config.session_sweep_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Err(e) = router.expire_sessions(Utc::now()).await {
                    tracing::warn!("Session sweep failed: {}", e);
                }
            }
        });
    }

    let app = app_router(state);
    let bind_addr = config.bind_addr();

    tracing::info!("defrag server starting on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health  : liveness probe");
    tracing::info!("  POST /dispatch: governed agent dispatch");
    tracing::info!("  GET  /agents  : capability registry");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
