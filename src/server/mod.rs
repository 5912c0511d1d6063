//! HTTP server for governed agent dispatch.
//!
//! # Endpoints
//!
//! - `GET  /health`  : Liveness probe
//! - `POST /dispatch`: Dispatch a request envelope
//! - `GET  /agents`  : List declared agents

pub mod routes;

pub use routes::{app_router, AppState};
