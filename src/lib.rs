//! # defrag
//!
//! A relational field engine and the governed dispatch layer around it.
//!
//! A user's state is a 3-D vector (`RESOURCES`, `HARMONY`, `AGENCY`) that
//! maps to one of eight archetypes. The family around the user runs as a
//! force-directed simulation whose stability and entropy drive tiered
//! insights. Every agent call goes through one router that validates the
//! envelope, checks the capability registry, honours the system regime,
//! spends session credits and filters tone.
//!
//! ```text
//!   POST /dispatch
//!        │
//!        ▼
//!   DispatchRouter ── CapabilityRegistry / RegimeTable / SessionService
//!        │
//!        ▼
//!   AdapterGateway ── vector │ simulator │ insight │ schema
//!        │
//!        ▼
//!   ToneGate ── ReplyEnvelope / HoldReply
//! ```

pub mod capabilities;
pub mod config;
pub mod contract;
pub mod diagnostics;
pub mod error;
pub mod insight;
pub mod interfaces;
pub mod model;
pub mod observability;
pub mod policy;
pub mod schema;
pub mod server;
pub mod session;
pub mod simulation;
pub mod store;
pub mod vector;

pub use contract::{DispatchRouter, ReplyEnvelope, RequestEnvelope};
pub use error::DispatchError;
pub use insight::InsightEngine;
pub use simulation::Simulator;
pub use vector::{update_state, UserState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
