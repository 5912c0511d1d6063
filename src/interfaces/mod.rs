//! # Agent Interfaces
//!
//! Every dispatch target is reached through one uniform trait,
//! [`AgentAdapter::invoke`], taking the envelope payload and a
//! [`DispatchContext`] that carries the regime snapshot computed by the
//! router.
//!
//! ## Architecture
//!
//! ```text
//! DispatchRouter
//!   │ registry check passed for targetAgent
//!   ▼
//! AdapterGateway
//!   │ invoke(name, payload, ctx)
//!   ▼
//! AgentAdapter (trait)
//!   ├── VectorAdapter     (vector-dynamics-agent)
//!   ├── SimulatorAdapter  (family-system-agent, per-scope SimulatorPool)
//!   ├── InsightAdapter    (analyst-agent, reads the same pool)
//!   └── SchemaAdapter     (schema-integration-agent)
//! ```

pub mod adapter;
pub mod adapters;
pub mod gateway;

pub use adapter::{AdapterError, AgentAdapter, DispatchContext};
pub use gateway::AdapterGateway;
