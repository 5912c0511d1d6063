//! Built-in engine adapters.
//!
//! Each adapter implements `AgentAdapter` for one engine and is bound in
//! the `AdapterGateway` under its registry name.

pub mod insight;
pub mod schema;
pub mod simulator;
pub mod vector;

pub use insight::InsightAdapter;
pub use schema::SchemaAdapter;
pub use simulator::{SimulatorAdapter, SimulatorPool};
pub use vector::VectorAdapter;
