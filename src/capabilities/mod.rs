//! # Capability Registry
//!
//! Declares which agents the router may dispatch to and the contract each
//! one carries. A `targetAgent` that is not declared here is rejected with
//! 403 before any regime or entitlement work happens.
//!
//! ## Resolution Flow
//!
//! 1. Envelope names `targetAgent: analyst-agent`
//! 2. `CapabilityRegistry::resolve("analyst-agent")` returns the `AgentCapability`
//! 3. `timeoutMs` bounds the adapter call
//! 4. `forbiddenOutputs` keys are stripped from the result

pub mod capability;
pub mod registry;

pub use capability::AgentCapability;
pub use registry::{
    CapabilityRegistry, RegistryError, INSIGHT_AGENT, SCHEMA_AGENT, SIMULATOR_AGENT, VECTOR_AGENT,
};
