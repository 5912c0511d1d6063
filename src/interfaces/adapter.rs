//! AgentAdapter trait: the one contract every dispatch target implements.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::insight::Tier;
use crate::policy::RegimeSnapshot;

/// What an adapter may know about the request it serves.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub trace_id: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// Computed once by the router; adapters never recompute it.
    pub regime: RegimeSnapshot,
    pub tier: Tier,
}

impl DispatchContext {
    /// Key for per-caller state: the session, else the user. Unscoped
    /// requests get no per-caller state.
    pub fn scope(&self) -> Option<&str> {
        self.session_id.as_deref().or(self.user_id.as_deref())
    }
}

/// The core adapter trait. Every engine reachable through the router
/// implements this.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Registry name this adapter serves.
    fn name(&self) -> &str;

    /// Run one request. `payload` is the envelope payload object.
    async fn invoke(&self, payload: Value, ctx: &DispatchContext) -> Result<Value, AdapterError>;
}

/// Adapter error types
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("No adapter bound for agent: {0}")]
    NotBound(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Decode a payload object into a typed request.
pub(crate) fn parse_payload<T: DeserializeOwned>(payload: Value) -> Result<T, AdapterError> {
    serde_json::from_value(payload).map_err(|e| AdapterError::InvalidPayload(e.to_string()))
}
