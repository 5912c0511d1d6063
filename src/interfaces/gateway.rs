//! AdapterGateway: routes a dispatch to the adapter bound under the target
//! agent's name.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::adapter::{AdapterError, AgentAdapter, DispatchContext};
use super::adapters::{InsightAdapter, SchemaAdapter, SimulatorAdapter, SimulatorPool, VectorAdapter};
use crate::insight::InsightEngine;
use crate::vector::Ephemeris;

/// Bound adapters indexed by agent name.
#[derive(Default, Clone)]
pub struct AdapterGateway {
    adapters: HashMap<String, Arc<dyn AgentAdapter>>,
    pool: Arc<SimulatorPool>,
}

impl AdapterGateway {
    /// Create a gateway with nothing bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a gateway with the four engine adapters bound. The simulator
    /// and insight adapters share one simulator pool.
    pub fn with_defaults(engine: InsightEngine, ephemeris: Arc<dyn Ephemeris>) -> Self {
        let mut gw = Self::new();
        let pool = gw.pool.clone();
        gw.bind(Arc::new(VectorAdapter::new(ephemeris)));
        gw.bind(Arc::new(SimulatorAdapter::new(pool.clone())));
        gw.bind(Arc::new(InsightAdapter::new(engine, pool)));
        gw.bind(Arc::new(SchemaAdapter));
        gw
    }

    /// Bind an adapter under its own name, replacing any previous binding.
    pub fn bind(&mut self, adapter: Arc<dyn AgentAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AgentAdapter>> {
        self.adapters.get(name)
    }

    /// Names of every bound adapter, sorted.
    pub fn bound(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The simulator pool shared by the default adapters.
    pub fn simulators(&self) -> &Arc<SimulatorPool> {
        &self.pool
    }

    /// Invoke the adapter bound under `name`.
    pub async fn invoke(&self, name: &str, payload: Value, ctx: &DispatchContext) -> Result<Value, AdapterError> {
        let adapter = self
            .adapters
            .get(name)
            .ok_or_else(|| AdapterError::NotBound(name.to_string()))?;
        adapter.invoke(payload, ctx).await.map_err(|e| {
            log::error!("[{}] agent runtime error in {}: {}", ctx.trace_id, name, e);
            e
        })
    }
}
