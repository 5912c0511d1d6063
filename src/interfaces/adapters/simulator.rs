//! Relational simulator adapter and the per-scope simulator pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::capabilities::SIMULATOR_AGENT;
use crate::insight::SimState;
use crate::interfaces::adapter::{parse_payload, AdapterError, AgentAdapter, DispatchContext};
use crate::simulation::Simulator;

pub const DEFAULT_SEED_SIZE: usize = 5;
/// Largest family a single `seed` may create.
pub const MAX_SEED_SIZE: usize = 500;
/// Most iterations a single `step` may run.
pub const MAX_STEP_ITERATIONS: usize = 10_000;

struct PoolEntry {
    sim: Arc<Mutex<Simulator>>,
    last_used: Instant,
}

impl PoolEntry {
    fn new(sim: Simulator) -> Self {
        Self {
            sim: Arc::new(Mutex::new(sim)),
            last_used: Instant::now(),
        }
    }
}

/// One simulator per caller scope, each behind its own lock.
#[derive(Default)]
pub struct SimulatorPool {
    sims: DashMap<String, PoolEntry>,
}

impl SimulatorPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, key: &str) -> Arc<Mutex<Simulator>> {
        let mut entry = self
            .sims
            .entry(key.to_string())
            .or_insert_with(|| PoolEntry::new(Simulator::new()));
        entry.last_used = Instant::now();
        entry.sim.clone()
    }

    /// Swap in a fresh simulator for `key`.
    pub fn replace(&self, key: &str, sim: Simulator) -> Arc<Mutex<Simulator>> {
        let entry = PoolEntry::new(sim);
        let handle = entry.sim.clone();
        self.sims.insert(key.to_string(), entry);
        handle
    }

    /// Flattened node state of the simulator at `key`, if one exists.
    pub async fn snapshot(&self, key: &str) -> Option<SimState> {
        let handle = self.sims.get(key).map(|entry| entry.sim.clone())?;
        let sim = handle.lock().await;
        Some(SimState::from(&*sim))
    }

    pub fn remove(&self, key: &str) -> bool {
        self.sims.remove(key).is_some()
    }

    /// Drop every simulator untouched for longer than `max_idle`; returns how many.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.sims.len();
        self.sims.retain(|_, entry| entry.last_used.elapsed() <= max_idle);
        let evicted = before.saturating_sub(self.sims.len());
        if evicted > 0 {
            log::info!("evicted {} idle simulators", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sims.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SimAction {
    Seed,
    Step,
    #[default]
    State,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimRequest {
    #[serde(default)]
    action: SimAction,
    #[serde(default)]
    size: Option<usize>,
    #[serde(default)]
    iterations: Option<usize>,
    #[serde(default)]
    field_strength: Option<f64>,
    #[serde(default)]
    seed: Option<u64>,
}

impl SimRequest {
    fn check_limits(&self) -> Result<(), AdapterError> {
        if let Some(size) = self.size.filter(|&n| n > MAX_SEED_SIZE) {
            return Err(AdapterError::InvalidPayload(format!(
                "size {size} exceeds the limit of {MAX_SEED_SIZE}"
            )));
        }
        if let Some(n) = self.iterations.filter(|&n| n > MAX_STEP_ITERATIONS) {
            return Err(AdapterError::InvalidPayload(format!(
                "iterations {n} exceeds the limit of {MAX_STEP_ITERATIONS}"
            )));
        }
        Ok(())
    }
}

/// Drives the caller's simulator.
///
/// | action  | effect                                               |
/// |---------|------------------------------------------------------|
/// | `seed`  | repopulate with `size` members (default 5)           |
/// | `step`  | integrate `iterations` steps (default 1)             |
/// | `state` | read the cosmic state; never touches `fieldStrength` |
///
/// `seed` and `step` need a session or user scope. Integration runs on the
/// blocking pool, so a dispatch timeout can abandon it.
pub struct SimulatorAdapter {
    pool: Arc<SimulatorPool>,
}

impl SimulatorAdapter {
    pub fn new(pool: Arc<SimulatorPool>) -> Self {
        Self { pool }
    }
}

fn full_state(sim: &Simulator) -> Value {
    json!({ "nodes": sim.nodes(), "cosmicState": sim.cosmic_state() })
}

#[async_trait]
impl AgentAdapter for SimulatorAdapter {
    fn name(&self) -> &str {
        SIMULATOR_AGENT
    }

    async fn invoke(&self, payload: Value, ctx: &DispatchContext) -> Result<Value, AdapterError> {
        let req: SimRequest = parse_payload(payload)?;
        req.check_limits()?;

        let Some(key) = ctx.scope() else {
            if req.action != SimAction::State {
                return Err(AdapterError::InvalidPayload(
                    "seed and step need a session_id or user_id".into(),
                ));
            }
            return Ok(full_state(&Simulator::new()));
        };

        let handle = match (req.action, req.seed) {
            (SimAction::Seed, Some(seed)) => self.pool.replace(key, Simulator::with_seed(seed)),
            _ => self.pool.get_or_create(key),
        };

        if req.action == SimAction::State {
            let sim = handle.lock().await;
            return Ok(full_state(&sim));
        }

        let mut sim = handle.lock_owned().await;
        let trace_id = ctx.trace_id.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            if let Some(fs) = req.field_strength {
                sim.set_field_strength(fs);
            }
            match req.action {
                SimAction::Seed => {
                    let size = req.size.unwrap_or(DEFAULT_SEED_SIZE);
                    sim.seed(size);
                    log::debug!("[{}] seeded simulator {} with {} members", trace_id, key, size);
                    full_state(&sim)
                }
                _ => {
                    let stats = sim.step(req.iterations.unwrap_or(1));
                    json!({ "stats": stats, "cosmicState": sim.cosmic_state() })
                }
            }
        })
        .await
        .map_err(|e| AdapterError::ExecutionFailed(format!("simulation task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::adapter::testing::ctx;

    fn session_ctx(id: &str) -> DispatchContext {
        let mut c = ctx();
        c.session_id = Some(id.into());
        c
    }

    #[tokio::test]
    async fn test_seed_then_step_keeps_state_per_session() {
        let pool = Arc::new(SimulatorPool::new());
        let adapter = SimulatorAdapter::new(pool.clone());

        let seeded = adapter
            .invoke(json!({"action": "seed", "size": 3, "seed": 42}), &session_ctx("s1"))
            .await
            .unwrap();
        assert_eq!(seeded["nodes"].as_array().unwrap().len(), 4);

        let stepped = adapter
            .invoke(json!({"action": "step", "iterations": 10}), &session_ctx("s1"))
            .await
            .unwrap();
        assert_eq!(stepped["stats"]["nodeCount"], 4);
        assert_eq!(stepped["stats"]["iterations"], 10);
        let stability = stepped["stats"]["stabilityScore"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&stability));

        let other = adapter.invoke(json!({}), &session_ctx("s2")).await.unwrap();
        assert_eq!(other["nodes"].as_array().unwrap().len(), 1);
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn test_field_strength_applies_to_step_not_state() {
        let adapter = SimulatorAdapter::new(Arc::new(SimulatorPool::new()));
        let out = adapter
            .invoke(json!({"action": "step", "fieldStrength": 1.5}), &session_ctx("s1"))
            .await
            .unwrap();
        assert_eq!(out["cosmicState"]["fieldStrength"], 1.5);

        let read = adapter
            .invoke(json!({"action": "state", "fieldStrength": 0.1}), &session_ctx("s1"))
            .await
            .unwrap();
        assert_eq!(read["cosmicState"]["fieldStrength"], 1.5);
    }

    #[tokio::test]
    async fn test_unscoped_callers_cannot_mutate() {
        let pool = Arc::new(SimulatorPool::new());
        let adapter = SimulatorAdapter::new(pool.clone());
        let err = adapter.invoke(json!({"action": "seed"}), &ctx()).await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidPayload(_)));
        let err = adapter.invoke(json!({"action": "step"}), &ctx()).await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidPayload(_)));

        let read = adapter.invoke(json!({}), &ctx()).await.unwrap();
        assert_eq!(read["nodes"].as_array().unwrap().len(), 1);
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_requests_are_rejected() {
        let adapter = SimulatorAdapter::new(Arc::new(SimulatorPool::new()));
        let too_big = json!({"action": "seed", "size": MAX_SEED_SIZE + 1});
        let err = adapter.invoke(too_big, &session_ctx("s1")).await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidPayload(_)));

        let too_long = json!({"action": "step", "iterations": MAX_STEP_ITERATIONS + 1});
        let err = adapter.invoke(too_long, &session_ctx("s1")).await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_long_step_can_be_abandoned_by_timeout() {
        let adapter = SimulatorAdapter::new(Arc::new(SimulatorPool::new()));
        adapter
            .invoke(json!({"action": "seed", "size": MAX_SEED_SIZE, "seed": 7}), &session_ctx("s1"))
            .await
            .unwrap();

        let step = json!({"action": "step", "iterations": MAX_STEP_ITERATIONS});
        let limited = tokio::time::timeout(Duration::from_millis(1), adapter.invoke(step, &session_ctx("s1"))).await;
        assert!(limited.is_err());
    }

    #[test]
    fn test_idle_simulators_are_evicted() {
        let pool = SimulatorPool::new();
        pool.get_or_create("a");
        pool.get_or_create("b");
        assert_eq!(pool.evict_idle(Duration::from_secs(60)), 0);
        assert_eq!(pool.len(), 2);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(pool.evict_idle(Duration::ZERO), 2);
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_action_is_invalid() {
        let adapter = SimulatorAdapter::new(Arc::new(SimulatorPool::new()));
        let err = adapter.invoke(json!({"action": "explode"}), &ctx()).await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_pool_snapshot() {
        let pool = SimulatorPool::new();
        assert!(pool.snapshot("s").await.is_none());
        {
            let handle = pool.replace("s", Simulator::with_seed(1));
            handle.lock().await.seed(2);
        }
        let state = pool.snapshot("s").await.unwrap();
        assert_eq!(state.nodes.len(), 3);
        assert!(pool.remove("s"));
        assert!(pool.is_empty());
    }
}
