//! Insight engine adapter.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::simulator::SimulatorPool;
use crate::capabilities::INSIGHT_AGENT;
use crate::insight::{InsightEngine, Member, PassLevel, SimState};
use crate::interfaces::adapter::{parse_payload, AdapterError, AgentAdapter, DispatchContext};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsightRequest {
    #[serde(default)]
    sim_state: Option<SimState>,
    #[serde(default)]
    members: Vec<Member>,
}

/// Analyzes either the supplied `simState` or the caller's live simulator.
pub struct InsightAdapter {
    engine: InsightEngine,
    pool: Arc<SimulatorPool>,
}

impl InsightAdapter {
    pub fn new(engine: InsightEngine, pool: Arc<SimulatorPool>) -> Self {
        Self { engine, pool }
    }
}

#[async_trait]
impl AgentAdapter for InsightAdapter {
    fn name(&self) -> &str {
        INSIGHT_AGENT
    }

    async fn invoke(&self, payload: Value, ctx: &DispatchContext) -> Result<Value, AdapterError> {
        let req: InsightRequest = parse_payload(payload)?;
        let state = match req.sim_state {
            Some(state) => state,
            None => {
                let running = match ctx.scope() {
                    Some(key) => self.pool.snapshot(key).await,
                    None => None,
                };
                running.ok_or_else(|| {
                    AdapterError::InvalidPayload("simState is required when no simulator is running".into())
                })?
            }
        };

        let entropy = InsightEngine::entropy(&state);
        let insights = self.engine.analyze(&state, &req.members, ctx.tier).await;
        log::debug!("[{}] {} insights for tier {:?}", ctx.trace_id, insights.len(), ctx.tier);

        Ok(json!({
            "insights": insights,
            "passLevel": PassLevel::from_entropy(entropy),
            "entropy": entropy,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::Tier;
    use crate::interfaces::adapter::testing::ctx;
    use crate::simulation::Simulator;

    fn adapter(pool: Arc<SimulatorPool>) -> InsightAdapter {
        InsightAdapter::new(InsightEngine::default(), pool)
    }

    #[tokio::test]
    async fn test_supplied_state_is_analyzed() {
        let payload = json!({
            "simState": {"nodes": [{"id": "m1", "x": 400.0, "y": 0.0, "z": 0.0}]},
            "members": [{"id": "m1", "role": "martyr"}]
        });
        let out = adapter(Arc::new(SimulatorPool::new())).invoke(payload, &ctx()).await.unwrap();
        let insights = out["insights"].as_array().unwrap();
        assert_eq!(insights.len(), 2);
        assert_eq!(insights[0]["type"], "DRIFT_WARNING");
        assert_eq!(out["passLevel"], "CALIBRATION");
    }

    #[tokio::test]
    async fn test_falls_back_to_session_simulator() {
        let pool = Arc::new(SimulatorPool::new());
        {
            let handle = pool.replace("s1", Simulator::with_seed(3));
            handle.lock().await.seed(2);
        }
        let mut c = ctx();
        c.session_id = Some("s1".into());
        c.tier = Tier::Pro;
        let out = adapter(pool).invoke(json!({"members": []}), &c).await.unwrap();
        assert_eq!(out["entropy"], 0.0);
        assert!(out["insights"].is_array());
    }

    #[tokio::test]
    async fn test_no_state_anywhere_is_invalid() {
        let err = adapter(Arc::new(SimulatorPool::new()))
            .invoke(json!({}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidPayload(_)));
    }
}
