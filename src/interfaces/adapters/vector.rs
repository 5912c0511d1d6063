//! Vector engine adapter.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::capabilities::VECTOR_AGENT;
use crate::interfaces::adapter::{parse_payload, AdapterError, AgentAdapter, DispatchContext};
use crate::vector::{
    lineage_from_members, update_state, update_state_seeded, AstrologyProfile, Ephemeris, LineageProfile,
    MemberRole, NoEphemeris, Vector3, DEFAULT_INTENSITY,
};

#[derive(Debug, Deserialize)]
struct RoleEntry {
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VectorRequest {
    input: Vector3,
    #[serde(default)]
    lineage: Option<LineageProfile>,
    #[serde(default)]
    members: Vec<RoleEntry>,
    #[serde(default)]
    astrology: Option<AstrologyProfile>,
    #[serde(default)]
    intensity: Option<f64>,
    #[serde(default)]
    seed: Option<u64>,
}

/// Runs `update_state` on the payload.
///
/// Lineage comes from `lineage` when given, else from the member roles.
/// Astrology comes from the payload, else from the ephemeris at call time.
pub struct VectorAdapter {
    ephemeris: Arc<dyn Ephemeris>,
}

impl VectorAdapter {
    pub fn new(ephemeris: Arc<dyn Ephemeris>) -> Self {
        Self { ephemeris }
    }
}

impl Default for VectorAdapter {
    fn default() -> Self {
        Self::new(Arc::new(NoEphemeris))
    }
}

#[async_trait]
impl AgentAdapter for VectorAdapter {
    fn name(&self) -> &str {
        VECTOR_AGENT
    }

    async fn invoke(&self, payload: Value, ctx: &DispatchContext) -> Result<Value, AdapterError> {
        let req: VectorRequest = parse_payload(payload)?;

        let lineage = req.lineage.unwrap_or_else(|| {
            let roles: Vec<Option<MemberRole>> = req
                .members
                .iter()
                .map(|m| m.role.as_deref().and_then(|r| r.parse().ok()))
                .collect();
            lineage_from_members(&roles)
        });
        let astrology = req.astrology.or_else(|| self.ephemeris.profile_at(Utc::now()));
        let intensity = req.intensity.unwrap_or(DEFAULT_INTENSITY);

        let state = match req.seed {
            Some(seed) => update_state_seeded(req.input, &lineage, astrology.as_ref(), intensity, seed),
            None => update_state(req.input, &lineage, astrology.as_ref(), intensity),
        };
        log::debug!("[{}] vector state: primary {}", ctx.trace_id, state.primary_archetype);

        let mut out = serde_json::to_value(&state)?;
        if let Value::Object(fields) = &mut out {
            fields.insert("message".into(), Value::String(state.notes.clone()));
        }
        Ok(out)
    }
}
