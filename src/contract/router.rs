//! Governed dispatch router: the per-request state machine.
//!
//! ```text
//! RECEIVED ─ validate ──────────► 400
//!          ─ registry ──────────► 403
//!          ─ regime snapshot
//!          ─ session check ─────► 402
//!          ─ narrative allowed? ─► HOLD (200, no spend)
//!          ─ reserve one credit ► 402 if a parallel request drained it
//!          ─ adapter invoke ────► 500 on failure or timeout (credit refunded)
//!          ─ strip forbidden outputs
//!          ─ tone gate
//!          ─ RESPONDED (200, reply envelope)
//! ```
//!
//! Every transition writes one diagnostic event keyed by `trace_id`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::envelope::{HoldReply, ReplyEnvelope, RequestEnvelope};
use crate::capabilities::{AgentCapability, CapabilityRegistry};
use crate::diagnostics::{DiagnosticEvent, DiagnosticsSink, EventType};
use crate::error::DispatchError;
use crate::insight::Tier;
use crate::interfaces::{AdapterGateway, DispatchContext};
use crate::observability::logger;
use crate::policy::{RegimeSnapshot, RegimeSource, RegimeTable, ToneGate};
use crate::session::{session_ttl, Reservation, SessionError, SessionService};
use crate::store::DocumentStore;

const ROUTER: &str = "Router";

/// What a successful dispatch returns. Both are HTTP 200.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Reply(ReplyEnvelope),
    Hold(HoldReply),
}

impl IntoResponse for DispatchOutcome {
    fn into_response(self) -> Response {
        match self {
            DispatchOutcome::Reply(reply) => Json(reply).into_response(),
            DispatchOutcome::Hold(hold) => Json(hold).into_response(),
        }
    }
}

/// Everything a dispatch needs. Cheap to clone.
#[derive(Clone)]
pub struct DispatchRouter {
    registry: Arc<CapabilityRegistry>,
    gateway: AdapterGateway,
    regimes: Arc<RegimeTable>,
    regime_source: Arc<dyn RegimeSource>,
    tone: Arc<ToneGate>,
    sessions: SessionService,
    diagnostics: DiagnosticsSink,
}

impl DispatchRouter {
    pub fn new(
        registry: CapabilityRegistry,
        gateway: AdapterGateway,
        regimes: RegimeTable,
        regime_source: Arc<dyn RegimeSource>,
        tone: ToneGate,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            gateway,
            regimes: Arc::new(regimes),
            regime_source,
            tone: Arc::new(tone),
            sessions: SessionService::new(store.clone()),
            diagnostics: DiagnosticsSink::new(store),
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    pub fn diagnostics(&self) -> &DiagnosticsSink {
        &self.diagnostics
    }

    pub fn gateway(&self) -> &AdapterGateway {
        &self.gateway
    }

    /// Expire stale sessions and free the simulators they and idle users held.
    ///
    /// Returns the number of sessions expired.
    pub async fn expire_sessions(&self, now: DateTime<Utc>) -> Result<usize, SessionError> {
        let expired = self.sessions.expire_stale(now).await?;
        let pool = self.gateway.simulators();
        for session_id in &expired {
            pool.remove(session_id);
        }
        let idle = session_ttl().to_std().unwrap_or(Duration::from_secs(3600));
        pool.evict_idle(idle);
        Ok(expired.len())
    }

    /// Run one raw request body through the state machine.
    pub async fn dispatch(&self, body: Value) -> Result<DispatchOutcome, DispatchError> {
        let start = Instant::now();

        // -- validate ------------------------------------------------------
        let raw_trace = body.get("trace_id").and_then(Value::as_str).unwrap_or("unknown").to_string();
        let raw_user = body.get("user_id").and_then(Value::as_str).map(str::to_string);
        let envelope = match RequestEnvelope::parse(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                logger().warn(&format!("Envelope rejected: {e}"), Some(raw_trace.as_str()), Some("Validator"), None);
                self.diagnostics
                    .log_event(
                        DiagnosticEvent::new(&raw_trace, EventType::Error)
                            .user(raw_user.as_deref())
                            .summary(json!({ "error": "Invalid Envelope Schema" })),
                    )
                    .await;
                return Err(e.into());
            }
        };
        let trace_id = envelope.trace_id.clone();
        let user_id = envelope.user_id.clone();

        // -- registry ------------------------------------------------------
        let Some(capability) = self.registry.resolve(&envelope.target_agent).cloned() else {
            logger().error(
                &format!("DENIED: Unknown agent '{}'", envelope.target_agent),
                Some(trace_id.as_str()),
                Some(ROUTER),
                None,
            );
            self.diagnostics
                .log_event(
                    DiagnosticEvent::new(&trace_id, EventType::Error)
                        .user(user_id.as_deref())
                        .summary(json!({ "error": "Unknown agent", "target": envelope.target_agent })),
                )
                .await;
            return Err(DispatchError::Forbidden {
                agent: envelope.target_agent,
                trace_id,
            });
        };
        logger().info(
            &format!("Registry Check Passed: {}", capability.name),
            Some(trace_id.as_str()),
            Some("RegistryGuard"),
            None,
        );

        // -- regime --------------------------------------------------------
        let regime = self.regime_source.compute(envelope.regime);
        let snapshot = self.regimes.snapshot(regime);
        self.diagnostics
            .log_event(
                DiagnosticEvent::new(&trace_id, EventType::AgentRequest)
                    .user(user_id.as_deref())
                    .summary(json!({ "source": envelope.source_agent, "target": envelope.target_agent }))
                    .regime(regime),
            )
            .await;
        logger().info(
            &format!("Dispatch: {} -> {}", envelope.source_agent, envelope.target_agent),
            Some(trace_id.as_str()),
            Some(ROUTER),
            Some(&json!({ "regime": regime })),
        );

        // -- entitlement ---------------------------------------------------
        if let Some(session_id) = envelope.session_id.as_deref() {
            self.check_session(session_id, &snapshot, &trace_id, user_id.as_deref())
                .await?;
        }

        // -- hold ----------------------------------------------------------
        if !snapshot.narrative_allowed {
            let outcome = self.hold(&envelope, &snapshot).await;
            // Held dispatches feed the latency regime as well.
            self.regime_source.record_latency(start.elapsed());
            return Ok(outcome);
        }

        // -- reserve -------------------------------------------------------
        let reserved = match envelope.session_id.as_deref() {
            Some(session_id) => {
                self.reserve(session_id, &trace_id, user_id.as_deref()).await?;
                Some(session_id)
            }
            None => None,
        };

        // -- invoke --------------------------------------------------------
        let ctx = DispatchContext {
            trace_id: trace_id.clone(),
            user_id: user_id.clone(),
            session_id: envelope.session_id.clone(),
            tier: requested_tier(&envelope),
            regime: snapshot,
        };
        let payload = Value::Object(envelope.payload.clone());
        let outcome = self.invoke(&capability, payload, &ctx).await;
        self.regime_source.record_latency(start.elapsed());

        let mut result = match outcome {
            Ok(result) => result,
            Err(reason) => {
                if let Some(session_id) = reserved {
                    self.refund(session_id, &trace_id).await;
                }
                return Err(self.fail(&trace_id, user_id.as_deref(), reason).await);
            }
        };

        // -- post-process --------------------------------------------------
        strip_forbidden(&capability, &mut result, &trace_id);
        self.tone.filter_result(&mut result);

        let entitlement_delta = if reserved.is_some() { -1 } else { 0 };

        let latency = start.elapsed().as_millis() as u64;
        logger().info(&format!("Dispatch Success ({latency}ms)"), Some(trace_id.as_str()), Some(ROUTER), None);
        self.diagnostics
            .log_event(
                DiagnosticEvent::new(&trace_id, EventType::AgentResponse)
                    .user(user_id.as_deref())
                    .metrics(latency, result_entropy(&result))
                    .entitlement_delta(entitlement_delta),
            )
            .await;

        Ok(DispatchOutcome::Reply(ReplyEnvelope::reply_to(&envelope, result)))
    }

    /// 402 unless the session exists and can spend.
    async fn check_session(
        &self,
        session_id: &str,
        snapshot: &RegimeSnapshot,
        trace_id: &str,
        user_id: Option<&str>,
    ) -> Result<(), DispatchError> {
        let session = match self.sessions.get_session(session_id).await {
            Ok(session) => session,
            Err(e) => {
                return Err(self.fail(trace_id, user_id, format!("session lookup failed: {e}")).await);
            }
        };

        match session {
            Some(session) if session.can_spend(Utc::now()) => {
                self.diagnostics
                    .log_event(
                        DiagnosticEvent::new(trace_id, EventType::EntitlementCheck)
                            .user(user_id)
                            .summary(json!({
                                "session_id": session_id,
                                "remaining_credits": session.remaining_credits,
                            }))
                            .entitlement_delta(0),
                    )
                    .await;
                if session.current_regime != snapshot.regime {
                    if let Err(e) = self.sessions.set_regime(session_id, snapshot.regime).await {
                        tracing::warn!(trace_id, "failed to record session regime: {e}");
                    }
                }
                Ok(())
            }
            _ => Err(self.deny(session_id, trace_id, user_id).await),
        }
    }

    /// Take the credit this dispatch will spend, before the adapter runs.
    ///
    /// A parallel request may have drained the session since the check,
    /// in which case this is a 402 and the target never runs.
    async fn reserve(&self, session_id: &str, trace_id: &str, user_id: Option<&str>) -> Result<(), DispatchError> {
        match self.sessions.reserve_credit(session_id, 1, Utc::now()).await {
            Ok(Reservation::Reserved(_)) => Ok(()),
            Ok(Reservation::Denied | Reservation::Missing) => Err(self.deny(session_id, trace_id, user_id).await),
            Err(e) => Err(self.fail(trace_id, user_id, format!("credit reservation failed: {e}")).await),
        }
    }

    async fn refund(&self, session_id: &str, trace_id: &str) {
        match self.sessions.refund_credit(session_id, 1).await {
            Ok(Some(_)) => {}
            Ok(None) => logger().warn(
                &format!("Session {session_id} vanished before credit refund"),
                Some(trace_id),
                Some(ROUTER),
                None,
            ),
            Err(e) => logger().error(
                &format!("Credit refund failed for session {session_id}: {e}"),
                Some(trace_id),
                Some(ROUTER),
                None,
            ),
        }
    }

    async fn deny(&self, session_id: &str, trace_id: &str, user_id: Option<&str>) -> DispatchError {
        logger().warn(
            &format!("Dispatch BLOCKED: Invalid Session {session_id}"),
            Some(trace_id),
            Some(ROUTER),
            None,
        );
        self.diagnostics
            .log_event(
                DiagnosticEvent::new(trace_id, EventType::Error)
                    .user(user_id)
                    .summary(json!({ "error": "Session Expired/Exhausted" })),
            )
            .await;
        DispatchError::Entitlement {
            trace_id: trace_id.to_string(),
        }
    }

    async fn hold(&self, envelope: &RequestEnvelope, snapshot: &RegimeSnapshot) -> DispatchOutcome {
        let trace_id = envelope.trace_id.as_str();
        logger().warn(
            &format!("Dispatch HALTED by Regime {}", snapshot.regime),
            Some(trace_id),
            Some(ROUTER),
            None,
        );
        self.diagnostics
            .log_event(
                DiagnosticEvent::new(trace_id, EventType::Hold)
                    .user(envelope.user_id.as_deref())
                    .regime(snapshot.regime)
                    .summary(json!({ "reason": snapshot.hold_reason() })),
            )
            .await;
        if let Some(session_id) = envelope.session_id.as_deref() {
            if let Err(e) = self.sessions.hold_session(session_id).await {
                tracing::warn!(trace_id, "failed to hold session {session_id}: {e}");
            }
        }
        DispatchOutcome::Hold(HoldReply::new(snapshot.hold_reason(), snapshot.ui_mode.clone()))
    }

    /// Call the adapter, bounded by the capability timeout when one is set.
    async fn invoke(&self, capability: &AgentCapability, payload: Value, ctx: &DispatchContext) -> Result<Value, String> {
        let call = self.gateway.invoke(&capability.name, payload, ctx);
        match capability.timeout_duration() {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!("Agent {} timed out after {}ms", capability.name, limit.as_millis())),
            },
            None => call.await.map_err(|e| e.to_string()),
        }
    }

    async fn fail(&self, trace_id: &str, user_id: Option<&str>, reason: String) -> DispatchError {
        logger().error(&format!("Dispatch Failed: {reason}"), Some(trace_id), Some(ROUTER), None);
        self.diagnostics
            .log_event(
                DiagnosticEvent::new(trace_id, EventType::Error)
                    .user(user_id)
                    .summary(json!({ "error": reason })),
            )
            .await;
        DispatchError::Internal {
            trace_id: trace_id.to_string(),
            reason,
        }
    }
}

/// `payload.tier` when it names a tier, else BASIC.
fn requested_tier(envelope: &RequestEnvelope) -> Tier {
    envelope
        .payload
        .get("tier")
        .and_then(|t| serde_json::from_value(t.clone()).ok())
        .unwrap_or_default()
}

/// Remove top-level result keys the capability forbids.
fn strip_forbidden(capability: &AgentCapability, result: &mut Value, trace_id: &str) {
    let (Some(forbidden), Value::Object(fields)) = (capability.forbidden_outputs.as_ref(), result) else {
        return;
    };
    for key in forbidden {
        if fields.remove(key).is_some() {
            logger().warn(
                &format!("Stripped forbidden output '{key}' from {}", capability.name),
                Some(trace_id),
                Some("RegistryGuard"),
                None,
            );
        }
    }
}

/// Entropy reported by the result, if any.
fn result_entropy(result: &Value) -> Option<f64> {
    result
        .get("entropy")
        .or_else(|| result.get("cosmicState").and_then(|c| c.get("entropy")))
        .and_then(Value::as_f64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
