//! # Diagnostics
//!
//! Append-only audit trail of router transitions, persisted to the
//! `diagnostics_log` collection. Persistence is best effort: a failed write
//! is logged and dropped so it can never fail the request that produced it.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::store::{Direction, DocumentStore, Query, DIAGNOSTICS};

/// Default page size for [`DiagnosticsSink::recent_events`].
pub const DEFAULT_RECENT_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentRequest,
    AgentResponse,
    Hold,
    Error,
    EntitlementCheck,
    PurchaseApplied,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Milliseconds.
    pub latency: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy: Option<f64>,
}

/// Fixed-width timestamps keep lexicographic order equal to time order.
fn fixed_width<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub trace_id: String,
    #[serde(serialize_with = "fixed_width")]
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_summary: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_snapshot: Option<MetricsSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entitlement_delta: Option<i64>,
}

impl DiagnosticEvent {
    pub fn new(trace_id: impl Into<String>, event_type: EventType) -> Self {
        Self {
            trace_id: trace_id.into(),
            timestamp: Utc::now(),
            event_type,
            user_id: None,
            payload_summary: None,
            regime: None,
            metrics_snapshot: None,
            entitlement_delta: None,
        }
    }

    pub fn user(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(str::to_string);
        self
    }

    pub fn summary(mut self, summary: Value) -> Self {
        self.payload_summary = Some(summary);
        self
    }

    pub fn regime(mut self, regime: impl ToString) -> Self {
        self.regime = Some(regime.to_string());
        self
    }

    pub fn metrics(mut self, latency_ms: u64, entropy: Option<f64>) -> Self {
        self.metrics_snapshot = Some(MetricsSnapshot {
            latency: latency_ms,
            entropy,
        });
        self
    }

    pub fn entitlement_delta(mut self, delta: i64) -> Self {
        self.entitlement_delta = Some(delta);
        self
    }
}

/// Writes and reads diagnostic events.
#[derive(Clone)]
pub struct DiagnosticsSink {
    store: Arc<dyn DocumentStore>,
}

impl DiagnosticsSink {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Persist one event. Failures are logged, never returned.
    pub async fn log_event(&self, event: DiagnosticEvent) {
        tracing::debug!(
            trace_id = %event.trace_id,
            event_type = ?event.event_type,
            "diagnostic event"
        );
        let doc = match serde_json::to_value(&event) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(trace_id = %event.trace_id, "failed to serialize diagnostics event: {e}");
                return;
            }
        };
        if let Err(e) = self.store.add(DIAGNOSTICS, doc).await {
            tracing::error!(trace_id = %event.trace_id, "failed to persist diagnostics log: {e}");
        }
    }

    /// A user's events, newest first. Read failures yield an empty list.
    pub async fn recent_events(&self, user_id: &str, limit: usize) -> Vec<DiagnosticEvent> {
        let query = Query::new()
            .where_eq("user_id", user_id)
            .order_by("timestamp", Direction::Descending)
            .limit(limit);
        match self.store.query(DIAGNOSTICS, &query).await {
            Ok(hits) => hits
                .into_iter()
                .filter_map(|(id, doc)| match serde_json::from_value(doc) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        tracing::warn!("skipping unreadable diagnostics event {id}: {e}");
                        None
                    }
                })
                .collect(),
            Err(e) => {
                tracing::error!("failed to fetch diagnostics: {e}");
                Vec::new()
            }
        }
    }

    /// Every event recorded for one trace, oldest first.
    pub async fn events_for_trace(&self, trace_id: &str) -> Vec<DiagnosticEvent> {
        let query = Query::new()
            .where_eq("trace_id", trace_id)
            .order_by("timestamp", Direction::Ascending);
        match self.store.query(DIAGNOSTICS, &query).await {
            Ok(hits) => hits
                .into_iter()
                .filter_map(|(_, doc)| serde_json::from_value(doc).ok())
                .collect(),
            Err(e) => {
                tracing::error!(trace_id, "failed to fetch diagnostics: {e}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use serde_json::Value;

    use crate::store::{DocumentStore, Mutation, Query, StoreError};

    /// Store whose every call fails.
    pub struct BrokenStore;

    #[async_trait]
    impl DocumentStore for BrokenStore {
        async fn get(&self, _: &str, _: &str) -> Result<Option<Value>, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn set(&self, _: &str, _: &str, _: Value) -> Result<(), StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn update(&self, _: &str, _: &str, _: Value) -> Result<(), StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn add(&self, _: &str, _: Value) -> Result<String, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn query(&self, _: &str, _: &Query) -> Result<Vec<(String, Value)>, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn transact(&self, _: &str, _: &str, _: Mutation) -> Result<Value, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
    }
}
