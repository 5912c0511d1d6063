//! Dispatch envelopes: the strict request shape and the two reply shapes.

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::policy::Regime;

pub const REPLY_SCHEMA_VERSION: &str = "1.0.0";
pub const HOLD_RETRY_AFTER_MS: u64 = 5_000;

static SEMVER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+$").unwrap());

/// One problem found while validating an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: String,
    pub path: Vec<String>,
    pub message: String,
}

impl ValidationIssue {
    fn new(code: &str, field: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            path: if field.is_empty() { vec![] } else { vec![field.to_string()] },
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Invalid Envelope Schema ({} issue(s))", .details.len())]
pub struct EnvelopeError {
    pub details: Vec<ValidationIssue>,
}

/// Inbound dispatch request. Undeclared fields are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestEnvelope {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    pub trace_id: String,
    pub timestamp: String,
    #[serde(rename = "sourceAgent")]
    pub source_agent: String,
    #[serde(rename = "targetAgent")]
    pub target_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regime: Option<Regime>,
    pub payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl RequestEnvelope {
    /// Decode and validate a raw request body.
    ///
    /// Shape errors (unknown field, wrong type, missing field) stop at the
    /// first one serde reports. Format checks on a well-shaped envelope are
    /// all collected.
    pub fn parse(body: Value) -> Result<Self, EnvelopeError> {
        let envelope: Self = serde_json::from_value(body).map_err(|e| EnvelopeError {
            details: vec![ValidationIssue::new("invalid_type", "", e.to_string())],
        })?;
        envelope.validate()?;
        Ok(envelope)
    }

    pub fn validate(&self) -> Result<(), EnvelopeError> {
        let mut details = Vec::new();
        if !SEMVER.is_match(&self.schema_version) {
            details.push(ValidationIssue::new("invalid_string", "schemaVersion", "Invalid semver"));
        }
        if uuid::Uuid::parse_str(&self.trace_id).is_err() {
            details.push(ValidationIssue::new("invalid_string", "trace_id", "Invalid uuid"));
        }
        if DateTime::parse_from_rfc3339(&self.timestamp).is_err() {
            details.push(ValidationIssue::new("invalid_string", "timestamp", "Invalid datetime"));
        }
        if details.is_empty() {
            Ok(())
        } else {
            Err(EnvelopeError { details })
        }
    }
}

/// Successful dispatch reply: source and target swapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    pub trace_id: String,
    pub timestamp: String,
    #[serde(rename = "sourceAgent")]
    pub source_agent: String,
    #[serde(rename = "targetAgent")]
    pub target_agent: String,
    pub payload: Value,
}

impl ReplyEnvelope {
    pub fn reply_to(request: &RequestEnvelope, payload: Value) -> Self {
        Self {
            schema_version: REPLY_SCHEMA_VERSION.to_string(),
            trace_id: request.trace_id.clone(),
            timestamp: now_rfc3339(),
            source_agent: request.target_agent.clone(),
            target_agent: request.source_agent.clone(),
            payload,
        }
    }
}

/// Reply sent instead of dispatching while the regime forbids narrative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldReply {
    pub status: String,
    pub reason: String,
    pub retry_after_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_mode: Option<String>,
}

impl HoldReply {
    pub fn new(reason: impl Into<String>, ui_mode: Option<String>) -> Self {
        Self {
            status: "HOLD".to_string(),
            reason: reason.into(),
            retry_after_ms: HOLD_RETRY_AFTER_MS,
            ui_mode,
        }
    }
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body() -> Value {
        json!({
            "schemaVersion": "1.0.0",
            "trace_id": "6f1c2b8e-3d4a-4c5b-9e7f-0a1b2c3d4e5f",
            "timestamp": "2026-03-01T12:00:00.000Z",
            "sourceAgent": "ui",
            "targetAgent": "analyst-agent",
            "payload": {"members": []}
        })
    }

    #[test]
    fn test_valid_envelope_parses() {
        let env = RequestEnvelope::parse(body()).unwrap();
        assert_eq!(env.target_agent, "analyst-agent");
        assert!(env.regime.is_none());
        assert!(env.session_id.is_none());
    }

    #[test]
    fn test_declared_optionals_are_accepted() {
        let mut b = body();
        b["regime"] = json!("SILENCE");
        b["session_id"] = json!("s1");
        b["user_id"] = json!("u1");
        let env = RequestEnvelope::parse(b).unwrap();
        assert_eq!(env.regime, Some(Regime::Silence));
        assert_eq!(env.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let mut b = body();
        b["extra"] = json!(true);
        let err = RequestEnvelope::parse(b).unwrap_err();
        assert!(err.details[0].message.contains("extra"));
    }

    #[test]
    fn test_shape_errors() {
        for (field, value) in [
            ("payload", json!([1, 2])),
            ("regime", json!("PANIC")),
            ("sourceAgent", json!(7)),
        ] {
            let mut b = body();
            b[field] = value;
            assert!(RequestEnvelope::parse(b).is_err(), "{field}");
        }
        let mut b = body();
        b.as_object_mut().unwrap().remove("targetAgent");
        assert!(RequestEnvelope::parse(b).is_err());
    }

    #[test]
    fn test_format_errors_are_collected() {
        let mut b = body();
        b["schemaVersion"] = json!("1.0");
        b["trace_id"] = json!("not-a-uuid");
        b["timestamp"] = json!("yesterday");
        let err = RequestEnvelope::parse(b).unwrap_err();
        let paths: Vec<_> = err.details.iter().map(|d| d.path[0].as_str()).collect();
        assert_eq!(paths, vec!["schemaVersion", "trace_id", "timestamp"]);
    }

    #[test]
    fn test_reply_swaps_agents() {
        let env = RequestEnvelope::parse(body()).unwrap();
        let reply = ReplyEnvelope::reply_to(&env, json!({"ok": true}));
        let wire = serde_json::to_value(&reply).unwrap();
        assert_eq!(wire["schemaVersion"], REPLY_SCHEMA_VERSION);
        assert_eq!(wire["sourceAgent"], "analyst-agent");
        assert_eq!(wire["targetAgent"], "ui");
        assert_eq!(wire["trace_id"], env.trace_id);
    }

    #[test]
    fn test_hold_reply_wire_shape() {
        let wire = serde_json::to_value(HoldReply::new("wait", Some("hold".into()))).unwrap();
        assert_eq!(wire, json!({"status": "HOLD", "reason": "wait", "retryAfterMs": 5000, "uiMode": "hold"}));
        let bare = serde_json::to_value(HoldReply::new("wait", None)).unwrap();
        assert!(bare.get("uiMode").is_none());
    }
}
