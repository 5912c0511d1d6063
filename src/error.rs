//! Dispatch error taxonomy and its HTTP mapping.
//!
//! | Variant       | Status | Body                                              |
//! |---------------|--------|---------------------------------------------------|
//! | `Validation`  | 400    | `{error, details, timestamp}`                     |
//! | `Forbidden`   | 403    | `{code: "FORBIDDEN", message, trace_id}`          |
//! | `Entitlement` | 402    | `{code: "ENTITLEMENT_EXHAUSTED", message, trace_id}` |
//! | `Internal`    | 500    | `{code: "INTERNAL_ERROR", message, trace_id}`     |
//!
//! A regime HOLD is not an error and never appears here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;

use crate::contract::envelope::{now_rfc3339, EnvelopeError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] EnvelopeError),

    #[error("Agent '{agent}' is not declared in the registry.")]
    Forbidden { agent: String, trace_id: String },

    #[error("Session expired or credits exhausted.")]
    Entitlement { trace_id: String },

    /// `reason` is logged; clients only see a generic message.
    #[error("Agent processing failed: {reason}")]
    Internal { trace_id: String, reason: String },
}

impl DispatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::Forbidden { .. } => StatusCode::FORBIDDEN,
            DispatchError::Entitlement { .. } => StatusCode::PAYMENT_REQUIRED,
            DispatchError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            DispatchError::Validation(e) => json!({
                "error": "Invalid Envelope Schema",
                "details": e.details,
                "timestamp": now_rfc3339(),
            }),
            DispatchError::Forbidden { trace_id, .. } => json!({
                "code": "FORBIDDEN",
                "message": self.to_string(),
                "trace_id": trace_id,
            }),
            DispatchError::Entitlement { trace_id } => json!({
                "code": "ENTITLEMENT_EXHAUSTED",
                "message": self.to_string(),
                "trace_id": trace_id,
            }),
            DispatchError::Internal { trace_id, .. } => json!({
                "code": "INTERNAL_ERROR",
                "message": "Agent processing failed",
                "trace_id": trace_id,
            }),
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::envelope::ValidationIssue;

    #[test]
    fn test_status_codes() {
        let validation = DispatchError::Validation(EnvelopeError { details: vec![] });
        assert_eq!(validation.status_code(), StatusCode::BAD_REQUEST);
        let forbidden = DispatchError::Forbidden {
            agent: "x".into(),
            trace_id: "t".into(),
        };
        assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);
        let entitlement = DispatchError::Entitlement { trace_id: "t".into() };
        assert_eq!(entitlement.status_code(), StatusCode::PAYMENT_REQUIRED);
        let internal = DispatchError::Internal {
            trace_id: "t".into(),
            reason: "boom".into(),
        };
        assert_eq!(internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_bodies() {
        let forbidden = DispatchError::Forbidden {
            agent: "voice-agent".into(),
            trace_id: "t".into(),
        };
        assert_eq!(
            forbidden.body(),
            json!({"code": "FORBIDDEN", "message": "Agent 'voice-agent' is not declared in the registry.", "trace_id": "t"})
        );

        let internal = DispatchError::Internal {
            trace_id: "t".into(),
            reason: "secret stack trace".into(),
        };
        assert_eq!(internal.body()["message"], "Agent processing failed");

        let validation = DispatchError::Validation(EnvelopeError {
            details: vec![ValidationIssue {
                code: "invalid_string".into(),
                path: vec!["trace_id".into()],
                message: "Invalid uuid".into(),
            }],
        });
        let body = validation.body();
        assert_eq!(body["error"], "Invalid Envelope Schema");
        assert_eq!(body["details"][0]["path"][0], "trace_id");
        assert!(body["timestamp"].is_string());
    }
}
