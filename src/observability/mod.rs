//! # Observability
//!
//! Structured request logging. Each entry is serialized to one JSON line
//! and emitted through `tracing` on the `defrag::log` target. Before
//! emitting, the serialized entry is scanned for PII field names; a match
//! raises an alert on `defrag::pii` and bumps a counter. The entry is
//! still written and the request carries on.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

static PII_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(email|phone|ssn)\b").unwrap());

static LOGGER: Lazy<StructuredLogger> = Lazy::new(StructuredLogger::new);

/// Process-wide logger.
pub fn logger() -> &'static StructuredLogger {
    &LOGGER
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry<'a> {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<&'a Value>,
}

/// Whether a serialized entry mentions a PII field.
pub fn contains_pii(serialized: &str) -> bool {
    PII_PATTERN.is_match(serialized)
}

#[derive(Debug, Default)]
pub struct StructuredLogger {
    pii_alerts: AtomicU64,
}

impl StructuredLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries that tripped the PII guard.
    pub fn pii_alerts(&self) -> u64 {
        self.pii_alerts.load(Ordering::Relaxed)
    }

    /// Serialize, guard and emit one entry. Returns the JSON line.
    pub fn log(
        &self,
        level: LogLevel,
        message: &str,
        trace_id: Option<&str>,
        agent: Option<&str>,
        meta: Option<&Value>,
    ) -> String {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message,
            trace_id,
            agent,
            meta,
        };
        let line = serde_json::to_string(&entry).unwrap_or_else(|e| {
            format!(r#"{{"level":"ERROR","message":"unserializable log entry: {e}"}}"#)
        });

        match level {
            LogLevel::Debug => tracing::debug!(target: "defrag::log", "{}", line),
            LogLevel::Info => tracing::info!(target: "defrag::log", "{}", line),
            LogLevel::Warn => tracing::warn!(target: "defrag::log", "{}", line),
            LogLevel::Error => tracing::error!(target: "defrag::log", "{}", line),
        }

        if contains_pii(&line) {
            self.pii_alerts.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                target: "defrag::pii",
                trace_id = trace_id.unwrap_or("-"),
                "PII pattern detected in log entry"
            );
        }
        line
    }

    pub fn info(&self, message: &str, trace_id: Option<&str>, agent: Option<&str>, meta: Option<&Value>) {
        self.log(LogLevel::Info, message, trace_id, agent, meta);
    }

    pub fn warn(&self, message: &str, trace_id: Option<&str>, agent: Option<&str>, meta: Option<&Value>) {
        self.log(LogLevel::Warn, message, trace_id, agent, meta);
    }

    pub fn error(&self, message: &str, trace_id: Option<&str>, agent: Option<&str>, meta: Option<&Value>) {
        self.log(LogLevel::Error, message, trace_id, agent, meta);
    }
}
