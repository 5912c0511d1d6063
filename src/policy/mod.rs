//! # Dispatch Policy
//!
//! The two system-wide policies the router applies to every request:
//!
//! - **Regime**: the operating mode (NOMINAL, SILENCE, HOLD, HIGH_LATENCY).
//!   It is computed once per request into a [`RegimeSnapshot`]; a regime
//!   that forbids narrative output short-circuits the request into a HOLD
//!   reply before anything runs.
//! - **Tone**: a term-substitution and redaction gate applied to the
//!   textual fields of a dispatch result.
//!
//! Both tables load from YAML and fall back to built-in defaults.
//!
//! ```text
//! envelope.regime ─┐
//!                  ├─► RegimeSource::compute ─► RegimeTable::snapshot ─► HOLD?
//! latency EWMA ────┘
//!
//! result ─► ToneGate::filter_result ─► reply
//! ```

pub mod regime;
pub mod tone;

use thiserror::Error;

pub use regime::{LatencyRegime, Regime, RegimeSnapshot, RegimeSource, RegimeSpec, RegimeTable, StaticRegime};
pub use tone::{ToneConfig, ToneGate, ToneRule};

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid policy YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid tone pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Read a YAML file into `T`.
pub(crate) fn load_yaml<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T, PolicyError> {
    let content = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_yaml::from_str(&content)?)
}
