//! Priors fed into the vector engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Vector3;

/// Bodies whose hard aspects add transit gain.
pub const GAIN_BODIES: [&str; 4] = ["sun", "moon", "mars", "saturn"];

/// Aspect types that count as hard.
pub const HARD_ASPECTS: [&str; 3] = ["conjunction", "square", "opposition"];

/// Gain contributed by one hard transit.
pub const TRANSIT_GAIN: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageProfile {
    pub bias_vector: Vector3,
}

impl LineageProfile {
    pub fn new(bias_vector: Vector3) -> Self {
        Self { bias_vector }
    }
}

/// One active transit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transit {
    pub body: String,
    #[serde(rename = "type")]
    pub aspect: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orb: Option<f64>,
}

impl Transit {
    pub fn new(body: impl Into<String>, aspect: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            aspect: aspect.into(),
            aspect_to: None,
            orb: None,
        }
    }

    /// A hard aspect touching one of the gain bodies. Case-insensitive.
    pub fn is_hard(&self) -> bool {
        let body = self.body.to_ascii_lowercase();
        let aspect = self.aspect.to_ascii_lowercase();
        HARD_ASPECTS.contains(&aspect.as_str()) && GAIN_BODIES.contains(&body.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AstrologyProfile {
    #[serde(default)]
    pub astro_prior: Vector3,
    #[serde(default)]
    pub transits: Vec<Transit>,
}

impl AstrologyProfile {
    /// Summed transit gain, capped at 1.0.
    pub fn transit_gain(&self) -> f64 {
        let hard = self.transits.iter().filter(|t| t.is_hard()).count();
        (hard as f64 * TRANSIT_GAIN).min(1.0)
    }
}

/// Source of astrological profiles for a moment in time.
///
/// Computing positions is outside this crate; implementors wrap whatever
/// ephemeris service the deployment has.
pub trait Ephemeris: Send + Sync {
    fn profile_at(&self, ts: DateTime<Utc>) -> Option<AstrologyProfile>;
}

/// Ephemeris that never has data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEphemeris;

impl Ephemeris for NoEphemeris {
    fn profile_at(&self, _ts: DateTime<Utc>) -> Option<AstrologyProfile> {
        None
    }
}
