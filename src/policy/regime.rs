//! Operating regimes and the sources that compute them.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{load_yaml, PolicyError};

/// Message used when a holding regime has none configured.
pub const DEFAULT_HOLD_REASON: &str = "System stabilizing.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    #[default]
    Nominal,
    Silence,
    Hold,
    HighLatency,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Nominal => "NOMINAL",
            Regime::Silence => "SILENCE",
            Regime::Hold => "HOLD",
            Regime::HighLatency => "HIGH_LATENCY",
        }
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimeSpec {
    pub name: Regime,
    pub narrative_allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_mode: Option<String>,
}

impl RegimeSpec {
    fn new(name: Regime, narrative_allowed: bool, hold_message: Option<&str>, ui_mode: &str) -> Self {
        Self {
            name,
            narrative_allowed,
            hold_message: hold_message.map(str::to_string),
            ui_mode: Some(ui_mode.to_string()),
        }
    }
}

/// The regime specification table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeTable {
    pub regimes: Vec<RegimeSpec>,
}

impl Default for RegimeTable {
    fn default() -> Self {
        Self {
            regimes: vec![
                RegimeSpec::new(Regime::Nominal, true, None, "standard"),
                RegimeSpec::new(Regime::Silence, false, Some("Silence protocol active. Narrative output paused."), "minimal"),
                RegimeSpec::new(Regime::Hold, false, Some(DEFAULT_HOLD_REASON), "hold"),
                RegimeSpec::new(
                    Regime::HighLatency,
                    false,
                    Some("High latency detected. Narrative output deferred."),
                    "degraded",
                ),
            ],
        }
    }
}

impl RegimeTable {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PolicyError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, PolicyError> {
        let table: Self = load_yaml(path)?;
        log::info!("loaded {} regimes from {}", table.regimes.len(), path.display());
        Ok(table)
    }

    pub fn get(&self, regime: Regime) -> Option<&RegimeSpec> {
        self.regimes.iter().find(|r| r.name == regime)
    }

    /// Freeze the spec for `regime` into a per-request snapshot.
    ///
    /// A regime missing from the table allows narrative output.
    pub fn snapshot(&self, regime: Regime) -> RegimeSnapshot {
        let spec = self.get(regime);
        if spec.is_none() {
            log::warn!("regime {} has no spec; allowing narrative", regime);
        }
        RegimeSnapshot {
            regime,
            narrative_allowed: spec.map(|s| s.narrative_allowed).unwrap_or(true),
            hold_message: spec.and_then(|s| s.hold_message.clone()),
            ui_mode: spec.and_then(|s| s.ui_mode.clone()),
            computed_at: Utc::now(),
        }
    }
}

/// Regime as seen by one request. Computed once, never re-read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimeSnapshot {
    pub regime: Regime,
    pub narrative_allowed: bool,
    pub hold_message: Option<String>,
    pub ui_mode: Option<String>,
    pub computed_at: DateTime<Utc>,
}

impl RegimeSnapshot {
    pub fn hold_reason(&self) -> &str {
        self.hold_message.as_deref().unwrap_or(DEFAULT_HOLD_REASON)
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Computes the system-wide regime.
pub trait RegimeSource: Send + Sync {
    /// The regime the system would pick on its own.
    fn current(&self) -> Regime;

    /// Feed back the latency of a completed dispatch.
    fn record_latency(&self, _latency: Duration) {}

    /// Combine the system regime with the one an envelope asked for.
    ///
    /// A non-NOMINAL request wins; otherwise the system regime stands.
    fn compute(&self, requested: Option<Regime>) -> Regime {
        match requested {
            Some(r) if r != Regime::Nominal => r,
            _ => self.current(),
        }
    }
}

/// Always reports the same regime.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRegime(pub Regime);

impl RegimeSource for StaticRegime {
    fn current(&self) -> Regime {
        self.0
    }
}

/// Reports HIGH_LATENCY while the smoothed dispatch latency is above a
/// threshold.
#[derive(Debug)]
pub struct LatencyRegime {
    threshold_ms: f64,
    alpha: f64,
    ewma_ms: Mutex<Option<f64>>,
}

impl LatencyRegime {
    pub const DEFAULT_ALPHA: f64 = 0.2;

    pub fn new(threshold: Duration) -> Self {
        Self::with_alpha(threshold, Self::DEFAULT_ALPHA)
    }

    /// `alpha` is the weight of the newest sample, clamped to `(0, 1]`.
    pub fn with_alpha(threshold: Duration, alpha: f64) -> Self {
        Self {
            threshold_ms: threshold.as_secs_f64() * 1000.0,
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            ewma_ms: Mutex::new(None),
        }
    }

    /// Smoothed latency, if any sample has been recorded.
    pub fn smoothed_ms(&self) -> Option<f64> {
        *self.ewma_ms.lock()
    }
}

impl RegimeSource for LatencyRegime {
    fn current(&self) -> Regime {
        match self.smoothed_ms() {
            Some(ms) if ms > self.threshold_ms => Regime::HighLatency,
            _ => Regime::Nominal,
        }
    }

    fn record_latency(&self, latency: Duration) {
        let sample = latency.as_secs_f64() * 1000.0;
        let mut ewma = self.ewma_ms.lock();
        let next = match *ewma {
            Some(prev) => self.alpha * sample + (1.0 - self.alpha) * prev,
            None => sample,
        };
        *ewma = Some(next);
        log::trace!("dispatch latency {:.1}ms, smoothed {:.1}ms", sample, next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = RegimeTable::default();
        assert!(table.get(Regime::Nominal).unwrap().narrative_allowed);
        for r in [Regime::Silence, Regime::Hold, Regime::HighLatency] {
            assert!(!table.get(r).unwrap().narrative_allowed, "{r}");
        }
    }

    #[test]
    fn test_yaml_round_trip_names() {
        let yaml = r#"
regimes:
  - name: NOMINAL
    narrativeAllowed: true
  - name: HIGH_LATENCY
    narrativeAllowed: false
    uiMode: degraded
"#;
        let table = RegimeTable::from_yaml_str(yaml).unwrap();
        let snap = table.snapshot(Regime::HighLatency);
        assert!(!snap.narrative_allowed);
        assert_eq!(snap.hold_reason(), DEFAULT_HOLD_REASON);
        assert_eq!(snap.ui_mode.as_deref(), Some("degraded"));
    }

    #[test]
    fn test_missing_spec_allows_narrative() {
        let table = RegimeTable { regimes: vec![] };
        assert!(table.snapshot(Regime::Silence).narrative_allowed);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regimes.yaml");
        std::fs::write(&path, "regimes:\n  - name: HOLD\n    narrativeAllowed: false\n    holdMessage: wait\n").unwrap();
        let table = RegimeTable::from_file(&path).unwrap();
        assert_eq!(table.snapshot(Regime::Hold).hold_reason(), "wait");
        assert!(RegimeTable::from_file(&dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn test_requested_regime_is_honored() {
        let source = StaticRegime(Regime::Nominal);
        assert_eq!(source.compute(None), Regime::Nominal);
        assert_eq!(source.compute(Some(Regime::Nominal)), Regime::Nominal);
        assert_eq!(source.compute(Some(Regime::Silence)), Regime::Silence);

        let stressed = StaticRegime(Regime::HighLatency);
        assert_eq!(stressed.compute(Some(Regime::Nominal)), Regime::HighLatency);
    }

    #[test]
    fn test_latency_regime_tracks_ewma() {
        let source = LatencyRegime::with_alpha(Duration::from_millis(100), 0.5);
        assert_eq!(source.current(), Regime::Nominal);

        source.record_latency(Duration::from_millis(50));
        assert_eq!(source.current(), Regime::Nominal);

        source.record_latency(Duration::from_millis(250));
        // 0.5 * 250 + 0.5 * 50
        assert!((source.smoothed_ms().unwrap() - 150.0).abs() < 1e-9);
        assert_eq!(source.current(), Regime::HighLatency);

        source.record_latency(Duration::from_millis(10));
        source.record_latency(Duration::from_millis(10));
        assert_eq!(source.current(), Regime::Nominal);
    }
}
