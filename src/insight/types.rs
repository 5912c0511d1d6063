use serde::{Deserialize, Serialize};

use crate::simulation::Simulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsightType {
    DriftWarning,
    ClusterDetected,
    HighEntropy,
    PatternRecognition,
    SchemaCoherence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Analysis depth unlocked by the current entropy.
///
/// Ordered: `Detection < Mapping < Integration < Calibration`. A stressed
/// system (high entropy) only gets the surface detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PassLevel {
    Detection,
    Mapping,
    Integration,
    Calibration,
}

impl PassLevel {
    pub fn from_entropy(entropy: f64) -> Self {
        if entropy > 0.8 {
            PassLevel::Detection
        } else if entropy > 0.5 {
            PassLevel::Mapping
        } else if entropy > 0.2 {
            PassLevel::Integration
        } else {
            PassLevel::Calibration
        }
    }
}

/// Subscription tier of the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    #[default]
    Basic,
    Pro,
    Expert,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_level: Option<PassLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coherence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub id: String,
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub related_node_ids: Vec<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<InsightMetrics>,
}

/// Family member metadata matched against simulation nodes by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Member {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name if present, else role.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.role)
    }
}

/// Flattened node as the insight engine reads it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeState {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub vx: f64,
    #[serde(default)]
    pub vy: f64,
    #[serde(default)]
    pub vz: f64,
}

impl NodeState {
    pub fn at(id: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            z,
            ..Default::default()
        }
    }

    pub fn with_velocity(mut self, vx: f64, vy: f64, vz: f64) -> Self {
        self.vx = vx;
        self.vy = vy;
        self.vz = vz;
        self
    }

    pub fn distance_from_origin(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(&self, other: &NodeState) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2)).sqrt()
    }

    pub fn speed(&self) -> f64 {
        (self.vx * self.vx + self.vy * self.vy + self.vz * self.vz).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimState {
    #[serde(default)]
    pub nodes: Vec<NodeState>,
}

impl From<&Simulator> for SimState {
    fn from(sim: &Simulator) -> Self {
        Self {
            nodes: sim
                .nodes()
                .iter()
                .map(|n| NodeState {
                    id: n.id.clone(),
                    x: n.position.x,
                    y: n.position.y,
                    z: n.position.z,
                    vx: n.velocity.x,
                    vy: n.velocity.y,
                    vz: n.velocity.z,
                })
                .collect(),
        }
    }
}
