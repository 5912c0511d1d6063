//! # Relational Simulator
//!
//! A small particle system: one fixed SELF node at the origin and a
//! population of member nodes pulled toward it (or pushed away at close
//! range). Nodes live in one owned arena and every mutation goes through
//! `&mut Simulator`, so callers that share a simulator wrap it in a mutex.

pub mod simulator;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vector::Vector3;

pub use simulator::{CosmicState, NodePosition, Simulator, DEFAULT_FIELD_STRENGTH, SELF_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    #[serde(rename = "SELF")]
    SelfNode,
    Family,
    Cosmic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipType {
    Close,
    Conflict,
    Distant,
    Cutoff,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 4] = [
        RelationshipType::Close,
        RelationshipType::Conflict,
        RelationshipType::Distant,
        RelationshipType::Cutoff,
    ];

    /// Multiplier applied to the radial force.
    pub fn force_factor(&self) -> f64 {
        match self {
            RelationshipType::Conflict => 2.0,
            RelationshipType::Distant => 0.1,
            _ => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationNode {
    pub id: String,
    pub position: Vector3,
    pub velocity: Vector3,
    pub mass: f64,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<RelationshipType>,
}

impl SimulationNode {
    /// A resting member node.
    pub fn member(
        id: impl Into<String>,
        position: Vector3,
        mass: f64,
        relationship_type: Option<RelationshipType>,
    ) -> Self {
        Self {
            id: id.into(),
            position,
            velocity: Vector3::ZERO,
            mass,
            node_type: NodeType::Family,
            relationship_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStats {
    pub node_count: usize,
    pub iterations: usize,
    pub max_velocity: f64,
    pub stability_score: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("simulation already has a SELF node")]
    DuplicateSelf,

    #[error("node id already present: {0}")]
    DuplicateId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_wire_format() {
        let node = SimulationNode::member("node_0", Vector3::new(1.0, 0.0, 0.0), 1.5, Some(RelationshipType::Conflict));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "FAMILY");
        assert_eq!(json["relationshipType"], "conflict");

        let json = serde_json::to_value(NodeType::SelfNode).unwrap();
        assert_eq!(json, "SELF");
    }
}
