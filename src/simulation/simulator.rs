use chrono::Utc;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{NodeType, RelationshipType, SimulationError, SimulationNode, SimulationStats};
use crate::vector::Vector3;

pub const SELF_ID: &str = "SELF";
pub const SELF_MASS: f64 = 10.0;
pub const DEFAULT_FIELD_STRENGTH: f64 = 0.5;

/// Outward push applied inside `REPULSION_RADIUS`.
const REPULSION: f64 = 0.5;
const REPULSION_RADIUS: f64 = 2.0;
/// Gravity coefficient, scaled by the field strength.
const GRAVITY: f64 = 0.05;
const DAMPING: f64 = 0.95;
/// Nodes this close to the origin are not integrated.
const SINGULARITY: f64 = 0.1;
/// Half-width of the seeding cube.
const SPAWN_HALF_WIDTH: f64 = 5.0;

/// Position record in a [`CosmicState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: String,
    pub pos: Vector3,
}

/// Snapshot handed to visualizers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CosmicState {
    pub entropy: f64,
    pub field_strength: f64,
    pub vector_map: Vec<NodePosition>,
}

/// Arena-backed particle simulator.
#[derive(Debug, Clone)]
pub struct Simulator {
    nodes: Vec<SimulationNode>,
    field_strength: f64,
    rng: SmallRng,
}

impl Simulator {
    /// An empty simulator holding only the SELF node, seeded from entropy.
    pub fn new() -> Self {
        Self::from_rng(SmallRng::from_entropy())
    }

    /// An empty simulator whose population draws are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(SmallRng::seed_from_u64(seed))
    }

    fn from_rng(rng: SmallRng) -> Self {
        Self {
            nodes: vec![self_node()],
            field_strength: DEFAULT_FIELD_STRENGTH,
            rng,
        }
    }

    // -----------------------------------------------------------------------
    // Population
    // -----------------------------------------------------------------------

    /// Replace every node with SELF plus `size` randomly placed members.
    pub fn seed(&mut self, size: usize) {
        self.nodes.clear();
        self.nodes.push(self_node());
        for i in 0..size {
            let position = Vector3::new(
                (self.rng.gen::<f64>() - 0.5) * 2.0 * SPAWN_HALF_WIDTH,
                (self.rng.gen::<f64>() - 0.5) * 2.0 * SPAWN_HALF_WIDTH,
                (self.rng.gen::<f64>() - 0.5) * 2.0 * SPAWN_HALF_WIDTH,
            );
            let mass = 1.0 + self.rng.gen::<f64>();
            let rel = RelationshipType::ALL[self.rng.gen_range(0..RelationshipType::ALL.len())];
            self.nodes
                .push(SimulationNode::member(format!("node_{i}"), position, mass, Some(rel)));
        }
        log::debug!("simulator seeded with {} member nodes", size);
    }

    /// Add one node. A second SELF node or a repeated id is rejected.
    pub fn add_node(&mut self, node: SimulationNode) -> Result<(), SimulationError> {
        if node.node_type == NodeType::SelfNode {
            return Err(SimulationError::DuplicateSelf);
        }
        if self.nodes.iter().any(|n| n.id == node.id) {
            return Err(SimulationError::DuplicateId(node.id));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn nodes(&self) -> &[SimulationNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn field_strength(&self) -> f64 {
        self.field_strength
    }

    pub fn set_field_strength(&mut self, field_strength: f64) {
        self.field_strength = field_strength;
    }

    // -----------------------------------------------------------------------
    // Integration
    // -----------------------------------------------------------------------

    /// Integrate `iterations` explicit Euler steps.
    pub fn step(&mut self, iterations: usize) -> SimulationStats {
        let gravity = -GRAVITY * self.field_strength;
        let mut max_velocity: f64 = 0.0;

        for _ in 0..iterations {
            for node in self.nodes.iter_mut() {
                if node.node_type == NodeType::SelfNode {
                    continue;
                }
                let d = node.position.norm();
                if d < SINGULARITY {
                    continue;
                }

                let mut force = if d < REPULSION_RADIUS { REPULSION } else { gravity };
                if let Some(rel) = node.relationship_type {
                    force *= rel.force_factor();
                }

                let dir = node.position * (1.0 / d);
                node.velocity = (node.velocity + dir * force) * DAMPING;
                node.position = node.position + node.velocity;

                max_velocity = max_velocity.max(node.velocity.norm());
            }
        }

        SimulationStats {
            node_count: self.nodes.len(),
            iterations,
            max_velocity,
            stability_score: (1.0 - max_velocity / 2.0).max(0.0),
            timestamp: Utc::now(),
        }
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Entropy over every node: `min(2 * mean speed, 1)`, 0 when empty.
    pub fn entropy(&self) -> f64 {
        mean_speed_entropy(self.nodes.iter().map(|n| n.velocity.norm()))
    }

    pub fn cosmic_state(&self) -> CosmicState {
        CosmicState {
            entropy: self.entropy(),
            field_strength: self.field_strength,
            vector_map: self
                .nodes
                .iter()
                .map(|n| NodePosition {
                    id: n.id.clone(),
                    pos: n.position,
                })
                .collect(),
        }
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

/// `min(2 * mean(speeds), 1)`; an empty iterator gives 0.
pub fn mean_speed_entropy(speeds: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = speeds.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        return 0.0;
    }
    (2.0 * sum / count as f64).min(1.0)
}

fn self_node() -> SimulationNode {
    SimulationNode {
        id: SELF_ID.to_string(),
        position: Vector3::ZERO,
        velocity: Vector3::ZERO,
        mass: SELF_MASS,
        node_type: NodeType::SelfNode,
        relationship_type: None,
    }
}
