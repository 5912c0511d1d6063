//! # Schema Integration
//!
//! Merges redundant nodes of a semantic graph and scores how coherent the
//! remaining graph is.

use serde::{Deserialize, Serialize};

/// Affect weights closer than this mark two distinct nodes as redundant.
pub const AFFECT_PROXIMITY: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaNode {
    pub id: String,
    pub content: String,
    pub affect_weight: f64,
}

impl SchemaNode {
    pub fn new(id: impl Into<String>, content: impl Into<String>, affect_weight: f64) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            affect_weight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Valence {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaEdge {
    pub source_id: String,
    pub target_id: String,
    pub valence: Valence,
    /// Full strength when absent.
    #[serde(default = "default_strength")]
    pub strength: f64,
}

fn default_strength() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaObject {
    pub nodes: Vec<SchemaNode>,
    #[serde(default)]
    pub edges: Vec<SchemaEdge>,
    #[serde(default)]
    pub coherence_score: f64,
}

/// Merge redundant nodes, drop dangling edges and recompute coherence.
pub fn integrate_schema(schema: &SchemaObject) -> SchemaObject {
    log::debug!("integrating schema with {} nodes", schema.nodes.len());

    let mut kept: Vec<SchemaNode> = Vec::with_capacity(schema.nodes.len());
    let mut merged_ids: Vec<&str> = Vec::new();

    for node in &schema.nodes {
        if merged_ids.contains(&node.id.as_str()) {
            continue;
        }
        let duplicate = kept.iter_mut().find(|k| {
            k.content.to_lowercase() == node.content.to_lowercase()
                || ((k.affect_weight - node.affect_weight).abs() < AFFECT_PROXIMITY && k.id != node.id)
        });
        match duplicate {
            Some(survivor) => {
                survivor.affect_weight = (survivor.affect_weight + node.affect_weight) / 2.0;
                merged_ids.push(&node.id);
            }
            None => kept.push(node.clone()),
        }
    }

    // Edges are not redirected to survivors; an edge touching a merged node is dropped.
    let survives = |id: &str| kept.iter().any(|n| n.id == id);
    let edges: Vec<SchemaEdge> = schema
        .edges
        .iter()
        .filter(|e| survives(&e.source_id) && survives(&e.target_id))
        .cloned()
        .collect();

    let coherence_score = coherence(&kept, &edges);
    log::debug!(
        "schema coherence {:.2} ({} nodes kept, {} edges kept)",
        coherence_score,
        kept.len(),
        edges.len()
    );

    SchemaObject {
        nodes: kept,
        edges,
        coherence_score,
    }
}

/// `valenceRatio * (1 - fragmentation)`, clamped to `[0, 1]`.
///
/// Positive and neutral edges both count toward the valence ratio.
pub fn coherence(nodes: &[SchemaNode], edges: &[SchemaEdge]) -> f64 {
    let valence_ratio = if edges.is_empty() {
        1.0
    } else {
        let non_negative = edges.iter().filter(|e| e.valence != Valence::Negative).count();
        non_negative as f64 / edges.len() as f64
    };

    let fragmentation = if nodes.is_empty() {
        0.0
    } else {
        let unconnected = nodes
            .iter()
            .filter(|n| !edges.iter().any(|e| e.source_id == n.id || e.target_id == n.id))
            .count();
        unconnected as f64 / nodes.len() as f64
    };

    (valence_ratio * (1.0 - fragmentation)).clamp(0.0, 1.0)
}
