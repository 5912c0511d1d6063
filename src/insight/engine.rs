use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::prompts::deep_dive_prompt;
use super::{Insight, InsightMetrics, InsightType, Member, PassLevel, Severity, SimState, Tier};
use crate::model::GenerativeModel;
use crate::schema::{integrate_schema, SchemaNode, SchemaObject};
use crate::simulation::simulator::mean_speed_entropy;

/// Nodes farther than this raise a drift warning.
pub const DRIFT_DISTANCE: f64 = 300.0;
/// Drift beyond this calls for the bond-over-correctness principle.
pub const SEVERE_DRIFT_DISTANCE: f64 = 500.0;
/// Pairs closer than this are flagged as enmeshed.
pub const CLUSTER_DISTANCE: f64 = 2.0;
pub const COHERENCE_FLOOR: f64 = 0.5;
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(30);

const OFFLINE_DESCRIPTION: &str =
    "Deep Intelligence requires a neural link (API Key). Please configure system parameters.";

/// Tiered analysis over a simulation snapshot.
#[derive(Clone)]
pub struct InsightEngine {
    model: Option<Arc<dyn GenerativeModel>>,
    model_timeout: Duration,
}

impl std::fmt::Debug for InsightEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightEngine")
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .field("model_timeout", &self.model_timeout)
            .finish()
    }
}

impl Default for InsightEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl InsightEngine {
    pub fn new(model: Option<Arc<dyn GenerativeModel>>) -> Self {
        Self {
            model,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Entropy of the snapshot: `min(2 * mean speed, 1)`.
    pub fn entropy(state: &SimState) -> f64 {
        mean_speed_entropy(state.nodes.iter().map(|n| n.speed()))
    }

    /// Run every detector the tier and pass level unlock, in order.
    pub async fn analyze(&self, state: &SimState, members: &[Member], tier: Tier) -> Vec<Insight> {
        let mut insights = Vec::new();
        let entropy = Self::entropy(state);
        let pass_level = PassLevel::from_entropy(entropy);
        log::debug!(
            "analyze: nodes={} entropy={:.3} pass={:?} tier={:?}",
            state.nodes.len(),
            entropy,
            pass_level,
            tier
        );

        // Drift runs at every pass level.
        detect_drift(state, members, &mut insights);

        if tier != Tier::Basic && pass_level >= PassLevel::Mapping {
            detect_clusters(state, &mut insights);
        }

        if tier != Tier::Basic && pass_level >= PassLevel::Integration {
            check_coherence(members, pass_level, &mut insights);
        }

        if tier == Tier::Expert && pass_level >= PassLevel::Mapping {
            insights.push(self.deep_dive(state, members, entropy).await);
        }

        insights
    }

    async fn deep_dive(&self, state: &SimState, members: &[Member], entropy: f64) -> Insight {
        let Some(model) = self.model.as_ref() else {
            log::warn!("insight engine has no generative model; returning offline state");
            return offline_insight();
        };

        let prompt = match deep_dive_prompt(state, members, entropy) {
            Ok(p) => p,
            Err(e) => {
                log::error!("deep dive prompt failed to render: {e}");
                return offline_insight();
            }
        };

        match tokio::time::timeout(self.model_timeout, model.generate_content(&prompt)).await {
            Ok(Ok(content)) => {
                let now = now_ms();
                Insight {
                    id: format!("deep-dive-{now}"),
                    insight_type: InsightType::PatternRecognition,
                    severity: Severity::High,
                    title: "System Deep Scan".into(),
                    description: content,
                    related_node_ids: vec![],
                    timestamp: now,
                    metrics: Some(InsightMetrics {
                        entropy: Some(entropy),
                        ..Default::default()
                    }),
                }
            }
            Ok(Err(e)) => {
                log::error!("deep dive generation failed ({}): {e}", model.name());
                offline_insight()
            }
            Err(_) => {
                log::error!(
                    "deep dive generation timed out after {:?} ({})",
                    self.model_timeout,
                    model.name()
                );
                offline_insight()
            }
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn clinical_principle(distance: f64) -> Option<&'static str> {
    if distance > SEVERE_DRIFT_DISTANCE {
        Some("RELATE_003: Choose bond over correctness")
    } else if distance > DRIFT_DISTANCE {
        Some("UPR_001: Safety container required")
    } else {
        None
    }
}

fn detect_drift(state: &SimState, members: &[Member], insights: &mut Vec<Insight>) {
    for node in &state.nodes {
        let distance = node.distance_from_origin();
        if distance <= DRIFT_DISTANCE {
            continue;
        }
        let Some(member) = members.iter().find(|m| m.id == node.id) else {
            continue;
        };
        let now = now_ms();
        insights.push(Insight {
            id: format!("drift-{}-{}", node.id, now),
            insight_type: InsightType::DriftWarning,
            severity: Severity::Medium,
            title: format!("Drift Detected: {}", member.label()),
            description: format!("{} is drifting to the periphery.", member.role),
            related_node_ids: vec![node.id.clone()],
            timestamp: now,
            metrics: Some(InsightMetrics {
                pass_level: Some(PassLevel::Detection),
                ..Default::default()
            }),
        });
        if let Some(principle) = clinical_principle(distance) {
            insights.push(Insight {
                id: format!("clinical-{}-{}", node.id, now),
                insight_type: InsightType::PatternRecognition,
                severity: Severity::High,
                title: "Clinical Intervention Trigger".into(),
                description: format!("Recommended Principle: {principle}"),
                related_node_ids: vec![node.id.clone()],
                timestamp: now,
                metrics: None,
            });
        }
    }
}

fn detect_clusters(state: &SimState, insights: &mut Vec<Insight>) {
    for (i, a) in state.nodes.iter().enumerate() {
        for b in &state.nodes[i + 1..] {
            if a.distance(b) < CLUSTER_DISTANCE {
                insights.push(Insight {
                    id: format!("cluster-{}-{}", a.id, b.id),
                    insight_type: InsightType::ClusterDetected,
                    severity: Severity::Medium,
                    title: "Fusion/Enmeshment Risk".into(),
                    description: format!("Nodes {} and {} are dangerously close.", a.id, b.id),
                    related_node_ids: vec![a.id.clone(), b.id.clone()],
                    timestamp: now_ms(),
                    metrics: None,
                });
            }
        }
    }
}

fn check_coherence(members: &[Member], pass_level: PassLevel, insights: &mut Vec<Insight>) {
    let schema = SchemaObject {
        nodes: members
            .iter()
            .map(|m| SchemaNode::new(m.id.clone(), m.role.clone(), 0.5))
            .collect(),
        edges: vec![],
        coherence_score: 0.0,
    };
    let integrated = integrate_schema(&schema);
    if integrated.coherence_score < COHERENCE_FLOOR {
        let now = now_ms();
        insights.push(Insight {
            id: format!("coherence-{now}"),
            insight_type: InsightType::SchemaCoherence,
            severity: Severity::High,
            title: "Low Cognitive Coherence".into(),
            description: format!(
                "Schema integration failed to resolve contradictions. Coherence Score: {:.2}",
                integrated.coherence_score
            ),
            related_node_ids: vec![],
            timestamp: now,
            metrics: Some(InsightMetrics {
                coherence: Some(integrated.coherence_score),
                pass_level: Some(pass_level),
                ..Default::default()
            }),
        });
    }
}

fn offline_insight() -> Insight {
    let now = now_ms();
    Insight {
        id: format!("offline-{now}"),
        insight_type: InsightType::PatternRecognition,
        severity: Severity::Low,
        title: "Cognitive Module Offline".into(),
        description: OFFLINE_DESCRIPTION.into(),
        related_node_ids: vec![],
        timestamp: now,
        metrics: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::NodeState;
    use crate::model::testing::ScriptedModel;

    /// Every node moving at `speed` along x gives entropy `min(2 * speed, 1)`.
    fn state_with_speed(speed: f64, nodes: Vec<NodeState>) -> SimState {
        SimState {
            nodes: nodes.into_iter().map(|n| n.with_velocity(speed, 0.0, 0.0)).collect(),
        }
    }

    fn family() -> Vec<Member> {
        vec![
            Member::new("m1", "Mother").named("Ann"),
            Member::new("m2", "Father"),
            Member::new("m3", "Sister"),
        ]
    }

    fn layout() -> Vec<NodeState> {
        vec![
            NodeState::at("SELF", 0.0, 0.0, 0.0),
            NodeState::at("m1", 350.0, 0.0, 0.0),
            NodeState::at("m2", 1.0, 0.0, 0.0),
            NodeState::at("m3", 0.0, 600.0, 0.0),
        ]
    }

    fn types(insights: &[Insight]) -> Vec<InsightType> {
        insights.iter().map(|i| i.insight_type).collect()
    }

    #[tokio::test]
    async fn test_empty_state_is_calibrated() {
        assert_eq!(InsightEngine::entropy(&SimState::default()), 0.0);
        let insights = InsightEngine::default()
            .analyze(&SimState::default(), &[], Tier::Basic)
            .await;
        assert!(insights.is_empty());
    }

    #[tokio::test]
    async fn test_drift_pairs_warning_with_principle() {
        let state = state_with_speed(0.0, layout());
        let insights = InsightEngine::default().analyze(&state, &family(), Tier::Basic).await;
        assert_eq!(
            types(&insights),
            vec![
                InsightType::DriftWarning,
                InsightType::PatternRecognition,
                InsightType::DriftWarning,
                InsightType::PatternRecognition,
            ]
        );
        assert_eq!(insights[0].title, "Drift Detected: Ann");
        assert_eq!(insights[0].description, "Mother is drifting to the periphery.");
        assert_eq!(insights[1].description, "Recommended Principle: UPR_001: Safety container required");
        assert_eq!(insights[2].title, "Drift Detected: Sister");
        assert_eq!(
            insights[3].description,
            "Recommended Principle: RELATE_003: Choose bond over correctness"
        );
        assert_eq!(insights[1].severity, Severity::High);
    }

    #[tokio::test]
    async fn test_unmatched_far_node_is_ignored() {
        let state = state_with_speed(0.0, vec![NodeState::at("stranger", 400.0, 0.0, 0.0)]);
        let insights = InsightEngine::default().analyze(&state, &family(), Tier::Basic).await;
        assert!(insights.is_empty());
    }

    #[tokio::test]
    async fn test_pro_tier_at_calibration_clusters_and_checks_coherence() {
        let state = state_with_speed(0.0, layout());
        let insights = InsightEngine::default().analyze(&state, &family(), Tier::Pro).await;
        let t = types(&insights);
        assert_eq!(t.iter().filter(|x| **x == InsightType::ClusterDetected).count(), 1);
        let cluster = insights
            .iter()
            .find(|i| i.insight_type == InsightType::ClusterDetected)
            .unwrap();
        assert_eq!(cluster.id, "cluster-SELF-m2");
        assert_eq!(cluster.related_node_ids, vec!["SELF", "m2"]);
        // Equal affect weights collapse the roster into one isolated node.
        let coherence = insights.last().unwrap();
        assert_eq!(coherence.insight_type, InsightType::SchemaCoherence);
        assert_eq!(coherence.metrics.as_ref().unwrap().coherence, Some(0.0));
        assert!(coherence.description.ends_with("Coherence Score: 0.00"));
    }

    #[tokio::test]
    async fn test_mapping_skips_coherence() {
        // entropy 0.6 -> MAPPING
        let state = state_with_speed(0.3, layout());
        let insights = InsightEngine::default().analyze(&state, &family(), Tier::Pro).await;
        let t = types(&insights);
        assert!(t.contains(&InsightType::ClusterDetected));
        assert!(!t.contains(&InsightType::SchemaCoherence));
    }

    #[tokio::test]
    async fn test_detection_blocks_deep_analysis_even_for_expert() {
        // entropy 1.0 -> DETECTION
        let model = Arc::new(ScriptedModel::replying("## SYSTEM DIAGNOSTIC REPORT"));
        let engine = InsightEngine::new(Some(model.clone()));
        let state = state_with_speed(0.6, layout());
        assert!(InsightEngine::entropy(&state) > 0.8);

        let insights = engine.analyze(&state, &family(), Tier::Expert).await;
        let t = types(&insights);
        assert!(!t.contains(&InsightType::ClusterDetected));
        assert!(!t.contains(&InsightType::SchemaCoherence));
        assert!(insights.iter().all(|i| i.title != "System Deep Scan"));
        assert!(insights.iter().all(|i| i.title != "Cognitive Module Offline"));
        assert_eq!(model.call_count(), 0);
        // Drift still reported.
        assert!(t.contains(&InsightType::DriftWarning));
    }

    #[tokio::test]
    async fn test_expert_deep_dive_uses_model() {
        let model = Arc::new(ScriptedModel::replying("## SYSTEM DIAGNOSTIC REPORT\nok"));
        let engine = InsightEngine::new(Some(model.clone()));
        let state = state_with_speed(0.3, layout());

        let insights = engine.analyze(&state, &family(), Tier::Expert).await;
        let last = insights.last().unwrap();
        assert_eq!(last.title, "System Deep Scan");
        assert_eq!(last.severity, Severity::High);
        assert!(last.id.starts_with("deep-dive-"));
        let entropy = last.metrics.as_ref().unwrap().entropy.unwrap();
        assert!((entropy - 0.6).abs() < 1e-9);
        assert_eq!(model.call_count(), 1);
        let prompt = model.last_prompt.lock().clone().unwrap();
        assert!(prompt.contains("Mother (Ann)"));
        assert!(prompt.contains("**Coherence State**: CRITICAL"));
    }

    #[tokio::test]
    async fn test_missing_model_degrades_to_offline() {
        let state = state_with_speed(0.0, layout());
        let insights = InsightEngine::default().analyze(&state, &family(), Tier::Expert).await;
        let last = insights.last().unwrap();
        assert_eq!(last.title, "Cognitive Module Offline");
        assert_eq!(last.severity, Severity::Low);
        assert_eq!(last.insight_type, InsightType::PatternRecognition);
        // Heuristic insights are kept.
        assert!(insights.len() > 1);
    }

    #[tokio::test]
    async fn test_model_failure_degrades_to_offline() {
        let engine = InsightEngine::new(Some(Arc::new(ScriptedModel::failing("boom"))));
        let state = state_with_speed(0.0, layout());
        let insights = engine.analyze(&state, &family(), Tier::Expert).await;
        assert_eq!(insights.last().unwrap().title, "Cognitive Module Offline");
    }

    #[tokio::test]
    async fn test_model_timeout_degrades_to_offline() {
        let engine = InsightEngine::new(Some(Arc::new(ScriptedModel::slow(Duration::from_secs(5)))))
            .with_timeout(Duration::from_millis(20));
        let state = state_with_speed(0.0, layout());
        let insights = engine.analyze(&state, &family(), Tier::Expert).await;
        let offline: Vec<_> = insights
            .iter()
            .filter(|i| i.title == "Cognitive Module Offline")
            .collect();
        assert_eq!(offline.len(), 1);
    }
}
