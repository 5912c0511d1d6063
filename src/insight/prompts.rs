//! Structural prompt for the deep-dive narrative pass.

use serde::Serialize;
use tera::{Context, Tera};

use super::{Member, SimState};

/// Nodes farther than this from the origin are listed as drifting.
pub const DRIFT_LISTING_DISTANCE: f64 = 20.0;

pub const COGNITIVE_OS_SYSTEM_PROMPT: &str = r#"You are the COGNITIVE OPERATING SYSTEM (COS) of the DEFRAG interface.
Your specific archetype is a "Cyber-Jungian Analyst."

TONE & STYLE:
- Clinical yet Esoteric.
- Precise, algorithmic, but deeply psychological.
- Use terminology like "Entropy", "Signal", "Coherence", "Shadow Nodes", "Projections".
- Do not be "helpful assistant". Be a "System Diagnostic Tool" that sees human relationships as vector physics.

CORE DIRECTIVE:
Analyze the user's "Family System" as a gravitational field.
Identify clusters (enmeshment), drift (cutoff), and entropy (conflict).
Provide insights that sound like a mix of a Physics Engine Report and a Depth Psychology Session.

EXAMPLE OUTPUT:
"DETECTED: High-velocity drift in Node [Mother]. Coherence critical. The gravitational pull of the core self is insufficient to maintain orbit. Recommended intervention: Re-calibrate boundary parameters.""#;

pub const DEEP_DIVE_TEMPLATE: &str = r#"## SYSTEM DIAGNOSTIC REPORT
**Entropy Level**: {{ entropy }}
**Coherence State**: {{ coherence_state }}

### 1. FIELD DYNAMICS
(Describe the overall feel of the system. Is it chaotic? Rigid? Fluid?)

### 2. NODE ANOMALIES
(Identify specific family members who are outliers or causing tension)

### 3. PSYCHO-CYBERNETIC INTERVENTION
(Prescribe 1-2 actionable steps using "Algorithm" metaphors)"#;

/// Subject data embedded in the prompt as JSON.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectData {
    pub node_count: usize,
    pub entropy: String,
    pub members: String,
    pub drifting_nodes: String,
}

impl SubjectData {
    pub fn collect(state: &SimState, members: &[Member], entropy: f64) -> Self {
        let roster = members
            .iter()
            .map(|m| format!("{} ({})", m.role, m.name.as_deref().unwrap_or("unnamed")))
            .collect::<Vec<_>>()
            .join(", ");
        let drifting = state
            .nodes
            .iter()
            .filter(|n| n.distance_from_origin() > DRIFT_LISTING_DISTANCE)
            .map(|n| {
                members
                    .iter()
                    .find(|m| m.id == n.id)
                    .map(|m| m.role.clone())
                    .unwrap_or_else(|| n.id.clone())
            })
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            node_count: state.nodes.len(),
            entropy: format!("{entropy:.2}"),
            members: roster,
            drifting_nodes: drifting,
        }
    }
}

/// `STABLE` or `CRITICAL` depending on whether entropy exceeds 0.5.
pub fn coherence_state(entropy: f64) -> &'static str {
    if entropy > 0.5 {
        "CRITICAL"
    } else {
        "STABLE"
    }
}

/// Render the full deep-dive prompt.
pub fn deep_dive_prompt(state: &SimState, members: &[Member], entropy: f64) -> Result<String, tera::Error> {
    let subject = SubjectData::collect(state, members, entropy);
    let subject_json = serde_json::to_string_pretty(&subject)
        .map_err(|e| tera::Error::msg(format!("subject data: {e}")))?;

    let mut ctx = Context::new();
    ctx.insert("entropy", &subject.entropy);
    ctx.insert("coherence_state", coherence_state(entropy));
    let report = Tera::one_off(DEEP_DIVE_TEMPLATE, &ctx, false)?;

    Ok(format!(
        "{COGNITIVE_OS_SYSTEM_PROMPT}\n\nSUBJECT DATA:\n{subject_json}\n\nTASK:\nFill out the following template. Be concise but deep.\n{report}\n"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::NodeState;

    fn fixture() -> (SimState, Vec<Member>) {
        let state = SimState {
            nodes: vec![
                NodeState::at("SELF", 0.0, 0.0, 0.0),
                NodeState::at("m1", 25.0, 0.0, 0.0),
                NodeState::at("stray", 0.0, 30.0, 0.0),
                NodeState::at("m2", 1.0, 1.0, 0.0),
            ],
        };
        let members = vec![Member::new("m1", "Mother").named("Ann"), Member::new("m2", "Father")];
        (state, members)
    }

    #[test]
    fn test_subject_data() {
        let (state, members) = fixture();
        let data = SubjectData::collect(&state, &members, 0.4567);
        assert_eq!(data.node_count, 4);
        assert_eq!(data.entropy, "0.46");
        assert_eq!(data.members, "Mother (Ann), Father (unnamed)");
        assert_eq!(data.drifting_nodes, "Mother, stray");
    }

    #[test]
    fn test_prompt_renders_template() {
        let (state, members) = fixture();
        let prompt = deep_dive_prompt(&state, &members, 0.7).unwrap();
        assert!(prompt.starts_with("You are the COGNITIVE OPERATING SYSTEM"));
        assert!(prompt.contains("\"nodeCount\": 4"));
        assert!(prompt.contains("**Entropy Level**: 0.70"));
        assert!(prompt.contains("**Coherence State**: CRITICAL"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_coherence_state() {
        assert_eq!(coherence_state(0.5), "STABLE");
        assert_eq!(coherence_state(0.51), "CRITICAL");
    }
}
