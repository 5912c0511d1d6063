//! `update_state`: blend, amplify, classify.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{Archetype, ArchetypeWeights, AstrologyProfile, Intervention, LineageProfile, Vector3};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const LAMBDA_LINEAGE: f64 = 0.6;
pub const LAMBDA_ASTRO: f64 = 0.4;
pub const LAMBDA_USER: f64 = 0.7;
pub const ALPHA_BASE: f64 = 0.4;
/// Loop detection threshold, shared by every axis.
pub const THETA: f64 = 0.4;
pub const DEFAULT_INTENSITY: f64 = 0.5;

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopFlags {
    pub order_loop: bool,
    pub chaos_loop: bool,
    /// Always false: the engine sees one snapshot and has no history.
    pub rotation_event: bool,
}

impl LoopFlags {
    pub fn detect(v: &Vector3) -> Self {
        Self {
            order_loop: v.y > THETA && v.x < -THETA,
            chaos_loop: v.x < -THETA && v.z < -THETA,
            rotation_event: false,
        }
    }
}

/// Snapshot of where the subject sits. Never persisted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    pub t: DateTime<Utc>,
    pub vector: Vector3,
    pub intensity: f64,
    pub gift_scores: Vector3,
    pub shadow_scores: Vector3,
    pub radius: f64,
    pub archetype_weights: ArchetypeWeights,
    pub primary_archetype: Archetype,
    pub flags: LoopFlags,
    pub intervention: Intervention,
    pub notes: String,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Run the engine with a seed derived from the inputs.
///
/// Identical inputs always select the same copy line.
pub fn update_state(
    input: Vector3,
    lineage: &LineageProfile,
    astrology: Option<&AstrologyProfile>,
    intensity: f64,
) -> UserState {
    let seed = input_seed(&input, lineage, astrology, intensity);
    update_state_seeded(input, lineage, astrology, intensity, seed)
}

/// Run the engine with an explicit copy-selection seed.
pub fn update_state_seeded(
    input: Vector3,
    lineage: &LineageProfile,
    astrology: Option<&AstrologyProfile>,
    intensity: f64,
    seed: u64,
) -> UserState {
    let intensity = intensity.clamp(0.0, 1.0);

    let prior = blend_priors(&lineage.bias_vector, astrology.map(|a| &a.astro_prior));
    let baseline = input * LAMBDA_USER + prior * (1.0 - LAMBDA_USER);

    let gain = astrology.map(AstrologyProfile::transit_gain).unwrap_or(0.0);
    let alpha = ALPHA_BASE * (1.0 + gain);
    let v = (baseline * (1.0 + alpha * intensity)).clamp_unit();

    let weights = ArchetypeWeights::from_vector(&v);
    let primary = weights.primary();
    let flags = LoopFlags::detect(&v);

    let mut rng = SmallRng::seed_from_u64(seed);
    let intervention = Intervention::choose(&v, intensity, &mut rng);

    let mut notes = format!("Target: {}. {}", primary, intervention.copy);
    if flags.order_loop {
        notes.push_str(" [ORDER TRAP]");
    }
    if flags.chaos_loop {
        notes.push_str(" [CHAOS TRAP]");
    }

    log::debug!(
        "vector state: v=({:.3},{:.3},{:.3}) primary={} gain={:.2}",
        v.x,
        v.y,
        v.z,
        primary,
        gain
    );

    UserState {
        t: Utc::now(),
        vector: v,
        intensity,
        gift_scores: v.positive_part(),
        shadow_scores: v.negative_part(),
        radius: v.norm(),
        archetype_weights: weights,
        primary_archetype: primary,
        flags,
        intervention,
        notes,
    }
}

fn blend_priors(lineage: &Vector3, astro: Option<&Vector3>) -> Vector3 {
    match astro {
        Some(a) if !a.is_zero() => *lineage * LAMBDA_LINEAGE + *a * LAMBDA_ASTRO,
        _ => *lineage,
    }
}

fn input_seed(
    input: &Vector3,
    lineage: &LineageProfile,
    astrology: Option<&AstrologyProfile>,
    intensity: f64,
) -> u64 {
    let mut hasher = DefaultHasher::new();
    for v in [input, &lineage.bias_vector] {
        v.x.to_bits().hash(&mut hasher);
        v.y.to_bits().hash(&mut hasher);
        v.z.to_bits().hash(&mut hasher);
    }
    intensity.to_bits().hash(&mut hasher);
    if let Some(astro) = astrology {
        astro.astro_prior.x.to_bits().hash(&mut hasher);
        astro.astro_prior.y.to_bits().hash(&mut hasher);
        astro.astro_prior.z.to_bits().hash(&mut hasher);
        astro.transits.len().hash(&mut hasher);
    }
    hasher.finish()
}
