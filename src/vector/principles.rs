//! Clinical principles used to phrase the vector engine's note.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::Vector3;

/// Line used when no principle triggers.
pub const DEFAULT_COPY: &str = "Observe the vector. Notice where it pulls you.";

const UPR_COPY: [&str; 4] = [
    "Your defenses are intelligent. They saved you once.",
    "There is no part of this system that is a mistake.",
    "You are doing the best you can with the data you have.",
    "Honor the survival strategy before asking it to change.",
];

const DIALECTICS_COPY: [&str; 4] = [
    "You can be furious and loving at the same time.",
    "This is not an 'either/or' problem. It is a 'both/and' reality.",
    "Acceptance does not mean approval. It means acknowledging what is.",
    "The opposite of your truth is also true in this system.",
];

const ACCEPTANCE_COPY: [&str; 4] = [
    "Stop fighting reality. It always wins.",
    "Pain is inevitable. Suffering is optional.",
    "Turn your mind towards what is actually happening right now.",
    "This moment is the only one you have to work with.",
];

const NON_JUDGMENT_COPY: [&str; 4] = [
    "Drop the analysis. Feel the sensation.",
    "Naming the pattern is not the same as changing it.",
    "Where do you feel this in your body?",
    "Notice the urge to explain away the pain.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Principle {
    /// Shame spiral: high intensity with collapsed agency.
    #[serde(rename = "unconditional_positive_regard")]
    Upr,
    /// Polarization on any axis.
    Dialectics,
    /// Chaos loop: hostility plus survival.
    #[serde(rename = "radical_acceptance")]
    Acceptance,
    /// Intellectualization: high meaning, low feeling.
    #[serde(rename = "zero_jargon")]
    NonJudgment,
    /// Nothing triggered.
    Observe,
}

impl Principle {
    /// First matching rule for the given state.
    pub fn select(v: &Vector3, intensity: f64) -> Self {
        if intensity > 0.7 && v.y < -0.3 {
            Principle::Upr
        } else if v.max_abs() > 0.8 {
            Principle::Dialectics
        } else if v.x < -0.3 && v.z < -0.3 {
            Principle::Acceptance
        } else if v.z > 0.5 && intensity < 0.3 {
            Principle::NonJudgment
        } else {
            Principle::Observe
        }
    }

    /// The copy bank for this principle.
    pub fn copy(&self) -> &'static [&'static str] {
        match self {
            Principle::Upr => &UPR_COPY,
            Principle::Dialectics => &DIALECTICS_COPY,
            Principle::Acceptance => &ACCEPTANCE_COPY,
            Principle::NonJudgment => &NON_JUDGMENT_COPY,
            Principle::Observe => &[DEFAULT_COPY],
        }
    }
}

/// A principle with the line chosen from its bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub principle: Principle,
    pub copy: String,
}

impl Intervention {
    /// Pick a principle for the state and draw one line from its bank.
    pub fn choose<R: Rng + ?Sized>(v: &Vector3, intensity: f64, rng: &mut R) -> Self {
        let principle = Principle::select(v, intensity);
        let bank = principle.copy();
        let copy = bank[rng.gen_range(0..bank.len())];
        Self {
            principle,
            copy: copy.to_string(),
        }
    }
}
