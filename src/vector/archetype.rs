//! The seven archetype poles and softmax weighting over them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Vector3;

/// Softmax sharpness applied to archetype distances.
pub const BETA: f64 = 2.0;

/// A fixed pole of the relational space.
///
/// Declaration order is significant: it breaks ties when two archetypes
/// receive the same weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Archetype {
    #[serde(rename = "THE_PROTAGONIST")]
    Protagonist,
    #[serde(rename = "THE_ANCHOR")]
    Anchor,
    #[serde(rename = "THE_DRIFTER")]
    Drifter,
    #[serde(rename = "THE_GHOST")]
    Ghost,
    #[serde(rename = "THE_CRUSADER")]
    Crusader,
    #[serde(rename = "THE_MARTYR")]
    Martyr,
    #[serde(rename = "THE_DESTROYER")]
    Destroyer,
}

impl Archetype {
    /// All archetypes in tie-break order.
    pub const ALL: [Archetype; 7] = [
        Archetype::Protagonist,
        Archetype::Anchor,
        Archetype::Drifter,
        Archetype::Ghost,
        Archetype::Crusader,
        Archetype::Martyr,
        Archetype::Destroyer,
    ];

    /// Coordinates of the pole.
    pub const fn coordinates(&self) -> Vector3 {
        match self {
            Archetype::Protagonist => Vector3::new(1.0, 1.0, 1.0),
            Archetype::Anchor => Vector3::new(1.0, -0.5, 0.5),
            Archetype::Drifter => Vector3::new(0.0, -1.0, -1.0),
            Archetype::Ghost => Vector3::new(-1.0, -1.0, 0.0),
            Archetype::Crusader => Vector3::new(-0.5, 1.0, -0.5),
            Archetype::Martyr => Vector3::new(1.0, -1.0, 1.0),
            Archetype::Destroyer => Vector3::new(-1.0, 1.0, -1.0),
        }
    }

    /// Wire name (`THE_PROTAGONIST`, ...).
    pub const fn as_str(&self) -> &'static str {
        match self {
            Archetype::Protagonist => "THE_PROTAGONIST",
            Archetype::Anchor => "THE_ANCHOR",
            Archetype::Drifter => "THE_DRIFTER",
            Archetype::Ghost => "THE_GHOST",
            Archetype::Crusader => "THE_CRUSADER",
            Archetype::Martyr => "THE_MARTYR",
            Archetype::Destroyer => "THE_DESTROYER",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized weights over [`Archetype::ALL`], indexed in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "std::collections::BTreeMap<Archetype, f64>")]
#[serde(try_from = "std::collections::BTreeMap<Archetype, f64>")]
pub struct ArchetypeWeights([f64; 7]);

impl ArchetypeWeights {
    /// Softmax of `exp(-BETA * d)` over every pole.
    pub fn from_vector(v: &Vector3) -> Self {
        let mut raw = [0.0; 7];
        for (slot, archetype) in raw.iter_mut().zip(Archetype::ALL.iter()) {
            *slot = (-BETA * v.distance(&archetype.coordinates())).exp();
        }
        let sum: f64 = raw.iter().sum();
        for w in raw.iter_mut() {
            *w /= sum;
        }
        Self(raw)
    }

    pub fn get(&self, archetype: Archetype) -> f64 {
        self.0[archetype as usize]
    }

    /// Highest-weighted archetype; the earliest wins a tie.
    pub fn primary(&self) -> Archetype {
        let mut best = 0;
        for i in 1..self.0.len() {
            if self.0[i] > self.0[best] {
                best = i;
            }
        }
        Archetype::ALL[best]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Archetype, f64)> + '_ {
        Archetype::ALL.iter().copied().zip(self.0.iter().copied())
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }
}

impl From<ArchetypeWeights> for std::collections::BTreeMap<Archetype, f64> {
    fn from(w: ArchetypeWeights) -> Self {
        w.iter().collect()
    }
}

impl TryFrom<std::collections::BTreeMap<Archetype, f64>> for ArchetypeWeights {
    type Error = String;

    fn try_from(map: std::collections::BTreeMap<Archetype, f64>) -> Result<Self, Self::Error> {
        let mut raw = [0.0; 7];
        for (i, archetype) in Archetype::ALL.iter().enumerate() {
            raw[i] = *map
                .get(archetype)
                .ok_or_else(|| format!("missing weight for {archetype}"))?;
        }
        Ok(Self(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        for v in [
            Vector3::ZERO,
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(-1.0, 0.3, -0.7),
            Vector3::new(0.2, -1.0, 1.0),
        ] {
            let w = ArchetypeWeights::from_vector(&v);
            assert!((w.sum() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_primary_at_pole() {
        for archetype in Archetype::ALL {
            let w = ArchetypeWeights::from_vector(&archetype.coordinates());
            assert_eq!(w.primary(), archetype);
        }
    }

    #[test]
    fn test_tie_goes_to_first_declared() {
        let w = ArchetypeWeights([0.25, 0.25, 0.1, 0.1, 0.1, 0.1, 0.1]);
        assert_eq!(w.primary(), Archetype::Protagonist);
        let w = ArchetypeWeights([0.1, 0.1, 0.1, 0.1, 0.1, 0.25, 0.25]);
        assert_eq!(w.primary(), Archetype::Martyr);
    }

    #[test]
    fn test_serializes_as_named_map() {
        let w = ArchetypeWeights::from_vector(&Vector3::ZERO);
        let json = serde_json::to_value(w).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 7);
        assert!(json.get("THE_GHOST").is_some());
        let back: ArchetypeWeights = serde_json::from_value(json).unwrap();
        assert!((back.sum() - 1.0).abs() < 1e-9);
    }
}
