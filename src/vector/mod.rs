//! # Vector Engine
//!
//! Places a subject inside the three-axis relational space and classifies
//! where they sit.
//!
//! | Axis | Positive pole | Negative pole |
//! |------|---------------|---------------|
//! | x    | connection    | hostility     |
//! | y    | agency        | submission    |
//! | z    | meaning       | survival      |
//!
//! The engine is a pure function ([`update_state`]): it blends the user's
//! slider input with a lineage prior and an optional astrological prior,
//! amplifies the result by emotional intensity, then scores it against the
//! seven fixed [`Archetype`] poles.
//!
//! ## Modules
//!
//! - [`archetype`]: the fixed archetype coordinates and softmax weighting
//! - [`engine`]: `update_state` and the `UserState` it produces
//! - [`lineage`]: member-role heuristic that derives the lineage bias
//! - [`principles`]: the intervention copy banks and their trigger rules
//! - [`profile`]: lineage / astrology profiles and the ephemeris seam

pub mod archetype;
pub mod engine;
pub mod lineage;
pub mod principles;
pub mod profile;

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

pub use archetype::{Archetype, ArchetypeWeights};
pub use engine::{update_state, update_state_seeded, LoopFlags, UserState, DEFAULT_INTENSITY};
pub use lineage::{lineage_from_members, MemberRole};
pub use principles::{Intervention, Principle};
pub use profile::{AstrologyProfile, Ephemeris, LineageProfile, NoEphemeris, Transit};

/// A point (or displacement) in the relational space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    /// The origin.
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Vector3) -> f64 {
        (*self - *other).norm()
    }

    /// Whether every component is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    /// Clamp every axis into `[-1, 1]`.
    pub fn clamp_unit(&self) -> Self {
        Self {
            x: self.x.clamp(-1.0, 1.0),
            y: self.y.clamp(-1.0, 1.0),
            z: self.z.clamp(-1.0, 1.0),
        }
    }

    /// Component-wise `max(0, v)`.
    pub fn positive_part(&self) -> Self {
        Self {
            x: self.x.max(0.0),
            y: self.y.max(0.0),
            z: self.z.max(0.0),
        }
    }

    /// Component-wise `min(0, v)`.
    pub fn negative_part(&self) -> Self {
        Self {
            x: self.x.min(0.0),
            y: self.y.min(0.0),
            z: self.z.min(0.0),
        }
    }

    /// Largest absolute component.
    pub fn max_abs(&self) -> f64 {
        self.x.abs().max(self.y.abs()).max(self.z.abs())
    }

    /// Unit vector in the same direction, or `None` for the zero vector.
    pub fn normalized(&self) -> Option<Self> {
        let n = self.norm();
        if n == 0.0 {
            None
        } else {
            Some(*self * (1.0 / n))
        }
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Vector3;

    fn mul(self, s: f64) -> Vector3 {
        Vector3::new(self.x * s, self.y * s, self.z * s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norm_and_distance() {
        let v = Vector3::new(3.0, 4.0, 0.0);
        assert_eq!(v.norm(), 5.0);
        assert_eq!(v.distance(&Vector3::ZERO), 5.0);
    }

    #[test]
    fn test_clamp_unit() {
        let v = Vector3::new(1.7, -3.0, 0.2).clamp_unit();
        assert_eq!(v, Vector3::new(1.0, -1.0, 0.2));
    }

    #[test]
    fn test_gift_and_shadow_parts() {
        let v = Vector3::new(0.5, -0.25, 0.0);
        assert_eq!(v.positive_part(), Vector3::new(0.5, 0.0, 0.0));
        assert_eq!(v.negative_part(), Vector3::new(0.0, -0.25, 0.0));
    }

    #[test]
    fn test_normalized_zero_is_none() {
        assert!(Vector3::ZERO.normalized().is_none());
        let unit = Vector3::new(0.0, 2.0, 0.0).normalized().unwrap();
        assert_eq!(unit, Vector3::new(0.0, 1.0, 0.0));
    }
}
