//! Derives a lineage bias vector from the roles inferred for family members.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{LineageProfile, Vector3};

/// Inferred archetypal role of one family member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Martyr,
    MadGenius,
    Crusader,
    Destroyer,
    Parasite,
    Slinger,
    Ghost,
    Innocent,
}

impl MemberRole {
    /// Axis bias contributed by one member holding this role.
    pub const fn bias(&self) -> Vector3 {
        match self {
            MemberRole::Destroyer => Vector3::new(-0.5, 0.5, 0.0),
            MemberRole::Crusader => Vector3::new(0.0, 0.5, 0.2),
            MemberRole::Martyr => Vector3::new(0.3, -0.5, 0.0),
            MemberRole::Ghost => Vector3::new(-0.5, 0.0, -0.3),
            _ => Vector3::ZERO,
        }
    }
}

impl FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "martyr" => Ok(MemberRole::Martyr),
            "mad_genius" => Ok(MemberRole::MadGenius),
            "crusader" => Ok(MemberRole::Crusader),
            "destroyer" => Ok(MemberRole::Destroyer),
            "parasite" => Ok(MemberRole::Parasite),
            "slinger" => Ok(MemberRole::Slinger),
            "ghost" => Ok(MemberRole::Ghost),
            "innocent" => Ok(MemberRole::Innocent),
            other => Err(format!("Invalid archetype: {other}")),
        }
    }
}

/// Average the role biases over every member.
///
/// Members without a role still count toward the denominator. An empty
/// family yields a zero bias.
pub fn lineage_from_members(roles: &[Option<MemberRole>]) -> LineageProfile {
    let count = roles.len().max(1) as f64;
    let sum = roles
        .iter()
        .flatten()
        .fold(Vector3::ZERO, |acc, role| acc + role.bias());
    LineageProfile::new(sum * (1.0 / count))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vector3, b: Vector3) -> bool {
        a.distance(&b) < 1e-12
    }

    #[test]
    fn test_empty_family_is_neutral() {
        assert_eq!(lineage_from_members(&[]).bias_vector, Vector3::ZERO);
    }

    #[test]
    fn test_roles_average_over_all_members() {
        let profile = lineage_from_members(&[
            Some(MemberRole::Destroyer),
            Some(MemberRole::Ghost),
            None,
            Some(MemberRole::Innocent),
        ]);
        assert!(close(profile.bias_vector, Vector3::new(-0.25, 0.125, -0.075)));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Mad_Genius".parse::<MemberRole>(), Ok(MemberRole::MadGenius));
        assert!("wizard".parse::<MemberRole>().is_err());
    }
}
