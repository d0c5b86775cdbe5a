//! Entity kinds and the fixed enumeration of group roles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The population a variable is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Atomic entity: one row per person.
    Individu,
    /// Household.
    Menage,
    /// Tax household (the unit the IRPP is assessed on).
    FoyerFiscal,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Individu => "individu",
            EntityKind::Menage => "menage",
            EntityKind::FoyerFiscal => "foyer_fiscal",
        })
    }
}

/// Position of a member inside a group entity.
///
/// For tax households: declarant (`Primary`), spouse, dependents 1 to 9.
/// For households: reference person, partner, children 1 to 9.
/// A role is held by at most one member of a given group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Role {
    Primary = 0,
    Spouse,
    Dependent1,
    Dependent2,
    Dependent3,
    Dependent4,
    Dependent5,
    Dependent6,
    Dependent7,
    Dependent8,
    Dependent9,
}

impl Role {
    pub const COUNT: usize = 11;

    /// Every role, in canonical order.
    pub const ALL: [Role; Role::COUNT] = [
        Role::Primary,
        Role::Spouse,
        Role::Dependent1,
        Role::Dependent2,
        Role::Dependent3,
        Role::Dependent4,
        Role::Dependent5,
        Role::Dependent6,
        Role::Dependent7,
        Role::Dependent8,
        Role::Dependent9,
    ];

    pub const COUPLE: [Role; 2] = [Role::Primary, Role::Spouse];

    pub const DEPENDENTS: [Role; 9] = [
        Role::Dependent1,
        Role::Dependent2,
        Role::Dependent3,
        Role::Dependent4,
        Role::Dependent5,
        Role::Dependent6,
        Role::Dependent7,
        Role::Dependent8,
        Role::Dependent9,
    ];

    #[inline(always)]
    pub fn index(self) -> usize { self as usize }

    pub fn is_dependent(self) -> bool {
        !matches!(self, Role::Primary | Role::Spouse)
    }

    /// The dependent role of the given 1-based rank.
    pub fn dependent(rank: usize) -> Option<Role> {
        rank.checked_sub(1).and_then(|i| Role::DEPENDENTS.get(i).copied())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => f.write_str("primary"),
            Role::Spouse => f.write_str("spouse"),
            dep => write!(f, "dependent{}", dep.index() - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_lists_are_consistent() {
        assert_eq!(Role::ALL.len(), Role::COUNT);
        for (i, role) in Role::ALL.iter().enumerate() {
            assert_eq!(role.index(), i);
        }
        assert!(Role::DEPENDENTS.iter().all(|r| r.is_dependent()));
        assert!(Role::COUPLE.iter().all(|r| !r.is_dependent()));
    }

    #[test]
    fn test_dependent_rank_lookup() {
        assert_eq!(Role::dependent(1), Some(Role::Dependent1));
        assert_eq!(Role::dependent(9), Some(Role::Dependent9));
        assert_eq!(Role::dependent(0), None);
        assert_eq!(Role::dependent(10), None);
        assert_eq!(Role::Dependent3.to_string(), "dependent3");
    }
}
