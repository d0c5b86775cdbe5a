//! The population of a simulation: how many individuals there are and how they
//! are grouped into households and tax households.

use super::role::{EntityKind, Role};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PopulationError {
    #[error("{kind} membership lists {actual} individuals, population has {expected}")]
    MembershipLength { kind: EntityKind, expected: usize, actual: usize },
    #[error("{kind} group {group} has more than one member with role {role}")]
    DuplicateRole { kind: EntityKind, group: usize, role: Role },
    #[error("{kind} group {group} has no members (group indices must be contiguous)")]
    EmptyGroup { kind: EntityKind, group: usize },
    #[error("'{0}' is not a group entity")]
    NotAGroup(EntityKind),
    #[error("{kind} structure declared twice")]
    DuplicateStructure { kind: EntityKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub group: usize,
    pub role: Role,
}

/// Membership of every individual in one group entity, plus the reverse
/// index (group, role) -> individual.
#[derive(Debug, Clone)]
pub struct GroupStructure {
    kind: EntityKind,
    memberships: Vec<Membership>,
    slots: Vec<[Option<u32>; Role::COUNT]>,
}

impl GroupStructure {
    fn new(kind: EntityKind, memberships: Vec<Membership>) -> Result<Self, PopulationError> {
        let count = memberships.iter().map(|m| m.group + 1).max().unwrap_or(0);
        let mut slots = vec![[None; Role::COUNT]; count];

        for (individual, m) in memberships.iter().enumerate() {
            let slot = &mut slots[m.group][m.role.index()];
            if slot.is_some() {
                return Err(PopulationError::DuplicateRole { kind, group: m.group, role: m.role });
            }
            *slot = Some(individual as u32);
        }

        if let Some(group) = slots.iter().position(|s| s.iter().all(Option::is_none)) {
            return Err(PopulationError::EmptyGroup { kind, group });
        }

        Ok(Self { kind, memberships, slots })
    }

    /// Every individual heads its own group.
    fn singletons(kind: EntityKind, individuals: usize) -> Self {
        let memberships = (0..individuals).map(|group| Membership { group, role: Role::Primary }).collect();
        let slots = (0..individuals)
            .map(|i| {
                let mut s = [None; Role::COUNT];
                s[Role::Primary.index()] = Some(i as u32);
                s
            })
            .collect();
        Self { kind, memberships, slots }
    }

    pub fn kind(&self) -> EntityKind { self.kind }
    pub fn count(&self) -> usize { self.slots.len() }
    pub fn individuals(&self) -> usize { self.memberships.len() }

    #[inline(always)]
    pub fn member(&self, group: usize, role: Role) -> Option<usize> {
        self.slots.get(group)?[role.index()].map(|i| i as usize)
    }

    pub fn membership(&self, individual: usize) -> Option<Membership> {
        self.memberships.get(individual).copied()
    }

    pub fn memberships(&self) -> &[Membership] { &self.memberships }
}

#[derive(Debug, Clone)]
pub struct Population {
    individuals: usize,
    menages: GroupStructure,
    foyers: GroupStructure,
}

impl Population {
    pub fn builder(individuals: usize) -> PopulationBuilder {
        PopulationBuilder { individuals, groups: Vec::new() }
    }

    /// Number of rows of the given entity.
    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Individu => self.individuals,
            EntityKind::Menage => self.menages.count(),
            EntityKind::FoyerFiscal => self.foyers.count(),
        }
    }

    pub fn groups(&self, kind: EntityKind) -> Result<&GroupStructure, PopulationError> {
        match kind {
            EntityKind::Individu => Err(PopulationError::NotAGroup(kind)),
            EntityKind::Menage => Ok(&self.menages),
            EntityKind::FoyerFiscal => Ok(&self.foyers),
        }
    }
}

pub struct PopulationBuilder {
    individuals: usize,
    groups: Vec<(EntityKind, Vec<Membership>)>,
}

impl PopulationBuilder {
    /// Declares the group and role of every individual, in individual order.
    pub fn group(mut self, kind: EntityKind, members: impl IntoIterator<Item = (usize, Role)>) -> Self {
        let members = members.into_iter().map(|(group, role)| Membership { group, role }).collect();
        self.groups.push((kind, members));
        self
    }

    /// Validates the declared structures. Group kinds that were not declared
    /// default to one group per individual.
    pub fn build(self) -> Result<Population, PopulationError> {
        let mut menages = None;
        let mut foyers = None;

        for (kind, members) in self.groups {
            if members.len() != self.individuals {
                return Err(PopulationError::MembershipLength { kind, expected: self.individuals, actual: members.len() });
            }
            let slot = match kind {
                EntityKind::Individu => return Err(PopulationError::NotAGroup(kind)),
                EntityKind::Menage => &mut menages,
                EntityKind::FoyerFiscal => &mut foyers,
            };
            if slot.is_some() {
                return Err(PopulationError::DuplicateStructure { kind });
            }
            *slot = Some(GroupStructure::new(kind, members)?);
        }

        Ok(Population {
            individuals: self.individuals,
            menages: menages.unwrap_or_else(|| GroupStructure::singletons(EntityKind::Menage, self.individuals)),
            foyers: foyers.unwrap_or_else(|| GroupStructure::singletons(EntityKind::FoyerFiscal, self.individuals)),
        })
    }
}
