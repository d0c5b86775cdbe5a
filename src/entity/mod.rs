//! Entities, roles and role-based aggregation of member values.
pub mod aggregate;
pub mod population;
pub mod role;

pub use aggregate::RoleAggregator;
pub use population::{GroupStructure, Membership, Population, PopulationBuilder, PopulationError};
pub use role::{EntityKind, Role};
