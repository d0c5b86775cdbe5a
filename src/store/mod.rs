//! The variable graph: definitions, declared dependencies and their topology.
pub mod registry;
pub mod types;

pub use registry::{RegistryBuilder, RegistryError, VariableDefinition, VariableRegistry};
pub use types::{DateRange, Dependency, Scalar, ValueType, VariableId};
