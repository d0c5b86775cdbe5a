use crate::entity::{EntityKind, PopulationError};
use crate::legislation::LegislationError;
use crate::period::Period;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputationError {
    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("Dependency cycle: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },
    #[error("Holder of '{variable}' for {period} was touched before its computation completed")]
    StaleCacheRead { variable: String, period: Period },
    #[error("Formula of '{variable}' requested '{dependency}' without declaring it")]
    UndeclaredDependency { variable: String, dependency: String },
    #[error("No formula of '{variable}' applies at {period} and the variable has no default")]
    NoApplicableFormula { variable: String, period: Period },
    #[error("No value supplied for '{variable}' at {period} and the variable has no default")]
    MissingInput { variable: String, period: Period },
    #[error("'{variable}' holds {actual} values where {expected} values were expected")]
    TypeMismatch { variable: String, expected: &'static str, actual: &'static str },
    #[error("'{variable}' has {actual} values, its population has {expected}")]
    LengthMismatch { variable: String, expected: usize, actual: usize },
    #[error("'{variable}' is defined on {actual}, operation needs {expected}")]
    EntityMismatch { variable: String, expected: EntityKind, actual: EntityKind },
    #[error(transparent)]
    Legislation(#[from] LegislationError),
    #[error(transparent)]
    Population(#[from] PopulationError),
}
