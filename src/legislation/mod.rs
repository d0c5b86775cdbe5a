//! Dated tax parameters: scalars and bracket schedules looked up by path.

pub mod bareme;
pub mod parameter;
pub mod snapshot;

pub use bareme::{Bareme, Bracket};
pub use parameter::{Legislation, ParameterNode};
pub use snapshot::{LegislationSnapshot, SnapshotNode};

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LegislationError {
    #[error("Parameter '{path}' is not in force at {date}")]
    UnknownParameterPath { path: String, date: NaiveDate },
    #[error("Parameter '{path}' is a {actual}, expected a {expected}")]
    WrongKind { path: String, expected: &'static str, actual: &'static str },
    #[error("Invalid legislation: {0}")]
    Parse(String),
    #[error("Cannot read legislation file '{path}': {message}")]
    Io { path: String, message: String },
}
