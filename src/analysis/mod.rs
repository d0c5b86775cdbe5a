pub mod coverage;
pub mod telemetry;
pub mod topology;

pub use coverage::{CoverageError, CoverageErrorType, CoverageValidator};
pub use telemetry::{Telemetry, TelemetryReport};
