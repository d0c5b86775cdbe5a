// Core of the Tunisian income tax model: periods, the variable graph, the
// cached evaluator and the dated legislation it reads.

pub mod analysis;
pub mod compute;
pub mod config;
pub mod display;
pub mod entity;
pub mod legislation;
pub mod model;
pub mod period;
pub mod store;

pub use compute::{ComputationError, Formula, FormulaContext, Holder, Simulation, Value};
pub use config::{ConfigError, SimulationConfig};
pub use entity::{EntityKind, Population, Role};
pub use legislation::{Bareme, Legislation, LegislationError, LegislationSnapshot};
pub use model::{ModelError, TaxBenefitSystem};
pub use period::{Period, PeriodError, PeriodUnit};
pub use store::{ValueType, VariableDefinition, VariableRegistry};
