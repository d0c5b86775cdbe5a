pub mod engine;
pub mod error;
pub mod kernel;
pub mod ledger;

pub use engine::{Formula, FormulaContext, Simulation};
pub use error::ComputationError;
pub use ledger::{Holder, HolderKey, Ledger, Origin, Value};
