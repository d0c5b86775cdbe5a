//! The Tunisian IRPP model: variable catalog, reference legislation and the
//! tax-benefit system that ties them to simulations.

pub mod demographie;
pub mod irpp;
pub mod revenus;

use crate::analysis::{CoverageError, CoverageValidator};
use crate::compute::{ComputationError, FormulaContext, Simulation, Value};
use crate::config::{ConfigError, SimulationConfig};
use crate::entity::{Population, Role};
use crate::legislation::{Legislation, LegislationError};
use crate::store::{RegistryError, VariableRegistry};
use chrono::NaiveDate;
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;

const REFERENCE_LEGISLATION: &str = include_str!("../../data/legislation_tunisia.json");

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Legislation(#[from] LegislationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Coverage check failed with {} problem(s); first: {}", .0.len(), .0.first().map_or("", |e| e.message.as_str()))]
    Coverage(Vec<CoverageError>),
}

/// Every variable of the model.
pub fn build_registry() -> Result<VariableRegistry, RegistryError> {
    let mut builder = VariableRegistry::builder();
    builder
        .extend(demographie::variables())
        .extend(revenus::variables())
        .extend(irpp::variables());
    builder.build()
}

/// The bundled parameter tree.
pub fn reference_legislation() -> Result<Legislation, LegislationError> {
    Legislation::from_json_str(REFERENCE_LEGISLATION)
}

/// A registry and a legislation, shared by every simulation created from them.
#[derive(Debug, Clone)]
pub struct TaxBenefitSystem {
    registry: Arc<VariableRegistry>,
    legislation: Arc<Legislation>,
    config: SimulationConfig,
}

impl TaxBenefitSystem {
    /// The model with the bundled legislation and default configuration.
    pub fn new() -> Result<Self, ModelError> { Self::load(SimulationConfig::default()) }

    pub fn load(config: SimulationConfig) -> Result<Self, ModelError> {
        let legislation = match &config.legislation_path {
            Some(path) => Legislation::from_path(path)?,
            None => reference_legislation()?,
        };
        let system = Self { registry: Arc::new(build_registry()?), legislation: Arc::new(legislation), config };
        if let Some(date) = system.config.coverage_date {
            system.check_coverage(date).map_err(ModelError::Coverage)?;
        }
        tracing::info!(variables = system.registry.count(), "tax-benefit system ready");
        Ok(system)
    }

    pub fn registry(&self) -> &VariableRegistry { &self.registry }
    pub fn legislation(&self) -> &Legislation { &self.legislation }
    pub fn config(&self) -> &SimulationConfig { &self.config }

    pub fn check_coverage(&self, date: NaiveDate) -> Result<(), Vec<CoverageError>> {
        CoverageValidator::new(&self.registry, &self.legislation).validate(date)
    }

    pub fn new_simulation(&self, population: Population) -> Result<Simulation, ConfigError> {
        Simulation::new(Arc::clone(&self.registry), Arc::clone(&self.legislation), population).with_config(&self.config)
    }
}

// Helpers shared by the formulas of this model. All of them read at the
// formula's own period.

fn mismatch(name: &str, expected: &'static str, value: &Value) -> ComputationError {
    ComputationError::TypeMismatch { variable: name.to_string(), expected, actual: value.type_name() }
}

fn as_floats(name: &str, value: &Value) -> Result<Vec<f64>, ComputationError> {
    value.as_floats().map(Cow::into_owned).ok_or_else(|| mismatch(name, "float", value))
}

pub(crate) fn as_ints(name: &str, value: &Value) -> Result<Vec<i64>, ComputationError> {
    value.as_ints().map(Cow::into_owned).ok_or_else(|| mismatch(name, "int", value))
}

pub(crate) fn column(ctx: &mut FormulaContext<'_>, name: &str) -> Result<Vec<f64>, ComputationError> {
    let holder = ctx.calculate(name, ctx.period())?;
    as_floats(name, &holder.value)
}

pub(crate) fn flags(ctx: &mut FormulaContext<'_>, name: &str) -> Result<Vec<bool>, ComputationError> {
    let holder = ctx.calculate(name, ctx.period())?;
    Ok(holder.bools()?.to_vec())
}

/// Value of the member holding `role`, as floats.
pub(crate) fn of_role(ctx: &mut FormulaContext<'_>, name: &str, role: Role) -> Result<Vec<f64>, ComputationError> {
    let holder = ctx.calculate(name, ctx.period())?;
    as_floats(name, &ctx.filter_role(&holder, role)?)
}

/// Flags of the member holding `role`.
pub(crate) fn flags_of_role(ctx: &mut FormulaContext<'_>, name: &str, role: Role) -> Result<Vec<bool>, ComputationError> {
    let holder = ctx.calculate(name, ctx.period())?;
    let value = ctx.filter_role(&holder, role)?;
    value.as_bools().map(<[bool]>::to_vec).ok_or_else(|| mismatch(name, "bool", &value))
}

/// Sum over the declarant and the spouse.
pub(crate) fn couple_sum(ctx: &mut FormulaContext<'_>, name: &str) -> Result<Vec<f64>, ComputationError> {
    let holder = ctx.calculate(name, ctx.period())?;
    ctx.sum_by_roles(&holder, &Role::COUPLE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_model_is_consistent() {
        let system = TaxBenefitSystem::new().unwrap();
        assert!(system.registry().id("irpp").is_some());
        for year in [2008, 2011, 2016, 2018] {
            let date = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
            assert_eq!(system.check_coverage(date), Ok(()), "coverage at {}", year);
        }
    }

    #[test]
    fn test_typed_views_report_mismatches() {
        assert_eq!(as_ints("age", &Value::from(vec![true, false])).unwrap(), vec![1, 0]);
        assert_eq!(
            as_ints("age", &Value::from(vec![1.5])).unwrap_err(),
            ComputationError::TypeMismatch { variable: "age".into(), expected: "int", actual: "float" }
        );
        assert!(matches!(as_floats("sal", &Value::from(vec![NaiveDate::MIN])), Err(ComputationError::TypeMismatch { .. })));
    }

    #[test]
    fn test_load_with_coverage_date_before_legislation() {
        let config = SimulationConfig { coverage_date: NaiveDate::from_ymd_opt(1990, 1, 1), ..Default::default() };
        assert!(matches!(TaxBenefitSystem::load(config), Err(ModelError::Coverage(_))));
    }

    #[test]
    fn test_load_legislation_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legislation.json");
        std::fs::write(&path, REFERENCE_LEGISLATION).unwrap();
        let config = SimulationConfig { legislation_path: Some(path), ..Default::default() };
        let system = TaxBenefitSystem::load(config).unwrap();
        assert_eq!(system.legislation(), &reference_legislation().unwrap());

        let missing = SimulationConfig { legislation_path: Some(dir.path().join("nope.json")), ..Default::default() };
        assert!(matches!(TaxBenefitSystem::load(missing), Err(ModelError::Legislation(LegislationError::Io { .. }))));
    }
}
