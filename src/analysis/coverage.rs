//! Static checks of a registry against the legislation in force at a date.
use super::topology;
use crate::legislation::Legislation;
use crate::store::VariableRegistry;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverageErrorType {
    /// No formula is valid at the date and the variable has no default.
    NoApplicableFormula,
    /// A declared parameter path is not in force at the date.
    UnknownParameter,
    /// The variable takes part in a cycle of required dependencies.
    DependencyCycle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageError {
    pub variable: String,
    pub error_type: CoverageErrorType,
    pub message: String,
}

/// Collects every coverage problem at a date without running any formula.
pub struct CoverageValidator<'a> {
    registry: &'a VariableRegistry,
    legislation: &'a Legislation,
}

impl<'a> CoverageValidator<'a> {
    pub fn new(registry: &'a VariableRegistry, legislation: &'a Legislation) -> Self {
        Self { registry, legislation }
    }

    pub fn validate(&self, date: NaiveDate) -> Result<(), Vec<CoverageError>> {
        let mut errors = Vec::new();
        let snapshot = self.legislation.at(date);

        for (_, def) in self.registry.definitions() {
            if def.is_input() {
                continue;
            }
            if !def.validity.contains(date) {
                if def.default.is_none() {
                    errors.push(CoverageError {
                        variable: def.name.clone(),
                        error_type: CoverageErrorType::NoApplicableFormula,
                        message: format!("No formula of '{}' applies at {} and it has no default", def.name, date),
                    });
                }
                continue;
            }
            for path in def.parameters.iter().filter(|p| !snapshot.contains(p)) {
                errors.push(CoverageError {
                    variable: def.name.clone(),
                    error_type: CoverageErrorType::UnknownParameter,
                    message: format!("'{}' reads '{}', which is not in force at {}", def.name, path, date),
                });
            }
        }

        for cycle in topology::cycles(self.registry) {
            let names: Vec<&str> = cycle.iter().map(|&id| self.registry.name(id)).collect();
            errors.push(CoverageError {
                variable: names[0].to_string(),
                error_type: CoverageErrorType::DependencyCycle,
                message: format!("Cycle among {}", names.join(", ")),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{ComputationError, FormulaContext, Value};
    use crate::entity::EntityKind;
    use crate::store::{Scalar, ValueType, VariableDefinition};

    fn zero(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
        Ok(Value::from(vec![0.0; ctx.count()]))
    }

    fn var(name: &str) -> VariableDefinition {
        VariableDefinition::computed(name, EntityKind::FoyerFiscal, ValueType::Float, zero)
    }

    fn date(y: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, 1, 1).unwrap()
    }

    fn legislation() -> Legislation {
        Legislation::from_json_str(r#"{ "ir": { "smig_ext": { "values": [ { "start": "2011-01-01", "value": 2400 } ] } } }"#)
            .unwrap()
    }

    #[test]
    fn test_clean_registry_passes() {
        let mut b = VariableRegistry::builder();
        b.add(var("sal_net").parameters(&["ir.smig_ext"]));
        let reg = b.build().unwrap();
        assert!(CoverageValidator::new(&reg, &legislation()).validate(date(2012)).is_ok());
    }

    #[test]
    fn test_expired_formula_needs_a_default() {
        let mut b = VariableRegistry::builder();
        b.add(var("ancien").valid_until(date(2005)).no_default())
            .add(var("ancien_avec_defaut").valid_until(date(2005)));
        let reg = b.build().unwrap();
        let leg = legislation();
        let validator = CoverageValidator::new(&reg, &leg);

        assert!(validator.validate(date(2004)).is_ok());
        let errors = validator.validate(date(2010)).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].variable, "ancien");
        assert_eq!(errors[0].error_type, CoverageErrorType::NoApplicableFormula);
    }

    #[test]
    fn test_collects_every_problem() {
        let mut b = VariableRegistry::builder();
        b.add(var("sal_net").parameters(&["ir.smig_ext"]))
            .add(var("future").valid_from(date(2020)).no_default())
            .add(var("future_with_default").valid_from(date(2020)).default_value(Scalar::Float(0.0)))
            .add(var("x").requires(&["y"]))
            .add(var("y").requires(&["x"]));
        let reg = b.build().unwrap();

        let errors = CoverageValidator::new(&reg, &legislation()).validate(date(2010)).unwrap_err();
        let kinds: Vec<(&str, &CoverageErrorType)> = errors.iter().map(|e| (e.variable.as_str(), &e.error_type)).collect();
        assert_eq!(
            kinds,
            vec![
                ("sal_net", &CoverageErrorType::UnknownParameter),
                ("future", &CoverageErrorType::NoApplicableFormula),
                ("x", &CoverageErrorType::DependencyCycle),
            ]
        );
    }
}
