//! engine.rs
//! Demand-driven evaluation of the variable graph.
//!
//! A request for (variable, period) is normalized to the variable's
//! definition period and answered from the ledger when possible. On a miss
//! the caller claims the key, runs the formula through a [`FormulaContext`]
//! and publishes the resulting holder. Formulas pull their own dependencies,
//! so evaluation is a depth-first walk driven by the formulas themselves.

use super::error::ComputationError;
use super::ledger::{Claim, Holder, HolderKey, Ledger, Value};
use crate::analysis::telemetry::{Telemetry, TelemetryReport};
use crate::analysis::topology;
use crate::config::{ConfigError, SimulationConfig};
use crate::entity::{EntityKind, Population, Role, RoleAggregator};
use crate::legislation::{Bareme, Legislation, LegislationSnapshot};
use crate::period::Period;
use crate::store::{VariableDefinition, VariableId, VariableRegistry};
use chrono::NaiveDate;
use rayon::prelude::*;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// A variable's formula. It must return one value per member of the
/// variable's entity, in the population's canonical order.
pub type Formula = fn(&mut FormulaContext<'_>) -> Result<Value, ComputationError>;

/// Keys currently being evaluated on this thread, outermost first.
type ResolutionStack = SmallVec<[HolderKey; 16]>;

pub struct Simulation {
    registry: Arc<VariableRegistry>,
    legislation: Arc<Legislation>,
    population: Population,
    ledger: Ledger,
    telemetry: Telemetry,
    snapshots: Mutex<HashMap<NaiveDate, Arc<LegislationSnapshot>>>,
    /// Variables whose `requires` closure is known to be acyclic.
    verified: RwLock<HashSet<VariableId>>,
    parallel: bool,
    pool: Option<rayon::ThreadPool>,
}

impl Simulation {
    pub fn new(registry: Arc<VariableRegistry>, legislation: Arc<Legislation>, population: Population) -> Self {
        let telemetry = Telemetry::new(registry.count());
        Self {
            registry,
            legislation,
            population,
            ledger: Ledger::new(),
            telemetry,
            snapshots: Mutex::default(),
            verified: RwLock::default(),
            parallel: true,
            pool: None,
        }
    }

    pub fn with_config(mut self, config: &SimulationConfig) -> Result<Self, ConfigError> {
        self.parallel = config.parallel;
        self.pool = config.thread_pool()?;
        Ok(self)
    }

    pub fn registry(&self) -> &VariableRegistry { &self.registry }
    pub fn population(&self) -> &Population { &self.population }
    pub fn legislation(&self) -> &Legislation { &self.legislation }
    pub(crate) fn ledger(&self) -> &Ledger { &self.ledger }

    pub fn telemetry(&self) -> TelemetryReport { self.telemetry.report(&self.registry) }

    /// Number of times the formula of `name` has run.
    pub fn evaluations(&self, name: &str) -> Result<u64, ComputationError> {
        Ok(self.telemetry.evaluations(self.registry.id_of(name)?))
    }

    /// Parameters in force at `date`. Built once per date and shared.
    pub fn legislation_at(&self, date: NaiveDate) -> Arc<LegislationSnapshot> {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(snapshots.entry(date).or_insert_with(|| Arc::new(self.legislation.at(date))))
    }

    /// Stores externally supplied values. Every cached computed holder of the
    /// variable and of everything downstream of it is dropped.
    pub fn set_input(&mut self, name: &str, period: Period, value: impl Into<Value>) -> Result<(), ComputationError> {
        let registry = Arc::clone(&self.registry);
        let id = registry.id_of(name)?;
        let def = registry.definition(id);
        let value = value.into();

        if !value.matches(&def.value_type) {
            return Err(ComputationError::TypeMismatch {
                variable: def.name.clone(),
                expected: def.value_type.name(),
                actual: value.type_name(),
            });
        }
        let expected = self.population.count(def.entity);
        if value.len() != expected {
            return Err(ComputationError::LengthMismatch { variable: def.name.clone(), expected, actual: value.len() });
        }

        let key = HolderKey { variable: id, period: period.normalize(def.definition_period) };
        let stale = topology::downstream_from(&registry, &[id]);
        let dropped = self.ledger.invalidate(&stale);
        if dropped > 0 {
            tracing::warn!(variable = %def.name, period = %key.period, dropped, "input change invalidated cached values");
        }
        self.ledger.insert_input(key, make_holder(def, id, key.period, value));
        Ok(())
    }

    /// Cached evaluation: computes on first request, then serves the cache.
    pub fn get(&self, name: &str, period: Period) -> Result<Holder, ComputationError> {
        let id = self.registry.id_of(name)?;
        self.resolve(id, period, &mut ResolutionStack::new(), false)
    }

    /// Runs the formula again even if a value is cached. The result is not
    /// written to the cache. Inputs are returned as stored.
    pub fn compute(&self, name: &str, period: Period) -> Result<Holder, ComputationError> {
        let id = self.registry.id_of(name)?;
        self.resolve(id, period, &mut ResolutionStack::new(), true)
    }

    /// Returns the cached holder without ever triggering evaluation.
    pub fn get_if_cached(&self, name: &str, period: Period) -> Result<Option<Holder>, ComputationError> {
        let id = self.registry.id_of(name)?;
        Ok(self.probe(id, period))
    }

    /// Evaluates several targets, in parallel unless disabled by configuration.
    /// Results follow the order of `names`.
    pub fn get_many(&self, names: &[&str], period: Period) -> Result<Vec<Holder>, ComputationError> {
        if !self.parallel || names.len() < 2 {
            return names.iter().map(|name| self.get(name, period)).collect();
        }
        let run = || names.par_iter().map(|name| self.get(name, period)).collect::<Result<Vec<_>, _>>();
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    fn probe(&self, id: VariableId, period: Period) -> Option<Holder> {
        let def = self.registry.definition(id);
        let key = HolderKey { variable: id, period: period.normalize(def.definition_period) };
        let found = self.ledger.peek(key);
        self.telemetry.record_probe(found.is_some());
        found
    }

    fn resolve(
        &self,
        id: VariableId,
        period: Period,
        stack: &mut ResolutionStack,
        forced: bool,
    ) -> Result<Holder, ComputationError> {
        let def = self.registry.definition(id);
        let key = HolderKey { variable: id, period: period.normalize(def.definition_period) };

        if stack.is_empty() {
            self.ensure_acyclic(id)?;
        }
        if let Some(pos) = stack.iter().position(|k| *k == key) {
            let mut path: Vec<String> = stack[pos..].iter().map(|k| self.registry.name(k.variable).to_string()).collect();
            path.push(def.name.clone());
            return Err(ComputationError::DependencyCycle { path });
        }

        if forced {
            if let Some(input) = self.ledger.input(key) {
                return Ok(input);
            }
            return self.evaluate(def, id, key, stack);
        }

        match self.ledger.claim(key) {
            Claim::Ready(holder) => {
                self.telemetry.record_cache_hit();
                tracing::trace!(variable = %def.name, period = %key.period, "cache hit");
                Ok(holder)
            }
            // An error drops the guard, which abandons the claim.
            Claim::Owner(guard) => guard.publish(self.evaluate(def, id, key, stack)?),
        }
    }

    fn ensure_acyclic(&self, id: VariableId) -> Result<(), ComputationError> {
        if self.verified.read().unwrap_or_else(PoisonError::into_inner).contains(&id) {
            return Ok(());
        }
        if let Some(cycle) = topology::find_cycle_from(&self.registry, id) {
            let path: Vec<String> = cycle.iter().map(|&v| self.registry.name(v).to_string()).collect();
            tracing::debug!(variable = %self.registry.name(id), cycle = %path.join(" -> "), "dependency cycle");
            return Err(ComputationError::DependencyCycle { path });
        }
        self.verified.write().unwrap_or_else(PoisonError::into_inner).insert(id);
        Ok(())
    }

    fn evaluate(
        &self,
        def: &VariableDefinition,
        id: VariableId,
        key: HolderKey,
        stack: &mut ResolutionStack,
    ) -> Result<Holder, ComputationError> {
        let formula = match def.formula {
            Some(formula) if def.validity.contains(key.period.start()) => formula,
            Some(_) => {
                return self.fill_default(def, id, key, || ComputationError::NoApplicableFormula {
                    variable: def.name.clone(),
                    period: key.period,
                })
            }
            None => {
                return self.fill_default(def, id, key, || ComputationError::MissingInput {
                    variable: def.name.clone(),
                    period: key.period,
                })
            }
        };

        stack.push(key);
        let outcome = formula(&mut FormulaContext { sim: self, def, variable: id, period: key.period, stack: &mut *stack });
        stack.pop();
        self.telemetry.record_evaluation(id);
        let value = outcome?;

        if !value.matches(&def.value_type) {
            return Err(ComputationError::TypeMismatch {
                variable: def.name.clone(),
                expected: def.value_type.name(),
                actual: value.type_name(),
            });
        }
        let expected = self.population.count(def.entity);
        if value.len() != expected {
            return Err(ComputationError::LengthMismatch { variable: def.name.clone(), expected, actual: value.len() });
        }

        tracing::debug!(variable = %def.name, period = %key.period, "formula evaluated");
        Ok(make_holder(def, id, key.period, value))
    }

    fn fill_default(
        &self,
        def: &VariableDefinition,
        id: VariableId,
        key: HolderKey,
        missing: impl FnOnce() -> ComputationError,
    ) -> Result<Holder, ComputationError> {
        let default = def.default.ok_or_else(missing)?;
        let len = self.population.count(def.entity);
        let value = Value::filled(&def.value_type, &default, len).ok_or_else(|| ComputationError::TypeMismatch {
            variable: def.name.clone(),
            expected: def.value_type.name(),
            actual: "incompatible default",
        })?;
        self.telemetry.record_default();
        tracing::debug!(variable = %def.name, period = %key.period, "default used");
        Ok(make_holder(def, id, key.period, value))
    }
}

fn make_holder(def: &VariableDefinition, id: VariableId, period: Period, value: Value) -> Holder {
    Holder {
        variable: id,
        name: Arc::from(def.name.as_str()),
        entity: def.entity,
        period,
        default: def.fill_value(),
        value,
    }
}

/// What a formula sees while it runs: its period, its declared dependencies,
/// the legislation at the period start and the group structure of its entity.
pub struct FormulaContext<'a> {
    sim: &'a Simulation,
    def: &'a VariableDefinition,
    variable: VariableId,
    period: Period,
    stack: &'a mut ResolutionStack,
}

impl<'a> FormulaContext<'a> {
    pub fn period(&self) -> Period { self.period }
    pub fn name(&self) -> &str { &self.def.name }
    pub fn entity(&self) -> EntityKind { self.def.entity }

    /// Number of rows the formula must return.
    pub fn count(&self) -> usize { self.sim.population.count(self.def.entity) }

    pub fn population(&self) -> &Population { &self.sim.population }

    fn dependency(&self, name: &str, probe: bool) -> Result<VariableId, ComputationError> {
        let registry = &self.sim.registry;
        let id = registry.id_of(name)?;
        let declared = registry.get_parents(self.variable).contains(&id)
            || (probe && registry.get_probes(self.variable).contains(&id));
        if !declared {
            return Err(ComputationError::UndeclaredDependency {
                variable: self.def.name.clone(),
                dependency: name.to_string(),
            });
        }
        Ok(id)
    }

    /// Cached evaluation of a required dependency.
    pub fn calculate(&mut self, name: &str, period: Period) -> Result<Holder, ComputationError> {
        let id = self.dependency(name, false)?;
        self.sim.resolve(id, period, self.stack, false)
    }

    /// Forced evaluation of a required dependency.
    pub fn compute(&mut self, name: &str, period: Period) -> Result<Holder, ComputationError> {
        let id = self.dependency(name, false)?;
        self.sim.resolve(id, period, self.stack, true)
    }

    /// Non-forcing probe of a required or probed dependency.
    pub fn get_if_cached(&self, name: &str, period: Period) -> Result<Option<Holder>, ComputationError> {
        let id = self.dependency(name, true)?;
        Ok(self.sim.probe(id, period))
    }

    /// Non-forcing probe that only sees values supplied with `set_input`.
    /// Defaults and computed values are ignored.
    pub fn get_input(&self, name: &str, period: Period) -> Result<Option<Holder>, ComputationError> {
        let id = self.dependency(name, true)?;
        let def = self.sim.registry.definition(id);
        let found = self.sim.ledger.input(HolderKey { variable: id, period: period.normalize(def.definition_period) });
        self.sim.telemetry.record_probe(found.is_some());
        Ok(found)
    }

    pub fn legislation(&self) -> Arc<LegislationSnapshot> { self.sim.legislation_at(self.period.start()) }

    pub fn scalar(&self, path: &str) -> Result<f64, ComputationError> {
        Ok(self.legislation().scalar(path)?)
    }

    pub fn bareme(&self, path: &str) -> Result<Bareme, ComputationError> {
        Ok(self.legislation().bareme(path)?.clone())
    }

    fn aggregator(&self) -> Result<RoleAggregator<'a>, ComputationError> {
        let sim: &'a Simulation = self.sim;
        Ok(RoleAggregator::new(sim.population.groups(self.def.entity)?))
    }

    pub fn filter_role(&self, holder: &Holder, role: Role) -> Result<Value, ComputationError> {
        self.aggregator()?.filter_role(holder, role)
    }

    pub fn split_by_roles(&self, holder: &Holder, roles: &[Role]) -> Result<Vec<(Role, Value)>, ComputationError> {
        self.aggregator()?.split_by_roles(holder, roles)
    }

    pub fn sum_by_roles(&self, holder: &Holder, roles: &[Role]) -> Result<Vec<f64>, ComputationError> {
        self.aggregator()?.sum_by_roles(holder, roles)
    }

    pub fn sum_by_entity(&self, holder: &Holder) -> Result<Vec<f64>, ComputationError> {
        self.aggregator()?.sum_all(holder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PopulationError;
    use crate::legislation::LegislationError;
    use crate::store::{Scalar, ValueType};
    use crate::compute::ledger::Origin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn year() -> Period { Period::year(2011).unwrap() }

    fn double(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
        let salaire = ctx.calculate("salaire", ctx.period())?;
        Ok(Value::from(salaire.floats()?.iter().map(|s| 2.0 * s).collect::<Vec<_>>()))
    }

    fn taxed(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
        let rate = ctx.scalar("ir.taux")?;
        let salaire = ctx.calculate("salaire", ctx.period())?;
        Ok(Value::from(salaire.floats()?.iter().map(|s| s * rate).collect::<Vec<_>>()))
    }

    fn couple(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
        let salaire = ctx.calculate("salaire", ctx.period())?;
        Ok(Value::from(ctx.sum_by_roles(&salaire, &Role::COUPLE)?))
    }

    fn sneaky(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
        ctx.calculate("salaire", ctx.period())?;
        Ok(Value::from(vec![0.0; ctx.count()]))
    }

    fn short(_: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
        Ok(Value::from(vec![1.0]))
    }

    fn wrong_type(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
        Ok(Value::from(vec![true; ctx.count()]))
    }

    fn group_sum_on_individual(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
        let salaire = ctx.calculate("salaire", ctx.period())?;
        Ok(Value::from(ctx.sum_by_entity(&salaire)?))
    }

    fn zero(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
        Ok(Value::from(vec![0.0; ctx.count()]))
    }

    fn x_needs_y(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
        Ok(ctx.calculate("y", ctx.period())?.value)
    }

    fn y_needs_x(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
        Ok(ctx.calculate("x", ctx.period())?.value)
    }

    fn registry() -> Arc<VariableRegistry> {
        let individu = EntityKind::Individu;
        let mut b = VariableRegistry::builder();
        b.add(VariableDefinition::input("salaire", individu, ValueType::Float))
            .add(VariableDefinition::input("required", individu, ValueType::Float).no_default())
            .add(VariableDefinition::computed("double", individu, ValueType::Float, double).requires(&["salaire"]))
            .add(
                VariableDefinition::computed("taxed", individu, ValueType::Float, taxed)
                    .requires(&["salaire"])
                    .parameters(&["ir.taux"]),
            )
            .add(
                VariableDefinition::computed("couple", EntityKind::FoyerFiscal, ValueType::Float, couple)
                    .requires(&["salaire"]),
            )
            .add(VariableDefinition::computed("sneaky", individu, ValueType::Float, sneaky))
            .add(VariableDefinition::computed("short", individu, ValueType::Float, short))
            .add(VariableDefinition::computed("wrong_type", individu, ValueType::Float, wrong_type))
            .add(
                VariableDefinition::computed("misplaced", individu, ValueType::Float, group_sum_on_individual)
                    .requires(&["salaire"]),
            )
            .add(
                VariableDefinition::computed("late", individu, ValueType::Float, zero)
                    .valid_from(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())
                    .no_default(),
            )
            .add(
                VariableDefinition::computed("late_with_default", individu, ValueType::Float, zero)
                    .valid_from(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())
                    .default_value(Scalar::Float(-1.0)),
            );
        Arc::new(b.build().unwrap())
    }

    fn legislation() -> Arc<Legislation> {
        Arc::new(
            Legislation::from_json_str(r#"{ "ir": { "taux": { "values": [ { "start": "2010-01-01", "value": 0.1 } ] } } }"#)
                .unwrap(),
        )
    }

    // Foyer 0: a couple. Foyer 1: a single declarant.
    fn population() -> Population {
        Population::builder(3)
            .group(EntityKind::FoyerFiscal, [(0, Role::Primary), (0, Role::Spouse), (1, Role::Primary)])
            .build()
            .unwrap()
    }

    fn simulation() -> Simulation {
        let mut sim = Simulation::new(registry(), legislation(), population());
        sim.set_input("salaire", year(), vec![1000.0, 500.0, 200.0]).unwrap();
        sim
    }

    #[test]
    fn test_get_is_idempotent() {
        let sim = simulation();
        let first = sim.get("double", year()).unwrap();
        let second = sim.get("double", year()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.value, Value::from(vec![2000.0, 1000.0, 400.0]));
        assert_eq!(sim.evaluations("double").unwrap(), 1);
        assert_eq!(sim.telemetry().cache_hits, 1);
    }

    #[test]
    fn test_requests_are_normalized_to_the_definition_period() {
        let sim = simulation();
        let march = Period::month(2011, 3).unwrap();
        let day = Period::day(NaiveDate::from_ymd_opt(2011, 11, 30).unwrap());
        let a = sim.get("double", march).unwrap();
        let b = sim.get("double", day).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.period, year());
        assert_eq!(sim.evaluations("double").unwrap(), 1);
    }

    #[test]
    fn test_compute_recomputes_without_caching() {
        let sim = simulation();
        sim.compute("double", year()).unwrap();
        sim.compute("double", year()).unwrap();
        assert_eq!(sim.evaluations("double").unwrap(), 2);
        assert!(sim.get_if_cached("double", year()).unwrap().is_none());

        // Inputs come back as stored.
        let salaire = sim.compute("salaire", year()).unwrap();
        assert_eq!(salaire.value, Value::from(vec![1000.0, 500.0, 200.0]));
    }

    #[test]
    fn test_get_if_cached_never_evaluates() {
        let sim = simulation();
        assert!(sim.get_if_cached("double", year()).unwrap().is_none());
        assert_eq!(sim.evaluations("double").unwrap(), 0);
        sim.get("double", year()).unwrap();
        assert!(sim.get_if_cached("double", Period::month(2011, 7).unwrap()).unwrap().is_some());

        let report = sim.telemetry();
        assert_eq!((report.probe_hits, report.probe_misses), (1, 1));
    }

    #[test]
    fn test_unknown_variable() {
        let sim = simulation();
        assert_eq!(sim.get("ghost", year()).unwrap_err(), ComputationError::UnknownVariable("ghost".into()));
        assert!(sim.get_if_cached("ghost", year()).is_err());
    }

    #[test]
    fn test_cycle_is_rejected_before_evaluation() {
        let mut b = VariableRegistry::builder();
        b.add(VariableDefinition::computed("x", EntityKind::Individu, ValueType::Float, x_needs_y).requires(&["y"]))
            .add(VariableDefinition::computed("y", EntityKind::Individu, ValueType::Float, y_needs_x).requires(&["x"]));
        let sim = Simulation::new(Arc::new(b.build().unwrap()), legislation(), population());

        let err = sim.get("x", year()).unwrap_err();
        assert_eq!(err, ComputationError::DependencyCycle { path: vec!["x".into(), "y".into(), "x".into()] });
        assert_eq!(sim.evaluations("x").unwrap(), 0);
        assert!(sim.ledger().is_empty());
    }

    #[test]
    fn test_undeclared_dependency() {
        let sim = simulation();
        assert_eq!(
            sim.get("sneaky", year()).unwrap_err(),
            ComputationError::UndeclaredDependency { variable: "sneaky".into(), dependency: "salaire".into() }
        );
    }

    #[test]
    fn test_defaults_and_missing_values() {
        let sim = simulation();
        assert!(matches!(sim.get("required", year()), Err(ComputationError::MissingInput { .. })));
        assert!(matches!(sim.get("late", year()), Err(ComputationError::NoApplicableFormula { .. })));

        let fallback = sim.get("late_with_default", year()).unwrap();
        assert_eq!(fallback.value, Value::from(vec![-1.0; 3]));
        assert_eq!(sim.evaluations("late_with_default").unwrap(), 0);
        assert_eq!(sim.telemetry().defaults_used, 1);

        // Unset inputs fall back to the natural default.
        let other_year = sim.get("salaire", Period::year(2015).unwrap()).unwrap();
        assert_eq!(other_year.value, Value::from(vec![0.0; 3]));
    }

    #[test]
    fn test_formula_output_is_validated() {
        let sim = simulation();
        assert_eq!(
            sim.get("short", year()).unwrap_err(),
            ComputationError::LengthMismatch { variable: "short".into(), expected: 3, actual: 1 }
        );
        assert!(matches!(sim.get("wrong_type", year()), Err(ComputationError::TypeMismatch { .. })));
        // Failed evaluations are not cached.
        assert!(sim.get_if_cached("short", year()).unwrap().is_none());
        assert!(sim.get("short", year()).is_err());
        assert_eq!(sim.evaluations("short").unwrap(), 2);
    }

    #[test]
    fn test_legislation_reaches_formulas() {
        let sim = simulation();
        assert_eq!(sim.get("taxed", year()).unwrap().value, Value::from(vec![100.0, 50.0, 20.0]));

        let before = Period::year(2009).unwrap();
        assert!(matches!(
            sim.get("taxed", before),
            Err(ComputationError::Legislation(LegislationError::UnknownParameterPath { .. }))
        ));
    }

    #[test]
    fn test_role_aggregation_through_context() {
        let sim = simulation();
        assert_eq!(sim.get("couple", year()).unwrap().value, Value::from(vec![1500.0, 200.0]));
        assert_eq!(
            sim.get("misplaced", year()).unwrap_err(),
            ComputationError::Population(PopulationError::NotAGroup(EntityKind::Individu))
        );
    }

    #[test]
    fn test_set_input_invalidates_downstream() {
        let mut sim = simulation();
        sim.get("double", year()).unwrap();
        sim.get("couple", year()).unwrap();

        sim.set_input("salaire", year(), vec![1.0, 2.0, 3.0]).unwrap();
        assert!(sim.get_if_cached("double", year()).unwrap().is_none());
        assert_eq!(sim.get("double", year()).unwrap().value, Value::from(vec![2.0, 4.0, 6.0]));
        assert_eq!(sim.get("couple", year()).unwrap().value, Value::from(vec![3.0, 3.0]));
        assert_eq!(sim.evaluations("double").unwrap(), 2);
    }

    #[test]
    fn test_set_input_validates_shape() {
        let mut sim = simulation();
        assert!(matches!(
            sim.set_input("salaire", year(), vec![1.0]),
            Err(ComputationError::LengthMismatch { expected: 3, actual: 1, .. })
        ));
        assert!(matches!(sim.set_input("salaire", year(), vec![1_i64, 2, 3]), Err(ComputationError::TypeMismatch { .. })));
    }

    #[test]
    fn test_concurrent_requests_compute_once() {
        let sim = simulation();
        thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| sim.get("double", year()).unwrap())).collect();
            for h in handles {
                assert_eq!(h.join().unwrap().value, Value::from(vec![2000.0, 1000.0, 400.0]));
            }
        });
        assert_eq!(sim.evaluations("double").unwrap(), 1);
    }

    static FLAKY_RUNS: AtomicUsize = AtomicUsize::new(0);

    fn flaky(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
        let salaire = ctx.calculate("salaire", ctx.period())?;
        thread::sleep(Duration::from_millis(30));
        if FLAKY_RUNS.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(ComputationError::UnknownVariable("transient".into()));
        }
        Ok(salaire.value)
    }

    #[test]
    fn test_waiters_take_over_a_failed_evaluation() {
        let mut b = VariableRegistry::builder();
        b.add(VariableDefinition::input("salaire", EntityKind::Individu, ValueType::Float))
            .add(VariableDefinition::computed("flaky", EntityKind::Individu, ValueType::Float, flaky).requires(&["salaire"]));
        let mut sim = Simulation::new(Arc::new(b.build().unwrap()), legislation(), population());
        sim.set_input("salaire", year(), vec![1.0, 2.0, 3.0]).unwrap();

        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..4).map(|_| s.spawn(|| sim.get("flaky", year()))).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
        for holder in results.into_iter().flatten() {
            assert_eq!(holder.value, Value::from(vec![1.0, 2.0, 3.0]));
        }
        assert_eq!(sim.evaluations("flaky").unwrap(), 2);
        let key = HolderKey { variable: sim.registry().id_of("flaky").unwrap(), period: year() };
        assert_eq!(sim.ledger().origin(key), Some(Origin::Computed));
    }

    #[test]
    fn test_get_many_on_dedicated_pool() {
        let config = SimulationConfig { worker_threads: Some(2), ..Default::default() };
        let mut sim = Simulation::new(registry(), legislation(), population()).with_config(&config).unwrap();
        sim.set_input("salaire", year(), vec![1000.0, 500.0, 200.0]).unwrap();

        let holders = sim.get_many(&["double", "taxed", "couple"], year()).unwrap();
        let names: Vec<&str> = holders.iter().map(|h| &*h.name).collect();
        assert_eq!(names, vec!["double", "taxed", "couple"]);
        assert!(sim.get_many(&["double", "short"], year()).is_err());
    }

    #[test]
    fn test_snapshots_are_shared_per_date() {
        let sim = simulation();
        let date = NaiveDate::from_ymd_opt(2011, 1, 1).unwrap();
        assert!(Arc::ptr_eq(&sim.legislation_at(date), &sim.legislation_at(date)));
    }
}
