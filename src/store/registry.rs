use super::types::*;
use crate::compute::engine::Formula;
use crate::compute::error::ComputationError;
use crate::entity::EntityKind;
use crate::period::PeriodUnit;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Variable '{0}' is defined twice")]
    Duplicate(String),
    #[error("Variable '{variable}' depends on '{dependency}', which is not defined")]
    UnresolvedDependency { variable: String, dependency: String },
    #[error("Variable '{variable}' declares '{dependency}' both as required and probed")]
    ConflictingDependency { variable: String, dependency: String },
}

/// Everything the engine knows about one variable.
#[derive(Clone)]
pub struct VariableDefinition {
    pub name: String,
    pub label: Option<String>,
    pub entity: EntityKind,
    pub value_type: ValueType,
    pub definition_period: PeriodUnit,
    pub default: Option<Scalar>,
    pub dependencies: Vec<Dependency>,
    pub parameters: Vec<String>,
    pub validity: DateRange,
    pub formula: Option<Formula>,
}

impl VariableDefinition {
    /// A variable supplied from outside the model.
    pub fn input(name: &str, entity: EntityKind, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            label: None,
            entity,
            value_type,
            definition_period: PeriodUnit::Year,
            default: Some(value_type.natural_default()),
            dependencies: Vec::new(),
            parameters: Vec::new(),
            validity: DateRange::all(),
            formula: None,
        }
    }

    /// A variable computed by `formula`.
    pub fn computed(name: &str, entity: EntityKind, value_type: ValueType, formula: Formula) -> Self {
        Self { formula: Some(formula), ..Self::input(name, entity, value_type) }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn period(mut self, unit: PeriodUnit) -> Self {
        self.definition_period = unit;
        self
    }

    pub fn permanent(self) -> Self { self.period(PeriodUnit::Eternity) }

    pub fn default_value(mut self, default: Scalar) -> Self {
        self.default = Some(default);
        self
    }

    /// Resolution fails instead of falling back to a default.
    pub fn no_default(mut self) -> Self {
        self.default = None;
        self
    }

    pub fn requires(mut self, names: &[&str]) -> Self {
        self.dependencies.extend(names.iter().map(|n| Dependency::Requires(n.to_string())));
        self
    }

    pub fn probes(mut self, names: &[&str]) -> Self {
        self.dependencies.extend(names.iter().map(|n| Dependency::Probes(n.to_string())));
        self
    }

    pub fn parameters(mut self, paths: &[&str]) -> Self {
        self.parameters.extend(paths.iter().map(|p| p.to_string()));
        self
    }

    pub fn valid_from(mut self, start: NaiveDate) -> Self {
        self.validity.start = Some(start);
        self
    }

    pub fn valid_until(mut self, stop: NaiveDate) -> Self {
        self.validity.stop = Some(stop);
        self
    }

    pub fn is_input(&self) -> bool { self.formula.is_none() }

    /// Default value used to fill arrays, falling back to the type's natural default.
    pub fn fill_value(&self) -> Scalar {
        self.default.unwrap_or_else(|| self.value_type.natural_default())
    }
}

impl fmt::Debug for VariableDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableDefinition")
            .field("name", &self.name)
            .field("entity", &self.entity)
            .field("value_type", &self.value_type)
            .field("definition_period", &self.definition_period)
            .field("default", &self.default)
            .field("dependencies", &self.dependencies)
            .field("has_formula", &self.formula.is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    defs: Vec<VariableDefinition>,
}

impl RegistryBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn add(&mut self, def: VariableDefinition) -> &mut Self {
        self.defs.push(def);
        self
    }

    pub fn extend(&mut self, defs: impl IntoIterator<Item = VariableDefinition>) -> &mut Self {
        self.defs.extend(defs);
        self
    }

    /// Resolves every declared dependency to an id and lays out the topology.
    pub fn build(self) -> Result<VariableRegistry, RegistryError> {
        let mut registry = VariableRegistry::default();
        registry.first_child = vec![u32::MAX; self.defs.len()];

        for def in &self.defs {
            if registry.index.insert(def.name.clone(), VariableId::new(registry.index.len())).is_some() {
                return Err(RegistryError::Duplicate(def.name.clone()));
            }
        }

        for (i, def) in self.defs.iter().enumerate() {
            let mut requires = Vec::new();
            let mut probes = Vec::new();
            for dep in &def.dependencies {
                let id = *registry.index.get(dep.name()).ok_or_else(|| RegistryError::UnresolvedDependency {
                    variable: def.name.clone(),
                    dependency: dep.name().to_string(),
                })?;
                match dep {
                    Dependency::Requires(_) => requires.push(id),
                    Dependency::Probes(_) => probes.push(id),
                }
            }
            if let Some(clash) = requires.iter().find(|id| probes.contains(id)) {
                return Err(RegistryError::ConflictingDependency {
                    variable: def.name.clone(),
                    dependency: self.defs[clash.index()].name.clone(),
                });
            }
            registry.link(VariableId::new(i), &requires, &probes);
        }

        registry.defs = self.defs;
        Ok(registry)
    }
}

/// The variable graph: definitions plus dense dependency topology.
#[derive(Debug, Default)]
pub struct VariableRegistry {
    defs: Vec<VariableDefinition>,
    index: HashMap<String, VariableId>,

    // Required dependencies (CSR)
    pub parents_flat: Vec<VariableId>,
    pub parents_ranges: Vec<(u32, u32)>, // (start, count)

    // Probed dependencies (CSR)
    pub probes_flat: Vec<VariableId>,
    pub probes_ranges: Vec<(u32, u32)>,

    // Downstream traversal helpers (both dependency kinds)
    pub first_child: Vec<u32>,
    pub child_targets: Vec<VariableId>,
    pub next_child: Vec<u32>,
}

impl VariableRegistry {
    pub fn builder() -> RegistryBuilder { RegistryBuilder::new() }
    pub fn count(&self) -> usize { self.defs.len() }

    fn link(&mut self, id: VariableId, requires: &[VariableId], probes: &[VariableId]) {
        // 1. Register parents
        let start = self.parents_flat.len() as u32;
        self.parents_flat.extend_from_slice(requires);
        self.parents_ranges.push((start, requires.len() as u32));

        let start = self.probes_flat.len() as u32;
        self.probes_flat.extend_from_slice(probes);
        self.probes_ranges.push((start, probes.len() as u32));

        // 2. Register children (adjacency list for downstream lookups)
        for &parent in requires.iter().chain(probes) {
            let p_idx = parent.index();
            let head = self.first_child[p_idx];
            let new_edge = self.child_targets.len() as u32;
            self.child_targets.push(id);
            self.next_child.push(head);
            self.first_child[p_idx] = new_edge;
        }
    }

    pub fn id(&self, name: &str) -> Option<VariableId> {
        self.index.get(name).copied()
    }

    pub fn resolve(&self, name: &str) -> Result<&VariableDefinition, ComputationError> {
        self.id(name)
            .map(|id| self.definition(id))
            .ok_or_else(|| ComputationError::UnknownVariable(name.to_string()))
    }

    pub fn id_of(&self, name: &str) -> Result<VariableId, ComputationError> {
        self.id(name).ok_or_else(|| ComputationError::UnknownVariable(name.to_string()))
    }

    #[inline(always)]
    pub fn definition(&self, id: VariableId) -> &VariableDefinition {
        &self.defs[id.index()]
    }

    pub fn name(&self, id: VariableId) -> &str {
        &self.defs[id.index()].name
    }

    pub fn definitions(&self) -> impl Iterator<Item = (VariableId, &VariableDefinition)> {
        self.defs.iter().enumerate().map(|(i, d)| (VariableId::new(i), d))
    }

    #[inline(always)]
    pub fn get_parents(&self, id: VariableId) -> &[VariableId] {
        let (start, count) = self.parents_ranges[id.index()];
        &self.parents_flat[start as usize..(start + count) as usize]
    }

    #[inline(always)]
    pub fn get_probes(&self, id: VariableId) -> &[VariableId] {
        let (start, count) = self.probes_ranges[id.index()];
        &self.probes_flat[start as usize..(start + count) as usize]
    }

    pub fn get_children(&self, id: VariableId) -> Vec<VariableId> {
        let mut children = Vec::new();
        let mut edge_idx = self.first_child.get(id.index()).copied().unwrap_or(u32::MAX);
        while edge_idx != u32::MAX {
            children.push(self.child_targets[edge_idx as usize]);
            edge_idx = self.next_child[edge_idx as usize];
        }
        children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::FormulaContext;
    use crate::compute::Value;

    fn zero(ctx: &mut FormulaContext<'_>) -> Result<Value, ComputationError> {
        Ok(Value::from(vec![0.0; ctx.count()]))
    }

    fn var(name: &str) -> VariableDefinition {
        VariableDefinition::computed(name, EntityKind::Individu, ValueType::Float, zero)
    }

    #[test]
    fn test_forward_references_resolve() {
        let mut b = VariableRegistry::builder();
        b.add(var("total").requires(&["a", "b"]))
            .add(VariableDefinition::input("a", EntityKind::Individu, ValueType::Float))
            .add(VariableDefinition::input("b", EntityKind::Individu, ValueType::Float));
        let reg = b.build().unwrap();

        let total = reg.id("total").unwrap();
        let a = reg.id("a").unwrap();
        assert_eq!(reg.get_parents(total), &[a, reg.id("b").unwrap()]);
        assert_eq!(reg.get_children(a), vec![total]);
        assert!(reg.resolve("a").unwrap().is_input());
    }

    #[test]
    fn test_probes_are_children_but_not_parents() {
        let mut b = VariableRegistry::builder();
        b.add(var("x").probes(&["y"])).add(var("y"));
        let reg = b.build().unwrap();
        let (x, y) = (reg.id("x").unwrap(), reg.id("y").unwrap());
        assert!(reg.get_parents(x).is_empty());
        assert_eq!(reg.get_probes(x), &[y]);
        assert_eq!(reg.get_children(y), vec![x]);
    }

    #[test]
    fn test_unknown_dependency_fails_build() {
        let mut b = VariableRegistry::builder();
        b.add(var("x").requires(&["ghost"]));
        assert_eq!(
            b.build().unwrap_err(),
            RegistryError::UnresolvedDependency { variable: "x".into(), dependency: "ghost".into() }
        );
    }

    #[test]
    fn test_duplicate_and_conflicting_declarations() {
        let mut b = VariableRegistry::builder();
        b.add(var("x")).add(var("x"));
        assert_eq!(b.build().unwrap_err(), RegistryError::Duplicate("x".into()));

        let mut b = VariableRegistry::builder();
        b.add(var("x").requires(&["y"]).probes(&["y"])).add(var("y"));
        assert!(matches!(b.build().unwrap_err(), RegistryError::ConflictingDependency { .. }));
    }

    #[test]
    fn test_resolve_unknown_name() {
        let reg = VariableRegistry::builder().build().unwrap();
        assert_eq!(reg.resolve("nope").unwrap_err(), ComputationError::UnknownVariable("nope".into()));
    }
}
