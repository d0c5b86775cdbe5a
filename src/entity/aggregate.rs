//! Role-based projections of individual values onto group entities.

use super::population::GroupStructure;
use super::role::{EntityKind, Role};
use crate::compute::{ComputationError, Holder, Value};

/// Reads individual-level holders through one group structure.
///
/// Every output is aligned with the groups of that structure. A role nobody
/// holds in a group yields the holder's default for that group.
#[derive(Debug, Clone, Copy)]
pub struct RoleAggregator<'p> {
    groups: &'p GroupStructure,
}

impl<'p> RoleAggregator<'p> {
    pub fn new(groups: &'p GroupStructure) -> Self { Self { groups } }

    pub fn kind(&self) -> EntityKind { self.groups.kind() }

    fn check(&self, holder: &Holder) -> Result<(), ComputationError> {
        if holder.entity != EntityKind::Individu {
            return Err(ComputationError::EntityMismatch {
                variable: holder.name.to_string(),
                expected: EntityKind::Individu,
                actual: holder.entity,
            });
        }
        if holder.len() != self.groups.individuals() {
            return Err(ComputationError::LengthMismatch {
                variable: holder.name.to_string(),
                expected: self.groups.individuals(),
                actual: holder.len(),
            });
        }
        Ok(())
    }

    fn default_mismatch(holder: &Holder) -> ComputationError {
        ComputationError::TypeMismatch {
            variable: holder.name.to_string(),
            expected: holder.value.type_name(),
            actual: "incompatible default",
        }
    }

    #[inline]
    fn gather<T: Copy>(&self, values: &[T], role: Role, fill: T) -> Vec<T> {
        (0..self.groups.count())
            .map(|g| self.groups.member(g, role).map_or(fill, |i| values[i]))
            .collect()
    }

    /// Value of the member holding `role` in each group.
    pub fn filter_role(&self, holder: &Holder, role: Role) -> Result<Value, ComputationError> {
        self.check(holder)?;
        let fill = holder.default;
        let missing = || Self::default_mismatch(holder);
        Ok(match &holder.value {
            Value::Bool(v) => Value::from(self.gather(v, role, fill.as_bool().ok_or_else(missing)?)),
            Value::Int(v) => Value::from(self.gather(v, role, fill.as_i64().ok_or_else(missing)?)),
            Value::Float(v) => Value::from(self.gather(v, role, fill.as_f64().ok_or_else(missing)?)),
            Value::Date(v) => Value::from(self.gather(v, role, fill.as_date().ok_or_else(missing)?)),
        })
    }

    /// One column per requested role, in the order given.
    pub fn split_by_roles(&self, holder: &Holder, roles: &[Role]) -> Result<Vec<(Role, Value)>, ComputationError> {
        roles.iter().map(|&role| Ok((role, self.filter_role(holder, role)?))).collect()
    }

    /// Sum over the members holding any of `roles`. Absent members add nothing.
    pub fn sum_by_roles(&self, holder: &Holder, roles: &[Role]) -> Result<Vec<f64>, ComputationError> {
        self.check(holder)?;
        let values = holder.floats()?;
        let mut out = vec![0.0; self.groups.count()];
        for (g, total) in out.iter_mut().enumerate() {
            for &role in roles {
                if let Some(i) = self.groups.member(g, role) {
                    *total += values[i];
                }
            }
        }
        Ok(out)
    }

    /// Sum over every member of each group.
    pub fn sum_all(&self, holder: &Holder) -> Result<Vec<f64>, ComputationError> {
        self.check(holder)?;
        let values = holder.floats()?;
        let mut out = vec![0.0; self.groups.count()];
        for (m, v) in self.groups.memberships().iter().zip(values.iter()) {
            out[m.group] += v;
        }
        Ok(out)
    }
}
