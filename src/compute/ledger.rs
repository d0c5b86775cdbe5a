//! ledger.rs
//! Typed value columns, holders, and the per-(variable, period) cache with
//! single-flight claims.

use super::error::ComputationError;
use crate::entity::EntityKind;
use crate::period::Period;
use crate::store::{Scalar, ValueType, VariableId};
use chrono::NaiveDate;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// A column of values aligned with an entity population.
/// Columns are shared; cloning a `Value` never copies data.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(Arc<Vec<bool>>),
    Int(Arc<Vec<i64>>),
    Float(Arc<Vec<f64>>),
    Date(Arc<Vec<NaiveDate>>),
}

impl Value {
    pub fn len(&self) -> usize {
        match self {
            Value::Bool(v) => v.len(),
            Value::Int(v) => v.len(),
            Value::Float(v) => v.len(),
            Value::Date(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Date(_) => "date",
        }
    }

    /// Whether this column can be stored for a variable of type `ty`.
    pub fn matches(&self, ty: &ValueType) -> bool {
        matches!(
            (self, ty),
            (Value::Bool(_), ValueType::Bool)
                | (Value::Int(_), ValueType::Int | ValueType::Enum(_))
                | (Value::Float(_), ValueType::Float)
                | (Value::Date(_), ValueType::Date)
        )
    }

    /// A column of `len` copies of `fill`, typed for `ty`.
    /// Returns `None` when `fill` cannot be represented as `ty`.
    pub fn filled(ty: &ValueType, fill: &Scalar, len: usize) -> Option<Value> {
        Some(match ty {
            ValueType::Bool => Value::from(vec![fill.as_bool()?; len]),
            ValueType::Int | ValueType::Enum(_) => Value::from(vec![fill.as_i64()?; len]),
            ValueType::Float => Value::from(vec![fill.as_f64()?; len]),
            ValueType::Date => Value::from(vec![fill.as_date()?; len]),
        })
    }

    pub fn get(&self, i: usize) -> Option<Scalar> {
        match self {
            Value::Bool(v) => v.get(i).map(|&x| Scalar::Bool(x)),
            Value::Int(v) => v.get(i).map(|&x| Scalar::Int(x)),
            Value::Float(v) => v.get(i).map(|&x| Scalar::Float(x)),
            Value::Date(v) => v.get(i).map(|&x| Scalar::Date(x)),
        }
    }

    /// Numeric view; booleans read as 0/1.
    pub fn as_floats(&self) -> Option<Cow<'_, [f64]>> {
        match self {
            Value::Float(v) => Some(Cow::Borrowed(v.as_slice())),
            Value::Int(v) => Some(Cow::Owned(v.iter().map(|&x| x as f64).collect())),
            Value::Bool(v) => Some(Cow::Owned(v.iter().map(|&x| if x { 1.0 } else { 0.0 }).collect())),
            Value::Date(_) => None,
        }
    }

    pub fn as_ints(&self) -> Option<Cow<'_, [i64]>> {
        match self {
            Value::Int(v) => Some(Cow::Borrowed(v.as_slice())),
            Value::Bool(v) => Some(Cow::Owned(v.iter().map(|&x| x as i64).collect())),
            _ => None,
        }
    }

    pub fn as_bools(&self) -> Option<&[bool]> {
        match self {
            Value::Bool(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_dates(&self) -> Option<&[NaiveDate]> {
        match self {
            Value::Date(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl From<Vec<bool>> for Value {
    fn from(v: Vec<bool>) -> Self { Value::Bool(Arc::new(v)) }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self { Value::Int(Arc::new(v)) }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self { Value::Float(Arc::new(v)) }
}

impl From<Vec<NaiveDate>> for Value {
    fn from(v: Vec<NaiveDate>) -> Self { Value::Date(Arc::new(v)) }
}

/// The values of one variable for one normalized period.
#[derive(Debug, Clone, PartialEq)]
pub struct Holder {
    pub variable: VariableId,
    pub name: Arc<str>,
    pub entity: EntityKind,
    pub period: Period,
    /// Stands in for members that are absent from a group.
    pub default: Scalar,
    pub value: Value,
}

impl Holder {
    pub fn len(&self) -> usize { self.value.len() }
    pub fn is_empty(&self) -> bool { self.value.is_empty() }

    fn mismatch(&self, expected: &'static str) -> ComputationError {
        ComputationError::TypeMismatch {
            variable: self.name.to_string(),
            expected,
            actual: self.value.type_name(),
        }
    }

    pub fn floats(&self) -> Result<Cow<'_, [f64]>, ComputationError> {
        self.value.as_floats().ok_or_else(|| self.mismatch("float"))
    }

    pub fn ints(&self) -> Result<Cow<'_, [i64]>, ComputationError> {
        self.value.as_ints().ok_or_else(|| self.mismatch("int"))
    }

    pub fn bools(&self) -> Result<&[bool], ComputationError> {
        self.value.as_bools().ok_or_else(|| self.mismatch("bool"))
    }

    pub fn dates(&self) -> Result<&[NaiveDate], ComputationError> {
        self.value.as_dates().ok_or_else(|| self.mismatch("date"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HolderKey {
    pub variable: VariableId,
    pub period: Period,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Input,
    Computed,
}

#[derive(Debug)]
enum Slot {
    InFlight,
    Ready { holder: Holder, origin: Origin },
}

/// Outcome of [`Ledger::claim`].
pub enum Claim<'l> {
    /// The key was already published.
    Ready(Holder),
    /// The caller owns the computation of this key and must publish it.
    Owner(ClaimGuard<'l>),
}

/// Exclusive right to compute one key. Dropping the guard without
/// publishing abandons the claim and wakes waiters.
pub struct ClaimGuard<'l> {
    ledger: &'l Ledger,
    key: HolderKey,
    published: bool,
}

impl ClaimGuard<'_> {
    pub fn key(&self) -> HolderKey { self.key }

    pub fn publish(mut self, holder: Holder) -> Result<Holder, ComputationError> {
        let mut slots = self.ledger.lock();
        match slots.get_mut(&self.key) {
            Some(slot) if matches!(slot, Slot::InFlight) => {
                *slot = Slot::Ready { holder: holder.clone(), origin: Origin::Computed };
                self.published = true;
                drop(slots);
                self.ledger.settled.notify_all();
                Ok(holder)
            }
            _ => Err(ComputationError::StaleCacheRead {
                variable: holder.name.to_string(),
                period: self.key.period,
            }),
        }
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        let mut slots = self.ledger.lock();
        if matches!(slots.get(&self.key), Some(Slot::InFlight)) {
            slots.remove(&self.key);
        }
        drop(slots);
        self.ledger.settled.notify_all();
    }
}

/// Append-only (per key) store of holders.
#[derive(Debug, Default)]
pub struct Ledger {
    slots: Mutex<HashMap<HolderKey, Slot>>,
    settled: Condvar,
}

impl Ledger {
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, HashMap<HolderKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the published holder, or makes the caller the owner of the key.
    /// Blocks while another thread is computing the same key.
    pub fn claim(&self, key: HolderKey) -> Claim<'_> {
        let mut slots = self.lock();
        loop {
            match slots.get(&key) {
                Some(Slot::Ready { holder, .. }) => return Claim::Ready(holder.clone()),
                Some(Slot::InFlight) => {
                    slots = self.settled.wait(slots).unwrap_or_else(PoisonError::into_inner);
                }
                None => {
                    slots.insert(key, Slot::InFlight);
                    return Claim::Owner(ClaimGuard { ledger: self, key, published: false });
                }
            }
        }
    }

    /// Non-blocking lookup of a published holder.
    pub fn peek(&self, key: HolderKey) -> Option<Holder> {
        match self.lock().get(&key) {
            Some(Slot::Ready { holder, .. }) => Some(holder.clone()),
            _ => None,
        }
    }

    /// The holder stored for `key` by `insert_input`, if any.
    pub fn input(&self, key: HolderKey) -> Option<Holder> {
        match self.lock().get(&key) {
            Some(Slot::Ready { holder, origin: Origin::Input }) => Some(holder.clone()),
            _ => None,
        }
    }

    pub fn origin(&self, key: HolderKey) -> Option<Origin> {
        match self.lock().get(&key) {
            Some(Slot::Ready { origin, .. }) => Some(*origin),
            _ => None,
        }
    }

    pub fn insert_input(&mut self, key: HolderKey, holder: Holder) {
        let slots = self.slots.get_mut().unwrap_or_else(PoisonError::into_inner);
        slots.insert(key, Slot::Ready { holder, origin: Origin::Input });
    }

    /// Drops every computed holder of the given variables, for all periods.
    /// Inputs are kept. Returns the number of holders dropped.
    pub fn invalidate(&mut self, variables: &HashSet<VariableId>) -> usize {
        let slots = self.slots.get_mut().unwrap_or_else(PoisonError::into_inner);
        let before = slots.len();
        slots.retain(|key, slot| {
            !(variables.contains(&key.variable) && matches!(slot, Slot::Ready { origin: Origin::Computed, .. }))
        });
        before - slots.len()
    }

    pub fn len(&self) -> usize { self.lock().len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
