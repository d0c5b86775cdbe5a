use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct VariableId(pub u32);

impl VariableId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

/// Storage type of a variable's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    /// Stored as integer codes; `variants[i]` labels code `i + 1`.
    Enum(&'static [&'static str]),
    Date,
}

impl ValueType {
    /// The value used when nothing else applies.
    pub fn natural_default(&self) -> Scalar {
        match self {
            ValueType::Bool => Scalar::Bool(false),
            ValueType::Int | ValueType::Enum(_) => Scalar::Int(0),
            ValueType::Float => Scalar::Float(0.0),
            ValueType::Date => Scalar::Date(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Enum(_) => "enum",
            ValueType::Date => "date",
        }
    }
}

/// A single value, used for defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Scalar::Float(v) => Some(v),
            Scalar::Int(v) => Some(v as f64),
            Scalar::Bool(v) => Some(if v { 1.0 } else { 0.0 }),
            Scalar::Date(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Scalar::Int(v) => Some(v),
            Scalar::Bool(v) => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Scalar::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match *self {
            Scalar::Date(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{:.3}", v),
            Scalar::Date(d) => write!(f, "{}", d),
        }
    }
}

/// Dates over which a formula is valid. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub stop: Option<NaiveDate>,
}

impl DateRange {
    pub fn all() -> Self { Self::default() }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start.map_or(true, |s| s <= day) && self.stop.map_or(true, |s| day <= s)
    }
}

/// How a formula uses another variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// Always evaluated when the formula runs.
    Requires(String),
    /// Only checked for presence in the cache; never forces evaluation and
    /// therefore never participates in cycle detection.
    Probes(String),
}

impl Dependency {
    pub fn name(&self) -> &str {
        match self {
            Dependency::Requires(n) | Dependency::Probes(n) => n,
        }
    }
}
