//! The dated parameter tree as stored on disk, and its resolution at a date.

use super::bareme::Bareme;
use super::snapshot::{LegislationSnapshot, SnapshotNode};
use super::LegislationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A value in force from `start` (inclusive) until `stop` (inclusive) or the
/// next entry. A `null` value removes the parameter from `start` on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dated<T> {
    pub start: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<NaiveDate>,
    #[serde(default)]
    pub value: Option<T>,
}

fn in_force<T>(entries: &[Dated<T>], date: NaiveDate) -> Option<&T> {
    let current = entries.iter().filter(|e| e.start <= date).max_by_key(|e| e.start)?;
    if current.stop.map_or(false, |stop| date > stop) {
        return None;
    }
    current.value.as_ref()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScalarParameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub values: Vec<Dated<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaremeParameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schedules: Vec<Dated<Bareme>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterNode {
    Scalar(ScalarParameter),
    Bareme(BaremeParameter),
    Group(BTreeMap<String, ParameterNode>),
}

impl ParameterNode {
    fn resolve(&self, date: NaiveDate) -> Option<SnapshotNode> {
        match self {
            ParameterNode::Scalar(p) => in_force(&p.values, date).map(|v| SnapshotNode::Scalar(*v)),
            ParameterNode::Bareme(p) => in_force(&p.schedules, date).map(|b| SnapshotNode::Bareme(b.clone())),
            ParameterNode::Group(children) => {
                let resolved = resolve_children(children, date);
                (!resolved.is_empty()).then_some(SnapshotNode::Group(resolved))
            }
        }
    }
}

fn resolve_children(children: &BTreeMap<String, ParameterNode>, date: NaiveDate) -> BTreeMap<String, SnapshotNode> {
    children
        .iter()
        .filter_map(|(name, node)| node.resolve(date).map(|n| (name.clone(), n)))
        .collect()
}

/// The full legislation across all dates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Legislation {
    root: BTreeMap<String, ParameterNode>,
}

impl Legislation {
    pub fn from_json_str(json: &str) -> Result<Self, LegislationError> {
        serde_json::from_str(json).map_err(|e| LegislationError::Parse(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LegislationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| LegislationError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let legislation = Self::from_json_str(&text)?;
        tracing::info!(path = %path.display(), "legislation loaded");
        Ok(legislation)
    }

    /// Resolves every parameter in force at `date`.
    pub fn at(&self, date: NaiveDate) -> LegislationSnapshot {
        LegislationSnapshot::new(date, resolve_children(&self.root, date))
    }
}
