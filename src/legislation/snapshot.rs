use super::bareme::Bareme;
use super::LegislationError;
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotNode {
    Scalar(f64),
    Bareme(Bareme),
    Group(BTreeMap<String, SnapshotNode>),
}

impl SnapshotNode {
    fn kind(&self) -> &'static str {
        match self {
            SnapshotNode::Scalar(_) => "scalar",
            SnapshotNode::Bareme(_) => "bareme",
            SnapshotNode::Group(_) => "group",
        }
    }
}

/// The parameters in force at a single date, addressed by dotted paths.
#[derive(Debug, Clone, PartialEq)]
pub struct LegislationSnapshot {
    date: NaiveDate,
    root: BTreeMap<String, SnapshotNode>,
}

impl LegislationSnapshot {
    pub(crate) fn new(date: NaiveDate, root: BTreeMap<String, SnapshotNode>) -> Self {
        Self { date, root }
    }

    pub fn date(&self) -> NaiveDate { self.date }

    pub fn get(&self, path: &str) -> Result<&SnapshotNode, LegislationError> {
        let mut segments = path.split('.');
        let missing = || LegislationError::UnknownParameterPath { path: path.to_string(), date: self.date };

        let first = segments.next().ok_or_else(missing)?;
        let mut node = self.root.get(first).ok_or_else(missing)?;
        for segment in segments {
            node = match node {
                SnapshotNode::Group(children) => children.get(segment).ok_or_else(missing)?,
                _ => return Err(missing()),
            };
        }
        Ok(node)
    }

    pub fn contains(&self, path: &str) -> bool { self.get(path).is_ok() }

    pub fn scalar(&self, path: &str) -> Result<f64, LegislationError> {
        match self.get(path)? {
            SnapshotNode::Scalar(v) => Ok(*v),
            other => Err(LegislationError::WrongKind { path: path.to_string(), expected: "scalar", actual: other.kind() }),
        }
    }

    pub fn bareme(&self, path: &str) -> Result<&Bareme, LegislationError> {
        match self.get(path)? {
            SnapshotNode::Bareme(b) => Ok(b),
            other => Err(LegislationError::WrongKind { path: path.to_string(), expected: "bareme", actual: other.kind() }),
        }
    }

    /// Scalar at `path`, or `fallback` when the path is not in force.
    pub fn scalar_or(&self, path: &str, fallback: f64) -> Result<f64, LegislationError> {
        match self.scalar(path) {
            Err(LegislationError::UnknownParameterPath { .. }) => Ok(fallback),
            other => other,
        }
    }
}
