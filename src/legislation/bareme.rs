//! Progressive bracket schedules.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    /// Lower bound of the bracket (inclusive).
    pub threshold: f64,
    /// Marginal rate applied above `threshold`.
    pub rate: f64,
}

/// A marginal-rate schedule. Brackets are kept sorted by threshold.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Bracket>", into = "Vec<Bracket>")]
pub struct Bareme {
    brackets: Vec<Bracket>,
}

impl From<Vec<Bracket>> for Bareme {
    fn from(mut brackets: Vec<Bracket>) -> Self {
        brackets.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));
        Self { brackets }
    }
}

impl From<Bareme> for Vec<Bracket> {
    fn from(b: Bareme) -> Self { b.brackets }
}

impl Bareme {
    pub fn new(brackets: Vec<Bracket>) -> Self { Self::from(brackets) }

    pub fn brackets(&self) -> &[Bracket] { &self.brackets }

    /// Tax due on a single base. Bases at or below the first threshold owe
    /// nothing. A NaN base yields NaN.
    pub fn calc_one(&self, base: f64) -> f64 {
        if base.is_nan() {
            return f64::NAN;
        }
        let mut tax = 0.0;
        for (i, bracket) in self.brackets.iter().enumerate() {
            if base <= bracket.threshold {
                break;
            }
            let upper = self.brackets.get(i + 1).map_or(f64::INFINITY, |next| next.threshold);
            tax += (base.min(upper) - bracket.threshold) * bracket.rate;
        }
        tax
    }

    pub fn calc(&self, bases: &[f64]) -> Vec<f64> {
        bases.iter().map(|&b| self.calc_one(b)).collect()
    }

    /// Rate of the bracket containing `base` (left-closed brackets).
    pub fn marginal_rate(&self, base: f64) -> f64 {
        self.brackets
            .iter()
            .take_while(|b| b.threshold <= base)
            .last()
            .map_or(0.0, |b| b.rate)
    }
}
