//! δ-presence: the share of subset rows in every equivalence class of the
//! population must lie within `[delta_min, delta_max]`.
//!
//! A class that violates the bounds is repaired by suppressing the fewest
//! rows that move its ratio back inside: subset rows when the ratio is too
//! high, other rows when it is too low. The number of rows this needs never
//! grows when classes are merged, so satisfaction is monotone in the lattice.

use std::collections::HashMap;

use num::rational::Ratio;
use num::Integer;

use crate::encoding::EncodedData;
use crate::error::{config_error, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PresenceBounds {
    delta_min: f64,
    delta_max: f64,
    lower: (i128, i128),
    upper: (i128, i128),
}

impl PresenceBounds {
    pub fn new(delta_min: f64, delta_max: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&delta_min) || !(0.0..=1.0).contains(&delta_max) {
            return Err(config_error(format!(
                "presence bounds must lie in [0, 1], got [{}, {}]",
                delta_min, delta_max
            )));
        }
        if delta_min > delta_max {
            return Err(config_error(format!(
                "delta_min {} exceeds delta_max {}",
                delta_min, delta_max
            )));
        }
        Ok(Self {
            delta_min,
            delta_max,
            lower: exact(delta_min)?,
            upper: exact(delta_max)?,
        })
    }

    pub fn delta_min(&self) -> f64 {
        self.delta_min
    }

    pub fn delta_max(&self) -> f64 {
        self.delta_max
    }

    /// Classify a class of `count` rows of which `subset_count` belong to the subset.
    pub fn check(&self, count: usize, subset_count: usize) -> Violation {
        let n = count as i128;
        let s = subset_count as i128;
        if n == 0 {
            return Violation::Within;
        }
        let (p, q) = self.upper;
        if s * q > p * n {
            // smallest x with (s - x) / (n - x) <= p / q
            let rows = Integer::div_ceil(&(s * q - p * n), &(q - p));
            return Violation::AboveMax {
                rows: rows as usize,
            };
        }
        let (p, q) = self.lower;
        if s * q < p * n {
            // smallest y with s / (n - y) >= p / q
            let rows = Integer::div_ceil(&(p * n - s * q), &p);
            return Violation::BelowMin {
                rows: rows as usize,
            };
        }
        Violation::Within
    }
}

fn exact(value: f64) -> Result<(i128, i128)> {
    let ratio = Ratio::<i64>::approximate_float(value)
        .ok_or_else(|| config_error(format!("cannot represent {} exactly", value)))?;
    Ok((*ratio.numer() as i128, *ratio.denom() as i128))
}

/// How a class relates to the presence bounds, and how many rows repair it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Violation {
    Within,
    /// Too many subset rows; `rows` subset rows must go.
    AboveMax { rows: usize },
    /// Too few subset rows; `rows` non-subset rows must go.
    BelowMin { rows: usize },
}

impl Violation {
    pub fn rows(&self) -> usize {
        match self {
            Violation::Within => 0,
            Violation::AboveMax { rows } | Violation::BelowMin { rows } => *rows,
        }
    }
}

/// An equivalence class at some transformation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EquivalenceClass {
    pub key: Vec<u32>,
    pub count: usize,
    pub subset_count: usize,
    pub violation: Violation,
}

impl EquivalenceClass {
    pub fn presence(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.subset_count as f64 / self.count as f64
        }
    }
}

/// Result of checking the privacy criterion at one transformation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PredicateOutcome {
    pub satisfied: bool,
    pub suppressed: usize,
    pub classes: usize,
    pub violating_classes: usize,
}

/// Checks δ-presence with a suppression budget over encoded data.
#[derive(Clone, Debug)]
pub struct PresenceCriterion {
    bounds: PresenceBounds,
    budget: usize,
}

impl PresenceCriterion {
    pub fn new(bounds: PresenceBounds, suppression_limit: f64, population: usize) -> Result<Self> {
        if !(0.0..=1.0).contains(&suppression_limit) {
            return Err(config_error(format!(
                "suppression limit must lie in [0, 1], got {}",
                suppression_limit
            )));
        }
        // floor(p * N / q) on integers, so 0.29 of 100 rows is 29
        let (p, q) = exact(suppression_limit)?;
        let budget = (p * population as i128 / q) as usize;
        Ok(Self { bounds, budget })
    }

    pub fn bounds(&self) -> &PresenceBounds {
        &self.bounds
    }

    /// Largest number of rows that may be suppressed.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Partition the population at `levels`. Classes are ordered by their first group.
    pub fn classes(&self, data: &EncodedData, levels: &[usize]) -> Vec<EquivalenceClass> {
        let mut index: HashMap<Vec<u32>, usize> = HashMap::new();
        let mut classes: Vec<EquivalenceClass> = vec![];
        for group in data.groups() {
            let key = data.generalize(group, levels);
            let i = *index.entry(key.clone()).or_insert_with(|| {
                classes.push(EquivalenceClass {
                    key,
                    count: 0,
                    subset_count: 0,
                    violation: Violation::Within,
                });
                classes.len() - 1
            });
            classes[i].count += group.count;
            classes[i].subset_count += group.subset_count;
        }
        for class in classes.iter_mut() {
            class.violation = self.bounds.check(class.count, class.subset_count);
        }
        classes
    }

    pub fn evaluate(&self, data: &EncodedData, levels: &[usize]) -> PredicateOutcome {
        let classes = self.classes(data, levels);
        let violating: Vec<&EquivalenceClass> = classes
            .iter()
            .filter(|class| class.violation != Violation::Within)
            .collect();
        let suppressed = violating.iter().map(|class| class.violation.rows()).sum();
        PredicateOutcome {
            satisfied: suppressed <= self.budget,
            suppressed,
            classes: classes.len(),
            violating_classes: violating.len(),
        }
    }
}
