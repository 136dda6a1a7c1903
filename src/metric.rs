use std::collections::HashMap;

use crate::encoding::EncodedData;
use crate::error::{config_error, Result};

/// How per-attribute losses are combined into one score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AggregateFunction {
    #[default]
    ArithmeticMean,
    GeometricMean,
    Sum,
    Maximum,
}

/// Information loss of a transformation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Loss {
    /// Aggregated generalization loss; monotone in the lattice.
    pub generalization: f64,
    /// Generalization loss plus the suppression penalty.
    pub total: f64,
}

/// Loss metric over the generalized quasi-identifiers.
///
/// The loss of one attribute at level `k` is `(|D0| - |Dk|) / (|D0| - 1)`,
/// where `|Dk|` counts the distinct labels of the observed values at `k`.
#[derive(Clone, Debug, PartialEq)]
pub struct LossMetric {
    aggregate: AggregateFunction,
    weights: HashMap<String, f64>,
    suppression_weight: f64,
}

impl Default for LossMetric {
    fn default() -> Self {
        Self {
            aggregate: AggregateFunction::ArithmeticMean,
            weights: HashMap::new(),
            suppression_weight: 1.0,
        }
    }
}

impl LossMetric {
    pub fn new(aggregate: AggregateFunction) -> Self {
        Self {
            aggregate,
            ..Self::default()
        }
    }

    pub fn aggregate(&self) -> AggregateFunction {
        self.aggregate
    }

    /// Weight of an attribute; attributes without an explicit weight count 1.
    pub fn set_attribute_weight(&mut self, attribute: &str, weight: f64) -> Result<&mut Self> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(config_error(format!(
                "weight of {:?} must be finite and non-negative, got {}",
                attribute, weight
            )));
        }
        self.weights.insert(attribute.to_string(), weight);
        Ok(self)
    }

    /// Penalty per suppressed fraction of the population.
    pub fn set_suppression_weight(&mut self, weight: f64) -> Result<&mut Self> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(config_error(format!(
                "suppression weight must be finite and non-negative, got {}",
                weight
            )));
        }
        self.suppression_weight = weight;
        Ok(self)
    }

    pub fn attribute_weight(&self, attribute: &str) -> f64 {
        self.weights.get(attribute).copied().unwrap_or(1.0)
    }

    /// Bind the metric to the encoded data of one search.
    pub fn prepare(&self, data: &EncodedData) -> Result<PreparedMetric> {
        let weights: Vec<f64> = data
            .attributes()
            .iter()
            .map(|attribute| self.attribute_weight(&attribute.name))
            .collect();
        let total: f64 = weights.iter().sum();
        if !weights.is_empty() && total <= 0.0 {
            return Err(config_error("attribute weights must not all be zero"));
        }
        let domains = data
            .attributes()
            .iter()
            .map(|attribute| {
                (0..=attribute.height())
                    .map(|level| attribute.domain_size(level))
                    .collect()
            })
            .collect();
        Ok(PreparedMetric {
            aggregate: self.aggregate,
            weights: weights.iter().map(|w| w / total).collect(),
            suppression_weight: self.suppression_weight,
            domains,
            population: data.num_rows(),
        })
    }
}

/// A loss metric with normalized weights and the domain sizes of every level.
#[derive(Clone, Debug)]
pub struct PreparedMetric {
    aggregate: AggregateFunction,
    weights: Vec<f64>,
    suppression_weight: f64,
    domains: Vec<Vec<usize>>,
    population: usize,
}

impl PreparedMetric {
    pub fn attribute_loss(&self, attribute: usize, level: usize) -> f64 {
        let domain = &self.domains[attribute];
        let base = domain[0];
        if base <= 1 {
            return 0.0;
        }
        (base - domain[level]) as f64 / (base - 1) as f64
    }

    pub fn generalization_loss(&self, levels: &[usize]) -> f64 {
        if levels.is_empty() {
            return 0.0;
        }
        let losses = levels.iter().enumerate().map(|(attribute, &level)| {
            (self.weights[attribute], self.attribute_loss(attribute, level))
        });
        match self.aggregate {
            AggregateFunction::ArithmeticMean => losses.map(|(w, l)| w * l).sum(),
            AggregateFunction::GeometricMean => {
                losses.map(|(w, l)| (1.0 + l).powf(w)).product::<f64>() - 1.0
            }
            AggregateFunction::Sum => {
                let n = levels.len() as f64;
                losses.map(|(w, l)| w * n * l).sum()
            }
            AggregateFunction::Maximum => {
                let n = levels.len() as f64;
                losses.map(|(w, l)| w * n * l).fold(0.0, f64::max)
            }
        }
    }

    pub fn loss(&self, levels: &[usize], suppressed: usize) -> Loss {
        let generalization = self.generalization_loss(levels);
        let penalty = if self.population == 0 {
            0.0
        } else {
            self.suppression_weight * suppressed as f64 / self.population as f64
        };
        Loss {
            generalization,
            total: generalization + penalty,
        }
    }
}
