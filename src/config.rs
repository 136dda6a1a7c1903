use crate::error::{config_error, Result};
use crate::metric::LossMetric;
use crate::presence::PresenceBounds;

/// How the transformation lattice is traversed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Skip nodes that a feasible predecessor already beats.
    #[default]
    Pruned,
    /// Evaluate every node.
    Exhaustive,
}

/// Which rows of a violating class are suppressed first when only some of
/// them have to go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RowOrder {
    #[default]
    FirstRowsFirst,
    LastRowsFirst,
}

/// Everything an anonymization run needs besides the data itself.
#[derive(Clone, Debug)]
pub struct AnonymizationConfig {
    pub bounds: PresenceBounds,
    suppression_limit: f64,
    pub metric: LossMetric,
    pub strategy: SearchStrategy,
    /// Size of the worker pool; `None` uses one worker per core.
    pub threads: Option<usize>,
    pub row_order: RowOrder,
    pub show_progress: bool,
}

impl AnonymizationConfig {
    /// A configuration with no suppression allowed.
    pub fn new(bounds: PresenceBounds) -> Self {
        Self {
            bounds,
            suppression_limit: 0.0,
            metric: LossMetric::default(),
            strategy: SearchStrategy::default(),
            threads: None,
            row_order: RowOrder::default(),
            show_progress: false,
        }
    }

    pub fn suppression_limit(&self) -> f64 {
        self.suppression_limit
    }

    pub fn with_suppression_limit(mut self, limit: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&limit) {
            return Err(config_error(format!(
                "suppression limit must lie in [0, 1], got {}",
                limit
            )));
        }
        self.suppression_limit = limit;
        Ok(self)
    }

    pub fn with_metric(mut self, metric: LossMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(config_error("the worker pool needs at least one thread"));
        }
        self.threads = Some(threads);
        Ok(self)
    }

    pub fn with_row_order(mut self, row_order: RowOrder) -> Self {
        self.row_order = row_order;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suppression_limit_is_validated() {
        let bounds = PresenceBounds::new(0.0, 0.1).unwrap();
        let config = AnonymizationConfig::new(bounds);
        assert_eq!(config.suppression_limit(), 0.0);
        assert!(config.clone().with_suppression_limit(1.5).is_err());
        assert!(config.clone().with_threads(0).is_err());
        let config = config.with_suppression_limit(0.1).unwrap();
        assert_eq!(config.suppression_limit(), 0.1);
    }
}
