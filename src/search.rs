use std::cmp::Ordering as CmpOrdering;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use log::{debug, info};
use once_cell::sync::OnceCell;
use rayon::prelude::*;

use crate::config::{AnonymizationConfig, SearchStrategy};
use crate::data::{Dataset, DatasetDefinition, SubsetRelation};
use crate::encoding::EncodedData;
use crate::error::{config_error, Error, Result};
use crate::lattice::{Lattice, Node};
use crate::metric::{Loss, PreparedMetric};
use crate::presence::{PredicateOutcome, PresenceCriterion};
use crate::result::AnonymizationResult;

/// Lets a caller abort a running search from another thread.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    Unvisited,
    /// Not evaluated: a feasible predecessor is at least as good.
    Pruned,
    Infeasible,
    Candidate,
}

/// The outcome of evaluating one node.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub node: Node,
    pub outcome: PredicateOutcome,
    pub loss: Loss,
}

impl Evaluation {
    /// Total order on solutions: loss, then suppressed rows, then level vector.
    pub fn rank_cmp(&self, other: &Evaluation) -> CmpOrdering {
        self.loss
            .total
            .total_cmp(&other.loss.total)
            .then(self.outcome.suppressed.cmp(&other.outcome.suppressed))
            .then_with(|| self.node.cmp(&other.node))
    }
}

/// Per-node states and evaluations of a finished search.
#[derive(Clone, Debug)]
pub struct SearchOutcome {
    lattice: Lattice,
    states: Vec<NodeState>,
    evaluations: Vec<Option<Evaluation>>,
    optimum: Evaluation,
}

impl SearchOutcome {
    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn optimum(&self) -> &Evaluation {
        &self.optimum
    }

    pub fn state(&self, node: &Node) -> NodeState {
        if !self.lattice.contains(node) {
            return NodeState::Unvisited;
        }
        self.states[self.lattice.index(node)]
    }

    pub fn evaluation(&self, node: &Node) -> Option<&Evaluation> {
        if !self.lattice.contains(node) {
            return None;
        }
        self.evaluations[self.lattice.index(node)].as_ref()
    }

    pub fn evaluations(&self) -> impl Iterator<Item = &Evaluation> {
        self.evaluations.iter().flatten()
    }

    /// Nodes known to satisfy the criterion, evaluated or pruned, in lexicographic order.
    pub fn feasible_nodes(&self) -> Vec<Node> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, state)| matches!(state, NodeState::Candidate | NodeState::Pruned))
            .map(|(index, _)| self.lattice.node(index))
            .collect()
    }

    pub fn evaluated_count(&self) -> usize {
        self.evaluations().count()
    }

    pub fn pruned_count(&self) -> usize {
        self.states
            .iter()
            .filter(|state| **state == NodeState::Pruned)
            .count()
    }

    /// Smallest total loss over all evaluated nodes.
    pub fn lowest_score(&self) -> f64 {
        self.evaluations()
            .map(|e| e.loss.total)
            .fold(f64::INFINITY, f64::min)
    }

    /// Largest total loss over all evaluated nodes.
    pub fn highest_score(&self) -> f64 {
        self.evaluations()
            .map(|e| e.loss.total)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

struct LatticeSearch<'a> {
    lattice: Lattice,
    data: &'a EncodedData,
    criterion: &'a PresenceCriterion,
    metric: &'a PreparedMetric,
    cache: Vec<OnceCell<Evaluation>>,
    cancel: &'a CancellationToken,
    progress: ProgressBar,
}

impl<'a> LatticeSearch<'a> {
    fn evaluate(&self, index: usize) -> &Evaluation {
        self.cache[index].get_or_init(|| {
            let node = self.lattice.node(index);
            let outcome = self.criterion.evaluate(self.data, node.levels());
            let loss = self.metric.loss(node.levels(), outcome.suppressed);
            debug!(
                "Evaluated {}: satisfied={} suppressed={} loss={:.6}",
                node, outcome.satisfied, outcome.suppressed, loss.total
            );
            Evaluation {
                node,
                outcome,
                loss,
            }
        })
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            self.progress.abandon();
            return Err(Error::SearchCancelled);
        }
        Ok(())
    }

    fn infeasible(&self) -> Error {
        let evaluated: Vec<&Evaluation> = self.cache.iter().filter_map(OnceCell::get).collect();
        Error::NoFeasibleSolution {
            best_loss: evaluated
                .iter()
                .map(|e| e.loss.total)
                .fold(f64::INFINITY, f64::min),
            min_suppressed: evaluated
                .iter()
                .map(|e| e.outcome.suppressed)
                .min()
                .unwrap_or(0),
            budget: self.criterion.budget(),
        }
    }

    /// `true` if `anchor`, a feasible evaluated node below `node`, is at least as good as
    /// anything `node` can reach.
    fn dominates(&self, anchor: &Evaluation, node: &Node) -> bool {
        if !anchor.node.precedes(node) {
            return false;
        }
        let lower_bound = self.metric.generalization_loss(node.levels());
        anchor.loss.total < lower_bound
            || (anchor.loss.total <= lower_bound && anchor.outcome.suppressed == 0)
    }

    fn run(self, strategy: SearchStrategy, pool: &rayon::ThreadPool) -> Result<SearchOutcome> {
        self.check_cancelled()?;

        // Satisfaction is monotone, so an infeasible top means nothing is feasible.
        let top = self.lattice.index(&self.lattice.top());
        if !self.evaluate(top).outcome.satisfied {
            self.evaluate(0);
            self.progress.abandon();
            return Err(self.infeasible());
        }

        let mut states = vec![NodeState::Unvisited; self.lattice.size()];
        let mut anchors: Vec<usize> = vec![];
        for (rank, indices) in self.lattice.ranks().into_iter().enumerate() {
            self.check_cancelled()?;
            let mut pending = vec![];
            for index in indices {
                let evaluated = self.cache[index].get().is_some();
                let node = self.lattice.node(index);
                let pruned = !evaluated
                    && strategy == SearchStrategy::Pruned
                    && anchors
                        .iter()
                        .any(|&anchor| self.dominates(self.evaluate(anchor), &node));
                if pruned {
                    states[index] = NodeState::Pruned;
                    self.progress.inc(1);
                } else {
                    pending.push(index);
                }
            }
            let pruned = states.iter().filter(|s| **s == NodeState::Pruned).count();
            debug!(
                "Rank {}: evaluating {} nodes ({} pruned so far)",
                rank,
                pending.len(),
                pruned
            );

            pool.install(|| {
                pending.par_iter().for_each(|&index| {
                    if !self.cancel.is_cancelled() {
                        self.evaluate(index);
                        self.progress.inc(1);
                    }
                })
            });
            self.check_cancelled()?;

            for index in pending {
                if self.evaluate(index).outcome.satisfied {
                    states[index] = NodeState::Candidate;
                    anchors.push(index);
                } else {
                    states[index] = NodeState::Infeasible;
                }
            }
        }
        self.progress.finish_and_clear();

        let optimum = states
            .iter()
            .enumerate()
            .filter(|(_, state)| **state == NodeState::Candidate)
            .map(|(index, _)| index)
            .min_by(|&a, &b| self.evaluate(a).rank_cmp(self.evaluate(b)))
            .ok_or_else(|| self.infeasible())?;
        let optimum = self.evaluate(optimum).clone();

        let evaluations: Vec<Option<Evaluation>> =
            self.cache.into_iter().map(OnceCell::into_inner).collect();
        Ok(SearchOutcome {
            lattice: self.lattice,
            states,
            evaluations,
            optimum,
        })
    }
}

fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new(len);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>7}/{len:7} ({eta})",
    )
    .map(|style| {
        style
            .with_key("eta", |state: &ProgressState, w: &mut dyn Write| {
                let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
            })
            .progress_chars("#>-")
    })
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress.set_style(style);
    progress
}

/// Finds the transformation with the least loss that satisfies δ-presence.
#[derive(Clone, Debug)]
pub struct Anonymizer {
    config: AnonymizationConfig,
    cancel: CancellationToken,
}

impl Anonymizer {
    pub fn new(config: AnonymizationConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &AnonymizationConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn anonymize<'a>(
        &self,
        dataset: &'a Dataset,
        definition: &DatasetDefinition,
        subset: &'a SubsetRelation,
    ) -> Result<AnonymizationResult<'a>> {
        definition.validate(dataset)?;
        let hierarchies = definition.resolve_hierarchies(dataset)?;
        let data = EncodedData::new(dataset, &hierarchies, subset)?;
        let criterion = PresenceCriterion::new(
            self.config.bounds,
            self.config.suppression_limit(),
            dataset.num_rows(),
        )?;
        let metric = self.config.metric.prepare(&data)?;
        let outcome = self.search(&data, &criterion, &metric)?;
        let optimum = outcome.optimum();
        info!(
            "Optimal transformation {} with loss {:.6} ({} rows suppressed)",
            optimum.node, optimum.loss.total, optimum.outcome.suppressed
        );
        Ok(AnonymizationResult::new(
            dataset,
            definition,
            subset,
            data,
            criterion,
            outcome,
            self.config.row_order,
        ))
    }

    /// Search the lattice of `data` for the optimal feasible transformation.
    pub fn search(
        &self,
        data: &EncodedData,
        criterion: &PresenceCriterion,
        metric: &PreparedMetric,
    ) -> Result<SearchOutcome> {
        let lattice = Lattice::new(data.heights())?;
        info!(
            "Searching {} transformations over hierarchy heights {:?} (suppression budget {} rows)",
            lattice.size(),
            lattice.heights(),
            criterion.budget()
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads.unwrap_or(0))
            .build()
            .map_err(|e| config_error(format!("cannot start worker pool: {}", e)))?;
        let search = LatticeSearch {
            cache: (0..lattice.size()).map(|_| OnceCell::new()).collect(),
            progress: progress_bar(lattice.size() as u64, self.config.show_progress),
            lattice,
            data,
            criterion,
            metric,
            cancel: &self.cancel,
        };
        let outcome = search.run(self.config.strategy, &pool)?;
        info!(
            "Evaluated {} of {} transformations, pruned {}",
            outcome.evaluated_count(),
            outcome.lattice().size(),
            outcome.pruned_count()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{HierarchySet, StaticHierarchy};
    use crate::metric::LossMetric;
    use crate::presence::PresenceBounds;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    // Two quasi-identifiers; subset rows are 0 and 4.
    fn fixture() -> (EncodedData, PreparedMetric) {
        let rows = [
            ["a", "x"],
            ["a", "x"],
            ["a", "y"],
            ["b", "y"],
            ["b", "x"],
            ["b", "y"],
            ["c", "x"],
            ["c", "y"],
        ];
        let dataset = Dataset::create(
            rows.iter().map(|r| strings(r)).collect(),
            strings(&["letter", "axis"]),
        )
        .unwrap();
        let letter = StaticHierarchy::new()
            .with("a", ["ab", "*"])
            .unwrap()
            .with("b", ["ab", "*"])
            .unwrap()
            .with("c", ["c", "*"])
            .unwrap();
        let axis = StaticHierarchy::new()
            .with("x", ["*"])
            .unwrap()
            .with("y", ["*"])
            .unwrap();
        let hierarchies = HierarchySet::new(vec![
            ("letter".to_string(), letter),
            ("axis".to_string(), axis),
        ]);
        let subset = SubsetRelation::from_indices(8, [0, 4]).unwrap();
        let data = EncodedData::new(&dataset, &hierarchies, &subset).unwrap();
        let metric = LossMetric::default().prepare(&data).unwrap();
        (data, metric)
    }

    fn anonymizer(delta_max: f64, limit: f64, strategy: SearchStrategy) -> Anonymizer {
        let config = AnonymizationConfig::new(PresenceBounds::new(0.0, delta_max).unwrap())
            .with_suppression_limit(limit)
            .unwrap()
            .with_strategy(strategy)
            .with_threads(2)
            .unwrap();
        Anonymizer::new(config)
    }

    fn search(delta_max: f64, limit: f64, strategy: SearchStrategy) -> Result<SearchOutcome> {
        let (data, metric) = fixture();
        let anonymizer = anonymizer(delta_max, limit, strategy);
        let criterion =
            PresenceCriterion::new(anonymizer.config().bounds, limit, data.num_rows()).unwrap();
        anonymizer.search(&data, &criterion, &metric)
    }

    #[test]
    fn test_finds_optimum() {
        let outcome = search(0.5, 0.0, SearchStrategy::Pruned).unwrap();
        let optimum = outcome.optimum();
        assert!(optimum.outcome.satisfied);
        assert_eq!(optimum.outcome.suppressed, 0);
        // [0, 1] groups by letter only: a 1/3, b 1/3, c 0/2
        assert_eq!(optimum.node, Node::new(vec![0, 1]));
        assert!(outcome.lowest_score() <= optimum.loss.total);
        assert!(outcome.highest_score() >= optimum.loss.total);
    }

    #[test]
    fn test_pruned_matches_exhaustive() {
        for (delta_max, limit) in [(0.5, 0.0), (0.3, 0.25), (0.2, 0.5), (0.25, 0.0)] {
            let pruned = search(delta_max, limit, SearchStrategy::Pruned).unwrap();
            let exhaustive = search(delta_max, limit, SearchStrategy::Exhaustive).unwrap();
            assert_eq!(pruned.optimum(), exhaustive.optimum());
            assert_eq!(pruned.feasible_nodes(), exhaustive.feasible_nodes());
            assert_eq!(exhaustive.pruned_count(), 0);
            assert_eq!(exhaustive.evaluated_count(), exhaustive.lattice().size());
        }
    }

    #[test]
    fn test_pruning_skips_dominated_nodes() {
        let outcome = search(0.5, 0.0, SearchStrategy::Pruned).unwrap();
        assert_eq!(outcome.state(&Node::new(vec![1, 1])), NodeState::Pruned);
        assert!(outcome.evaluation(&Node::new(vec![1, 1])).is_none());
        // the top node is checked before the traversal
        assert!(outcome.evaluation(&Node::new(vec![2, 1])).is_some());
    }

    #[test]
    fn test_no_feasible_solution() {
        // the top class holds 2 of 8 subset rows: 0.25 > 0.2 and nothing may be suppressed
        let err = search(0.2, 0.0, SearchStrategy::Pruned).unwrap_err();
        match err {
            Error::NoFeasibleSolution {
                min_suppressed,
                budget,
                ..
            } => {
                assert_eq!(min_suppressed, 1);
                assert_eq!(budget, 0);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_search() {
        let (data, metric) = fixture();
        let token = CancellationToken::new();
        let anonymizer =
            anonymizer(0.5, 0.0, SearchStrategy::Pruned).with_cancellation(token.clone());
        assert!(!anonymizer.cancellation_token().is_cancelled());
        token.cancel();
        assert!(anonymizer.cancellation_token().is_cancelled());
        let criterion = PresenceCriterion::new(anonymizer.config().bounds, 0.0, 8).unwrap();
        assert!(matches!(
            anonymizer.search(&data, &criterion, &metric),
            Err(Error::SearchCancelled)
        ));
    }

    #[test]
    fn test_rank_cmp_breaks_ties() {
        let evaluation = |levels: Vec<usize>, suppressed: usize, total: f64| Evaluation {
            node: Node::new(levels),
            outcome: PredicateOutcome {
                satisfied: true,
                suppressed,
                classes: 1,
                violating_classes: 0,
            },
            loss: Loss {
                generalization: total,
                total,
            },
        };
        let a = evaluation(vec![1, 0], 0, 0.5);
        let b = evaluation(vec![0, 1], 0, 0.5);
        let c = evaluation(vec![0, 0], 3, 0.5);
        let d = evaluation(vec![2, 2], 0, 0.25);
        assert_eq!(b.rank_cmp(&a), CmpOrdering::Less);
        assert_eq!(a.rank_cmp(&c), CmpOrdering::Less);
        assert_eq!(d.rank_cmp(&b), CmpOrdering::Less);
    }
}
