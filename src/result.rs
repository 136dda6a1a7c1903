use std::collections::HashMap;

use log::info;

use crate::config::RowOrder;
use crate::data::{AttributeRole, Dataset, DatasetDefinition, SubsetRelation};
use crate::encoding::EncodedData;
use crate::lattice::Node;
use crate::presence::{EquivalenceClass, PresenceCriterion, Violation};
use crate::search::{Evaluation, SearchOutcome};

/// Cell value of suppressed quasi-identifiers and of identifying attributes.
pub const SUPPRESSED: &str = "*";

/// Which rows an output covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum View {
    #[default]
    Population,
    Subset,
}

/// A rendered table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Output {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// The chosen transformation and everything needed to apply it.
pub struct AnonymizationResult<'a> {
    dataset: &'a Dataset,
    subset: &'a SubsetRelation,
    roles: Vec<AttributeRole>,
    data: EncodedData,
    criterion: PresenceCriterion,
    outcome: SearchOutcome,
    suppressed: Vec<bool>,
}

impl<'a> AnonymizationResult<'a> {
    pub(crate) fn new(
        dataset: &'a Dataset,
        definition: &DatasetDefinition,
        subset: &'a SubsetRelation,
        data: EncodedData,
        criterion: PresenceCriterion,
        outcome: SearchOutcome,
        row_order: RowOrder,
    ) -> Self {
        let roles = definition.attributes().iter().map(|a| a.role).collect();
        let suppressed = select_suppressed(
            &data,
            &criterion,
            subset,
            outcome.optimum().node.levels(),
            row_order,
        );
        info!(
            "Suppressing {} of {} rows",
            suppressed.iter().filter(|s| **s).count(),
            suppressed.len()
        );
        Self {
            dataset,
            subset,
            roles,
            data,
            criterion,
            outcome,
            suppressed,
        }
    }

    /// Generalization levels of the chosen transformation, in quasi-identifier order.
    pub fn transformation(&self) -> &Node {
        &self.outcome.optimum().node
    }

    pub fn optimum(&self) -> &Evaluation {
        self.outcome.optimum()
    }

    pub fn quasi_identifiers(&self) -> Vec<&str> {
        self.data
            .attributes()
            .iter()
            .map(|a| a.name.as_str())
            .collect()
    }

    pub fn score(&self) -> f64 {
        self.optimum().loss.total
    }

    pub fn lowest_score(&self) -> f64 {
        self.outcome.lowest_score()
    }

    pub fn highest_score(&self) -> f64 {
        self.outcome.highest_score()
    }

    pub fn search(&self) -> &SearchOutcome {
        &self.outcome
    }

    pub fn suppressed_rows(&self) -> Vec<usize> {
        self.suppressed
            .iter()
            .enumerate()
            .filter_map(|(i, &s)| if s { Some(i) } else { None })
            .collect()
    }

    pub fn is_suppressed(&self, row: usize) -> bool {
        self.suppressed.get(row).copied().unwrap_or(false)
    }

    /// Equivalence classes of the population at the chosen transformation, before suppression.
    pub fn classes(&self) -> Vec<EquivalenceClass> {
        self.criterion
            .classes(&self.data, self.transformation().levels())
    }

    /// Render the chosen transformation over `view`.
    pub fn output(&self, view: View) -> Output {
        let rows: Vec<usize> = match view {
            View::Population => (0..self.dataset.num_rows()).collect(),
            View::Subset => self.subset.indices().to_vec(),
        };
        Output {
            header: self.dataset.header().to_vec(),
            rows: rows.into_iter().map(|row| self.render_row(row)).collect(),
        }
    }

    fn render_row(&self, row: usize) -> Vec<String> {
        let levels = self.transformation().levels();
        let group = &self.data.groups()[self.data.row_group(row)];
        let mut cells: Vec<String> = self.dataset.rows()[row]
            .iter()
            .zip(&self.roles)
            .map(|(cell, role)| match role {
                AttributeRole::Identifying => SUPPRESSED.to_string(),
                _ => cell.clone(),
            })
            .collect();
        for (i, (attribute, &column)) in self
            .data
            .attributes()
            .iter()
            .zip(self.data.columns())
            .enumerate()
        {
            cells[column] = if self.suppressed[row] {
                SUPPRESSED.to_string()
            } else {
                let code = attribute.code(group.key[i], levels[i]);
                attribute.label(code, levels[i]).to_string()
            };
        }
        cells
    }
}

/// Pick the rows that repair every violating class at `levels`.
///
/// Classes above `delta_max` lose subset rows, classes below `delta_min`
/// lose other rows; within a class rows are taken in `row_order`.
fn select_suppressed(
    data: &EncodedData,
    criterion: &PresenceCriterion,
    subset: &SubsetRelation,
    levels: &[usize],
    row_order: RowOrder,
) -> Vec<bool> {
    let classes = criterion.classes(data, levels);
    let index: HashMap<&[u32], usize> = classes
        .iter()
        .enumerate()
        .map(|(i, class)| (class.key.as_slice(), i))
        .collect();
    let group_class: Vec<usize> = data
        .groups()
        .iter()
        .map(|group| index[data.generalize(group, levels).as_slice()])
        .collect();
    let mut remaining: Vec<usize> = classes.iter().map(|c| c.violation.rows()).collect();

    let mut suppressed = vec![false; data.num_rows()];
    let rows: Box<dyn Iterator<Item = usize>> = match row_order {
        RowOrder::FirstRowsFirst => Box::new(0..data.num_rows()),
        RowOrder::LastRowsFirst => Box::new((0..data.num_rows()).rev()),
    };
    for row in rows {
        let class = group_class[data.row_group(row)];
        if remaining[class] == 0 {
            continue;
        }
        let take = match classes[class].violation {
            Violation::AboveMax { .. } => subset.contains(row),
            Violation::BelowMin { .. } => !subset.contains(row),
            Violation::Within => false,
        };
        if take {
            suppressed[row] = true;
            remaining[class] -= 1;
        }
    }
    suppressed
}
