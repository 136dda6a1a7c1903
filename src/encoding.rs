use std::collections::{BTreeSet, HashMap};

use log::info;

use crate::data::{Dataset, SubsetRelation};
use crate::error::{config_error, Result};
use crate::hierarchy::HierarchySet;

/// Dictionary codes of one quasi-identifier at every level of its hierarchy.
#[derive(Clone, Debug)]
pub struct EncodedAttribute {
    pub name: String,
    /// `codes[level][base]` is the code at `level` of the value with base code `base`.
    codes: Vec<Vec<u32>>,
    /// `labels[level][code]` is the label behind a code.
    labels: Vec<Vec<String>>,
}

impl EncodedAttribute {
    fn new(name: &str, observed: &BTreeSet<&str>, hierarchies: &HierarchySet) -> Result<Self> {
        let height = hierarchies
            .get(name)
            .ok_or_else(|| config_error(format!("no hierarchy for attribute {:?}", name)))?
            .height();
        let mut codes = Vec::with_capacity(height + 1);
        let mut labels = Vec::with_capacity(height + 1);
        for level in 0..=height {
            let mut dictionary: HashMap<&str, u32> = HashMap::new();
            let mut level_labels: Vec<String> = vec![];
            let mut level_codes = Vec::with_capacity(observed.len());
            for value in observed {
                let label = hierarchies.level_of(name, value, level)?;
                let code = *dictionary.entry(label).or_insert_with(|| {
                    level_labels.push(label.to_string());
                    (level_labels.len() - 1) as u32
                });
                level_codes.push(code);
            }
            codes.push(level_codes);
            labels.push(level_labels);
        }
        Ok(Self {
            name: name.to_string(),
            codes,
            labels,
        })
    }

    pub fn height(&self) -> usize {
        self.codes.len() - 1
    }

    pub fn code(&self, base: u32, level: usize) -> u32 {
        self.codes[level][base as usize]
    }

    pub fn label(&self, code: u32, level: usize) -> &str {
        &self.labels[level][code as usize]
    }

    /// Number of distinct labels the observed values take at `level`.
    pub fn domain_size(&self, level: usize) -> usize {
        self.labels[level].len()
    }
}

/// Rows sharing the same raw quasi-identifier values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub key: Vec<u32>,
    pub count: usize,
    pub subset_count: usize,
}

/// The population reduced to what the search needs: encoded quasi-identifiers
/// and the distinct base tuples with their population and subset counts.
#[derive(Clone, Debug)]
pub struct EncodedData {
    attributes: Vec<EncodedAttribute>,
    columns: Vec<usize>,
    groups: Vec<Group>,
    row_groups: Vec<u32>,
}

impl EncodedData {
    pub fn new(
        dataset: &Dataset,
        hierarchies: &HierarchySet,
        subset: &SubsetRelation,
    ) -> Result<Self> {
        if subset.population_size() != dataset.num_rows() {
            return Err(config_error(format!(
                "subset refers to {} rows but the population has {}",
                subset.population_size(),
                dataset.num_rows()
            )));
        }
        let mut attributes = vec![];
        let mut columns = vec![];
        let mut base_codes: Vec<HashMap<&str, u32>> = vec![];
        for (name, _) in hierarchies.iter() {
            let observed = dataset.distinct_values(name)?;
            attributes.push(EncodedAttribute::new(name, &observed, hierarchies)?);
            base_codes.push(
                observed
                    .iter()
                    .enumerate()
                    .map(|(i, value)| (*value, i as u32))
                    .collect(),
            );
            columns.push(dataset.column_index(name)?);
        }

        let mut index: HashMap<Vec<u32>, u32> = HashMap::new();
        let mut groups: Vec<Group> = vec![];
        let mut row_groups = Vec::with_capacity(dataset.num_rows());
        for (i, row) in dataset.rows().iter().enumerate() {
            let key: Vec<u32> = columns
                .iter()
                .zip(&base_codes)
                .map(|(&column, codes)| codes[row[column].as_str()])
                .collect();
            let group = *index.entry(key.clone()).or_insert_with(|| {
                groups.push(Group {
                    key,
                    count: 0,
                    subset_count: 0,
                });
                (groups.len() - 1) as u32
            });
            let entry = &mut groups[group as usize];
            entry.count += 1;
            if subset.contains(i) {
                entry.subset_count += 1;
            }
            row_groups.push(group);
        }
        info!(
            "Encoded {} rows into {} distinct quasi-identifier tuples",
            dataset.num_rows(),
            groups.len()
        );
        Ok(Self {
            attributes,
            columns,
            groups,
            row_groups,
        })
    }

    pub fn attributes(&self) -> &[EncodedAttribute] {
        &self.attributes
    }

    /// Dataset column index of every quasi-identifier.
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    pub fn heights(&self) -> Vec<usize> {
        self.attributes.iter().map(EncodedAttribute::height).collect()
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn row_group(&self, row: usize) -> usize {
        self.row_groups[row] as usize
    }

    pub fn num_rows(&self) -> usize {
        self.row_groups.len()
    }

    /// Key of `group` generalized to `levels`.
    pub fn generalize(&self, group: &Group, levels: &[usize]) -> Vec<u32> {
        group
            .key
            .iter()
            .zip(&self.attributes)
            .zip(levels)
            .map(|((&base, attribute), &level)| attribute.code(base, level))
            .collect()
    }
}
