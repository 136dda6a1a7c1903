use std::collections::{BTreeSet, HashMap};

use log::{debug, warn};

use crate::date_hierarchy::DateFormat;
use crate::error::{config_error, Error, Result};
use crate::hierarchy::{Hierarchy, HierarchySet};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeRole {
    /// Directly identifying; used as the join key and masked in every output.
    Identifying,
    /// Generalized according to its hierarchy.
    QuasiIdentifying,
    /// Released unchanged.
    Insensitive,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Date(DateFormat),
    String,
}

/// An in-memory table of raw string cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dataset {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn create(rows: Vec<Vec<String>>, column_names: Vec<String>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for name in &column_names {
            if !seen.insert(name.as_str()) {
                return Err(config_error(format!("duplicate column name {:?}", name)));
            }
        }
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != column_names.len())
        {
            return Err(config_error(format!(
                "row {} has {} cells, expected {}",
                i,
                row.len(),
                column_names.len()
            )));
        }
        Ok(Self {
            header: column_names,
            rows,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.header.len()
    }

    pub fn column_index(&self, attribute: &str) -> Result<usize> {
        self.header
            .iter()
            .position(|name| name == attribute)
            .ok_or_else(|| config_error(format!("unknown attribute {:?}", attribute)))
    }

    pub fn column(&self, attribute: &str) -> Result<impl Iterator<Item = &str>> {
        let index = self.column_index(attribute)?;
        Ok(self.rows.iter().map(move |row| row[index].as_str()))
    }

    pub fn distinct_values(&self, attribute: &str) -> Result<BTreeSet<&str>> {
        Ok(self.column(attribute)?.collect())
    }
}

#[derive(Clone, Debug)]
pub struct Attribute {
    pub name: String,
    pub role: AttributeRole,
    pub data_type: DataType,
    pub hierarchy: Option<Hierarchy>,
}

/// Roles, types and hierarchies of the attributes of a dataset.
///
/// The definition is a plain value handed to the anonymizer; it is not
/// attached to the row data.
#[derive(Clone, Debug, Default)]
pub struct DatasetDefinition {
    attributes: Vec<Attribute>,
}

impl DatasetDefinition {
    /// A definition with every column insensitive and typed as a string.
    pub fn for_dataset(dataset: &Dataset) -> Self {
        let attributes = dataset
            .header()
            .iter()
            .map(|name| Attribute {
                name: name.clone(),
                role: AttributeRole::Insensitive,
                data_type: DataType::String,
                hierarchy: None,
            })
            .collect();
        Self { attributes }
    }

    fn attribute_mut(&mut self, attribute: &str) -> Result<&mut Attribute> {
        self.attributes
            .iter_mut()
            .find(|a| a.name == attribute)
            .ok_or_else(|| config_error(format!("unknown attribute {:?}", attribute)))
    }

    pub fn set_role(&mut self, attribute: &str, role: AttributeRole) -> Result<&mut Self> {
        self.attribute_mut(attribute)?.role = role;
        Ok(self)
    }

    pub fn set_data_type(&mut self, attribute: &str, data_type: DataType) -> Result<&mut Self> {
        self.attribute_mut(attribute)?.data_type = data_type;
        Ok(self)
    }

    pub fn set_hierarchy(
        &mut self,
        attribute: &str,
        hierarchy: impl Into<Hierarchy>,
    ) -> Result<&mut Self> {
        self.attribute_mut(attribute)?.hierarchy = Some(hierarchy.into());
        Ok(self)
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn role(&self, name: &str) -> Option<AttributeRole> {
        self.attribute(name).map(|a| a.role)
    }

    pub fn names_with_role(&self, role: AttributeRole) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|a| a.role == role)
            .map(|a| a.name.as_str())
            .collect()
    }

    pub fn quasi_identifiers(&self) -> Vec<&str> {
        self.names_with_role(AttributeRole::QuasiIdentifying)
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.names_with_role(AttributeRole::Identifying)
    }

    /// Check the definition against the data it describes.
    pub fn validate(&self, dataset: &Dataset) -> Result<()> {
        let names: Vec<&str> = self.attributes.iter().map(|a| a.name.as_str()).collect();
        if names.len() != dataset.num_columns()
            || names.iter().zip(dataset.header()).any(|(a, b)| *a != b.as_str())
        {
            return Err(config_error("definition does not match the dataset columns"));
        }
        for attribute in &self.attributes {
            if attribute.role == AttributeRole::QuasiIdentifying && attribute.hierarchy.is_none()
            {
                return Err(config_error(format!(
                    "quasi-identifying attribute {:?} has no hierarchy",
                    attribute.name
                )));
            }
            let values = dataset.distinct_values(&attribute.name)?;
            match &attribute.data_type {
                DataType::Integer => {
                    if let Some(bad) = values.iter().find(|v| v.trim().parse::<i64>().is_err()) {
                        return Err(config_error(format!(
                            "value {:?} of integer attribute {:?} is not an integer",
                            bad, attribute.name
                        )));
                    }
                }
                DataType::Date(format) => {
                    if let Some(bad) = values.iter().find(|v| format.parse(v).is_none()) {
                        return Err(Error::MalformedDate {
                            attribute: attribute.name.clone(),
                            value: bad.to_string(),
                            format: format.pattern().to_string(),
                        });
                    }
                }
                DataType::String => {}
            }
        }
        Ok(())
    }

    /// Resolve the hierarchy of every quasi-identifier against the observed values.
    pub fn resolve_hierarchies(&self, dataset: &Dataset) -> Result<HierarchySet> {
        let mut resolved = vec![];
        for attribute in &self.attributes {
            if attribute.role != AttributeRole::QuasiIdentifying {
                continue;
            }
            let hierarchy = attribute.hierarchy.as_ref().ok_or_else(|| {
                config_error(format!(
                    "quasi-identifying attribute {:?} has no hierarchy",
                    attribute.name
                ))
            })?;
            let observed = dataset.distinct_values(&attribute.name)?;
            let table = hierarchy.resolve(&attribute.name, observed.iter().copied())?;
            debug!(
                "Resolved hierarchy for {}: {} values, height {}",
                attribute.name,
                table.len(),
                table.height()
            );
            resolved.push((attribute.name.clone(), table));
        }
        Ok(HierarchySet::new(resolved))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnmatchedRowPolicy {
    #[default]
    Fail,
    Drop,
}

/// The rows of a population that belong to the research subset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubsetRelation {
    members: Vec<bool>,
    indices: Vec<usize>,
}

impl SubsetRelation {
    /// Match the rows of `subset` to `population` on the identifying attributes.
    pub fn build(
        population: &Dataset,
        definition: &DatasetDefinition,
        subset: &Dataset,
        policy: UnmatchedRowPolicy,
    ) -> Result<Self> {
        let keys = definition.identifiers();
        if keys.is_empty() {
            return Err(config_error(
                "building a subset requires at least one identifying attribute",
            ));
        }
        let population_columns = keys
            .iter()
            .map(|key| population.column_index(key))
            .collect::<Result<Vec<_>>>()?;
        let subset_columns = keys
            .iter()
            .map(|key| subset.column_index(key))
            .collect::<Result<Vec<_>>>()?;

        let mut index: HashMap<Vec<&str>, usize> = HashMap::with_capacity(population.num_rows());
        for (i, row) in population.rows().iter().enumerate() {
            let key = join_key(row, &population_columns);
            if index.insert(key.clone(), i).is_some() {
                return Err(Error::JoinKeyNotUnique {
                    key: key.join(","),
                });
            }
        }

        let mut members = vec![false; population.num_rows()];
        let mut dropped = 0;
        for (i, row) in subset.rows().iter().enumerate() {
            let key = join_key(row, &subset_columns);
            match (index.get(&key), policy) {
                (Some(&matched), _) => members[matched] = true,
                (None, UnmatchedRowPolicy::Drop) => dropped += 1,
                (None, UnmatchedRowPolicy::Fail) => {
                    return Err(Error::UnmatchedRow {
                        row: i,
                        key: key.join(","),
                    })
                }
            }
        }
        if dropped > 0 {
            warn!("Dropped {} subset rows without a population match", dropped);
        }
        Ok(Self::from_members(members))
    }

    /// A subset given directly by population row indices.
    pub fn from_indices<I>(population_size: usize, indices: I) -> Result<Self>
    where
        I: IntoIterator<Item = usize>,
    {
        let mut members = vec![false; population_size];
        for index in indices {
            if index >= population_size {
                return Err(config_error(format!(
                    "subset index {} is out of range for {} rows",
                    index, population_size
                )));
            }
            members[index] = true;
        }
        Ok(Self::from_members(members))
    }

    fn from_members(members: Vec<bool>) -> Self {
        let indices = members
            .iter()
            .enumerate()
            .filter_map(|(i, &member)| if member { Some(i) } else { None })
            .collect();
        Self { members, indices }
    }

    pub fn contains(&self, row: usize) -> bool {
        self.members.get(row).copied().unwrap_or(false)
    }

    /// Sorted population row indices of the subset.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn population_size(&self) -> usize {
        self.members.len()
    }
}

fn join_key<'a>(row: &'a [String], columns: &[usize]) -> Vec<&'a str> {
    columns.iter().map(|&c| row[c].as_str()).collect()
}
