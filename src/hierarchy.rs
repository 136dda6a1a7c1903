use std::borrow::Cow;
use std::collections::HashMap;

use crate::date_hierarchy::DateHierarchyBuilder;
use crate::error::{config_error, Error, Result};

/// A generalization hierarchy given as a lookup table.
///
/// Every raw value maps to the labels it is generalized to at levels
/// `1..=height`. Level 0 is the raw value itself.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StaticHierarchy {
    entries: HashMap<String, Vec<String>>,
    order: Vec<String>,
    height: usize,
}

impl StaticHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the generalizations of `value`, ordered from the least to the most general level.
    pub fn add<I, S>(&mut self, value: &str, generalizations: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = generalizations.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(config_error(format!(
                "hierarchy entry for {:?} has no generalization levels",
                value
            )));
        }
        if self.entries.is_empty() {
            self.height = labels.len();
        } else if labels.len() != self.height {
            return Err(config_error(format!(
                "hierarchy entry for {:?} has {} levels, expected {}",
                value,
                labels.len(),
                self.height
            )));
        }
        if self.entries.contains_key(value) {
            return Err(config_error(format!(
                "duplicate hierarchy entry for {:?}",
                value
            )));
        }
        self.order.push(value.to_string());
        self.entries.insert(value.to_string(), labels);
        Ok(())
    }

    /// Builder-style variant of [`StaticHierarchy::add`].
    pub fn with<I, S>(mut self, value: &str, generalizations: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add(value, generalizations)?;
        Ok(self)
    }

    /// Number of generalization levels above the raw values.
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.entries.contains_key(value)
    }

    /// Raw values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Label of `value` at `level`, or `None` if the value is unmapped or the level too high.
    pub fn level_of(&self, value: &str, level: usize) -> Option<&str> {
        let (raw, labels) = self.entries.get_key_value(value)?;
        match level {
            0 => Some(raw.as_str()),
            l if l <= self.height => Some(labels[l - 1].as_str()),
            _ => None,
        }
    }

    /// Check that the top level is a single class and that every level refines the next.
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(config_error("hierarchy has no entries"));
        }
        for level in 1..self.height {
            let mut parents: HashMap<&str, &str> = HashMap::new();
            for labels in self.entries.values() {
                let child = labels[level - 1].as_str();
                let parent = labels[level].as_str();
                match parents.get(child) {
                    Some(&seen) if seen != parent => {
                        return Err(config_error(format!(
                            "label {:?} at level {} generalizes to both {:?} and {:?}",
                            child,
                            level,
                            seen,
                            parent
                        )));
                    }
                    _ => {
                        parents.insert(child, parent);
                    }
                }
            }
        }
        let mut tops = self.entries.values().map(|labels| &labels[self.height - 1]);
        if let Some(first) = tops.next() {
            if let Some(other) = tops.find(|label| *label != first) {
                return Err(config_error(format!(
                    "top level {} holds more than one label ({:?}, {:?})",
                    self.height, first, other
                )));
            }
        }
        Ok(())
    }
}

/// A hierarchy as configured on an attribute: either a lookup table or a
/// date hierarchy that is derived from the observed values.
#[derive(Clone, Debug)]
pub enum Hierarchy {
    Static(StaticHierarchy),
    Date(DateHierarchyBuilder),
}

impl Hierarchy {
    pub fn height(&self) -> usize {
        match self {
            Hierarchy::Static(hierarchy) => hierarchy.height(),
            Hierarchy::Date(builder) => builder.height(),
        }
    }

    pub fn level_of<'a>(
        &'a self,
        attribute: &str,
        value: &'a str,
        level: usize,
    ) -> Result<Cow<'a, str>> {
        match self {
            Hierarchy::Static(hierarchy) => hierarchy
                .level_of(value, level)
                .map(Cow::Borrowed)
                .ok_or_else(|| unmapped(attribute, value, level, hierarchy.height())),
            Hierarchy::Date(builder) => builder.label(attribute, value, level),
        }
    }

    /// Produce the lookup table used during search, covering every observed value.
    pub fn resolve<'v, I>(&self, attribute: &str, observed: I) -> Result<StaticHierarchy>
    where
        I: IntoIterator<Item = &'v str>,
    {
        let hierarchy = match self {
            Hierarchy::Static(hierarchy) => {
                for value in observed {
                    if !hierarchy.contains(value) {
                        return Err(Error::UnmappedValue {
                            attribute: attribute.to_string(),
                            value: value.to_string(),
                        });
                    }
                }
                hierarchy.clone()
            }
            Hierarchy::Date(builder) => builder.build(attribute, observed)?,
        };
        hierarchy.validate()?;
        Ok(hierarchy)
    }
}

impl From<StaticHierarchy> for Hierarchy {
    fn from(hierarchy: StaticHierarchy) -> Self {
        Hierarchy::Static(hierarchy)
    }
}

impl From<DateHierarchyBuilder> for Hierarchy {
    fn from(builder: DateHierarchyBuilder) -> Self {
        Hierarchy::Date(builder)
    }
}

fn unmapped(attribute: &str, value: &str, level: usize, height: usize) -> Error {
    if level > height {
        config_error(format!(
            "level {} exceeds height {} of hierarchy for {:?}",
            level, height, attribute
        ))
    } else {
        Error::UnmappedValue {
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }
}

/// Resolved hierarchies of the quasi-identifiers, in column order.
#[derive(Clone, Debug, Default)]
pub struct HierarchySet {
    attributes: Vec<(String, StaticHierarchy)>,
}

impl HierarchySet {
    pub fn new(attributes: Vec<(String, StaticHierarchy)>) -> Self {
        Self { attributes }
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StaticHierarchy)> {
        self.attributes
            .iter()
            .map(|(name, hierarchy)| (name.as_str(), hierarchy))
    }

    pub fn get(&self, attribute: &str) -> Option<&StaticHierarchy> {
        self.attributes
            .iter()
            .find(|(name, _)| name == attribute)
            .map(|(_, hierarchy)| hierarchy)
    }

    pub fn heights(&self) -> Vec<usize> {
        self.attributes.iter().map(|(_, h)| h.height()).collect()
    }

    pub fn level_of(&self, attribute: &str, value: &str, level: usize) -> Result<&str> {
        let hierarchy = self
            .get(attribute)
            .ok_or_else(|| config_error(format!("no hierarchy for attribute {:?}", attribute)))?;
        hierarchy
            .level_of(value, level)
            .ok_or_else(|| unmapped(attribute, value, level, hierarchy.height()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_hierarchy::Granularity;

    fn race() -> StaticHierarchy {
        let mut hierarchy = StaticHierarchy::new();
        for value in ["0", "8527", "8515", "8516"] {
            hierarchy
                .add(value, ["{0, 8527, 8515, 8516}"])
                .unwrap();
        }
        hierarchy
    }

    fn age() -> StaticHierarchy {
        StaticHierarchy::new()
            .with("21", ["20-24", "20-29", "*"])
            .unwrap()
            .with("23", ["20-24", "20-29", "*"])
            .unwrap()
            .with("27", ["25-29", "20-29", "*"])
            .unwrap()
            .with("34", ["30-34", "30-39", "*"])
            .unwrap()
    }

    #[test]
    fn test_level_of() {
        let hierarchy = age();
        assert_eq!(hierarchy.height(), 3);
        assert_eq!(hierarchy.level_of("27", 0), Some("27"));
        assert_eq!(hierarchy.level_of("27", 1), Some("25-29"));
        assert_eq!(hierarchy.level_of("27", 2), Some("20-29"));
        assert_eq!(hierarchy.level_of("27", 3), Some("*"));
        assert_eq!(hierarchy.level_of("27", 4), None);
        assert_eq!(hierarchy.level_of("99", 1), None);
    }

    #[test]
    fn test_add_rejects_inconsistent_height() {
        let mut hierarchy = race();
        assert!(matches!(
            hierarchy.add("1", ["a", "b"]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut hierarchy = race();
        assert!(hierarchy.add("0", ["x"]).is_err());
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        race().validate().unwrap();
        age().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_multiple_tops() {
        let hierarchy = StaticHierarchy::new()
            .with("a", ["x"])
            .unwrap()
            .with("b", ["y"])
            .unwrap();
        assert!(hierarchy.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_refining_levels() {
        let hierarchy = StaticHierarchy::new()
            .with("1", ["low", "A", "*"])
            .unwrap()
            .with("2", ["low", "B", "*"])
            .unwrap();
        assert!(hierarchy.validate().is_err());
    }

    #[test]
    fn test_resolve_reports_unmapped_value() {
        let hierarchy = Hierarchy::from(race());
        let err = hierarchy
            .resolve("race_concept_id", ["8527", "42"])
            .unwrap_err();
        match err {
            Error::UnmappedValue { attribute, value } => {
                assert_eq!(attribute, "race_concept_id");
                assert_eq!(value, "42");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_level_of_over_both_variants() {
        let age = Hierarchy::from(age());
        assert_eq!(age.height(), 3);
        assert_eq!(age.level_of("age", "23", 0).unwrap(), "23");
        assert_eq!(age.level_of("age", "23", 1).unwrap(), "20-24");
        assert_eq!(age.level_of("age", "23", 3).unwrap(), "*");
        assert!(matches!(
            age.level_of("age", "22", 1),
            Err(Error::UnmappedValue { .. })
        ));
        assert!(matches!(
            age.level_of("age", "23", 4),
            Err(Error::Configuration(_))
        ));

        let builder = DateHierarchyBuilder::new(
            "%Y-%m-%d",
            &[Granularity::MonthYear, Granularity::Decade],
        )
        .unwrap();
        let birth = Hierarchy::from(builder);
        assert_eq!(birth.height(), 3);
        assert_eq!(birth.level_of("birth", "1987-06-21", 0).unwrap(), "1987-06-21");
        assert_eq!(birth.level_of("birth", "1987-06-21", 1).unwrap(), "1987-06");
        assert_eq!(birth.level_of("birth", "1987-06-21", 2).unwrap(), "1980-1989");
        assert_eq!(birth.level_of("birth", "1987-06-21", 3).unwrap(), "*");
        assert!(matches!(
            birth.level_of("birth", "21/06/1987", 1),
            Err(Error::MalformedDate { .. })
        ));
        assert!(birth.level_of("birth", "1987-06-21", 4).is_err());
    }

    #[test]
    fn test_hierarchy_set_level_of() {
        let set = HierarchySet::new(vec![("age".to_string(), age())]);
        assert_eq!(set.level_of("age", "21", 2).unwrap(), "20-29");
        assert!(matches!(
            set.level_of("age", "22", 1),
            Err(Error::UnmappedValue { .. })
        ));
        assert!(matches!(
            set.level_of("age", "21", 9),
            Err(Error::Configuration(_))
        ));
        assert_eq!(set.heights(), vec![3]);
    }
}
