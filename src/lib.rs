//! Anonymization of a population table so that a research subset of its rows
//! satisfies δ-presence, using global generalization along per-attribute
//! hierarchies plus bounded row suppression.

pub mod config;
pub mod data;
pub mod date_hierarchy;
pub mod encoding;
pub mod error;
pub mod hierarchy;
pub mod io;
pub mod lattice;
pub mod metric;
pub mod presence;
pub mod result;
pub mod search;

pub use config::{AnonymizationConfig, RowOrder, SearchStrategy};
pub use data::{
    Attribute, AttributeRole, DataType, Dataset, DatasetDefinition, SubsetRelation,
    UnmatchedRowPolicy,
};
pub use date_hierarchy::{DateFormat, DateHierarchyBuilder, Granularity};
pub use error::{Error, Result};
pub use hierarchy::{Hierarchy, HierarchySet, StaticHierarchy};
pub use lattice::{Lattice, Node};
pub use metric::{AggregateFunction, LossMetric};
pub use presence::PresenceBounds;
pub use result::{AnonymizationResult, Output, View, SUPPRESSED};
pub use search::{Anonymizer, CancellationToken, Evaluation, NodeState, SearchOutcome};
