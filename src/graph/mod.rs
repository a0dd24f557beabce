//! Graph transformer.
//!
//! Turns per-file analysis results plus an optional project hierarchy into
//! the entity/relationship payload handed to the ingestion client.

pub mod hierarchy;
pub mod identity;
pub mod resolver;
pub mod transform;
pub mod types;

pub use hierarchy::{ApplicationInfo, BinField, EntryTag, PackageInfo, ProjectHierarchy, ProjectInfo};
pub use resolver::NameResolver;
pub use transform::{to_graph, TransformOptions};
pub use types::{
    AnalysisData, Confidence, GraphEntity, GraphId, GraphKind, GraphRelationship, GraphSummary,
    RelationshipType,
};
