//! Graph payload types.
//!
//! `AnalysisData` is the only thing that crosses the ingestion boundary, so
//! everything here serializes to the engine's camelCase JSON shape.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::parser::{EntityKind, ScopeRef};

/// The kind of a graph node: any declaration kind, plus the synthetic
/// structural kinds the transformer adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GraphKind {
    #[serde(rename = "function")]
    Function,
    #[serde(rename = "class")]
    Class,
    #[serde(rename = "interface")]
    Interface,
    #[serde(rename = "type")]
    Type,
    #[serde(rename = "import")]
    Import,
    #[serde(rename = "export")]
    Export,
    #[serde(rename = "variable")]
    Variable,
    #[serde(rename = "struct")]
    Struct,
    #[serde(rename = "enum")]
    Enum,
    #[serde(rename = "trait")]
    Trait,
    #[serde(rename = "impl")]
    Impl,
    #[serde(rename = "module")]
    Module,
    #[serde(rename = "constant")]
    Constant,
    #[serde(rename = "static")]
    Static,
    SourceFile,
    ExternalModule,
    Project,
    Application,
    Package,
    Dependency,
}

impl GraphKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphKind::Function => "function",
            GraphKind::Class => "class",
            GraphKind::Interface => "interface",
            GraphKind::Type => "type",
            GraphKind::Import => "import",
            GraphKind::Export => "export",
            GraphKind::Variable => "variable",
            GraphKind::Struct => "struct",
            GraphKind::Enum => "enum",
            GraphKind::Trait => "trait",
            GraphKind::Impl => "impl",
            GraphKind::Module => "module",
            GraphKind::Constant => "constant",
            GraphKind::Static => "static",
            GraphKind::SourceFile => "SourceFile",
            GraphKind::ExternalModule => "ExternalModule",
            GraphKind::Project => "Project",
            GraphKind::Application => "Application",
            GraphKind::Package => "Package",
            GraphKind::Dependency => "Dependency",
        }
    }

    /// Nodes that belong to exactly one source file and therefore count
    /// towards that file's `relationshipCount`.
    pub fn is_file_scoped(&self) -> bool {
        !matches!(
            self,
            GraphKind::ExternalModule
                | GraphKind::Project
                | GraphKind::Application
                | GraphKind::Package
                | GraphKind::Dependency
        )
    }
}

impl From<EntityKind> for GraphKind {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Function => GraphKind::Function,
            EntityKind::Class => GraphKind::Class,
            EntityKind::Interface => GraphKind::Interface,
            EntityKind::Type => GraphKind::Type,
            EntityKind::Import => GraphKind::Import,
            EntityKind::Export => GraphKind::Export,
            EntityKind::Variable => GraphKind::Variable,
            EntityKind::Struct => GraphKind::Struct,
            EntityKind::Enum => GraphKind::Enum,
            EntityKind::Trait => GraphKind::Trait,
            EntityKind::Impl => GraphKind::Impl,
            EntityKind::Module => GraphKind::Module,
            EntityKind::Constant => GraphKind::Constant,
            EntityKind::Static => GraphKind::Static,
        }
    }
}

impl fmt::Display for GraphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic, content-derived node id.
///
/// Unlike [`ScopeRef`], equal inputs always give equal ids, across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(pub(crate) String);

impl GraphId {
    /// Wrap an id that does not come from hashing (synthetic edge targets).
    pub fn synthetic(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A graph-ready node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEntity {
    pub id: GraphId,
    pub kind: GraphKind,
    pub name: String,
    pub text: String,
    /// Project-relative path with `/` separators; empty for nodes not tied
    /// to a file.
    pub file_path: String,
    pub line: usize,
    pub column: usize,
    pub pos: usize,
    pub end: usize,
    pub flags: u32,
    /// Carried over from extraction; only meaningful within this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_scope_id: Option<ScopeRef>,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub is_exported: bool,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_lines: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl GraphEntity {
    /// A node with every optional extra unset.
    pub fn new(id: GraphId, kind: GraphKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            text: String::new(),
            file_path: String::new(),
            line: 0,
            column: 0,
            pos: 0,
            end: 0,
            flags: 0,
            parent_scope_id: None,
            is_async: false,
            is_exported: false,
            is_abstract: false,
            module: None,
            extension: None,
            entity_count: None,
            total_lines: None,
            relationship_count: None,
            version: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Calls,
    Exports,
    Contains,
    Imports,
    HasApplication,
    HasPackage,
    HasEntrypoint,
    DependsOn,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Calls => "CALLS",
            RelationshipType::Exports => "EXPORTS",
            RelationshipType::Contains => "CONTAINS",
            RelationshipType::Imports => "IMPORTS",
            RelationshipType::HasApplication => "HAS_APPLICATION",
            RelationshipType::HasPackage => "HAS_PACKAGE",
            RelationshipType::HasEntrypoint => "HAS_ENTRYPOINT",
            RelationshipType::DependsOn => "DEPENDS_ON",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// A directed, typed edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRelationship {
    pub from: GraphId,
    pub to: GraphId,
    #[serde(rename = "type")]
    pub rel_type: RelationshipType,
    pub evidence: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl GraphRelationship {
    pub fn new(
        from: GraphId,
        to: GraphId,
        rel_type: RelationshipType,
        evidence: impl Into<String>,
        confidence: Confidence,
    ) -> Self {
        Self {
            from,
            to,
            rel_type,
            evidence: evidence.into(),
            confidence,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// The complete graph for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisData {
    pub entities: Vec<GraphEntity>,
    pub relationships: Vec<GraphRelationship>,
}

impl AnalysisData {
    pub fn summary(&self) -> GraphSummary {
        let mut summary = GraphSummary::default();
        for entity in &self.entities {
            *summary.entities.entry(entity.kind.as_str()).or_default() += 1;
        }
        for rel in &self.relationships {
            *summary.relationships.entry(rel.rel_type.as_str()).or_default() += 1;
        }
        summary
    }
}

/// Counts per entity kind and relationship type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphSummary {
    pub entities: BTreeMap<&'static str, usize>,
    pub relationships: BTreeMap<&'static str, usize>,
}

impl GraphSummary {
    pub fn total_entities(&self) -> usize {
        self.entities.values().sum()
    }

    pub fn total_relationships(&self) -> usize {
        self.relationships.values().sum()
    }
}

impl fmt::Display for GraphSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "entities: {}", self.total_entities())?;
        for (kind, count) in &self.entities {
            writeln!(f, "  {kind}: {count}")?;
        }
        writeln!(f, "relationships: {}", self.total_relationships())?;
        for (rel, count) in &self.relationships {
            writeln!(f, "  {rel}: {count}")?;
        }
        Ok(())
    }
}
