//! Per-file extraction types.
//!
//! These live for one analysis pass only: extractors produce them, the file
//! analyzer bundles them, and the graph transformer consumes them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::scope::ScopeRef;

/// The kind of a syntactic declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Function,
    Class,
    Interface,
    Type,
    Import,
    Export,
    Variable,
    Struct,
    Enum,
    Trait,
    Impl,
    Module,
    Constant,
    Static,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Function => "function",
            EntityKind::Class => "class",
            EntityKind::Interface => "interface",
            EntityKind::Type => "type",
            EntityKind::Import => "import",
            EntityKind::Export => "export",
            EntityKind::Variable => "variable",
            EntityKind::Struct => "struct",
            EntityKind::Enum => "enum",
            EntityKind::Trait => "trait",
            EntityKind::Impl => "impl",
            EntityKind::Module => "module",
            EntityKind::Constant => "constant",
            EntityKind::Static => "static",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of an export statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportType {
    Named,
    Namespace,
    All,
    Default,
    Assignment,
}

/// One declaration found in one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeEntity {
    pub kind: EntityKind,
    pub name: String,
    /// 1-indexed declaration line.
    pub line: usize,
    /// 0-indexed column of the declaration start.
    pub column: usize,
    /// Byte offset of the declaration start.
    pub pos: usize,
    /// Byte offset one past the declaration end.
    pub end: usize,
    /// First source line of the declaration.
    pub signature: String,
    pub file_path: PathBuf,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub is_exported: bool,
    #[serde(default)]
    pub is_abstract: bool,
    pub scope_id: ScopeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_scope_id: Option<ScopeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_type: Option<ExportType>,
    #[serde(default)]
    pub is_re_export: bool,
    /// Surrounding source lines, when context snippets were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// How a call site names its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalleeKind {
    /// Bare identifier: `foo()`.
    Function,
    /// Property access: `obj.method()`.
    Method,
    /// Computed member: `obj[key]()`.
    Dynamic,
}

/// One call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallExpression {
    pub callee: String,
    pub callee_kind: CalleeKind,
    pub line: usize,
    /// Nearest enclosing function or method name; `None` at top level.
    pub containing_function: Option<String>,
    pub argument_count: usize,
    pub signature: String,
}

impl CallExpression {
    /// The last segment of the callee, which is what name-based resolution
    /// matches against (`obj.method` → `method`, `a::b` → `b`).
    pub fn target_name(&self) -> &str {
        let tail = self.callee.rsplit('.').next().unwrap_or(&self.callee);
        tail.rsplit("::").next().unwrap_or(tail)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeAliasInfo {
    pub name: String,
    pub type_parameters: Vec<String>,
    pub definition: String,
    pub is_exported: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceInfo {
    pub name: String,
    pub type_parameters: Vec<String>,
    pub extends: Vec<String>,
    pub member_count: usize,
    pub is_exported: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub name: String,
    pub type_parameters: Vec<String>,
    pub extends: Vec<String>,
    pub implements: Vec<String>,
    pub member_count: usize,
    pub is_abstract: bool,
    pub is_exported: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumInfo {
    pub name: String,
    pub member_count: usize,
    pub is_const: bool,
    pub is_exported: bool,
}

/// Type-level declarations of one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeInformation {
    pub type_aliases: Vec<TypeAliasInfo>,
    pub interfaces: Vec<InterfaceInfo>,
    pub classes: Vec<ClassInfo>,
    pub enums: Vec<EnumInfo>,
    pub type_references: Vec<String>,
}

impl TypeInformation {
    pub fn is_empty(&self) -> bool {
        self.type_aliases.is_empty()
            && self.interfaces.is_empty()
            && self.classes.is_empty()
            && self.enums.is_empty()
            && self.type_references.is_empty()
    }

    /// Record a referenced type name once, keeping first-seen order.
    pub(crate) fn add_reference(&mut self, name: &str) {
        if !name.is_empty() && !self.type_references.iter().any(|r| r == name) {
            self.type_references.push(name.to_string());
        }
    }
}

/// What one extractor returns for one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub entities: Vec<CodeEntity>,
    pub call_expressions: Vec<CallExpression>,
    pub type_info: TypeInformation,
}

/// Knobs shared by every extractor. Calls and types default off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    pub calls: bool,
    pub types: bool,
    /// Lines of context to snippet around each entity.
    pub context: Option<usize>,
}
