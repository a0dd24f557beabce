//! Unified grammar-driven extractor for JavaScript, Java and Rust.
//!
//! Each grammar contributes a rule table mapping declaration node kinds to
//! entity kinds. Nodes that need more than a name lookup (ECMAScript
//! declarators, imports and exports) are handled before the table.

use std::path::Path;
use std::str::Utf8Error;
use tracing::{debug, warn};
use tree_sitter::Node;

use super::ecma;
use super::language::Dialect;
use super::types::{
    CalleeKind, ClassInfo, EntityKind, EnumInfo, ExtractOptions, Extraction, InterfaceInfo,
    TypeAliasInfo, TypeInformation,
};
use super::walk::{self, has_token, members, CallSite, Collector, Visit};
use crate::error::{GraphloomError, Result};

/// Grammars handled by this walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    JavaScript,
    Java,
    Rust,
}

impl Grammar {
    pub fn from_dialect(dialect: Dialect) -> Option<Self> {
        match dialect {
            Dialect::JavaScript => Some(Grammar::JavaScript),
            Dialect::Java => Some(Grammar::Java),
            Dialect::Rust => Some(Grammar::Rust),
            Dialect::TypeScript { .. } | Dialect::Fallback => None,
        }
    }

    fn dialect(self) -> Dialect {
        match self {
            Grammar::JavaScript => Dialect::JavaScript,
            Grammar::Java => Dialect::Java,
            Grammar::Rust => Dialect::Rust,
        }
    }

    fn rules(self) -> &'static [Rule] {
        match self {
            Grammar::JavaScript => JS_RULES,
            Grammar::Java => JAVA_RULES,
            Grammar::Rust => RUST_RULES,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum NameSource {
    Field(&'static str),
    /// Text of the first named child.
    FirstMember,
    /// Java `field_declaration`: `declarator` → `name`.
    Declarator,
}

#[derive(Debug)]
struct Rule {
    node: &'static str,
    kind: EntityKind,
    opens_scope: bool,
    name: NameSource,
}

const fn rule(node: &'static str, kind: EntityKind, opens_scope: bool) -> Rule {
    Rule {
        node,
        kind,
        opens_scope,
        name: NameSource::Field("name"),
    }
}

const fn named(node: &'static str, kind: EntityKind, name: NameSource) -> Rule {
    Rule {
        node,
        kind,
        opens_scope: false,
        name,
    }
}

const JS_RULES: &[Rule] = &[
    rule("function_declaration", EntityKind::Function, true),
    rule("generator_function_declaration", EntityKind::Function, true),
    rule("class_declaration", EntityKind::Class, true),
    rule("method_definition", EntityKind::Function, true),
    named("field_definition", EntityKind::Variable, NameSource::Field("property")),
];

const JAVA_RULES: &[Rule] = &[
    rule("class_declaration", EntityKind::Class, true),
    rule("record_declaration", EntityKind::Class, true),
    rule("interface_declaration", EntityKind::Interface, true),
    rule("annotation_type_declaration", EntityKind::Interface, false),
    rule("enum_declaration", EntityKind::Enum, true),
    rule("method_declaration", EntityKind::Function, true),
    rule("constructor_declaration", EntityKind::Function, true),
    named("field_declaration", EntityKind::Variable, NameSource::Declarator),
    named("import_declaration", EntityKind::Import, NameSource::FirstMember),
    named("package_declaration", EntityKind::Module, NameSource::FirstMember),
];

const RUST_RULES: &[Rule] = &[
    rule("function_item", EntityKind::Function, true),
    rule("function_signature_item", EntityKind::Function, false),
    rule("struct_item", EntityKind::Struct, false),
    rule("union_item", EntityKind::Struct, false),
    rule("enum_item", EntityKind::Enum, false),
    rule("trait_item", EntityKind::Trait, true),
    Rule {
        node: "impl_item",
        kind: EntityKind::Impl,
        opens_scope: true,
        name: NameSource::Field("type"),
    },
    rule("mod_item", EntityKind::Module, true),
    rule("const_item", EntityKind::Constant, false),
    rule("static_item", EntityKind::Static, false),
    rule("type_item", EntityKind::Type, false),
    named("use_declaration", EntityKind::Import, NameSource::Field("argument")),
];

/// Extract entities (and optionally calls/types) from one file.
pub fn extract(
    file_path: &Path,
    content: &str,
    grammar: Grammar,
    options: &ExtractOptions,
) -> Result<Extraction> {
    let tree = walk::parse(file_path, content, grammar.dialect())?;
    let root = tree.root_node();
    if root.has_error() {
        debug!(file = %file_path.display(), grammar = ?grammar, "syntax errors present, extracting what parsed");
    }

    let mut collector = Collector::new(file_path, content, options.context);
    visit(&mut collector, grammar, root);

    let call_expressions = if options.calls {
        match grammar {
            Grammar::JavaScript => {
                walk::collect_calls(root, collector.src, &ecma::classify_call, &ecma::function_name)
            }
            Grammar::Java => {
                walk::collect_calls(root, collector.src, &java_call, &java_function_name)
            }
            Grammar::Rust => {
                walk::collect_calls(root, collector.src, &rust_call, &rust_function_name)
            }
        }
    } else {
        Vec::new()
    };

    let mut type_info = TypeInformation::default();
    if options.types {
        if let Err(e) = collect_types(grammar, root, collector.src, &mut type_info) {
            warn!(file = %file_path.display(), error = %e, "type extraction stopped early");
        }
    }

    Ok(Extraction {
        entities: collector.entities,
        call_expressions,
        type_info,
    })
}

fn visit(c: &mut Collector, grammar: Grammar, root: Node) {
    // Nodes whose scope is still open, innermost last.
    let mut open: Vec<usize> = Vec::new();
    for step in walk::traverse(root) {
        match step {
            Visit::Enter(node) => {
                if declare(c, grammar, node) {
                    open.push(node.id());
                }
            }
            Visit::Exit(node) => {
                if open.last() == Some(&node.id()) {
                    open.pop();
                    c.close_scope(node);
                }
            }
        }
    }
}

fn declare(c: &mut Collector, grammar: Grammar, node: Node) -> bool {
    if grammar == Grammar::JavaScript {
        match node.kind() {
            "variable_declarator" => {
                let opens = ecma::emit_declarator(c, node);
                if opens {
                    c.open_scope(node);
                }
                return opens;
            }
            "import_statement" => {
                ecma::emit_import(c, node);
                return false;
            }
            "export_statement" => {
                ecma::emit_export(c, node);
                return false;
            }
            "function_expression" | "arrow_function" | "class" if ecma::is_exported(node) => {
                let kind = if node.kind() == "class" {
                    EntityKind::Class
                } else {
                    EntityKind::Function
                };
                let name = c.field_text(node, "name").unwrap_or_default();
                let entity = c.emit(node, kind, name);
                entity.is_async = ecma::is_async(node);
                entity.is_exported = true;
                c.open_scope(node);
                return true;
            }
            _ => {}
        }
    }

    let Some(rule) = grammar.rules().iter().find(|r| r.node == node.kind()) else {
        return false;
    };

    let name = match rule.name {
        NameSource::Field(field) => c.field_text(node, field).unwrap_or_default(),
        NameSource::FirstMember => members(node).first().map(|n| c.text(*n)).unwrap_or_default(),
        NameSource::Declarator => node
            .child_by_field_name("declarator")
            .and_then(|d| c.field_text(d, "name"))
            .unwrap_or_default(),
    };

    let (is_async, is_exported, is_abstract) = flags(grammar, node);
    let entity = c.emit(node, rule.kind, name);
    entity.is_async = is_async;
    entity.is_exported = is_exported;
    entity.is_abstract = is_abstract;
    if rule.kind == EntityKind::Import {
        entity.module = Some(entity.name.clone());
    }

    if rule.opens_scope {
        c.open_scope(node);
    }
    rule.opens_scope
}

/// `(async, exported, abstract)` as each grammar spells them.
fn flags(grammar: Grammar, node: Node) -> (bool, bool, bool) {
    match grammar {
        Grammar::JavaScript => (ecma::is_async(node), ecma::is_exported(node), false),
        Grammar::Java => {
            let modifiers = members(node).into_iter().find(|c| c.kind() == "modifiers");
            let has = |token| modifiers.is_some_and(|m| has_token(m, token));
            (false, has("public"), has("abstract"))
        }
        Grammar::Rust => {
            let children = members(node);
            let exported = children.iter().any(|c| c.kind() == "visibility_modifier");
            let is_async = children
                .iter()
                .any(|c| c.kind() == "function_modifiers" && has_token(*c, "async"));
            (is_async, exported, false)
        }
    }
}

fn node_text(node: Node, src: &[u8]) -> String {
    node.utf8_text(src).unwrap_or("").to_string()
}

fn java_call(node: Node, src: &[u8]) -> Option<CallSite> {
    if node.kind() != "method_invocation" {
        return None;
    }
    let name = node_text(node.child_by_field_name("name")?, src);
    let (callee, kind) = match node.child_by_field_name("object") {
        Some(object) => (
            format!("{}.{}", node_text(object, src), name),
            CalleeKind::Method,
        ),
        None => (name, CalleeKind::Function),
    };
    let argument_count = node
        .child_by_field_name("arguments")
        .map(|a| members(a).len())
        .unwrap_or(0);
    Some(CallSite {
        callee,
        kind,
        argument_count,
    })
}

fn java_function_name(node: Node, src: &[u8]) -> Option<String> {
    match node.kind() {
        "method_declaration" | "constructor_declaration" => {
            Some(node_text(node.child_by_field_name("name")?, src))
        }
        _ => None,
    }
}

fn rust_callee(function: Node, src: &[u8]) -> (String, CalleeKind) {
    match function.kind() {
        "identifier" | "scoped_identifier" => (node_text(function, src), CalleeKind::Function),
        "field_expression" => {
            let value = function.child_by_field_name("value").map(|v| node_text(v, src));
            let field = function.child_by_field_name("field").map(|f| node_text(f, src));
            match (value, field) {
                (Some(v), Some(f)) => (format!("{v}.{f}"), CalleeKind::Method),
                _ => (node_text(function, src), CalleeKind::Method),
            }
        }
        "generic_function" => match function.child_by_field_name("function") {
            Some(inner) => rust_callee(inner, src),
            None => (node_text(function, src), CalleeKind::Dynamic),
        },
        "index_expression" => {
            let object = members(function)
                .first()
                .map(|o| node_text(*o, src))
                .unwrap_or_default();
            (format!("{object}[dynamic]"), CalleeKind::Dynamic)
        }
        _ => (node_text(function, src), CalleeKind::Dynamic),
    }
}

fn rust_call(node: Node, src: &[u8]) -> Option<CallSite> {
    if node.kind() != "call_expression" {
        return None;
    }
    let (callee, kind) = rust_callee(node.child_by_field_name("function")?, src);
    let argument_count = node
        .child_by_field_name("arguments")
        .map(|a| members(a).len())
        .unwrap_or(0);
    Some(CallSite {
        callee,
        kind,
        argument_count,
    })
}

fn rust_function_name(node: Node, src: &[u8]) -> Option<String> {
    match node.kind() {
        "function_item" => Some(node_text(node.child_by_field_name("name")?, src)),
        _ => None,
    }
}

type TypeResult<T> = std::result::Result<T, Utf8Error>;

fn texts(nodes: Vec<Node>, src: &[u8]) -> TypeResult<Vec<String>> {
    nodes
        .into_iter()
        .filter(|n| n.kind() != "type_arguments")
        .map(|n| n.utf8_text(src).map(str::to_string))
        .collect()
}

fn field_string(node: Node, field: &str, src: &[u8]) -> TypeResult<String> {
    match node.child_by_field_name(field) {
        Some(n) => n.utf8_text(src).map(str::to_string),
        None => Ok(String::new()),
    }
}

/// Type parameter names; bounds are dropped.
fn type_parameters(node: Node, src: &[u8]) -> TypeResult<Vec<String>> {
    let Some(params) = node.child_by_field_name("type_parameters") else {
        return Ok(Vec::new());
    };
    members(params)
        .into_iter()
        .map(|p| {
            let name = p
                .child_by_field_name("left")
                .or_else(|| p.child_by_field_name("name"))
                .or_else(|| members(p).into_iter().find(|c| c.kind().ends_with("identifier")))
                .unwrap_or(p);
            name.utf8_text(src).map(str::to_string)
        })
        .collect()
}

fn body_count(node: Node, member_kind: Option<&str>) -> usize {
    node.child_by_field_name("body")
        .map(|b| {
            members(b)
                .into_iter()
                .filter(|m| member_kind.map_or(true, |k| m.kind() == k))
                .count()
        })
        .unwrap_or(0)
}

fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    members(node).into_iter().find(|c| c.kind() == kind)
}

fn is_declaration_name(node: Node) -> bool {
    node.parent().is_some_and(|p| {
        p.child_by_field_name("name")
            .is_some_and(|n| n.id() == node.id())
    })
}

fn collect_types(
    grammar: Grammar,
    root: Node,
    src: &[u8],
    info: &mut TypeInformation,
) -> TypeResult<()> {
    for step in walk::traverse(root) {
        if let Visit::Enter(node) = step {
            record_type(grammar, node, src, info)?;
        }
    }
    Ok(())
}

fn record_type(grammar: Grammar, node: Node, src: &[u8], info: &mut TypeInformation) -> TypeResult<()> {
    let exported = || flags(grammar, node).1;

    match (grammar, node.kind()) {
        (Grammar::JavaScript, "class_declaration") => {
            let extends = match child_of_kind(node, "class_heritage") {
                Some(heritage) => texts(members(heritage), src)?,
                None => Vec::new(),
            };
            info.classes.push(ClassInfo {
                name: field_string(node, "name", src)?,
                extends,
                member_count: body_count(node, None),
                is_exported: exported(),
                ..Default::default()
            });
        }
        (Grammar::Java, "class_declaration") => {
            let (_, is_exported, is_abstract) = flags(grammar, node);
            let extends = match node.child_by_field_name("superclass") {
                Some(s) => texts(members(s), src)?,
                None => Vec::new(),
            };
            let implements = match node
                .child_by_field_name("interfaces")
                .and_then(|i| child_of_kind(i, "type_list"))
            {
                Some(list) => texts(members(list), src)?,
                None => Vec::new(),
            };
            info.classes.push(ClassInfo {
                name: field_string(node, "name", src)?,
                type_parameters: type_parameters(node, src)?,
                extends,
                implements,
                member_count: body_count(node, None),
                is_abstract,
                is_exported,
            });
        }
        (Grammar::Java, "interface_declaration") => {
            let extends = match child_of_kind(node, "extends_interfaces")
                .and_then(|e| child_of_kind(e, "type_list"))
            {
                Some(list) => texts(members(list), src)?,
                None => Vec::new(),
            };
            info.interfaces.push(InterfaceInfo {
                name: field_string(node, "name", src)?,
                type_parameters: type_parameters(node, src)?,
                extends,
                member_count: body_count(node, None),
                is_exported: exported(),
            });
        }
        (Grammar::Java, "enum_declaration") => info.enums.push(EnumInfo {
            name: field_string(node, "name", src)?,
            member_count: body_count(node, Some("enum_constant")),
            is_const: false,
            is_exported: exported(),
        }),
        (Grammar::Rust, "type_item") => info.type_aliases.push(TypeAliasInfo {
            name: field_string(node, "name", src)?,
            type_parameters: type_parameters(node, src)?,
            definition: field_string(node, "type", src)?,
            is_exported: exported(),
        }),
        (Grammar::Rust, "enum_item") => info.enums.push(EnumInfo {
            name: field_string(node, "name", src)?,
            member_count: body_count(node, Some("enum_variant")),
            is_const: false,
            is_exported: exported(),
        }),
        (Grammar::Rust, "trait_item") => {
            let extends = match node.child_by_field_name("bounds") {
                Some(bounds) => texts(members(bounds), src)?,
                None => Vec::new(),
            };
            info.interfaces.push(InterfaceInfo {
                name: field_string(node, "name", src)?,
                type_parameters: type_parameters(node, src)?,
                extends,
                member_count: body_count(node, None),
                is_exported: exported(),
            });
        }
        (Grammar::Java | Grammar::Rust, "type_identifier") if !is_declaration_name(node) => {
            info.add_reference(node.utf8_text(src)?);
        }
        _ => {}
    }
    Ok(())
}

/// Extract through the unified walker for any grammar-backed dialect it owns.
pub fn extract_dialect(
    file_path: &Path,
    content: &str,
    dialect: Dialect,
    options: &ExtractOptions,
) -> Result<Extraction> {
    let grammar = Grammar::from_dialect(dialect).ok_or_else(|| GraphloomError::Parse {
        path: file_path.to_path_buf(),
        message: format!("{} is not handled by the unified walker", dialect.name()),
    })?;
    extract(file_path, content, grammar, options)
}
