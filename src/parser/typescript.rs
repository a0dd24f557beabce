//! TypeScript extractor.
//!
//! Walks the typed grammar directly: declarations with lexical nesting,
//! call sites, and a separate type-level pass (aliases, interfaces with their
//! `extends` lists, class heritage, enums, referenced type names).

use std::path::Path;
use std::str::Utf8Error;
use tracing::{debug, warn};
use tree_sitter::Node;

use super::ecma;
use super::language::Dialect;
use super::types::{
    ClassInfo, EntityKind, EnumInfo, ExtractOptions, Extraction, InterfaceInfo, TypeAliasInfo,
    TypeInformation,
};
use super::walk::{self, has_token, members, Collector, Visit};
use crate::error::Result;

/// Extract entities (and optionally calls/types) from one TypeScript file.
pub fn extract(
    file_path: &Path,
    content: &str,
    tsx: bool,
    options: &ExtractOptions,
) -> Result<Extraction> {
    let tree = walk::parse(file_path, content, Dialect::TypeScript { tsx })?;
    let root = tree.root_node();
    if root.has_error() {
        debug!(file = %file_path.display(), "syntax errors present, extracting what parsed");
    }

    let mut collector = Collector::new(file_path, content, options.context);
    visit(&mut collector, root);

    let call_expressions = if options.calls {
        walk::collect_calls(root, collector.src, &ecma::classify_call, &ecma::function_name)
    } else {
        Vec::new()
    };

    let mut type_info = TypeInformation::default();
    if options.types {
        if let Err(e) = collect_types(root, collector.src, &mut type_info) {
            warn!(file = %file_path.display(), error = %e, "type extraction stopped early");
        }
    }

    Ok(Extraction {
        entities: collector.entities,
        call_expressions,
        type_info,
    })
}

fn visit(c: &mut Collector, root: Node) {
    // Nodes whose scope is still open, innermost last.
    let mut open: Vec<usize> = Vec::new();
    for step in walk::traverse(root) {
        match step {
            Visit::Enter(node) => {
                if declare(c, node) {
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

/// Emit an entity for `node` if it is a declaration. Returns whether a scope
/// was opened.
fn declare(c: &mut Collector, node: Node) -> bool {
    let name = c.field_text(node, "name").unwrap_or_default();
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            let entity = c.emit(node, EntityKind::Function, name);
            entity.is_async = ecma::is_async(node);
            entity.is_exported = ecma::is_exported(node);
            c.open_scope(node);
            true
        }
        "function_signature" => {
            let entity = c.emit(node, EntityKind::Function, name);
            entity.is_exported = ecma::is_exported(node);
            false
        }
        "function_expression" | "arrow_function" if ecma::is_exported(node) => {
            let entity = c.emit(node, EntityKind::Function, name);
            entity.is_async = ecma::is_async(node);
            entity.is_exported = true;
            c.open_scope(node);
            true
        }
        "class_declaration" | "abstract_class_declaration" => {
            let entity = c.emit(node, EntityKind::Class, name);
            entity.is_abstract = node.kind() == "abstract_class_declaration";
            entity.is_exported = ecma::is_exported(node);
            c.open_scope(node);
            true
        }
        "class" if ecma::is_exported(node) => {
            let entity = c.emit(node, EntityKind::Class, name);
            entity.is_exported = true;
            c.open_scope(node);
            true
        }
        "method_definition" => {
            let entity = c.emit(node, EntityKind::Function, name);
            entity.is_async = ecma::is_async(node);
            c.open_scope(node);
            true
        }
        "method_signature" | "abstract_method_signature" => {
            let entity = c.emit(node, EntityKind::Function, name);
            entity.is_abstract = node.kind() == "abstract_method_signature";
            false
        }
        "public_field_definition" => {
            c.emit(node, EntityKind::Variable, name);
            false
        }
        "interface_declaration" => {
            let entity = c.emit(node, EntityKind::Interface, name);
            entity.is_exported = ecma::is_exported(node);
            false
        }
        "type_alias_declaration" => {
            let entity = c.emit(node, EntityKind::Type, name);
            entity.is_exported = ecma::is_exported(node);
            false
        }
        "enum_declaration" => {
            let entity = c.emit(node, EntityKind::Enum, name);
            entity.is_exported = ecma::is_exported(node);
            false
        }
        "internal_module" | "module" => {
            let entity = c.emit(node, EntityKind::Module, ecma::unquote(name));
            entity.is_exported = ecma::is_exported(node);
            false
        }
        "variable_declarator" => {
            let opens = ecma::emit_declarator(c, node);
            if opens {
                c.open_scope(node);
            }
            opens
        }
        "import_statement" => {
            ecma::emit_import(c, node);
            false
        }
        "export_statement" => {
            ecma::emit_export(c, node);
            false
        }
        _ => false,
    }
}

fn text<'a>(node: Node, src: &'a [u8]) -> std::result::Result<&'a str, Utf8Error> {
    node.utf8_text(src)
}

fn type_parameters(node: Node, src: &[u8]) -> std::result::Result<Vec<String>, Utf8Error> {
    let Some(params) = node.child_by_field_name("type_parameters") else {
        return Ok(Vec::new());
    };
    members(params)
        .into_iter()
        .map(|p| {
            let name = p.child_by_field_name("name").unwrap_or(p);
            text(name, src).map(str::to_string)
        })
        .collect()
}

fn texts(nodes: Vec<Node>, src: &[u8]) -> std::result::Result<Vec<String>, Utf8Error> {
    nodes
        .into_iter()
        .filter(|n| n.kind() != "type_arguments")
        .map(|n| text(n, src).map(str::to_string))
        .collect()
}

fn body_members(node: Node) -> usize {
    node.child_by_field_name("body")
        .map(|b| members(b).len())
        .unwrap_or(0)
}

/// Third walk: type-level declarations only. Stops at the first fault;
/// whatever was collected before it stays in `info`.
fn collect_types(
    root: Node,
    src: &[u8],
    info: &mut TypeInformation,
) -> std::result::Result<(), Utf8Error> {
    for step in walk::traverse(root) {
        if let Visit::Enter(node) = step {
            record_type(node, src, info)?;
        }
    }
    Ok(())
}

fn record_type(
    node: Node,
    src: &[u8],
    info: &mut TypeInformation,
) -> std::result::Result<(), Utf8Error> {
    let name = || -> std::result::Result<String, Utf8Error> {
        match node.child_by_field_name("name") {
            Some(n) => text(n, src).map(str::to_string),
            None => Ok("anonymous".to_string()),
        }
    };

    match node.kind() {
        "type_alias_declaration" => info.type_aliases.push(TypeAliasInfo {
            name: name()?,
            type_parameters: type_parameters(node, src)?,
            definition: node
                .child_by_field_name("value")
                .map(|v| text(v, src))
                .transpose()?
                .unwrap_or_default()
                .to_string(),
            is_exported: ecma::is_exported(node),
        }),
        "interface_declaration" => {
            let extends = members(node)
                .into_iter()
                .find(|c| c.kind() == "extends_type_clause")
                .map(|clause| texts(members(clause), src))
                .transpose()?
                .unwrap_or_default();
            info.interfaces.push(InterfaceInfo {
                name: name()?,
                type_parameters: type_parameters(node, src)?,
                extends,
                member_count: body_members(node),
                is_exported: ecma::is_exported(node),
            });
        }
        "class_declaration" | "abstract_class_declaration" => {
            let mut extends = Vec::new();
            let mut implements = Vec::new();
            if let Some(heritage) = members(node)
                .into_iter()
                .find(|c| c.kind() == "class_heritage")
            {
                for clause in members(heritage) {
                    match clause.kind() {
                        "extends_clause" => extends.extend(texts(members(clause), src)?),
                        "implements_clause" => implements.extend(texts(members(clause), src)?),
                        _ => {}
                    }
                }
            }
            info.classes.push(ClassInfo {
                name: name()?,
                type_parameters: type_parameters(node, src)?,
                extends,
                implements,
                member_count: body_members(node),
                is_abstract: node.kind() == "abstract_class_declaration",
                is_exported: ecma::is_exported(node),
            });
        }
        "enum_declaration" => info.enums.push(EnumInfo {
            name: name()?,
            member_count: body_members(node),
            is_const: has_token(node, "const"),
            is_exported: ecma::is_exported(node),
        }),
        "type_identifier" => {
            let is_decl_name = node.parent().is_some_and(|p| {
                matches!(
                    p.kind(),
                    "type_alias_declaration"
                        | "interface_declaration"
                        | "class_declaration"
                        | "abstract_class_declaration"
                        | "type_parameter"
                ) && p
                    .child_by_field_name("name")
                    .is_some_and(|n| n.id() == node.id())
            });
            if !is_decl_name {
                info.add_reference(text(node, src)?);
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::{CalleeKind, ExportType};

    fn run(source: &str) -> Extraction {
        let options = ExtractOptions {
            calls: true,
            types: true,
            context: None,
        };
        extract(Path::new("src/sample.ts"), source, false, &options).unwrap()
    }

    #[test]
    fn test_exported_async_function() {
        let ex = run(r#"export async function fetchData(): Promise<string> { return "data"; }"#);
        let f = &ex.entities[0];
        assert_eq!(f.kind, EntityKind::Function);
        assert_eq!(f.name, "fetchData");
        assert!(f.is_async);
        assert!(f.is_exported);
        assert_eq!(f.line, 1);
        assert!(f.parent_scope_id.is_none());
    }

    #[test]
    fn test_methods_nest_under_class() {
        let ex = run(
            r#"
abstract class Repo<T> {
    find(id: string): T { return this.load(id); }
    abstract save(item: T): void;
}
"#,
        );
        let class = ex.entities.iter().find(|e| e.name == "Repo").unwrap();
        assert!(class.is_abstract);
        let find = ex.entities.iter().find(|e| e.name == "find").unwrap();
        assert_eq!(find.parent_scope_id.as_ref(), Some(&class.scope_id));
        let save = ex.entities.iter().find(|e| e.name == "save").unwrap();
        assert_eq!(save.parent_scope_id.as_ref(), Some(&class.scope_id));
    }

    #[test]
    fn test_arrow_function_declarators() {
        let ex = run("export const handler = async (req) => { respond(req); };\nlet count = 0;");
        let handler = ex.entities.iter().find(|e| e.name == "handler").unwrap();
        assert_eq!(handler.kind, EntityKind::Function);
        assert!(handler.is_async);
        assert!(handler.is_exported);
        let count = ex.entities.iter().find(|e| e.name == "count").unwrap();
        assert_eq!(count.kind, EntityKind::Variable);
        assert!(!count.is_exported);

        let call = &ex.call_expressions[0];
        assert_eq!(call.callee, "respond");
        assert_eq!(call.containing_function.as_deref(), Some("handler"));
    }

    #[test]
    fn test_call_classification() {
        let ex = run(
            r#"
init();
function run() {
    api.client.get("/x", 1);
    handlers[name]();
}
"#,
        );
        let calls = &ex.call_expressions;
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].callee, "init");
        assert_eq!(calls[0].callee_kind, CalleeKind::Function);
        assert!(calls[0].containing_function.is_none());
        assert_eq!(calls[1].callee, "api.client.get");
        assert_eq!(calls[1].callee_kind, CalleeKind::Method);
        assert_eq!(calls[1].argument_count, 2);
        assert_eq!(calls[1].containing_function.as_deref(), Some("run"));
        assert_eq!(calls[2].callee, "handlers[dynamic]");
        assert_eq!(calls[2].callee_kind, CalleeKind::Dynamic);
    }

    #[test]
    fn test_imports_and_exports() {
        let ex = run(
            r#"
import { useState } from 'react';
import helper from "./helper";
function local() {}
export { local };
export * from './all';
export default local;
"#,
        );
        let imports: Vec<_> = ex
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Import)
            .map(|e| e.module.as_deref().unwrap())
            .collect();
        assert_eq!(imports, vec!["react", "./helper"]);

        let exports: Vec<_> = ex
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Export)
            .collect();
        assert_eq!(exports.len(), 3);
        assert_eq!(exports[0].name, "local");
        assert_eq!(exports[0].export_type, Some(ExportType::Named));
        assert!(!exports[0].is_re_export);
        assert_eq!(exports[1].export_type, Some(ExportType::All));
        assert!(exports[1].is_re_export);
        assert_eq!(exports[2].export_type, Some(ExportType::Default));
        assert_eq!(exports[2].name, "local");
    }

    #[test]
    fn test_type_information() {
        let ex = run(
            r#"
export type Id<T> = string | T;
interface Named extends Base, Other { name: string; label(): string; }
export class User extends Model implements Named, Serializable { name = ""; label() { return this.name; } }
const enum Role { Admin, Guest }
function load(u: Account): Profile { return u.profile; }
"#,
        );
        let types = &ex.type_info;
        assert_eq!(types.type_aliases.len(), 1);
        assert_eq!(types.type_aliases[0].name, "Id");
        assert_eq!(types.type_aliases[0].type_parameters, vec!["T"]);
        assert_eq!(types.type_aliases[0].definition, "string | T");
        assert!(types.type_aliases[0].is_exported);

        assert_eq!(types.interfaces[0].extends, vec!["Base", "Other"]);
        assert_eq!(types.interfaces[0].member_count, 2);

        let user = &types.classes[0];
        assert_eq!(user.extends, vec!["Model"]);
        assert_eq!(user.implements, vec!["Named", "Serializable"]);
        assert_eq!(user.member_count, 2);
        assert!(user.is_exported);

        assert_eq!(types.enums[0].name, "Role");
        assert_eq!(types.enums[0].member_count, 2);
        assert!(types.enums[0].is_const);

        assert!(types.type_references.contains(&"Account".to_string()));
        assert!(types.type_references.contains(&"Profile".to_string()));
        assert!(!types.type_references.contains(&"User".to_string()));
    }

    #[test]
    fn test_malformed_input_is_partial() {
        let ex = run("function ok() {}\nclass {{{ interface");
        assert!(ex.entities.iter().any(|e| e.name == "ok"));
    }

    #[test]
    fn test_options_default_off() {
        let ex = extract(
            Path::new("a.ts"),
            "function a() { b(); }\ntype T = string;",
            false,
            &ExtractOptions::default(),
        )
        .unwrap();
        assert!(ex.call_expressions.is_empty());
        assert!(ex.type_info.is_empty());
        assert_eq!(ex.entities.len(), 2);
    }

    #[test]
    fn test_context_snippet() {
        let options = ExtractOptions {
            context: Some(1),
            ..Default::default()
        };
        let ex = extract(
            Path::new("a.ts"),
            "// lead\nfunction a() {}\n// tail\n// far",
            false,
            &options,
        )
        .unwrap();
        assert_eq!(
            ex.entities[0].context.as_deref(),
            Some("// lead\nfunction a() {}\n// tail")
        );
    }
}
