//! Node handling common to the TypeScript and JavaScript grammars:
//! imports, export statements, variable declarators and call classification.

use tree_sitter::Node;

use super::types::{CalleeKind, EntityKind, ExportType};
use super::walk::{has_token, members, CallSite, Collector};

const FUNCTION_VALUES: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
];

/// Strip matching quotes from a string literal.
pub(crate) fn unquote(text: &str) -> &str {
    let t = text.trim();
    for q in ['"', '\'', '`'] {
        if t.len() >= 2 && t.starts_with(q) && t.ends_with(q) {
            return &t[1..t.len() - 1];
        }
    }
    t
}

pub(crate) fn is_async(node: Node) -> bool {
    has_token(node, "async")
}

/// Declarations directly under `export ...` are exported.
pub(crate) fn is_exported(node: Node) -> bool {
    node.parent().is_some_and(|p| p.kind() == "export_statement")
}

pub(crate) fn is_function_value(node: Node) -> bool {
    FUNCTION_VALUES.contains(&node.kind())
}

/// `import ... from "mod"` → one import entity named by the specifier.
pub(crate) fn emit_import(c: &mut Collector, node: Node) {
    let module = c
        .field_text(node, "source")
        .map(unquote)
        .unwrap_or_default()
        .to_string();
    let entity = c.emit(node, EntityKind::Import, &module);
    entity.module = Some(module);
}

/// `const x = ...` declarators. Returns `true` when the declarator binds a
/// function and therefore opens a scope.
pub(crate) fn emit_declarator(c: &mut Collector, node: Node) -> bool {
    let Some(name_node) = node.child_by_field_name("name") else {
        return false;
    };
    // Destructuring patterns bind no single name.
    if name_node.kind() != "identifier" {
        return false;
    }
    let name = c.text(name_node);
    let value = node.child_by_field_name("value");
    let exported = node.parent().is_some_and(is_exported);

    match value {
        Some(v) if is_function_value(v) => {
            let entity = c.emit(node, EntityKind::Function, name);
            entity.is_async = is_async(v);
            entity.is_exported = exported;
            true
        }
        _ => {
            let entity = c.emit(node, EntityKind::Variable, name);
            entity.is_exported = exported;
            false
        }
    }
}

/// Standalone export statements. Statements wrapping a declaration emit
/// nothing here; the declaration itself carries `isExported`.
pub(crate) fn emit_export(c: &mut Collector, node: Node) {
    if node.child_by_field_name("declaration").is_some() {
        return;
    }
    let source = c.field_text(node, "source").map(|s| unquote(s).to_string());
    let re_export = source.is_some();

    let mut clause = None;
    let mut namespace = None;
    for child in members(node) {
        match child.kind() {
            "export_clause" => clause = Some(child),
            "namespace_export" => namespace = Some(child),
            _ => {}
        }
    }

    if let Some(clause) = clause {
        for spec in members(clause) {
            if spec.kind() != "export_specifier" {
                continue;
            }
            let name = c
                .field_text(spec, "name")
                .map(unquote)
                .unwrap_or_default();
            let entity = c.emit(spec, EntityKind::Export, name);
            entity.export_type = Some(ExportType::Named);
            entity.is_re_export = re_export;
            entity.module = source.clone();
        }
        return;
    }

    let (export_type, name) = if let Some(ns) = namespace {
        let name = members(ns)
            .first()
            .map(|n| c.text(*n))
            .unwrap_or_default();
        (ExportType::Namespace, name.to_string())
    } else if has_token(node, "*") {
        (ExportType::All, "*".to_string())
    } else if has_token(node, "default") {
        let name = match node.child_by_field_name("value") {
            Some(v) if v.kind() == "identifier" => c.text(v).to_string(),
            Some(v) => v
                .child_by_field_name("name")
                .map(|n| c.text(n).to_string())
                .unwrap_or_else(|| "default".to_string()),
            None => "default".to_string(),
        };
        (ExportType::Default, name)
    } else if has_token(node, "=") {
        let name = members(node)
            .last()
            .map(|n| c.text(*n))
            .unwrap_or_default();
        (ExportType::Assignment, name.to_string())
    } else {
        return;
    };

    let entity = c.emit(node, EntityKind::Export, &name);
    entity.export_type = Some(export_type);
    entity.is_re_export = re_export;
    entity.module = source;
}

/// Classify a `call_expression` by the shape of its callee.
pub(crate) fn classify_call(node: Node, src: &[u8]) -> Option<CallSite> {
    if node.kind() != "call_expression" {
        return None;
    }
    let function = node.child_by_field_name("function")?;
    let text = |n: Node| n.utf8_text(src).unwrap_or("").to_string();

    let (callee, kind) = match function.kind() {
        "identifier" => (text(function), CalleeKind::Function),
        "member_expression" => {
            let object = function.child_by_field_name("object").map(text);
            let property = function.child_by_field_name("property").map(text);
            match (object, property) {
                (Some(o), Some(p)) => (format!("{o}.{p}"), CalleeKind::Method),
                _ => (text(function), CalleeKind::Method),
            }
        }
        "subscript_expression" => {
            let object = function
                .child_by_field_name("object")
                .map(text)
                .unwrap_or_default();
            (format!("{object}[dynamic]"), CalleeKind::Dynamic)
        }
        _ => (text(function), CalleeKind::Dynamic),
    };

    let argument_count = node
        .child_by_field_name("arguments")
        .map(|args| members(args).len())
        .unwrap_or(0);

    Some(CallSite {
        callee,
        kind,
        argument_count,
    })
}

/// Name of a function-like node, for tracking the enclosing function.
pub(crate) fn function_name(node: Node, src: &[u8]) -> Option<String> {
    let name_of = |n: Node| {
        n.child_by_field_name("name")
            .and_then(|name| name.utf8_text(src).ok())
            .map(str::to_string)
    };
    match node.kind() {
        "function_declaration"
        | "generator_function_declaration"
        | "method_definition"
        | "function_expression" => name_of(node),
        "variable_declarator" => {
            let value = node.child_by_field_name("value")?;
            if is_function_value(value) {
                name_of(node)
            } else {
                None
            }
        }
        _ => None,
    }
}
