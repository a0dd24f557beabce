//! Fallback extractor for dialects without a grammar.
//!
//! A line scanner: declarations are recognized by keyword, nesting by
//! indentation. It never fails and never produces type information.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use super::scope::{context_snippet, ScopeRef};
use super::types::{
    CallExpression, CalleeKind, CodeEntity, EntityKind, ExtractOptions, Extraction,
};

static FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:(?:pub|export|public|private|protected|static|default)\s+)*(async\s+)?(?:def|function|fn|func|fun|sub)\s+([A-Za-z_$][\w$]*)",
    )
    .expect("valid function pattern")
});

static CONTAINER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:(?:pub|export|public|private|abstract|final|sealed|data)\s+)*(class|struct|interface|trait|enum|module|namespace|object|type)\s+([A-Za-z_][\w]*)",
    )
    .expect("valid container pattern")
});

static IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*(?:import|from|require|use|using|#include)\s*\(?\s*["'<]?([\w./:@-]+)"#)
        .expect("valid import pattern")
});

static CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)\s*\(").expect("valid call pattern")
});

const KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "elif", "except", "with", "function",
    "def", "fn", "func", "fun", "sub", "print", "not", "and", "or", "in", "lambda",
];

struct Frame {
    indent: usize,
    scope: ScopeRef,
    function: Option<String>,
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn container_kind(keyword: &str) -> EntityKind {
    match keyword {
        "struct" => EntityKind::Struct,
        "interface" => EntityKind::Interface,
        "trait" => EntityKind::Trait,
        "enum" => EntityKind::Enum,
        "module" | "namespace" => EntityKind::Module,
        "type" => EntityKind::Type,
        _ => EntityKind::Class,
    }
}

/// Scan `content` line by line.
pub fn extract(file_path: &Path, content: &str, options: &ExtractOptions) -> Extraction {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut extraction = Extraction::default();
    let mut frames: Vec<Frame> = Vec::new();
    let mut offset = 0;

    for (idx, raw) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let line_start = offset;
        offset += raw.len() + 1;

        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let indent = indentation(line);
        while frames.last().is_some_and(|f| f.indent >= indent) {
            frames.pop();
        }

        let declared = if let Some(caps) = FUNCTION.captures(line) {
            Some((EntityKind::Function, caps[2].to_string(), caps.get(1).is_some()))
        } else if let Some(caps) = CONTAINER.captures(line) {
            Some((container_kind(&caps[1]), caps[2].to_string(), false))
        } else {
            IMPORT
                .captures(line)
                .map(|caps| (EntityKind::Import, caps[1].to_string(), false))
        };

        if options.calls {
            let enclosing = frames.iter().rev().find_map(|f| f.function.clone());
            for caps in CALL.captures_iter(line) {
                let callee = &caps[1];
                if KEYWORDS.contains(&callee) {
                    continue;
                }
                if declared.as_ref().is_some_and(|(_, name, _)| name == callee) {
                    continue;
                }
                let kind = if callee.contains('.') {
                    CalleeKind::Method
                } else {
                    CalleeKind::Function
                };
                extraction.call_expressions.push(CallExpression {
                    callee: callee.to_string(),
                    callee_kind: kind,
                    line: line_no,
                    containing_function: enclosing.clone(),
                    argument_count: count_arguments(&line[caps.get(0).map_or(0, |m| m.end())..]),
                    signature: line.trim().to_string(),
                });
            }
        }

        let Some((kind, name, is_async)) = declared else {
            continue;
        };
        let trimmed = line.trim();
        let scope = ScopeRef::mint(kind, &name, line_no);
        extraction.entities.push(CodeEntity {
            kind,
            name: name.clone(),
            line: line_no,
            column: indent,
            pos: line_start + indent,
            end: line_start + line.len(),
            signature: trimmed.to_string(),
            file_path: file_path.to_path_buf(),
            is_async,
            is_exported: trimmed.starts_with("export ")
                || trimmed.starts_with("pub ")
                || trimmed.starts_with("public "),
            is_abstract: trimmed.contains("abstract "),
            scope_id: scope.clone(),
            parent_scope_id: frames.last().map(|f| f.scope.clone()),
            module: (kind == EntityKind::Import).then(|| name.clone()),
            export_type: None,
            is_re_export: false,
            context: options.context.map(|n| context_snippet(&lines, line_no, n)),
        });

        if kind != EntityKind::Import {
            frames.push(Frame {
                indent,
                scope,
                function: (kind == EntityKind::Function).then_some(name),
            });
        }
    }

    extraction
}

/// Top-level comma count inside the argument list that opens `rest`.
fn count_arguments(rest: &str) -> usize {
    let mut depth = 0usize;
    let mut count = 0usize;
    let mut seen = false;
    for ch in rest.chars() {
        match ch {
            '(' | '[' | '{' => {
                depth += 1;
                seen = true;
            }
            ')' | ']' | '}' if depth == 0 => break,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => count += 1,
            c if !c.is_whitespace() => seen = true,
            _ => {}
        }
    }
    if seen {
        count + 1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_nesting_and_calls() {
        let source = r#"
import os
from typing import Optional

class UserService:
    def __init__(self, db):
        self.db = db

    async def get_user(self, user_id):
        return self.db.find(user_id, None)

def main():
    service = UserService(None)
    print(service)

main()
"#;
        let options = ExtractOptions {
            calls: true,
            ..Default::default()
        };
        let ex = extract(Path::new("svc.py"), source, &options);
        let names: Vec<_> = ex.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["os", "typing", "UserService", "__init__", "get_user", "main"]
        );

        let class = &ex.entities[2];
        let get_user = &ex.entities[4];
        assert!(get_user.is_async);
        assert_eq!(get_user.parent_scope_id.as_ref(), Some(&class.scope_id));
        assert!(ex.entities[5].parent_scope_id.is_none());

        let find = ex
            .call_expressions
            .iter()
            .find(|c| c.callee == "self.db.find")
            .unwrap();
        assert_eq!(find.callee_kind, CalleeKind::Method);
        assert_eq!(find.containing_function.as_deref(), Some("get_user"));
        assert_eq!(find.argument_count, 2);

        let top = ex.call_expressions.last().unwrap();
        assert_eq!(top.callee, "main");
        assert!(top.containing_function.is_none());
        assert!(ex.call_expressions.iter().all(|c| c.callee != "print"));
    }

    #[test]
    fn test_go_like_source() {
        let source = "package main\n\ntype Server struct {}\n\nfunc Run() {\n\tstart(1)\n}\n";
        let ex = extract(Path::new("main.go"), source, &ExtractOptions::default());
        assert_eq!(ex.entities[0].kind, EntityKind::Type);
        assert_eq!(ex.entities[0].name, "Server");
        assert_eq!(ex.entities[1].kind, EntityKind::Function);
        assert!(ex.call_expressions.is_empty());
    }

    #[test]
    fn test_offsets() {
        let source = "x\n  def f():\n";
        let ex = extract(Path::new("a.py"), source, &ExtractOptions::default());
        let f = &ex.entities[0];
        assert_eq!(f.line, 2);
        assert_eq!(f.column, 2);
        assert_eq!(f.pos, 4);
        assert_eq!(f.end, 12);
    }

    #[test]
    fn test_count_arguments() {
        assert_eq!(count_arguments(")"), 0);
        assert_eq!(count_arguments("a, f(b, c), [d, e])"), 3);
        assert_eq!(count_arguments("x)"), 1);
    }
}
