//! Tree-walking plumbing shared by the grammar-based extractors.

use std::path::Path;
use tree_sitter::{Node, Parser, Tree, TreeCursor};

use super::language::Dialect;
use super::scope::{context_snippet, first_line, ScopeRef, ScopeStack};
use super::types::{CallExpression, CalleeKind, CodeEntity, EntityKind};
use crate::error::{GraphloomError, Result};

/// Parse `content` with the grammar of `dialect`.
pub(crate) fn parse(path: &Path, content: &str, dialect: Dialect) -> Result<Tree> {
    let language = dialect
        .tree_sitter_language()
        .ok_or_else(|| GraphloomError::Parse {
            path: path.to_path_buf(),
            message: format!("{} has no grammar", dialect.name()),
        })?;
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| GraphloomError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    parser
        .parse(content, None)
        .ok_or_else(|| GraphloomError::Parse {
            path: path.to_path_buf(),
            message: "parser produced no tree".to_string(),
        })
}

/// Named children, comments excluded.
pub(crate) fn members(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    let members = node
        .named_children(&mut cursor)
        .filter(|c| !c.kind().contains("comment"))
        .collect();
    members
}

/// Whether `node` has a direct (possibly anonymous) child of `kind`.
pub(crate) fn has_token(node: Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == kind);
    found
}

/// Emits entities and tracks the scope stack for one file.
pub(crate) struct Collector<'a> {
    pub src: &'a [u8],
    lines: Vec<&'a str>,
    file_path: &'a Path,
    context: Option<usize>,
    scopes: ScopeStack,
    pub entities: Vec<CodeEntity>,
}

impl<'a> Collector<'a> {
    pub fn new(file_path: &'a Path, content: &'a str, context: Option<usize>) -> Self {
        Self {
            src: content.as_bytes(),
            lines: if context.is_some() {
                content.split('\n').collect()
            } else {
                Vec::new()
            },
            file_path,
            context,
            scopes: ScopeStack::new(),
            entities: Vec::new(),
        }
    }

    pub fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.src).unwrap_or("")
    }

    /// Text of the `field` child, if present.
    pub fn field_text(&self, node: Node, field: &str) -> Option<&'a str> {
        node.child_by_field_name(field).map(|n| self.text(n))
    }

    /// Record one declaration rooted at `node`, parented to the innermost
    /// open scope. An empty name becomes `"anonymous"`.
    pub fn emit(&mut self, node: Node, kind: EntityKind, name: &str) -> &mut CodeEntity {
        let name = if name.is_empty() { "anonymous" } else { name };
        let line = node.start_position().row + 1;
        let context = self
            .context
            .map(|n| context_snippet(&self.lines, line, n));
        self.entities.push(CodeEntity {
            kind,
            name: name.to_string(),
            line,
            column: node.start_position().column,
            pos: node.start_byte(),
            end: node.end_byte(),
            signature: first_line(self.text(node)),
            file_path: self.file_path.to_path_buf(),
            is_async: false,
            is_exported: false,
            is_abstract: false,
            scope_id: ScopeRef::mint(kind, name, line),
            parent_scope_id: self.scopes.current().cloned(),
            module: None,
            export_type: None,
            is_re_export: false,
            context,
        });
        let last = self.entities.len() - 1;
        &mut self.entities[last]
    }

    /// Open a scope owned by `node`, using the most recently emitted entity.
    pub fn open_scope(&mut self, node: Node) {
        if let Some(entity) = self.entities.last() {
            self.scopes.push(node.id(), entity.scope_id.clone());
        }
    }

    pub fn close_scope(&mut self, node: Node) {
        self.scopes.pop(node.id());
    }
}

/// A classified call site, before line/containing-function bookkeeping.
pub(crate) struct CallSite {
    pub callee: String,
    pub kind: CalleeKind,
    pub argument_count: usize,
}

/// One step of a depth-first walk: a node is entered before its children
/// and exited after them.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Visit<'t> {
    Enter(Node<'t>),
    Exit(Node<'t>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Descend,
    Advance,
    Done,
}

/// Pre/post-order walk over the named nodes under `root`, `root` included.
///
/// Driven by a [`TreeCursor`], so nesting depth costs no stack.
pub(crate) struct Traversal<'t> {
    cursor: TreeCursor<'t>,
    root: Node<'t>,
    phase: Phase,
}

pub(crate) fn traverse<'t>(root: Node<'t>) -> Traversal<'t> {
    Traversal {
        cursor: root.walk(),
        root,
        phase: Phase::Start,
    }
}

impl<'t> Traversal<'t> {
    fn step(&mut self) -> Option<Visit<'t>> {
        match self.phase {
            Phase::Done => None,
            Phase::Start => {
                self.phase = Phase::Descend;
                Some(Visit::Enter(self.root))
            }
            Phase::Descend => {
                if self.cursor.goto_first_child() {
                    Some(Visit::Enter(self.cursor.node()))
                } else {
                    self.phase = Phase::Advance;
                    Some(Visit::Exit(self.cursor.node()))
                }
            }
            Phase::Advance => {
                if self.cursor.node() == self.root {
                    self.phase = Phase::Done;
                    None
                } else if self.cursor.goto_next_sibling() {
                    self.phase = Phase::Descend;
                    Some(Visit::Enter(self.cursor.node()))
                } else if self.cursor.goto_parent() {
                    Some(Visit::Exit(self.cursor.node()))
                } else {
                    self.phase = Phase::Done;
                    None
                }
            }
        }
    }
}

impl<'t> Iterator for Traversal<'t> {
    type Item = Visit<'t>;

    fn next(&mut self) -> Option<Visit<'t>> {
        loop {
            let visit = self.step()?;
            let node = match visit {
                Visit::Enter(n) | Visit::Exit(n) => n,
            };
            if node.is_named() {
                return Some(visit);
            }
        }
    }
}

/// Second tree walk: every call site with the innermost enclosing function
/// name. `classify` recognizes call nodes; `function_name` recognizes nodes
/// that open a named function body.
pub(crate) fn collect_calls<C, F>(
    root: Node,
    src: &[u8],
    classify: &C,
    function_name: &F,
) -> Vec<CallExpression>
where
    C: Fn(Node, &[u8]) -> Option<CallSite>,
    F: Fn(Node, &[u8]) -> Option<String>,
{
    let mut calls = Vec::new();
    // (owning node id, function name)
    let mut enclosing: Vec<(usize, String)> = Vec::new();

    for visit in traverse(root) {
        match visit {
            Visit::Enter(node) => {
                if let Some(site) = classify(node, src) {
                    calls.push(CallExpression {
                        callee: site.callee,
                        callee_kind: site.kind,
                        line: node.start_position().row + 1,
                        containing_function: enclosing.last().map(|(_, name)| name.clone()),
                        argument_count: site.argument_count,
                        signature: first_line(node.utf8_text(src).unwrap_or("")),
                    });
                }
                if let Some(name) = function_name(node, src) {
                    enclosing.push((node.id(), name));
                }
            }
            Visit::Exit(node) => {
                if enclosing.last().is_some_and(|(id, _)| *id == node.id()) {
                    enclosing.pop();
                }
            }
        }
    }
    calls
}
