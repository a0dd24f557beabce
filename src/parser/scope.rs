//! Pass-local scope identities and the lexical scope stack.
//!
//! A [`ScopeRef`] only links nested declarations to their parent within one
//! extraction pass. It is not stable across runs; the graph layer computes
//! its own deterministic ids and bridges the two explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::types::EntityKind;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeRef(String);

impl ScopeRef {
    /// Mint a fresh ref. The random suffix keeps two same-named declarations
    /// on the same line distinct.
    pub fn mint(kind: EntityKind, name: &str, line: usize) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        ScopeRef(format!("{kind}_{name}_{line}_{}", &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stack of open lexical scopes, keyed by the syntax node that opened them.
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<(usize, ScopeRef)>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node_id: usize, scope: ScopeRef) {
        self.frames.push((node_id, scope));
    }

    /// Innermost open scope.
    pub fn current(&self) -> Option<&ScopeRef> {
        self.frames.last().map(|(_, s)| s)
    }

    /// Close the frame opened by `node_id`, wherever it sits in the stack.
    pub fn pop(&mut self, node_id: usize) -> Option<ScopeRef> {
        let idx = self.frames.iter().rposition(|(id, _)| *id == node_id)?;
        Some(self.frames.remove(idx).1)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// First line of a declaration, trimmed.
pub(crate) fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or("").trim().to_string()
}

/// `context` lines either side of the 1-indexed `line`, clamped to the file.
pub(crate) fn context_snippet(lines: &[&str], line: usize, context: usize) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let idx = line.saturating_sub(1).min(lines.len() - 1);
    let start = idx.saturating_sub(context);
    let end = (idx + context + 1).min(lines.len());
    lines[start..end].join("\n")
}
