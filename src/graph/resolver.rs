//! Name-based target resolution.
//!
//! This is a heuristic, not a symbol table: names are compared as plain
//! strings with no module-path or type disambiguation. A lookup tries the
//! caller's own file first, then falls back to a linear scan over every
//! entity, so an unresolved name costs O(n).
//!
//! Only declarations are targets: `SourceFile`, import and export nodes
//! never resolve.

use std::collections::HashMap;

use super::types::{GraphEntity, GraphId, GraphKind};

pub struct NameResolver<'a> {
    entities: &'a [GraphEntity],
    by_file: HashMap<&'a str, Vec<usize>>,
}

impl<'a> NameResolver<'a> {
    pub fn new(entities: &'a [GraphEntity]) -> Self {
        let mut by_file: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for (idx, entity) in entities.iter().enumerate() {
            if !is_declaration(entity) {
                continue;
            }
            by_file.entry(entity.file_path.as_str()).or_default().push(idx);
        }
        Self { entities, by_file }
    }

    /// First declaration named `name` in `file_path`.
    pub fn declaration_in_file(&self, file_path: &str, name: &str) -> Option<&'a GraphEntity> {
        let entities = self.entities;
        self.by_file
            .get(file_path)?
            .iter()
            .map(|&idx| &entities[idx])
            .find(|e| e.name == name)
    }

    /// Same-file match, else the first match anywhere.
    pub fn resolve(&self, file_path: &str, name: &str) -> Option<&'a GraphId> {
        if let Some(entity) = self.declaration_in_file(file_path, name) {
            return Some(&entity.id);
        }
        self.entities
            .iter()
            .find(|e| is_declaration(e) && e.name == name)
            .map(|e| &e.id)
    }
}

fn is_declaration(entity: &GraphEntity) -> bool {
    entity.kind.is_file_scoped()
        && !matches!(
            entity.kind,
            GraphKind::SourceFile | GraphKind::Import | GraphKind::Export
        )
}
