//! Dialect detection and tree-sitter grammar loading.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tree_sitter::Language;

/// Every source dialect the analyzer knows how to walk.
///
/// Detection never fails: anything unrecognized becomes [`Dialect::Fallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// Dedicated walker with full type information.
    TypeScript { tsx: bool },
    /// Unified walker.
    JavaScript,
    /// Unified walker.
    Java,
    /// Unified walker.
    Rust,
    /// Line-oriented regex scanner.
    Fallback,
}

impl Dialect {
    /// Detect dialect from file extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("ts" | "mts" | "cts") => Dialect::TypeScript { tsx: false },
            Some("tsx") => Dialect::TypeScript { tsx: true },
            Some("js" | "jsx" | "mjs" | "cjs") => Dialect::JavaScript,
            Some("java") => Dialect::Java,
            Some("rs") => Dialect::Rust,
            _ => Dialect::Fallback,
        }
    }

    /// Get the tree-sitter grammar, if this dialect is grammar-based.
    pub fn tree_sitter_language(&self) -> Option<Language> {
        match self {
            Dialect::TypeScript { tsx: false } => {
                Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            }
            Dialect::TypeScript { tsx: true } => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            Dialect::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Dialect::Java => Some(tree_sitter_java::LANGUAGE.into()),
            Dialect::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Dialect::Fallback => None,
        }
    }

    /// Get the display name.
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::TypeScript { tsx: false } => "TypeScript",
            Dialect::TypeScript { tsx: true } => "TSX",
            Dialect::JavaScript => "JavaScript",
            Dialect::Java => "Java",
            Dialect::Rust => "Rust",
            Dialect::Fallback => "Fallback",
        }
    }
}
