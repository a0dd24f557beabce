//! Language extractors.
//!
//! One extractor per dialect, selected by file extension through
//! [`Dialect`]. Extraction is per-file and stateless: nothing carries over
//! between files.

pub mod ecma;
pub mod fallback;
pub mod language;
pub mod scope;
pub mod types;
pub mod typescript;
pub mod unified;
mod walk;

use std::path::Path;
use tracing::warn;

pub use language::Dialect;
pub use scope::{ScopeRef, ScopeStack};
pub use types::{
    CallExpression, CalleeKind, ClassInfo, CodeEntity, EntityKind, EnumInfo, ExportType,
    ExtractOptions, Extraction, InterfaceInfo, TypeAliasInfo, TypeInformation,
};

/// Extract entities, calls and types from one file.
///
/// Never fails: a grammar-level fault is logged and yields an empty
/// extraction for that file.
pub fn extract_file(path: &Path, content: &str, options: &ExtractOptions) -> Extraction {
    let dialect = Dialect::from_path(path);
    let result = match dialect {
        Dialect::TypeScript { tsx } => typescript::extract(path, content, tsx, options),
        Dialect::JavaScript | Dialect::Java | Dialect::Rust => {
            unified::extract_dialect(path, content, dialect, options)
        }
        Dialect::Fallback => Ok(fallback::extract(path, content, options)),
    };

    match result {
        Ok(extraction) => extraction,
        Err(e) => {
            warn!(file = %path.display(), dialect = dialect.name(), error = %e, "extractor fault, file yields no entities");
            Extraction::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_extension_uses_fallback() {
        let ex = extract_file(
            Path::new("script.lua"),
            "function greet(name)\n  print(name)\nend\n",
            &ExtractOptions::default(),
        );
        assert_eq!(ex.entities.len(), 1);
        assert_eq!(ex.entities[0].name, "greet");
    }

    #[test]
    fn test_empty_sources() {
        for path in ["a.ts", "a.tsx", "a.js", "A.java", "a.rs", "a.py"] {
            let ex = extract_file(Path::new(path), "", &ExtractOptions::default());
            assert!(ex.entities.is_empty(), "{path}");
            assert!(ex.call_expressions.is_empty(), "{path}");
        }
    }

    #[test]
    fn test_malformed_rust_is_tolerated() {
        let ex = extract_file(
            Path::new("bad.rs"),
            "fn broken( { struct }}}",
            &ExtractOptions::default(),
        );
        assert!(ex.type_info.is_empty());
    }

    #[test]
    fn test_tsx_dispatch() {
        let ex = extract_file(
            Path::new("App.tsx"),
            "export const App = () => <div>{title()}</div>;",
            &ExtractOptions {
                calls: true,
                ..Default::default()
            },
        );
        assert_eq!(ex.entities[0].name, "App");
        assert_eq!(ex.call_expressions[0].callee, "title");
        assert_eq!(ex.call_expressions[0].containing_function.as_deref(), Some("App"));
    }
}
