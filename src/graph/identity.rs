//! Deterministic node identities.
//!
//! Every id is the first 16 hex characters of a SHA-256 over a fixed key
//! layout. Changing a layout changes every id the engine has stored.

use sha2::{Digest, Sha256};
use std::path::{Component, Path};

use super::types::{GraphId, GraphKind};

const ID_LEN: usize = 16;

fn digest(key: &str) -> GraphId {
    let hash = Sha256::digest(key.as_bytes());
    let mut hex = String::with_capacity(ID_LEN);
    for byte in hash.iter().take(ID_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    GraphId(hex)
}

/// Id of a source-level declaration: `"{relPath}:{kind}:{name}:{line}"`.
pub fn entity_id(rel_path: &str, kind: GraphKind, name: &str, line: usize) -> GraphId {
    digest(&format!("{rel_path}:{}:{name}:{line}", kind.as_str()))
}

pub fn source_file_id(rel_path: &str) -> GraphId {
    digest(&format!("SourceFile:{rel_path}"))
}

pub fn external_module_id(specifier: &str) -> GraphId {
    digest(&format!("ExternalModule:{specifier}"))
}

pub fn project_id(name: &str) -> GraphId {
    digest(&format!("Project:{name}"))
}

pub fn application_id(name: &str, path: &str) -> GraphId {
    digest(&format!("Application:{path}:{name}"))
}

pub fn package_id(name: &str, path: &str) -> GraphId {
    digest(&format!("Package:{path}:{name}"))
}

pub fn dependency_id(name: &str) -> GraphId {
    digest(&format!("Dependency:{name}"))
}

/// Synthetic import target left for the engine to resolve.
pub fn local_import_id(specifier: &str) -> GraphId {
    let sanitized: String = specifier
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    GraphId::synthetic(format!("local_import_{sanitized}"))
}

/// `path` relative to `root` (when it lies under it), `/`-separated, with
/// `.` segments dropped.
pub fn relative_path(path: &Path, root: Option<&Path>) -> String {
    let rel = root
        .and_then(|root| path.strip_prefix(root).ok())
        .unwrap_or(path);
    normalize(rel)
}

pub(crate) fn normalize(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut absolute = false;
    for component in path.components() {
        match component {
            Component::RootDir => absolute = true,
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.last().is_some_and(|p| p != "..") {
                    parts.pop();
                } else {
                    parts.push("..".to_string());
                }
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::Prefix(prefix) => parts.push(prefix.as_os_str().to_string_lossy().into_owned()),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}
