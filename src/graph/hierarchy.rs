//! Project hierarchy consumed by the transformer.
//!
//! Manifest discovery happens elsewhere; this side only reads a ready-made
//! hierarchy (usually from a JSON file) and answers a few questions about it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::identity::normalize;
use crate::error::{GraphloomError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectHierarchy {
    pub project_info: ProjectInfo,
    pub packages: Vec<PackageInfo>,
    pub applications: Vec<ApplicationInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectInfo {
    pub name: String,
    pub path: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageInfo {
    pub name: String,
    pub version: Option<String>,
    /// Package directory, relative to the project root.
    pub path: String,
    pub main: Option<String>,
    pub types: Option<String>,
    pub bin: Option<BinField>,
    /// Dependency name to version requirement.
    pub dependencies: BTreeMap<String, String>,
}

/// `bin` is either a single path or a map of command name to path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinField {
    Single(String),
    Named(BTreeMap<String, String>),
}

impl BinField {
    pub fn paths(&self) -> Vec<&str> {
        match self {
            BinField::Single(path) => vec![path.as_str()],
            BinField::Named(map) => map.values().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationInfo {
    pub name: String,
    pub path: String,
    /// Name of the package this application is built from.
    pub package: Option<String>,
    /// Entry files, relative to the project root.
    pub entry_points: Vec<String>,
}

/// Which manifest field an entry point corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTag {
    Main,
    Types,
    Bin,
}

impl EntryTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryTag::Main => "main",
            EntryTag::Types => "types",
            EntryTag::Bin => "bin",
        }
    }
}

impl ProjectHierarchy {
    /// Read a hierarchy from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| GraphloomError::Config {
            path: path.to_path_buf(),
            message: format!("invalid project hierarchy: {e}"),
        })
    }

    pub fn package(&self, name: &str) -> Option<&PackageInfo> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// A dependency is internal when it names another package of this
    /// project or uses a `workspace:` version.
    pub fn is_workspace_dependency(&self, name: &str, version: &str) -> bool {
        version.starts_with("workspace:") || self.packages.iter().any(|p| p.name == name)
    }

    /// Distinct external dependencies across all packages, sorted by name.
    /// The first version seen for a name wins.
    pub fn external_dependencies(&self) -> Vec<(&str, &str)> {
        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        for package in &self.packages {
            for (name, version) in &package.dependencies {
                if self.is_workspace_dependency(name, version) {
                    continue;
                }
                seen.entry(name.as_str()).or_insert(version.as_str());
            }
        }
        seen.into_iter().collect()
    }
}

impl PackageInfo {
    /// Tag `entry` (project-relative) against this manifest's declared
    /// fields. Entry points matching none of them are treated as `main`.
    pub fn entry_tag(&self, entry: &str) -> EntryTag {
        let entry = normalize(Path::new(entry));
        let declared = |field: &str| {
            let joined = normalize(&Path::new(&self.path).join(field));
            joined == entry || normalize(Path::new(field)) == entry
        };
        if self.types.as_deref().is_some_and(declared) {
            EntryTag::Types
        } else if self
            .bin
            .as_ref()
            .is_some_and(|bin| bin.paths().into_iter().any(declared))
        {
            EntryTag::Bin
        } else {
            EntryTag::Main
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProjectHierarchy {
        serde_json::from_str(
            r#"{
                "projectInfo": { "name": "shop", "path": "." },
                "packages": [
                    {
                        "name": "@shop/web",
                        "version": "1.2.0",
                        "path": "packages/web",
                        "main": "src/index.ts",
                        "types": "src/types.d.ts",
                        "bin": { "web": "./bin/cli.js" },
                        "dependencies": {
                            "react": "^18.0.0",
                            "@shop/core": "workspace:*",
                            "lodash": "^4.17.0"
                        }
                    },
                    {
                        "name": "@shop/core",
                        "path": "packages/core",
                        "bin": "cli.js",
                        "dependencies": { "lodash": "^4.0.0", "zod": "3.22.0" }
                    }
                ],
                "applications": [
                    {
                        "name": "web",
                        "path": "packages/web",
                        "package": "@shop/web",
                        "entryPoints": ["packages/web/src/index.ts"]
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_external_dependencies_skip_workspace() {
        let hierarchy = sample();
        let deps = hierarchy.external_dependencies();
        assert_eq!(
            deps,
            vec![("lodash", "^4.17.0"), ("react", "^18.0.0"), ("zod", "3.22.0")]
        );
    }

    #[test]
    fn test_entry_tags() {
        let hierarchy = sample();
        let web = hierarchy.package("@shop/web").unwrap();
        assert_eq!(web.entry_tag("packages/web/src/index.ts"), EntryTag::Main);
        assert_eq!(web.entry_tag("packages/web/src/types.d.ts"), EntryTag::Types);
        assert_eq!(web.entry_tag("packages/web/bin/cli.js"), EntryTag::Bin);
        assert_eq!(web.entry_tag("packages/web/src/other.ts"), EntryTag::Main);

        let core = hierarchy.package("@shop/core").unwrap();
        assert_eq!(core.bin.as_ref().unwrap().paths(), vec!["cli.js"]);
        assert_eq!(core.entry_tag("packages/core/cli.js"), EntryTag::Bin);
    }

    #[test]
    fn test_load_rejects_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hierarchy.json");
        fs::write(&path, "{ not json").unwrap();
        let err = ProjectHierarchy::load(&path).unwrap_err();
        assert!(matches!(err, GraphloomError::Config { .. }));

        fs::write(&path, r#"{"projectInfo":{"name":"p"}}"#).unwrap();
        let loaded = ProjectHierarchy::load(&path).unwrap();
        assert_eq!(loaded.project_info.name, "p");
        assert!(loaded.packages.is_empty());
    }
}
