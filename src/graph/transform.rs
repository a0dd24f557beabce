//! Graph transformer: per-file analysis results in, one `AnalysisData` out.
//!
//! Construction happens in five ordered passes. Later passes look up ids
//! assigned by earlier ones, so the order is load-bearing:
//!
//! 1. hierarchy nodes (project, applications, packages, dependencies)
//! 2. one node per declaration plus one `SourceFile` node per file
//! 3. per-file relationships (calls, exports, containment, imports)
//! 4. hierarchy relationships
//! 5. back-fill of `SourceFile.relationshipCount`
//!
//! Any reference that cannot be resolved drops that one relationship and
//! nothing else.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::hierarchy::ProjectHierarchy;
use super::identity::{
    application_id, dependency_id, entity_id, external_module_id, local_import_id, normalize,
    package_id, project_id, relative_path, source_file_id,
};
use super::resolver::NameResolver;
use super::types::{
    AnalysisData, Confidence, GraphEntity, GraphId, GraphKind, GraphRelationship,
    RelationshipType,
};
use crate::analyzer::FileAnalysisResult;
use crate::parser::{CalleeKind, CodeEntity, EntityKind, ExportType, ScopeRef};

#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    /// Paths are made relative to this directory when they lie under it.
    pub root: Option<PathBuf>,
    /// Emit `Dependency` nodes and their edges.
    pub include_deps: bool,
}

/// Build the graph for one pipeline run.
pub fn to_graph(
    results: &[FileAnalysisResult],
    hierarchy: Option<&ProjectHierarchy>,
    options: &TransformOptions,
) -> AnalysisData {
    let root = options.root.as_deref();
    let mut nodes = Emitter::default();
    let mut relationships = Vec::new();

    // Pass 1
    let hierarchy_nodes = hierarchy.map(|h| add_hierarchy_nodes(&mut nodes, h, options.include_deps));

    // Pass 2
    let files: Vec<FileNodes<'_>> = results
        .iter()
        .map(|result| add_file_nodes(&mut nodes, result, root))
        .collect();

    // Pass 3
    let mut derived = Derived::default();
    {
        let resolver = NameResolver::new(&nodes.entities);
        for file in &files {
            derive_file_relationships(file, &resolver, &mut derived);
        }
    }
    relationships.append(&mut derived.relationships);
    for entity in derived.nodes.entities {
        nodes.push(entity);
    }

    // Pass 4
    if let (Some(hierarchy), Some(hierarchy_nodes)) = (hierarchy, hierarchy_nodes.as_ref()) {
        link_hierarchy(
            &nodes.entities,
            &files,
            hierarchy,
            hierarchy_nodes,
            options.include_deps,
            &mut relationships,
        );
    }

    // Pass 5
    let mut entities = nodes.entities;
    backfill_relationship_counts(&mut entities, &relationships);

    let data = AnalysisData {
        entities,
        relationships,
    };
    info!(
        files = results.len(),
        entities = data.entities.len(),
        relationships = data.relationships.len(),
        "graph transform complete"
    );
    data
}

/// Appends nodes, keeping only the first node for any id.
#[derive(Default)]
struct Emitter {
    entities: Vec<GraphEntity>,
    seen: HashSet<GraphId>,
}

impl Emitter {
    fn push(&mut self, entity: GraphEntity) -> bool {
        if !self.seen.insert(entity.id.clone()) {
            debug!(id = %entity.id, name = %entity.name, "duplicate graph id skipped");
            return false;
        }
        self.entities.push(entity);
        true
    }
}

struct HierarchyNodes {
    project: GraphId,
    applications: Vec<GraphId>,
    packages: Vec<GraphId>,
    dependencies: HashMap<String, GraphId>,
}

fn add_hierarchy_nodes(
    nodes: &mut Emitter,
    hierarchy: &ProjectHierarchy,
    include_deps: bool,
) -> HierarchyNodes {
    let info = &hierarchy.project_info;
    let project = project_id(&info.name);
    let mut node = GraphEntity::new(project.clone(), GraphKind::Project, &info.name);
    node.file_path = info.path.clone();
    node.text = info.description.clone().unwrap_or_default();
    nodes.push(node);

    let applications = hierarchy
        .applications
        .iter()
        .map(|app| {
            let id = application_id(&app.name, &app.path);
            let mut node = GraphEntity::new(id.clone(), GraphKind::Application, &app.name);
            node.file_path = app.path.clone();
            nodes.push(node);
            id
        })
        .collect();

    let packages = hierarchy
        .packages
        .iter()
        .map(|pkg| {
            let id = package_id(&pkg.name, &pkg.path);
            let mut node = GraphEntity::new(id.clone(), GraphKind::Package, &pkg.name);
            node.file_path = pkg.path.clone();
            node.version = pkg.version.clone();
            nodes.push(node);
            id
        })
        .collect();

    let mut dependencies = HashMap::new();
    if include_deps {
        for (name, version) in hierarchy.external_dependencies() {
            let id = dependency_id(name);
            let mut node = GraphEntity::new(id.clone(), GraphKind::Dependency, name);
            node.version = Some(version.to_string());
            nodes.push(node);
            dependencies.insert(name.to_string(), id);
        }
    }

    HierarchyNodes {
        project,
        applications,
        packages,
        dependencies,
    }
}

type DeclKey<'r> = (&'r str, GraphKind, usize);

/// Bridges the extractor's pass-local [`ScopeRef`]s to graph ids by
/// re-matching `(name, kind, line)` within one file.
struct ScopeBridge<'r> {
    scopes: HashMap<&'r ScopeRef, DeclKey<'r>>,
    emitted: HashMap<DeclKey<'r>, GraphId>,
}

impl<'r> ScopeBridge<'r> {
    fn new(entities: &'r [CodeEntity], ids: &[GraphId]) -> Self {
        let mut scopes = HashMap::with_capacity(entities.len());
        let mut emitted = HashMap::with_capacity(entities.len());
        for (entity, id) in entities.iter().zip(ids) {
            let key = (entity.name.as_str(), GraphKind::from(entity.kind), entity.line);
            scopes.insert(&entity.scope_id, key);
            emitted.entry(key).or_insert_with(|| id.clone());
        }
        Self { scopes, emitted }
    }

    fn resolve(&self, scope: &ScopeRef) -> Option<&GraphId> {
        self.scopes.get(scope).and_then(|key| self.emitted.get(key))
    }
}

/// Per-file bookkeeping carried from pass 2 into passes 3 and 4.
struct FileNodes<'r> {
    result: &'r FileAnalysisResult,
    rel_path: String,
    file_id: GraphId,
    /// Graph id of each declaration, aligned with `result.entities`.
    ids: Vec<GraphId>,
    /// Whether each declaration's node was kept, or lost to an earlier one
    /// with the same id.
    kept: Vec<bool>,
    bridge: ScopeBridge<'r>,
}

impl FileNodes<'_> {
    /// Declarations that own their graph node, with its id.
    fn declarations(&self) -> impl Iterator<Item = (&CodeEntity, &GraphId)> + '_ {
        self.result
            .entities
            .iter()
            .zip(&self.ids)
            .zip(&self.kept)
            .filter(|(_, kept)| **kept)
            .map(|(declaration, _)| declaration)
    }
}

fn add_file_nodes<'r>(
    nodes: &mut Emitter,
    result: &'r FileAnalysisResult,
    root: Option<&Path>,
) -> FileNodes<'r> {
    let rel_path = relative_path(&result.file_path, root);
    let mut ids = Vec::with_capacity(result.entities.len());
    let mut kept = Vec::with_capacity(result.entities.len());

    for entity in &result.entities {
        let kind = GraphKind::from(entity.kind);
        let id = entity_id(&rel_path, kind, &entity.name, entity.line);
        let mut node = GraphEntity::new(id.clone(), kind, &entity.name);
        node.text = entity
            .context
            .clone()
            .unwrap_or_else(|| entity.signature.clone());
        node.file_path = rel_path.clone();
        node.line = entity.line;
        node.column = entity.column;
        node.pos = entity.pos;
        node.end = entity.end;
        node.parent_scope_id = entity.parent_scope_id.clone();
        node.is_async = entity.is_async;
        node.is_exported = entity.is_exported;
        node.is_abstract = entity.is_abstract;
        node.module = entity.module.clone();
        kept.push(nodes.push(node));
        ids.push(id);
    }

    let file_id = source_file_id(&rel_path);
    let name = Path::new(&rel_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| rel_path.clone());
    let mut file_node = GraphEntity::new(file_id.clone(), GraphKind::SourceFile, name);
    file_node.text = rel_path.clone();
    file_node.file_path = rel_path.clone();
    file_node.extension = Path::new(&rel_path)
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned());
    file_node.entity_count = Some(result.entities.len());
    file_node.total_lines = Some(result.total_lines);
    file_node.relationship_count = Some(0);
    nodes.push(file_node);

    let bridge = ScopeBridge::new(&result.entities, &ids);
    FileNodes {
        result,
        rel_path,
        file_id,
        ids,
        kept,
        bridge,
    }
}

#[derive(Default)]
struct Derived {
    relationships: Vec<GraphRelationship>,
    nodes: Emitter,
    externals: HashMap<String, GraphId>,
    dropped: usize,
}

fn derive_file_relationships(file: &FileNodes<'_>, resolver: &NameResolver<'_>, out: &mut Derived) {
    let before = out.relationships.len();
    derive_calls(file, resolver, out);
    derive_exports(file, resolver, out);
    derive_containment(file, out);
    derive_imports(file, out);
    debug!(
        file = %file.rel_path,
        relationships = out.relationships.len() - before,
        dropped = out.dropped,
        "derived file relationships"
    );
}

fn derive_calls(file: &FileNodes<'_>, resolver: &NameResolver<'_>, out: &mut Derived) {
    for call in &file.result.call_expressions {
        let Some(caller) = call.containing_function.as_deref() else {
            continue;
        };
        let from = resolver.declaration_in_file(&file.rel_path, caller);
        let to = resolver.resolve(&file.rel_path, call.target_name());
        let (Some(from), Some(to)) = (from, to) else {
            out.dropped += 1;
            continue;
        };
        let evidence = match call.callee_kind {
            CalleeKind::Method => format!("method call `{}` at line {}", call.callee, call.line),
            CalleeKind::Function => format!("direct call `{}` at line {}", call.callee, call.line),
            CalleeKind::Dynamic => format!("dynamic call `{}` at line {}", call.callee, call.line),
        };
        let kind = match call.callee_kind {
            CalleeKind::Method => "method",
            CalleeKind::Function => "function",
            CalleeKind::Dynamic => "dynamic",
        };
        out.relationships.push(
            GraphRelationship::new(
                from.id.clone(),
                to.clone(),
                RelationshipType::Calls,
                evidence,
                Confidence::High,
            )
            .with_meta("line", call.line)
            .with_meta("argumentCount", call.argument_count)
            .with_meta("calleeKind", kind),
        );
    }
}

fn derive_exports(file: &FileNodes<'_>, resolver: &NameResolver<'_>, out: &mut Derived) {
    for (entity, id) in file.declarations() {
        match entity.kind {
            EntityKind::Export => {
                if entity.is_re_export
                    || matches!(
                        entity.export_type,
                        Some(ExportType::All) | Some(ExportType::Namespace)
                    )
                {
                    continue;
                }
                let Some(target) = resolver.declaration_in_file(&file.rel_path, &entity.name) else {
                    out.dropped += 1;
                    continue;
                };
                let shape = match entity.export_type {
                    Some(ExportType::Default) => "default",
                    Some(ExportType::Assignment) => "assignment",
                    _ => "named",
                };
                out.relationships.push(
                    GraphRelationship::new(
                        file.file_id.clone(),
                        target.id.clone(),
                        RelationshipType::Exports,
                        format!("export statement for `{}` at line {}", entity.name, entity.line),
                        Confidence::High,
                    )
                    .with_meta("exportType", shape),
                );
            }
            EntityKind::Import => {}
            _ if entity.is_exported => {
                let name = format!("export:{}", entity.name);
                let virtual_id = entity_id(&file.rel_path, GraphKind::Export, &name, entity.line);
                let mut node = GraphEntity::new(virtual_id.clone(), GraphKind::Export, name);
                node.text = entity.signature.clone();
                node.file_path = file.rel_path.clone();
                node.line = entity.line;
                node.column = entity.column;
                node.pos = entity.pos;
                node.end = entity.end;
                node.is_exported = true;
                out.nodes.push(node);
                out.relationships.push(
                    GraphRelationship::new(
                        id.clone(),
                        virtual_id,
                        RelationshipType::Exports,
                        format!("inline export of {} `{}`", entity.kind, entity.name),
                        Confidence::High,
                    )
                    .with_meta("exportType", "inline"),
                );
            }
            _ => {}
        }
    }
}

fn derive_containment(file: &FileNodes<'_>, out: &mut Derived) {
    for (entity, id) in file.declarations() {
        match &entity.parent_scope_id {
            Some(parent) => {
                let Some(parent_id) = file.bridge.resolve(parent) else {
                    out.dropped += 1;
                    continue;
                };
                out.relationships.push(GraphRelationship::new(
                    parent_id.clone(),
                    id.clone(),
                    RelationshipType::Contains,
                    format!("{} `{}` is nested in its enclosing scope", entity.kind, entity.name),
                    Confidence::High,
                ));
            }
            None => out.relationships.push(GraphRelationship::new(
                file.file_id.clone(),
                id.clone(),
                RelationshipType::Contains,
                format!("{} `{}` declared in {}", entity.kind, entity.name, file.rel_path),
                Confidence::High,
            )),
        }
    }
}

/// Module specifiers that name a file of this project rather than a package.
fn is_local_specifier(specifier: &str) -> bool {
    specifier.starts_with('.')
        || specifier.starts_with('/')
        || specifier.starts_with("crate::")
        || specifier.starts_with("self::")
        || specifier.starts_with("super::")
}

fn derive_imports(file: &FileNodes<'_>, out: &mut Derived) {
    for (entity, _) in file.declarations() {
        if entity.kind != EntityKind::Import {
            continue;
        }
        let specifier = entity.module.as_deref().unwrap_or(&entity.name);
        let evidence = format!("import of `{specifier}` at line {}", entity.line);
        if is_local_specifier(specifier) {
            out.relationships.push(
                GraphRelationship::new(
                    file.file_id.clone(),
                    local_import_id(specifier),
                    RelationshipType::Imports,
                    evidence,
                    Confidence::Medium,
                )
                .with_meta("specifier", specifier)
                .with_meta("fromFile", &file.rel_path),
            );
            continue;
        }

        let target = match out.externals.get(specifier) {
            Some(id) => id.clone(),
            None => {
                let id = external_module_id(specifier);
                let mut node = GraphEntity::new(id.clone(), GraphKind::ExternalModule, specifier);
                node.module = Some(specifier.to_string());
                out.nodes.push(node);
                out.externals.insert(specifier.to_string(), id.clone());
                id
            }
        };
        out.relationships.push(
            GraphRelationship::new(
                file.file_id.clone(),
                target,
                RelationshipType::Imports,
                evidence,
                Confidence::High,
            )
            .with_meta("specifier", specifier),
        );
    }
}

/// Package name a module specifier refers to: `@scope/pkg/sub` → `@scope/pkg`,
/// `lodash/fp` → `lodash`, `serde::de` → `serde`.
fn package_name(specifier: &str) -> &str {
    if let Some((head, _)) = specifier.split_once("::") {
        return head;
    }
    let mut slashes = specifier.match_indices('/').map(|(idx, _)| idx);
    let cut = if specifier.starts_with('@') {
        slashes.nth(1)
    } else {
        slashes.next()
    };
    match cut {
        Some(idx) => &specifier[..idx],
        None => specifier,
    }
}

fn link_hierarchy(
    entities: &[GraphEntity],
    files: &[FileNodes<'_>],
    hierarchy: &ProjectHierarchy,
    ids: &HierarchyNodes,
    include_deps: bool,
    out: &mut Vec<GraphRelationship>,
) {
    for (app, app_id) in hierarchy.applications.iter().zip(&ids.applications) {
        out.push(GraphRelationship::new(
            ids.project.clone(),
            app_id.clone(),
            RelationshipType::HasApplication,
            format!("application `{}` at {}", app.name, app.path),
            Confidence::High,
        ));
    }
    for (pkg, pkg_id) in hierarchy.packages.iter().zip(&ids.packages) {
        out.push(GraphRelationship::new(
            ids.project.clone(),
            pkg_id.clone(),
            RelationshipType::HasPackage,
            format!("package `{}` at {}", pkg.name, pkg.path),
            Confidence::High,
        ));
    }

    let file_ids: HashMap<&str, &GraphId> = files
        .iter()
        .map(|f| (f.rel_path.as_str(), &f.file_id))
        .collect();
    for (app, app_id) in hierarchy.applications.iter().zip(&ids.applications) {
        let package = app.package.as_deref().and_then(|name| hierarchy.package(name));
        for entry in &app.entry_points {
            let direct = normalize(Path::new(entry));
            let nested = normalize(&Path::new(&app.path).join(entry));
            let Some((path, file_id)) = file_ids
                .get_key_value(direct.as_str())
                .or_else(|| file_ids.get_key_value(nested.as_str()))
            else {
                debug!(application = %app.name, entry = %entry, "entry point has no source file");
                continue;
            };
            let tag = package
                .map(|p| p.entry_tag(path))
                .map_or("main", |tag| tag.as_str());
            out.push(
                GraphRelationship::new(
                    app_id.clone(),
                    (*file_id).clone(),
                    RelationshipType::HasEntrypoint,
                    format!("{tag} entry point {path} of `{}`", app.name),
                    Confidence::High,
                )
                .with_meta("tag", tag)
                .with_meta("entryPoint", entry),
            );
        }
    }

    if !include_deps {
        return;
    }
    for (pkg, pkg_id) in hierarchy.packages.iter().zip(&ids.packages) {
        for (name, version) in &pkg.dependencies {
            let Some(dep_id) = ids.dependencies.get(name) else {
                continue;
            };
            out.push(
                GraphRelationship::new(
                    pkg_id.clone(),
                    dep_id.clone(),
                    RelationshipType::DependsOn,
                    format!("`{}` declares dependency `{name}`", pkg.name),
                    Confidence::High,
                )
                .with_meta("version", version),
            );
        }
    }
    for entity in entities.iter().filter(|e| e.kind == GraphKind::Import) {
        let specifier = entity.module.as_deref().unwrap_or(&entity.name);
        if is_local_specifier(specifier) {
            continue;
        }
        let Some(dep_id) = ids.dependencies.get(package_name(specifier)) else {
            continue;
        };
        out.push(
            GraphRelationship::new(
                entity.id.clone(),
                dep_id.clone(),
                RelationshipType::Imports,
                format!("import of `{specifier}` resolves to a declared dependency"),
                Confidence::Medium,
            )
            .with_meta("usage", "dependency")
            .with_meta("specifier", specifier),
        );
    }
}

fn backfill_relationship_counts(entities: &mut [GraphEntity], relationships: &[GraphRelationship]) {
    let file_of: HashMap<&GraphId, &str> = entities
        .iter()
        .filter(|e| e.kind.is_file_scoped())
        .map(|e| (&e.id, e.file_path.as_str()))
        .collect();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for rel in relationships {
        let touched: BTreeSet<&str> = [&rel.from, &rel.to]
            .into_iter()
            .filter_map(|id| file_of.get(id).copied())
            .collect();
        for path in touched {
            *counts.entry(path.to_string()).or_default() += 1;
        }
    }

    for entity in entities.iter_mut().filter(|e| e.kind == GraphKind::SourceFile) {
        entity.relationship_count = Some(counts.get(&entity.file_path).copied().unwrap_or(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{analyze_source, AnalysisOptions};
    use crate::graph::hierarchy::{ApplicationInfo, PackageInfo, ProjectInfo};
    use std::collections::BTreeMap;

    fn analyze(path: &str, source: &str) -> FileAnalysisResult {
        let options = AnalysisOptions {
            calls: true,
            ..Default::default()
        };
        analyze_source(Path::new(path), source, &options)
    }

    fn rels(data: &AnalysisData, rel_type: RelationshipType) -> Vec<&GraphRelationship> {
        data.relationships
            .iter()
            .filter(|r| r.rel_type == rel_type)
            .collect()
    }

    fn find<'d>(data: &'d AnalysisData, kind: GraphKind, name: &str) -> &'d GraphEntity {
        data.entities
            .iter()
            .find(|e| e.kind == kind && e.name == name)
            .unwrap_or_else(|| panic!("no {kind} named {name}"))
    }

    #[test]
    fn test_cross_file_call() {
        let results = vec![
            analyze("a.ts", "function foo(){ bar(); }"),
            analyze("b.ts", "function bar(){}"),
        ];
        let data = to_graph(&results, None, &TransformOptions::default());

        let foo = find(&data, GraphKind::Function, "foo");
        let bar = find(&data, GraphKind::Function, "bar");
        let calls = rels(&data, RelationshipType::Calls);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].from, foo.id);
        assert_eq!(calls[0].to, bar.id);
        assert_eq!(calls[0].confidence, Confidence::High);
        assert!(calls[0].evidence.contains("direct call"));
    }

    #[test]
    fn test_ids_are_deterministic() {
        let source = "class Store {\n  load() { return fetch(); }\n}\nfunction fetch() {}\n";
        let first = to_graph(&[analyze("s.ts", source)], None, &TransformOptions::default());
        let second = to_graph(&[analyze("s.ts", source)], None, &TransformOptions::default());
        let ids = |d: &AnalysisData| d.entities.iter().map(|e| e.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        let edges = |d: &AnalysisData| {
            d.relationships
                .iter()
                .map(|r| (r.from.clone(), r.to.clone(), r.rel_type))
                .collect::<Vec<_>>()
        };
        assert_eq!(edges(&first), edges(&second));
    }

    #[test]
    fn test_source_file_node_and_containment() {
        let source = "class Store {\n  load() {}\n}\n";
        let data = to_graph(&[analyze("src/store.ts", source)], None, &TransformOptions::default());

        let file = find(&data, GraphKind::SourceFile, "store.ts");
        assert_eq!(file.id, source_file_id("src/store.ts"));
        assert_eq!(file.entity_count, Some(2));
        assert_eq!(file.total_lines, Some(4));
        assert_eq!(file.extension.as_deref(), Some("ts"));

        let class = find(&data, GraphKind::Class, "Store");
        let method = find(&data, GraphKind::Function, "load");
        let contains = rels(&data, RelationshipType::Contains);
        assert_eq!(contains.len(), 2);
        assert!(contains.iter().any(|r| r.from == file.id && r.to == class.id));
        assert!(contains.iter().any(|r| r.from == class.id && r.to == method.id));
        assert_eq!(file.relationship_count, Some(2));
    }

    #[test]
    fn test_exports() {
        let source = "export function api() {}\nfunction local() {}\nexport { local };\nexport * from './other';\n";
        let data = to_graph(&[analyze("m.ts", source)], None, &TransformOptions::default());

        let file = find(&data, GraphKind::SourceFile, "m.ts");
        let api = find(&data, GraphKind::Function, "api");
        let local = find(&data, GraphKind::Function, "local");
        let virtual_node = find(&data, GraphKind::Export, "export:api");

        let exports = rels(&data, RelationshipType::Exports);
        assert_eq!(exports.len(), 2);
        assert!(exports.iter().any(|r| r.from == api.id && r.to == virtual_node.id));
        assert!(exports.iter().any(|r| r.from == file.id && r.to == local.id));
    }

    #[test]
    fn test_duplicate_declarations_get_one_node_and_one_edge_each() {
        let source = "export function dup() {} export function dup() {}\n";
        let data = to_graph(&[analyze("d.ts", source)], None, &TransformOptions::default());

        let dups: Vec<_> = data
            .entities
            .iter()
            .filter(|e| e.kind == GraphKind::Function && e.name == "dup")
            .collect();
        assert_eq!(dups.len(), 1);
        let markers = data
            .entities
            .iter()
            .filter(|e| e.kind == GraphKind::Export && e.name == "export:dup")
            .count();
        assert_eq!(markers, 1);

        assert_eq!(rels(&data, RelationshipType::Contains).len(), 1);
        assert_eq!(rels(&data, RelationshipType::Exports).len(), 1);
        let pairs: HashSet<_> = data
            .relationships
            .iter()
            .map(|r| (r.from.clone(), r.to.clone(), r.rel_type))
            .collect();
        assert_eq!(pairs.len(), data.relationships.len());
        assert_eq!(find(&data, GraphKind::SourceFile, "d.ts").relationship_count, Some(2));
    }

    #[test]
    fn test_imports() {
        let results = vec![
            analyze("a.ts", "import { x } from './util';\nimport React from 'react';\n"),
            analyze("b.ts", "import { useState } from 'react';\n"),
        ];
        let data = to_graph(&results, None, &TransformOptions::default());

        let externals: Vec<_> = data
            .entities
            .iter()
            .filter(|e| e.kind == GraphKind::ExternalModule)
            .collect();
        assert_eq!(externals.len(), 1);
        assert_eq!(externals[0].name, "react");

        let imports = rels(&data, RelationshipType::Imports);
        assert_eq!(imports.len(), 3);
        assert!(imports
            .iter()
            .any(|r| r.to.as_str() == "local_import___util"));
        assert_eq!(
            imports.iter().filter(|r| r.to == externals[0].id).count(),
            2
        );
    }

    #[test]
    fn test_unresolved_references_are_dropped() {
        let data = to_graph(
            &[analyze("a.ts", "function foo() { missing(); obj[key](); }\nmissing2();\n")],
            None,
            &TransformOptions::default(),
        );
        assert!(rels(&data, RelationshipType::Calls).is_empty());
        assert_eq!(rels(&data, RelationshipType::Contains).len(), 1);
    }

    #[test]
    fn test_root_relative_paths() {
        let options = TransformOptions {
            root: Some(PathBuf::from("/repo")),
            include_deps: false,
        };
        let data = to_graph(&[analyze("/repo/src/a.rs", "fn main() {}")], None, &options);
        let main = find(&data, GraphKind::Function, "main");
        assert_eq!(main.file_path, "src/a.rs");
        assert_eq!(main.id, entity_id("src/a.rs", GraphKind::Function, "main", 1));
    }

    fn hierarchy() -> ProjectHierarchy {
        ProjectHierarchy {
            project_info: ProjectInfo {
                name: "shop".into(),
                path: ".".into(),
                description: None,
            },
            packages: vec![PackageInfo {
                name: "web".into(),
                version: Some("1.0.0".into()),
                path: "web".into(),
                main: Some("src/index.ts".into()),
                types: Some("src/types.ts".into()),
                bin: None,
                dependencies: BTreeMap::from([
                    ("react".to_string(), "^18".to_string()),
                    ("web".to_string(), "1.0.0".to_string()),
                ]),
            }],
            applications: vec![ApplicationInfo {
                name: "web-app".into(),
                path: "web".into(),
                package: Some("web".into()),
                entry_points: vec!["src/index.ts".into(), "web/src/types.ts".into()],
            }],
        }
    }

    #[test]
    fn test_hierarchy_passes() {
        let results = vec![
            analyze("web/src/index.ts", "import { createRoot } from 'react-dom';\nimport React from 'react';\n"),
            analyze("web/src/types.ts", "export type Props = {};\n"),
        ];
        let options = TransformOptions {
            root: None,
            include_deps: true,
        };
        let data = to_graph(&results, Some(&hierarchy()), &options);

        assert_eq!(data.entities[0].kind, GraphKind::Project);
        let app = find(&data, GraphKind::Application, "web-app");
        let pkg = find(&data, GraphKind::Package, "web");
        assert_eq!(pkg.version.as_deref(), Some("1.0.0"));
        let dep = find(&data, GraphKind::Dependency, "react");
        assert!(data
            .entities
            .iter()
            .all(|e| !(e.kind == GraphKind::Dependency && e.name == "web")));

        assert_eq!(rels(&data, RelationshipType::HasApplication).len(), 1);
        assert_eq!(rels(&data, RelationshipType::HasPackage).len(), 1);

        let entries = rels(&data, RelationshipType::HasEntrypoint);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|r| r.from == app.id));
        let tags: Vec<_> = entries.iter().map(|r| r.metadata["tag"].as_str()).collect();
        assert_eq!(tags, vec!["main", "types"]);

        let depends = rels(&data, RelationshipType::DependsOn);
        assert_eq!(depends.len(), 1);
        assert_eq!(depends[0].from, pkg.id);
        assert_eq!(depends[0].to, dep.id);

        let usage: Vec<_> = rels(&data, RelationshipType::Imports)
            .into_iter()
            .filter(|r| r.metadata.get("usage").map(String::as_str) == Some("dependency"))
            .collect();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].to, dep.id);
        assert_eq!(usage[0].confidence, Confidence::Medium);
    }

    #[test]
    fn test_relationship_counts_include_hierarchy_edges() {
        let results = vec![analyze("web/src/index.ts", "function boot() {}\n")];
        let data = to_graph(&results, Some(&hierarchy()), &TransformOptions::default());
        let file = find(&data, GraphKind::SourceFile, "index.ts");
        // CONTAINS boot + HAS_ENTRYPOINT
        assert_eq!(file.relationship_count, Some(2));
    }

    #[test]
    fn test_package_name() {
        assert_eq!(package_name("@scope/pkg/sub"), "@scope/pkg");
        assert_eq!(package_name("lodash/fp"), "lodash");
        assert_eq!(package_name("react"), "react");
        assert_eq!(package_name("serde::de::Visitor"), "serde");
    }
}
