//! # Graphloom
//!
//! Static analysis of a source tree into an entity/relationship graph, and
//! delivery of that graph to an external graph engine.
//!
//! ## Pipeline
//!
//! - **Extractors** ([`parser`]): per-file entities, call sites and types
//! - **Analyzer** ([`analyzer`]): one result per readable file
//! - **Transformer** ([`graph`]): deterministic ids, cross-file edges,
//!   project roll-up
//! - **Ingestion** ([`ingest`]): handshake, then file, stream or bulk
//!   transfer to the engine process
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graphloom::{build_analysis, AnalysisOptions, TransformOptions};
//! use std::path::PathBuf;
//!
//! let files = vec![PathBuf::from("src/index.ts")];
//! let options = AnalysisOptions { calls: true, ..Default::default() };
//! let data = build_analysis(&files, None, &options, &TransformOptions::default());
//! println!("{}", data.summary());
//! ```

pub mod analyzer;
pub mod config;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod parser;

use std::path::Path;

pub use analyzer::{analyze_files, collect_source_files, total_lines, AnalysisOptions, FileAnalysisResult};
pub use config::GraphloomConfig;
pub use error::{GraphloomError, Result};
pub use graph::{
    to_graph, AnalysisData, GraphEntity, GraphId, GraphKind, GraphRelationship, ProjectHierarchy,
    RelationshipType, TransformOptions,
};
pub use ingest::{IngestClient, IngestError, IngestMode, IngestSettings, IngestStats};
pub use parser::{extract_file, Dialect, ExtractOptions, Extraction};

/// Analyze `paths` and transform the results into one graph.
///
/// `options.include_deps` overrides the flag in `transform`.
pub fn build_analysis<P: AsRef<Path> + Sync>(
    paths: &[P],
    hierarchy: Option<&ProjectHierarchy>,
    options: &AnalysisOptions,
    transform: &TransformOptions,
) -> AnalysisData {
    let results = analyze_files(paths, options);
    let transform = TransformOptions {
        include_deps: options.include_deps || transform.include_deps,
        ..transform.clone()
    };
    to_graph(&results, hierarchy, &transform)
}
