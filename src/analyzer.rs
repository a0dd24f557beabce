//! File analyzer. Reads each input file, dispatches it to its extractor,
//! and assembles one result per readable file.
//!
//! Files are independent, so extraction runs in parallel; output order still
//! follows input order.

use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::parser::{
    extract_file, CallExpression, CodeEntity, ExtractOptions, TypeInformation,
};

/// Everything extracted from one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnalysisResult {
    pub file_path: PathBuf,
    pub entities: Vec<CodeEntity>,
    pub call_expressions: Vec<CallExpression>,
    pub type_info: TypeInformation,
    pub total_lines: usize,
}

/// Option bag accepted at the analysis boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisOptions {
    pub calls: bool,
    pub types: bool,
    pub context: Option<usize>,
    pub include_deps: bool,
}

impl AnalysisOptions {
    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            calls: self.calls,
            types: self.types,
            context: self.context,
        }
    }
}

/// Line count as `content.split('\n')` sees it: an empty file has one line.
pub fn total_lines(content: &str) -> usize {
    content.split('\n').count()
}

/// Analyze `content` as if read from `path`.
pub fn analyze_source(path: &Path, content: &str, options: &AnalysisOptions) -> FileAnalysisResult {
    let extraction = extract_file(path, content, &options.extract_options());
    FileAnalysisResult {
        file_path: path.to_path_buf(),
        entities: extraction.entities,
        call_expressions: extraction.call_expressions,
        type_info: extraction.type_info,
        total_lines: total_lines(content),
    }
}

/// Analyze every path. Unreadable files are skipped with a warning; every
/// other file produces a result, even with zero entities. Invalid UTF-8 is
/// replaced, not rejected.
pub fn analyze_files<P: AsRef<Path> + Sync>(
    paths: &[P],
    options: &AnalysisOptions,
) -> Vec<FileAnalysisResult> {
    let results: Vec<FileAnalysisResult> = paths
        .par_iter()
        .filter_map(|path| {
            let path = path.as_ref();
            match fs::read(path) {
                Ok(bytes) => {
                    let content = String::from_utf8_lossy(&bytes);
                    let result = analyze_source(path, &content, options);
                    debug!(
                        file = %path.display(),
                        entities = result.entities.len(),
                        calls = result.call_expressions.len(),
                        "analyzed file"
                    );
                    Some(result)
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unreadable file");
                    None
                }
            }
        })
        .collect();

    info!(
        requested = paths.len(),
        analyzed = results.len(),
        "analysis pass complete"
    );
    results
}

/// All files under `root`, honoring `.gitignore`, sorted by path.
pub fn collect_source_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}
