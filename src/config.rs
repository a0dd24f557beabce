//! Project configuration, read from `.graphloom/config.toml`.
//!
//! Precedence, highest first: CLI flags, environment, config file, defaults.
//! A missing file means defaults; a malformed one is logged and ignored.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::analyzer::AnalysisOptions;
use crate::error::{GraphloomError, Result};
use crate::ingest::{IngestMode, IngestSettings, DEFAULT_BATCH_SIZE};

pub const CONFIG_DIR: &str = ".graphloom";
pub const CONFIG_FILE: &str = "config.toml";
pub const ENV_ENGINE_BIN: &str = "GRAPHLOOM_ENGINE_BIN";
pub const ENV_DB_PATH: &str = "GRAPHLOOM_DB_PATH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphloomConfig {
    pub engine: EngineConfig,
    pub ingest: IngestConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Graph engine executable. Required for ingest and query.
    pub binary: Option<PathBuf>,
    /// Leading arguments passed before each engine command.
    pub args: Vec<String>,
    /// Database path; relative paths resolve against the project root.
    pub db_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: None,
            args: Vec::new(),
            db_path: PathBuf::from(CONFIG_DIR).join("graph.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub mode: IngestMode,
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            mode: IngestMode::Auto,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub calls: bool,
    pub types: bool,
    pub context: Option<usize>,
    pub include_deps: bool,
}

impl AnalysisConfig {
    pub fn options(&self) -> AnalysisOptions {
        AnalysisOptions {
            calls: self.calls,
            types: self.types,
            context: self.context,
            include_deps: self.include_deps,
        }
    }
}

impl GraphloomConfig {
    /// Load `<root>/.graphloom/config.toml`, then apply environment overrides.
    pub fn load(root: &Path) -> Self {
        let mut config = Self::load_file(&root.join(CONFIG_DIR).join(CONFIG_FILE));
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load a config file. Missing → defaults; malformed → warning + defaults.
    pub fn load_file(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Self::default();
            }
        };
        match Self::from_toml(&content, path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "ignoring malformed config");
                Self::default()
            }
        }
    }

    pub fn from_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| GraphloomError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Apply `GRAPHLOOM_*` overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bin) = lookup(ENV_ENGINE_BIN).filter(|v| !v.is_empty()) {
            self.engine.binary = Some(PathBuf::from(bin));
        }
        if let Some(db) = lookup(ENV_DB_PATH).filter(|v| !v.is_empty()) {
            self.engine.db_path = PathBuf::from(db);
        }
    }

    pub fn resolve_db_path(&self, root: &Path) -> PathBuf {
        if self.engine.db_path.is_absolute() {
            self.engine.db_path.clone()
        } else {
            root.join(&self.engine.db_path)
        }
    }

    /// Client settings for this project. Fails when no engine is configured.
    pub fn ingest_settings(&self, root: &Path) -> Result<IngestSettings> {
        let binary = self.engine.binary.clone().ok_or_else(|| GraphloomError::Config {
            path: root.join(CONFIG_DIR).join(CONFIG_FILE),
            message: format!("no graph engine configured; set [engine] binary or {ENV_ENGINE_BIN}"),
        })?;
        Ok(IngestSettings::new(binary, self.resolve_db_path(root))
            .with_args(self.engine.args.iter().cloned())
            .with_batch_size(self.ingest.batch_size))
    }
}
