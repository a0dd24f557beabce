//! Crate-wide error type.

use std::path::PathBuf;
use thiserror::Error;

use crate::ingest::IngestError;

pub type Result<T> = std::result::Result<T, GraphloomError>;

#[derive(Error, Debug)]
pub enum GraphloomError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    Ingest(#[from] IngestError),
}
