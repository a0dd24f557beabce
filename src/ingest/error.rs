//! Ingestion failures.
//!
//! Each way the engine can fail keeps its own variant so callers can tell a
//! missing binary from a crashed one from a refused payload.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// The engine process could not be started.
    #[error("failed to spawn graph engine `{binary}`: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine ran and exited unsuccessfully.
    #[error("graph engine exited with {}: {stderr}", code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")))]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// Exit was clean but no structured reply of the expected type appeared.
    #[error("no `{expected}` reply in graph engine output: {raw}")]
    ProtocolParse { expected: String, raw: String },

    /// The engine answered with `success: false`.
    #[error("graph engine reported failure: {}", errors.join("; "))]
    Remote { errors: Vec<String> },

    #[error("Rust tool not ready or invalid handshake response")]
    NotReady,

    #[error("invalid client state: expected {expected}, found {found}")]
    InvalidState { expected: &'static str, found: String },

    #[error("ingestion cancelled")]
    Cancelled,

    #[error("I/O error talking to graph engine: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
