//! Ingestion protocol client.
//!
//! Ships an [`AnalysisData`](crate::graph::AnalysisData) payload to the
//! external graph engine over its standard streams, in one of three modes.

pub mod client;
pub mod error;
pub mod frame;
pub mod protocol;

pub use client::{ClientState, IngestClient, IngestMode, IngestSettings, DEFAULT_BATCH_SIZE};
pub use error::{IngestError, IngestResult};
pub use frame::{FrameStats, FrameWriter};
pub use protocol::{csv_escape, csv_unescape, HandshakeAck, IngestStats, QueryRow};
