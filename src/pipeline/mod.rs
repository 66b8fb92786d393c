//! Ingestion orchestration: chunking, dedup, and per-file control flow.
//!
//! The skip-unchanged ledger check and the fingerprint-based store check are
//! two independent layers: the first is a fast path that avoids downloads,
//! the second is the correctness guard. A stale-triggered reprocess of
//! unchanged content still results in zero duplicate writes.

pub mod chunking;
mod service;
pub mod types;

pub use chunking::{Chunk, ChunkPolicy, ChunkingError};
pub use service::IngestionPipeline;
pub use types::{
    CancelFlag, FileErrorKind, FileFailure, IngestionOptions, PipelineError, RunSummary,
};
