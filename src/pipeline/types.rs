//! Core data types and error definitions for the ingestion pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::pipeline::chunking::ChunkPolicy;
use crate::source::SourceError;
use crate::store::StoreError;

/// Errors fatal to a whole ingestion pass.
///
/// Everything file-scoped is isolated into the run summary instead; only
/// listing, ledger, and store-bootstrap failures abort the pass.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Remote collection could not be enumerated.
    #[error("failed to list remote collection: {0}")]
    Listing(#[source] SourceError),
    /// Ledger could not be locked or persisted.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Vector store could not be prepared for writes.
    #[error("vector store is unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Error category attached to a failed file in the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileErrorKind {
    /// Download of the file's bytes failed.
    Fetch,
    /// Text extraction failed or produced no characters.
    Extraction,
    /// Embedding failed after the bounded retry attempts.
    Embedding,
    /// Vector store write/delete or ledger update failed.
    Store,
}

/// One failed file as reported in the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    /// Identifier of the failed file.
    pub file_id: String,
    /// Display name of the failed file.
    pub file_name: String,
    /// Failure category.
    pub kind: FileErrorKind,
    /// Human-readable diagnostic.
    pub message: String,
}

/// Structured outcome of one ingestion pass.
///
/// Success is never claimed for a file whose ledger entry was not updated:
/// a file is counted in `files_processed` only after its chunks are in the
/// store and its revision is durably recorded.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Identifier of this pass, for log correlation.
    pub run_id: String,
    /// Files visible in the remote collection listing.
    pub files_scanned: usize,
    /// Files skipped because their revision matched the ledger.
    pub files_skipped: usize,
    /// Files fully ingested and ledgered this pass.
    pub files_processed: usize,
    /// New chunks written to the vector store.
    pub chunks_ingested: usize,
    /// Chunks skipped because their fingerprint was already stored.
    pub chunks_deduplicated: usize,
    /// Stale chunks removed after their owning file changed.
    pub chunks_orphaned: usize,
    /// Per-file failures, each isolated from the rest of the pass.
    pub failures: Vec<FileFailure>,
}

impl RunSummary {
    pub(crate) fn new(run_id: String) -> Self {
        Self {
            run_id,
            files_scanned: 0,
            files_skipped: 0,
            files_processed: 0,
            chunks_ingested: 0,
            chunks_deduplicated: 0,
            chunks_orphaned: 0,
            failures: Vec::new(),
        }
    }
}

/// Chunk-level counts for one successfully ingested file.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct IngestStats {
    pub(crate) ingested: usize,
    pub(crate) deduplicated: usize,
    pub(crate) orphaned: usize,
}

/// Result of processing one candidate file.
pub(crate) enum FileOutcome {
    Ingested(IngestStats),
    Failed(FileFailure),
}

/// Tuning knobs for one ingestion pass.
#[derive(Debug, Clone)]
pub struct IngestionOptions {
    /// Identifier of the remote collection to mirror.
    pub collection_id: String,
    /// Chunk window and overlap applied to every document.
    pub chunk: ChunkPolicy,
    /// Per-call bound on extraction and embedding, distinct from retries.
    pub call_timeout: Duration,
    /// Upper bound on embedding attempts per file.
    pub max_retries: usize,
    /// Number of files processed concurrently.
    pub concurrency: usize,
}

/// Cooperative cancellation flag checked between files.
///
/// Requesting cancellation lets in-flight files finish (their ledger entries
/// are valid) while undispatched files wait for the next pass.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a flag with cancellation not requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the running pass.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
