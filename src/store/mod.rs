//! Vector index capability interface and Qdrant implementation.

pub mod payload;
pub mod qdrant;
pub mod types;

pub use qdrant::QdrantIndex;
pub use types::{EmbeddedChunk, ScoredChunk, StoreError};

use std::collections::BTreeSet;

use async_trait::async_trait;

/// Capability interface the orchestrator requires from a vector store.
///
/// Any implementation satisfying these operations is interchangeable; the
/// pipeline never assumes a particular backend. Upserts must be idempotent
/// per fingerprint, and upsert/delete must be safe under concurrent calls
/// for different owning files.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Prepare backing storage for writes. Idempotent.
    async fn ensure_ready(&self) -> Result<(), StoreError>;

    /// Return the subset of `fingerprints` already present in the index.
    async fn existing_fingerprints(
        &self,
        fingerprints: &[String],
    ) -> Result<BTreeSet<String>, StoreError>;

    /// Store embedded chunks keyed by fingerprint. Re-upserting an existing
    /// fingerprint overwrites in place; it never duplicates. Returns the
    /// number of points written.
    async fn upsert(&self, chunks: Vec<EmbeddedChunk>) -> Result<usize, StoreError>;

    /// Remove chunks owned by `file_id` whose fingerprint is not in `keep`.
    /// Returns the number of points removed.
    async fn delete_by_owner(
        &self,
        file_id: &str,
        keep: &BTreeSet<String>,
    ) -> Result<usize, StoreError>;

    /// Similarity query over stored chunks for the retrieval path.
    async fn query(&self, vector: Vec<f32>, limit: usize)
    -> Result<Vec<ScoredChunk>, StoreError>;
}
