use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion activity over the process lifetime.
#[derive(Default)]
pub struct IngestMetrics {
    files_processed: AtomicU64,
    files_skipped: AtomicU64,
    files_failed: AtomicU64,
    chunks_ingested: AtomicU64,
    chunks_deduplicated: AtomicU64,
    chunks_orphaned: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fully ingested file and its chunk-level counts.
    pub fn record_file(&self, ingested: u64, deduplicated: u64, orphaned: u64) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.chunks_ingested.fetch_add(ingested, Ordering::Relaxed);
        self.chunks_deduplicated
            .fetch_add(deduplicated, Ordering::Relaxed);
        self.chunks_orphaned.fetch_add(orphaned, Ordering::Relaxed);
    }

    /// Record a file skipped because its ledger revision was current.
    pub fn record_skip(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a file whose ingestion failed this pass.
    pub fn record_failure(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_processed: self.files_processed.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            chunks_ingested: self.chunks_ingested.load(Ordering::Relaxed),
            chunks_deduplicated: self.chunks_deduplicated.load(Ordering::Relaxed),
            chunks_orphaned: self.chunks_orphaned.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of ingestion counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Files fully ingested since startup.
    pub files_processed: u64,
    /// Files skipped as unchanged since startup.
    pub files_skipped: u64,
    /// Files whose ingestion failed since startup.
    pub files_failed: u64,
    /// New chunks written to the vector index.
    pub chunks_ingested: u64,
    /// Chunks skipped because their fingerprint was already stored.
    pub chunks_deduplicated: u64,
    /// Stale chunks removed after their owning file changed.
    pub chunks_orphaned: u64,
}
