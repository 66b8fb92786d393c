//! Ingestion orchestrator: one pass over the remote collection.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use crate::embedding::EmbeddingClient;
use crate::extract::TextExtractor;
use crate::ledger::IngestionLedger;
use crate::metrics::{IngestMetrics, MetricsSnapshot};
use crate::pipeline::chunking::Chunk;
use crate::pipeline::types::{
    CancelFlag, FileErrorKind, FileFailure, FileOutcome, IngestStats, IngestionOptions,
    PipelineError, RunSummary,
};
use crate::source::{FileSource, RemoteFile};
use crate::store::{EmbeddedChunk, VectorIndex};

/// Drives ingestion passes: listing, change detection, extraction, chunking,
/// embedding, deduplicated writes, and ledger updates.
///
/// The pipeline owns long-lived handles to its collaborators and shares them
/// across per-file tasks. Construct it once near process start.
pub struct IngestionPipeline {
    source: Arc<dyn FileSource>,
    worker: FileWorker,
    ledger: Arc<IngestionLedger>,
    options: IngestionOptions,
    metrics: Arc<IngestMetrics>,
}

/// Shared collaborator handles cloned into each per-file task.
struct FileWorker {
    source: Arc<dyn FileSource>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    ledger: Arc<IngestionLedger>,
    metrics: Arc<IngestMetrics>,
    options: IngestionOptions,
}

impl Clone for FileWorker {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            extractor: Arc::clone(&self.extractor),
            embedder: Arc::clone(&self.embedder),
            index: Arc::clone(&self.index),
            ledger: Arc::clone(&self.ledger),
            metrics: Arc::clone(&self.metrics),
            options: self.options.clone(),
        }
    }
}

impl IngestionPipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        source: Arc<dyn FileSource>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        ledger: Arc<IngestionLedger>,
        options: IngestionOptions,
    ) -> Self {
        let metrics = Arc::new(IngestMetrics::new());
        let worker = FileWorker {
            source: Arc::clone(&source),
            extractor,
            embedder,
            index,
            ledger: Arc::clone(&ledger),
            metrics: Arc::clone(&metrics),
            options: options.clone(),
        };

        Self {
            source,
            worker,
            ledger,
            options,
            metrics,
        }
    }

    /// Return the current process-lifetime metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Run one ingestion pass, converging the vector store to the current
    /// state of the remote collection.
    ///
    /// Holds the ledger's run lock for the duration; a concurrent pass fails
    /// fast. Individual file failures are isolated into the summary; only
    /// listing, ledger, and store-bootstrap errors abort the pass.
    pub async fn run(&self, cancel: &CancelFlag) -> Result<RunSummary, PipelineError> {
        let _lock = self.ledger.lock()?;
        self.worker.index.ensure_ready().await?;

        let listed = self
            .source
            .list(&self.options.collection_id)
            .await
            .map_err(PipelineError::Listing)?;
        let files = dedupe_by_id(listed);

        let run_id = Uuid::new_v4().to_string();
        let mut summary = RunSummary::new(run_id.clone());
        summary.files_scanned = files.len();
        tracing::info!(
            run_id = %run_id,
            collection = %self.options.collection_id,
            files = files.len(),
            "Starting ingestion pass"
        );

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut tasks: JoinSet<FileOutcome> = JoinSet::new();

        for file in files {
            if cancel.is_requested() {
                tracing::warn!(
                    run_id = %run_id,
                    "Cancellation requested; remaining files are left for the next pass"
                );
                break;
            }

            if self.ledger.revision(&file.id).await.as_deref() == Some(file.revision()) {
                tracing::debug!(file = %file.name, "Unchanged since last pass; skipping");
                summary.files_skipped += 1;
                self.metrics.record_skip();
                continue;
            }

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let worker = self.worker.clone();
            tasks.spawn(async move {
                let _permit = permit;
                worker.process(file).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(FileOutcome::Ingested(stats)) => {
                    summary.files_processed += 1;
                    summary.chunks_ingested += stats.ingested;
                    summary.chunks_deduplicated += stats.deduplicated;
                    summary.chunks_orphaned += stats.orphaned;
                }
                Ok(FileOutcome::Failed(failure)) => {
                    self.metrics.record_failure();
                    summary.failures.push(failure);
                }
                Err(join_err) => {
                    tracing::error!(run_id = %run_id, error = %join_err, "File task aborted");
                }
            }
        }

        tracing::info!(
            run_id = %run_id,
            scanned = summary.files_scanned,
            skipped = summary.files_skipped,
            processed = summary.files_processed,
            ingested = summary.chunks_ingested,
            deduplicated = summary.chunks_deduplicated,
            orphaned = summary.chunks_orphaned,
            failed = summary.failures.len(),
            "Ingestion pass complete"
        );

        Ok(summary)
    }
}

impl FileWorker {
    async fn process(&self, file: RemoteFile) -> FileOutcome {
        match self.ingest(&file).await {
            Ok(stats) => FileOutcome::Ingested(stats),
            Err(failure) => {
                tracing::warn!(
                    file = %failure.file_name,
                    kind = ?failure.kind,
                    error = %failure.message,
                    "File ingestion failed; ledger untouched"
                );
                FileOutcome::Failed(failure)
            }
        }
    }

    /// Ingest one candidate file. Any error leaves the ledger untouched so
    /// the file is retried on the next pass.
    async fn ingest(&self, file: &RemoteFile) -> Result<IngestStats, FileFailure> {
        let bytes = self
            .source
            .fetch(&file.id)
            .await
            .map_err(|err| self.failure(file, FileErrorKind::Fetch, err.to_string()))?;
        tracing::debug!(file = %file.name, bytes = bytes.len(), "Fetched file");

        let document = match timeout(
            self.options.call_timeout,
            self.extractor.extract(file, bytes),
        )
        .await
        {
            Ok(Ok(document)) => document,
            Ok(Err(err)) => {
                return Err(self.failure(file, FileErrorKind::Extraction, err.to_string()));
            }
            Err(_) => {
                return Err(self.failure(
                    file,
                    FileErrorKind::Extraction,
                    format!("timed out after {:?}", self.options.call_timeout),
                ));
            }
        };

        let chunks = self.options.chunk.split(&file.id, &document.text);
        if chunks.is_empty() {
            return Err(self.failure(
                file,
                FileErrorKind::Extraction,
                "document produced no ingestible text".to_string(),
            ));
        }

        let fingerprints: Vec<String> = chunks.iter().map(Chunk::fingerprint).collect();
        let existing = self
            .index
            .existing_fingerprints(&fingerprints)
            .await
            .map_err(|err| self.failure(file, FileErrorKind::Store, err.to_string()))?;

        // Only fingerprints absent from the store get embedded and written;
        // a metadata-only touch results in zero new work here.
        let pending: Vec<(Chunk, String)> = chunks
            .into_iter()
            .zip(fingerprints.iter().cloned())
            .filter(|(_, fingerprint)| !existing.contains(fingerprint))
            .collect();
        let deduplicated = fingerprints.len() - pending.len();

        let ingested = if pending.is_empty() {
            0
        } else {
            let texts: Vec<String> = pending.iter().map(|(chunk, _)| chunk.text.clone()).collect();
            let vectors = self
                .embed_with_retry(&file.name, &texts)
                .await
                .map_err(|message| self.failure(file, FileErrorKind::Embedding, message))?;

            debug_assert_eq!(vectors.len(), pending.len());
            let embedded: Vec<EmbeddedChunk> = pending
                .into_iter()
                .zip(vectors)
                .map(|((chunk, fingerprint), vector)| EmbeddedChunk {
                    chunk,
                    vector,
                    fingerprint,
                    file_name: file.name.clone(),
                })
                .collect();

            self.index
                .upsert(embedded)
                .await
                .map_err(|err| self.failure(file, FileErrorKind::Store, err.to_string()))?
        };

        // Write-before-delete: the fresh generation is durable before any
        // stale chunk from a prior version of this file is removed.
        let keep: BTreeSet<String> = fingerprints.into_iter().collect();
        let orphaned = self
            .index
            .delete_by_owner(&file.id, &keep)
            .await
            .map_err(|err| self.failure(file, FileErrorKind::Store, err.to_string()))?;

        // Ledger last: a crash before this point leaves the file eligible
        // for retry instead of falsely marked complete.
        self.ledger
            .record(&file.id, file.revision())
            .await
            .map_err(|err| self.failure(file, FileErrorKind::Store, err.to_string()))?;

        let stats = IngestStats {
            ingested,
            deduplicated,
            orphaned,
        };
        self.metrics
            .record_file(ingested as u64, deduplicated as u64, orphaned as u64);
        tracing::info!(
            file = %file.name,
            ingested,
            deduplicated,
            orphaned,
            "File ingested"
        );
        Ok(stats)
    }

    /// Embed with a bounded number of attempts and exponential backoff.
    /// Timeouts count as failed attempts.
    async fn embed_with_retry(
        &self,
        file_name: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, String> {
        let attempts = self.options.max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = timeout(self.options.call_timeout, self.embedder.embed(texts)).await;
            let message = match outcome {
                Ok(Ok(vectors)) => return Ok(vectors),
                Ok(Err(err)) => err.to_string(),
                Err(_) => format!("timed out after {:?}", self.options.call_timeout),
            };

            if attempt >= attempts {
                return Err(format!("{message} (after {attempt} attempts)"));
            }
            let delay = retry_backoff(attempt);
            tracing::warn!(
                file = file_name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "Embedding attempt failed; backing off"
            );
            sleep(delay).await;
        }
    }

    fn failure(&self, file: &RemoteFile, kind: FileErrorKind, message: String) -> FileFailure {
        FileFailure {
            file_id: file.id.clone(),
            file_name: file.name.clone(),
            kind,
            message,
        }
    }
}

/// Drop repeated listings of the same file id, keeping the first, so no two
/// tasks ever process one file concurrently within a pass.
fn dedupe_by_id(files: Vec<RemoteFile>) -> Vec<RemoteFile> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(files.len());
    for file in files {
        if seen.insert(file.id.clone()) {
            unique.push(file);
        } else {
            tracing::warn!(file = %file.name, id = %file.id, "Duplicate listing entry ignored");
        }
    }
    unique
}

fn retry_backoff(attempt: usize) -> Duration {
    let exponent = attempt.min(6) as u32;
    Duration::from_millis(200u64.saturating_mul(1u64 << exponent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let files = vec![
            RemoteFile {
                id: "f1".into(),
                name: "a.txt".into(),
                mime_type: "text/plain".into(),
                modified: "m1".into(),
                content_hash: None,
            },
            RemoteFile {
                id: "f1".into(),
                name: "a-dup.txt".into(),
                mime_type: "text/plain".into(),
                modified: "m2".into(),
                content_hash: None,
            },
            RemoteFile {
                id: "f2".into(),
                name: "b.txt".into(),
                mime_type: "text/plain".into(),
                modified: "m1".into(),
                content_hash: None,
            },
        ];

        let unique = dedupe_by_id(files);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].name, "a.txt");
        assert_eq!(unique[1].id, "f2");
    }

    #[test]
    fn backoff_grows_and_saturates() {
        assert_eq!(retry_backoff(1), Duration::from_millis(400));
        assert_eq!(retry_backoff(2), Duration::from_millis(800));
        assert_eq!(retry_backoff(6), retry_backoff(20));
    }
}
