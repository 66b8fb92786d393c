#![deny(missing_docs)]

//! Core library for the docsync ingestion pipeline.
//!
//! docsync mirrors a remote document collection into a Qdrant vector index:
//! it lists the collection, extracts text from files that changed since the
//! last pass, splits the text into overlapping character windows, embeds the
//! windows, and upserts them keyed by a deterministic content fingerprint so
//! reruns never duplicate stored chunks.

/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and HTTP adapter.
pub mod embedding;
/// Text extraction for the supported document formats.
pub mod extract;
/// Persisted ingestion ledger and run lock.
pub mod ledger;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// Ingestion orchestration: chunking, dedup, and per-file control flow.
pub mod pipeline;
/// Remote file store adapter.
pub mod source;
/// Vector index capability interface and Qdrant implementation.
pub mod store;
