//! Remote file store adapter.

pub mod http;

pub use http::HttpFileSource;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while talking to the remote file store.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid file store URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// File store responded with an unexpected status code.
    #[error("Unexpected file store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from the file store.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// A document visible in the remote collection listing.
///
/// Immutable from the pipeline's perspective apart from the modification
/// stamp and content hash, which signal re-ingestion.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFile {
    /// Identifier stable across runs.
    pub id: String,
    /// Display name, including the extension used for type detection.
    pub name: String,
    /// Declared MIME type.
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Last-modified stamp reported by the store.
    #[serde(rename = "modifiedTime")]
    pub modified: String,
    /// Content hash, when the store provides one.
    #[serde(rename = "contentHash", default)]
    pub content_hash: Option<String>,
}

impl RemoteFile {
    /// Change indicator recorded in the ingestion ledger.
    ///
    /// Prefers the content hash and falls back to the modification stamp, so
    /// stores without hashes still get change detection.
    pub fn revision(&self) -> &str {
        self.content_hash.as_deref().unwrap_or(&self.modified)
    }
}

/// Capability interface over the remote file store.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Enumerate the files currently present in the collection.
    async fn list(&self, collection_id: &str) -> Result<Vec<RemoteFile>, SourceError>;

    /// Download the raw bytes of one file.
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>, SourceError>;
}
