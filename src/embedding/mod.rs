//! Embedding client abstraction and HTTP adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Endpoint or credentials could not be assembled into a client.
    #[error("invalid embedding endpoint: {0}")]
    InvalidEndpoint(String),
    /// HTTP layer failed before receiving a response.
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with an unexpected status code.
    #[error("embedding service returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider returned a different number of vectors than inputs.
    #[error("embedding service returned {actual} vectors for {expected} inputs")]
    CountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },
    /// Returned vector dimensionality does not match configuration.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured for the vector store.
        expected: usize,
        /// Dimension actually produced by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one vector per supplied text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Dimensionality every returned vector must have. Constant for the
    /// lifetime of a vector store; changing models requires re-ingestion.
    fn dimension(&self) -> usize;
}

/// Client for OpenAI-compatible `/embeddings` endpoints.
///
/// Both hosted OpenAI and a local Ollama runtime expose this shape; the base
/// URL decides which one is spoken to.
pub struct HttpEmbeddingClient {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbeddingClient {
    /// Build a client against `base_url`, optionally authenticating with a
    /// bearer token.
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        model: &str,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        if model.trim().is_empty() {
            return Err(EmbeddingError::InvalidEndpoint(
                "embedding model name is empty".to_string(),
            ));
        }
        if dimension == 0 {
            return Err(EmbeddingError::InvalidEndpoint(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|key| !key.trim().is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", key.trim()))
                .map_err(|_| EmbeddingError::InvalidEndpoint("invalid API key".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent("docsync/0.1")
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        tracing::debug!(endpoint = %endpoint, model, dimension, "Initialized embedding client");

        Ok(Self {
            client,
            endpoint,
            model: model.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = EmbeddingError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Embedding request failed");
            return Err(error);
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: parsed.data.len(),
            });
        }

        let vectors: Vec<Vec<f32>> = parsed
            .data
            .into_iter()
            .map(|entry| entry.embedding)
            .collect();

        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    #[tokio::test]
    async fn embed_restores_input_order() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [0.0, 1.0] },
                        { "index": 0, "embedding": [1.0, 0.0] }
                    ]
                }));
            })
            .await;

        let client = HttpEmbeddingClient::new(
            &server.base_url(),
            None,
            "test-model",
            2,
            Duration::from_secs(5),
        )
        .expect("client builds");

        let vectors = client
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .expect("embedding succeeds");

        mock.assert();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn embed_rejects_wrong_dimension() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [ { "index": 0, "embedding": [1.0, 2.0, 3.0] } ]
                }));
            })
            .await;

        let client = HttpEmbeddingClient::new(
            &server.base_url(),
            None,
            "test-model",
            2,
            Duration::from_secs(5),
        )
        .expect("client builds");

        let error = client.embed(&["text".to_string()]).await.unwrap_err();
        assert!(matches!(
            error,
            EmbeddingError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn embed_rejects_missing_vectors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({ "data": [] }));
            })
            .await;

        let client = HttpEmbeddingClient::new(
            &server.base_url(),
            None,
            "test-model",
            2,
            Duration::from_secs(5),
        )
        .expect("client builds");

        let error = client.embed(&["text".to_string()]).await.unwrap_err();
        assert!(matches!(error, EmbeddingError::CountMismatch { .. }));
    }

    #[tokio::test]
    async fn empty_input_makes_no_request() {
        let client = HttpEmbeddingClient::new(
            "http://127.0.0.1:1",
            None,
            "test-model",
            2,
            Duration::from_secs(1),
        )
        .expect("client builds");
        let vectors = client.embed(&[]).await.expect("trivially succeeds");
        assert!(vectors.is_empty());
    }
}
