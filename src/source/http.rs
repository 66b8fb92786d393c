//! HTTP client for a Drive-style file store API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;

use super::{FileSource, RemoteFile, SourceError};

/// Remote file store client speaking a Drive-style REST API.
///
/// Listing: `GET {base}/files?collection={id}` returning `{ "files": [...] }`
/// with id/name/mimeType/modifiedTime (and optionally contentHash) per entry.
/// Download: `GET {base}/files/{id}?alt=media` returning the raw bytes.
pub struct HttpFileSource {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

#[derive(Deserialize)]
struct ListFilesResponse {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

impl HttpFileSource {
    /// Construct a new client for the given API base URL.
    pub fn new(
        base_url: &str,
        api_token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent("docsync/0.1")
            .timeout(timeout)
            .build()?;
        let base_url = normalize_base_url(base_url).map_err(SourceError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_token = api_token.is_some(),
            "Initialized file store HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_token: api_token.map(str::to_string),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.api_token
            && !token.is_empty()
        {
            req = req.bearer_auth(token);
        }
        req
    }
}

#[async_trait]
impl FileSource for HttpFileSource {
    async fn list(&self, collection_id: &str) -> Result<Vec<RemoteFile>, SourceError> {
        let response = self
            .request(Method::GET, "files")
            .query(&[("collection", collection_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = SourceError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_id, error = %error, "Failed to list files");
            return Err(error);
        }

        let payload: ListFilesResponse = response.json().await?;
        tracing::debug!(
            collection = collection_id,
            files = payload.files.len(),
            "Listed remote collection"
        );
        Ok(payload.files)
    }

    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>, SourceError> {
        let response = self
            .request(Method::GET, &format!("files/{file_id}"))
            .query(&[("alt", "media")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = SourceError::UnexpectedStatus { status, body };
            tracing::error!(file = file_id, error = %error, "Failed to download file");
            return Err(error);
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};
    use serde_json::json;

    #[tokio::test]
    async fn list_parses_metadata_fields() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/files")
                    .query_param("collection", "folder-1");
                then.status(200).json_body(json!({
                    "files": [
                        {
                            "id": "f1",
                            "name": "report.pdf",
                            "mimeType": "application/pdf",
                            "modifiedTime": "2026-02-01T08:30:00Z"
                        },
                        {
                            "id": "f2",
                            "name": "scan.png",
                            "mimeType": "image/png",
                            "modifiedTime": "2026-02-02T09:00:00Z",
                            "contentHash": "deadbeef"
                        }
                    ]
                }));
            })
            .await;

        let source = HttpFileSource::new(&server.base_url(), None, Duration::from_secs(5))
            .expect("client builds");
        let files = source.list("folder-1").await.expect("listing succeeds");

        mock.assert();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].id, "f1");
        assert_eq!(files[0].revision(), "2026-02-01T08:30:00Z");
        assert_eq!(files[1].revision(), "deadbeef");
    }

    #[tokio::test]
    async fn fetch_returns_raw_bytes() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/files/f1")
                    .query_param("alt", "media");
                then.status(200).body("hello bytes");
            })
            .await;

        let source = HttpFileSource::new(&server.base_url(), Some("token"), Duration::from_secs(5))
            .expect("client builds");
        let bytes = source.fetch("f1").await.expect("fetch succeeds");

        mock.assert();
        assert_eq!(bytes, b"hello bytes");
    }

    #[tokio::test]
    async fn listing_failure_surfaces_status_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/files");
                then.status(403).body("forbidden");
            })
            .await;

        let source = HttpFileSource::new(&server.base_url(), None, Duration::from_secs(5))
            .expect("client builds");
        let error = source.list("folder-1").await.unwrap_err();
        match error {
            SourceError::UnexpectedStatus { status, body } => {
                assert_eq!(status.as_u16(), 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
