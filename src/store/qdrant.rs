//! HTTP client implementing the vector index over Qdrant's REST API.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};

use super::VectorIndex;
use super::payload::{build_payload, current_timestamp_rfc3339, point_id_for};
use super::types::{
    EmbeddedChunk, QueryResponse, QueryResponseResult, ScoredChunk, ScrollResponse, StoreError,
};

const SCROLL_PAGE_SIZE: usize = 512;

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantIndex {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    vector_size: u64,
}

impl QdrantIndex {
    /// Construct a new client for the given Qdrant instance and collection.
    pub fn new(
        url: &str,
        api_key: Option<&str>,
        collection: &str,
        vector_size: u64,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .user_agent("docsync/0.1")
            .timeout(timeout)
            .build()?;
        let base_url = normalize_base_url(url).map_err(StoreError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            collection,
            vector_size,
            has_api_key = api_key.is_some(),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: api_key.map(str::to_string),
            collection: collection.to_string(),
            vector_size,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(&self, response: reqwest::Response, on_success: F) -> Result<(), StoreError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }

    async fn collection_exists(&self) -> Result<bool, StoreError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = StoreError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    async fn create_collection(&self) -> Result<(), StoreError> {
        let body = json!({
            "vectors": {
                "size": self.vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{}", self.collection))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, "Collection created");
        })
        .await
    }

    /// Ensure payload indexes exist for the fields the pipeline filters on.
    async fn ensure_payload_indexes(&self) -> Result<(), StoreError> {
        let fields: [(&str, &str); 4] = [
            ("source_id", "keyword"),
            ("fingerprint", "keyword"),
            ("file_name", "keyword"),
            ("timestamp", "datetime"),
        ];

        for (field, schema) in fields {
            let body = json!({
                "field_name": field,
                "field_schema": schema,
            });

            let response = self
                .request(Method::PUT, &format!("collections/{}/index", self.collection))
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() || response.status() == StatusCode::CONFLICT {
                tracing::debug!(collection = %self.collection, field, schema, "Payload index ensured");
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = StoreError::UnexpectedStatus { status, body };
                tracing::warn!(collection = %self.collection, field, schema, error = %error, "Failed to ensure payload index");
            }
        }

        Ok(())
    }

    /// Page through the scroll endpoint, collecting ids and payloads for
    /// every point matching `filter`.
    async fn scroll_points(
        &self,
        with_payload: Value,
        filter: Value,
    ) -> Result<Vec<(Option<Value>, Map<String, Value>)>, StoreError> {
        let mut offset: Option<Value> = None;
        let mut collected = Vec::new();

        loop {
            let mut body = json!({
                "with_payload": with_payload.clone(),
                "with_vector": false,
                "limit": SCROLL_PAGE_SIZE,
                "filter": filter.clone(),
            });

            if let Some(cursor) = &offset {
                body.as_object_mut()
                    .expect("scroll body is an object")
                    .insert("offset".into(), cursor.clone());
            }

            let response = self
                .request(
                    Method::POST,
                    &format!("collections/{}/points/scroll", self.collection),
                )
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = StoreError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Failed to scroll points");
                return Err(error);
            }

            let ScrollResponse { result } = response.json().await?;
            for point in result.points {
                collected.push((point.id, point.payload.unwrap_or_default()));
            }

            match result.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => break,
            }
        }

        Ok(collected)
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_ready(&self) -> Result<(), StoreError> {
        if !self.collection_exists().await? {
            tracing::debug!(
                collection = %self.collection,
                vector_size = self.vector_size,
                "Creating collection"
            );
            self.create_collection().await?;
        }
        self.ensure_payload_indexes().await
    }

    async fn existing_fingerprints(
        &self,
        fingerprints: &[String],
    ) -> Result<BTreeSet<String>, StoreError> {
        if fingerprints.is_empty() {
            return Ok(BTreeSet::new());
        }

        let filter = json!({
            "must": [
                {
                    "key": "fingerprint",
                    "match": { "any": fingerprints }
                }
            ]
        });

        let points = self.scroll_points(json!(["fingerprint"]), filter).await?;
        let mut present = BTreeSet::new();
        for (_, payload) in points {
            if let Some(Value::String(fingerprint)) = payload.get("fingerprint") {
                present.insert(fingerprint.clone());
            }
        }
        Ok(present)
    }

    async fn upsert(&self, chunks: Vec<EmbeddedChunk>) -> Result<usize, StoreError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let now = current_timestamp_rfc3339();
        let serialized: Vec<Value> = chunks
            .into_iter()
            .map(|chunk| {
                let payload = build_payload(&chunk, &now);
                json!({
                    "id": point_id_for(&chunk.fingerprint),
                    "vector": chunk.vector,
                    "payload": payload,
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/points", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = %self.collection,
                points = point_count,
                "Points upserted"
            );
        })
        .await?;

        Ok(point_count)
    }

    async fn delete_by_owner(
        &self,
        file_id: &str,
        keep: &BTreeSet<String>,
    ) -> Result<usize, StoreError> {
        let mut clauses = json!({
            "must": [
                {
                    "key": "source_id",
                    "match": { "value": file_id }
                }
            ]
        });
        if !keep.is_empty() {
            let keep_list: Vec<&String> = keep.iter().collect();
            clauses
                .as_object_mut()
                .expect("filter is an object")
                .insert(
                    "must_not".into(),
                    json!([
                        {
                            "key": "fingerprint",
                            "match": { "any": keep_list }
                        }
                    ]),
                );
        }

        let stale = self.scroll_points(json!(false), clauses).await?;
        let ids: Vec<Value> = stale.into_iter().filter_map(|(id, _)| id).collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let removed = ids.len();
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": ids }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = %self.collection,
                file = file_id,
                removed,
                "Stale points removed"
            );
        })
        .await?;

        Ok(removed)
    }

    async fn query(
        &self,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, error = %error, "Qdrant query failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        let results = points
            .into_iter()
            .map(|point| ScoredChunk {
                id: stringify_point_id(point.id),
                score: point.score,
                payload: point.payload,
            })
            .collect();

        Ok(results)
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

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::chunking::Chunk;
    use httpmock::{Method::POST, Method::PUT, MockServer};

    fn index_for(server: &MockServer) -> QdrantIndex {
        QdrantIndex::new(
            &server.base_url(),
            None,
            "demo",
            2,
            Duration::from_secs(5),
        )
        .expect("client builds")
    }

    fn embedded(file_id: &str, index: usize, text: &str) -> EmbeddedChunk {
        let chunk = Chunk {
            file_id: file_id.into(),
            index,
            text: text.into(),
            char_len: text.chars().count(),
            overlap_with_previous: 0,
        };
        let fingerprint = chunk.fingerprint();
        EmbeddedChunk {
            chunk,
            vector: vec![0.5, 0.5],
            fingerprint,
            file_name: "doc.txt".into(),
        }
    }

    #[tokio::test]
    async fn upsert_addresses_points_by_fingerprint() {
        let server = MockServer::start_async().await;
        let chunk = embedded("f1", 0, "alpha");
        let expected_id = point_id_for(&chunk.fingerprint);

        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/demo/points")
                    .query_param("wait", "true")
                    .body_contains(&expected_id);
                then.status(200).json_body(serde_json::json!({ "status": "ok" }));
            })
            .await;

        let written = index_for(&server)
            .upsert(vec![chunk])
            .await
            .expect("upsert succeeds");

        mock.assert();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn existing_fingerprints_returns_present_subset() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/demo/points/scroll");
                then.status(200).json_body(serde_json::json!({
                    "result": {
                        "points": [
                            { "id": "p1", "payload": { "fingerprint": "fp-a" } },
                            { "id": "p2", "payload": { "fingerprint": "fp-c" } }
                        ],
                        "next_page_offset": null
                    }
                }));
            })
            .await;

        let present = index_for(&server)
            .existing_fingerprints(&[
                "fp-a".to_string(),
                "fp-b".to_string(),
                "fp-c".to_string(),
            ])
            .await
            .expect("scroll succeeds");

        mock.assert();
        assert_eq!(
            present,
            BTreeSet::from(["fp-a".to_string(), "fp-c".to_string()])
        );
    }

    #[tokio::test]
    async fn delete_by_owner_removes_scrolled_ids() {
        let server = MockServer::start_async().await;
        let scroll = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/scroll")
                    .body_contains("source_id")
                    .body_contains("must_not");
                then.status(200).json_body(serde_json::json!({
                    "result": {
                        "points": [
                            { "id": "stale-1", "payload": {} },
                            { "id": "stale-2", "payload": {} }
                        ],
                        "next_page_offset": null
                    }
                }));
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/delete")
                    .body_contains("stale-1")
                    .body_contains("stale-2");
                then.status(200).json_body(serde_json::json!({ "status": "ok" }));
            })
            .await;

        let keep = BTreeSet::from(["fp-live".to_string()]);
        let removed = index_for(&server)
            .delete_by_owner("f1", &keep)
            .await
            .expect("delete succeeds");

        scroll.assert();
        delete.assert();
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn delete_by_owner_with_no_stale_points_skips_delete_call() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/demo/points/scroll");
                then.status(200).json_body(serde_json::json!({
                    "result": { "points": [], "next_page_offset": null }
                }));
            })
            .await;

        let removed = index_for(&server)
            .delete_by_owner("f1", &BTreeSet::new())
            .await
            .expect("delete succeeds");
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn query_parses_scored_points() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/demo/points/query");
                then.status(200).json_body(serde_json::json!({
                    "result": [
                        {
                            "id": "p1",
                            "score": 0.42,
                            "payload": { "text": "Example", "source_id": "f1" }
                        }
                    ]
                }));
            })
            .await;

        let hits = index_for(&server)
            .query(vec![0.1, 0.2], 3)
            .await
            .expect("query succeeds");

        mock.assert();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "p1");
        assert!((hits[0].score - 0.42).abs() < f32::EPSILON);
        let payload = hits[0].payload.as_ref().expect("payload");
        assert_eq!(payload["source_id"], "f1");
    }

    #[tokio::test]
    async fn upsert_failure_surfaces_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/demo/points");
                then.status(500).body("boom");
            })
            .await;

        let error = index_for(&server)
            .upsert(vec![embedded("f1", 0, "alpha")])
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::UnexpectedStatus { .. }));
    }
}
