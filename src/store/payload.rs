//! Helpers for constructing Qdrant payloads and point identifiers.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

use super::types::EmbeddedChunk;

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(chunk: &EmbeddedChunk, timestamp_rfc3339: &str) -> Value {
    let mut payload = Map::new();
    payload.insert(
        "source_id".into(),
        Value::String(chunk.chunk.file_id.clone()),
    );
    payload.insert("file_name".into(), Value::String(chunk.file_name.clone()));
    payload.insert("chunk_index".into(), Value::from(chunk.chunk.index));
    payload.insert("char_len".into(), Value::from(chunk.chunk.char_len));
    payload.insert(
        "fingerprint".into(),
        Value::String(chunk.fingerprint.clone()),
    );
    payload.insert("text".into(), Value::String(chunk.chunk.text.clone()));
    payload.insert(
        "timestamp".into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    Value::Object(payload)
}

/// Derive the point identifier for a fingerprint.
///
/// The id is a UUID built from the fingerprint digest, so upserting the same
/// fingerprint always addresses the same point and storage stays
/// at-most-once per fingerprint.
pub(crate) fn point_id_for(fingerprint: &str) -> String {
    let digest = Sha256::digest(fingerprint.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::chunking::Chunk;

    fn sample_chunk() -> EmbeddedChunk {
        let chunk = Chunk {
            file_id: "f1".into(),
            index: 2,
            text: "sample".into(),
            char_len: 6,
            overlap_with_previous: 0,
        };
        let fingerprint = chunk.fingerprint();
        EmbeddedChunk {
            chunk,
            vector: vec![0.1, 0.2],
            fingerprint,
            file_name: "report.pdf".into(),
        }
    }

    #[test]
    fn point_id_is_stable_and_distinct() {
        let a = point_id_for("fp-a");
        assert_eq!(a, point_id_for("fp-a"));
        assert_ne!(a, point_id_for("fp-b"));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }

    #[test]
    fn payload_carries_owner_and_fingerprint() {
        let chunk = sample_chunk();
        let payload = build_payload(&chunk, "2026-01-01T00:00:00Z");
        assert_eq!(payload["source_id"], "f1");
        assert_eq!(payload["file_name"], "report.pdf");
        assert_eq!(payload["chunk_index"], 2);
        assert_eq!(payload["fingerprint"], chunk.fingerprint.as_str());
        assert_eq!(payload["text"], "sample");
        assert_eq!(payload["timestamp"], "2026-01-01T00:00:00Z");
    }
}
