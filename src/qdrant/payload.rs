//! Helpers for constructing Qdrant payloads.

use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

/// Build the payload stored alongside each chunk: caller metadata merged with the chunk
/// text and the ingestion timestamp. `text` always reflects the embedded content, even
/// when the metadata carries a key of the same name.
pub(crate) fn build_payload(
    text: &str,
    metadata: &Map<String, Value>,
    timestamp_rfc3339: &str,
) -> Value {
    let mut payload = metadata.clone();
    payload
        .entry("ingested_at")
        .or_insert_with(|| Value::String(timestamp_rfc3339.to_string()));
    payload.insert("text".into(), Value::String(text.to_string()));
    Value::Object(payload)
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Construct a fresh point identifier.
pub(crate) fn generate_point_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_merges_metadata_with_text() {
        let metadata = json!({
            "source": "notes.txt",
            "chunk_index": 2,
            "total_chunks": 4
        });
        let Value::Object(metadata) = metadata else {
            unreachable!()
        };

        let payload = build_payload("chunk body", &metadata, "2024-01-01T00:00:00Z");
        assert_eq!(payload["text"], "chunk body");
        assert_eq!(payload["source"], "notes.txt");
        assert_eq!(payload["chunk_index"], 2);
        assert_eq!(payload["total_chunks"], 4);
        assert_eq!(payload["ingested_at"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn text_field_cannot_be_overridden_by_metadata() {
        let mut metadata = Map::new();
        metadata.insert("text".into(), Value::String("stale".into()));
        let payload = build_payload("fresh", &metadata, "2024-01-01T00:00:00Z");
        assert_eq!(payload["text"], "fresh");
    }

    #[test]
    fn point_ids_are_unique_uuids() {
        let first = generate_point_id();
        let second = generate_point_id();
        assert_ne!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }
}
