use serde_json::json;

use ingest_api::{EnrichedRecord, StreamRecord};

use crate::error::EnrichError;

/// Dead-letter line for a record the stage rejected.
///
/// The payload is carried as lossy UTF-8 text so the line itself is always
/// valid JSON, even when the rejection reason was an encoding error.
pub fn dead_letter_record(record: &StreamRecord, error: &EnrichError) -> EnrichedRecord {
    let reason = match error {
        EnrichError::Decode(_) => "decode",
        EnrichError::MalformedRecord(_) => "malformed_record",
    };
    let line = json!({
        "reason": reason,
        "error": error.to_string(),
        "partition_key": record.partition_key,
        "sequence_number": record.sequence_number,
        "shard_id": record.shard_id,
        "stream_name": record.stream_name,
        "approx_arrival_ms": record.approx_arrival_ms,
        "payload": String::from_utf8_lossy(&record.data),
    });
    EnrichedRecord::new(line.to_string())
}
