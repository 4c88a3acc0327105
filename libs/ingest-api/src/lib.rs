pub mod connector;
pub mod error;
pub mod record;

pub use connector::{RecordSink, RecordSource};
pub use error::{ConnectorError, ErrorKind};
pub use record::{EnrichedRecord, StreamRecord};

/// Current Unix time in milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Shard id in the `shardId-000000000000` layout used by stream services.
pub fn shard_id(index: u64) -> String {
    format!("shardId-{index:012}")
}
