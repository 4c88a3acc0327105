/// Raw record as delivered by a stream source.
///
/// `data` is opaque bytes. Nothing below the enrichment stage interprets
/// them. The rest is transport metadata attached out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    /// Payload bytes as written by the producer.
    pub data: Vec<u8>,
    /// Partition key. Producers put the tenant id here.
    pub partition_key: String,
    /// Per-shard sequence number assigned by the source.
    pub sequence_number: String,
    /// Approximate arrival time in milliseconds (Unix epoch).
    pub approx_arrival_ms: i64,
    /// Name of the stream the record was read from.
    pub stream_name: String,
    /// Shard the record was read from.
    pub shard_id: String,
}

impl StreamRecord {
    /// Record with empty metadata, for callers that only care about
    /// payload and partition key.
    pub fn new(data: impl Into<Vec<u8>>, partition_key: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            partition_key: partition_key.into(),
            sequence_number: String::new(),
            approx_arrival_ms: 0,
            stream_name: String::new(),
            shard_id: String::new(),
        }
    }
}

/// UTF-8 text record ready for a delivery stream.
///
/// Always ends with a single `\n` so line-oriented consumers can split
/// records without a separate framing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedRecord(String);

impl EnrichedRecord {
    /// Wrap a line. A missing terminator is added, extra ones are kept
    /// out by the producer of the line.
    pub fn new(mut line: String) -> Self {
        if !line.ends_with('\n') {
            line.push('\n');
        }
        Self(line)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

}
