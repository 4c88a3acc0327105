use ingest_api::ConnectorError;

/// Failure of the enrichment stage for a single record.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("payload is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),

    #[error("payload is not a JSON object: {0}")]
    MalformedRecord(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("record {sequence_number} on {shard_id}: {source}")]
    Enrich {
        sequence_number: String,
        shard_id: String,
        #[source]
        source: EnrichError,
    },

    #[error("worker task failed: {0}")]
    Join(String),
}

impl EngineError {
    /// Add context to the error.
    ///
    /// For `Connector`, context goes to the inner `ConnectorError`.
    /// For `Config`, it is prepended to the message.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Connector(e) => EngineError::Connector(e.with_context(ctx)),
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}
