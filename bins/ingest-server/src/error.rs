#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    Engine(#[from] ingest_engine::EngineError),

    #[error("enrich: {0}")]
    Enrich(#[from] ingest_engine::EnrichError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
