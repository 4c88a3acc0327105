use ingest_engine::{IngestConfig, SourceConfig};

use crate::error::ServerError;

pub fn run(config_path: &str) -> Result<(), ServerError> {
    let config = IngestConfig::load(config_path)?;
    let props = &config.application_properties;
    let source = match &config.source {
        SourceConfig::Lines(lines) => format!("lines:{}", lines.path),
        SourceConfig::Tcp(tcp) => format!("tcp:{}:{}", tcp.host, tcp.port),
    };
    tracing::info!(
        config = %config_path,
        region = %props.region,
        input = %props.input_stream,
        delivery = %props.delivery_stream,
        %source,
        policy = ?config.stage.on_error,
        parallelism = config.stage.parallelism,
        "configuration is valid"
    );
    Ok(())
}
