use std::sync::Arc;

use ingest_api::{RecordSink, RecordSource};
use sink_file::FileSink;
use source_lines::LinesSource;
use source_tcp::TcpSource;

use crate::config::{ApplicationProperties, SinkConfig, SourceConfig};
use crate::error::EngineError;

/// Open the configured source for the input stream.
pub async fn open_source(
    cfg: &SourceConfig,
    props: &ApplicationProperties,
) -> Result<Box<dyn RecordSource>, EngineError> {
    let ctx = format!("source for stream '{}'", props.input_stream);
    let source: Box<dyn RecordSource> = match cfg {
        SourceConfig::Lines(lines) => Box::new(
            LinesSource::open(lines, &props.input_stream)
                .await
                .map_err(|e| e.with_context(&ctx))?,
        ),
        SourceConfig::Tcp(tcp) => Box::new(
            TcpSource::bind(tcp, &props.input_stream)
                .await
                .map_err(|e| e.with_context(&ctx))?,
        ),
    };

    tracing::info!(stream = %props.input_stream, source = %source.describe(), "opened source");
    Ok(source)
}

/// Open a sink. `name` is the delivery stream (or dead-letter) name used
/// in logs and errors.
pub async fn open_sink(cfg: &SinkConfig, name: &str) -> Result<Arc<dyn RecordSink>, EngineError> {
    let ctx = format!("sink '{name}'");
    let sink: Arc<dyn RecordSink> = match cfg {
        SinkConfig::File(file) => Arc::new(FileSink::open(file).await.map_err(|e| e.with_context(&ctx))?),
    };

    tracing::info!(%name, sink = %sink.describe(), "opened sink");
    Ok(sink)
}
