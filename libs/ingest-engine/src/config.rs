use serde::Deserialize;

use sink_file::FileSinkConfig;
use source_lines::LinesConfig;
use source_tcp::TcpConfig;

use crate::enrich::{DEFAULT_TENANT_FIELD, DEFAULT_TIMESTAMP_FIELD};
use crate::error::EngineError;

/// Root configuration. Parsed from TOML once at startup, immutable after.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IngestConfig {
    /// Stream and region names. The `FlinkApplicationProperties` group id
    /// is accepted so exported property maps load unchanged.
    #[serde(alias = "FlinkApplicationProperties")]
    pub application_properties: ApplicationProperties,

    #[serde(default)]
    pub stage: StageConfig,

    pub source: SourceConfig,

    pub sink: SinkConfig,

    /// Destination for records the stage rejects (`on_error = "dead_letter"`).
    #[serde(default)]
    pub dead_letter: Option<SinkConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApplicationProperties {
    #[serde(default = "default_region", alias = "Region")]
    pub region: String,
    /// Stream the source reads from.
    #[serde(alias = "InputKinesisStream")]
    pub input_stream: String,
    /// Delivery stream the sink writes to.
    #[serde(alias = "FirehoseStreamName")]
    pub delivery_stream: String,
}

fn default_region() -> String {
    "us-west-2".into()
}

/// What the pipeline does with a record the stage cannot enrich.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the pipeline and report the record.
    #[default]
    #[serde(alias = "fail_fast")]
    Fail,
    /// Log, count and drop the record.
    Skip,
    /// Forward the raw record to the dead-letter sink.
    DeadLetter,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StageConfig {
    #[serde(default = "default_tenant_field")]
    pub tenant_field: String,
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    #[serde(default)]
    pub on_error: FailurePolicy,
    /// Number of enrichment workers. Records of one shard always go to
    /// the same worker.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Bounded channel size between dispatcher and each worker.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

fn default_tenant_field() -> String {
    DEFAULT_TENANT_FIELD.into()
}
fn default_timestamp_field() -> String {
    DEFAULT_TIMESTAMP_FIELD.into()
}
fn default_parallelism() -> usize {
    1
}
fn default_channel_buffer() -> usize {
    1024
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            tenant_field: default_tenant_field(),
            timestamp_field: default_timestamp_field(),
            on_error: FailurePolicy::default(),
            parallelism: default_parallelism(),
            channel_buffer: default_channel_buffer(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Lines(LinesConfig),
    Tcp(TcpConfig),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    File(FileSinkConfig),
}

impl IngestConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content).map_err(|e| e.with_context(path))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let props = &self.application_properties;
        require_non_empty("application_properties.region", &props.region)?;
        require_non_empty("application_properties.input_stream", &props.input_stream)?;
        require_non_empty("application_properties.delivery_stream", &props.delivery_stream)?;

        let stage = &self.stage;
        require_non_empty("stage.tenant_field", &stage.tenant_field)?;
        require_non_empty("stage.timestamp_field", &stage.timestamp_field)?;
        if stage.tenant_field == stage.timestamp_field {
            return Err(EngineError::Config(format!(
                "stage.tenant_field and stage.timestamp_field must differ (both '{}')",
                stage.tenant_field
            )));
        }
        if stage.parallelism == 0 {
            return Err(EngineError::Config("stage.parallelism must be at least 1".into()));
        }
        if stage.channel_buffer == 0 {
            return Err(EngineError::Config("stage.channel_buffer must be at least 1".into()));
        }

        match (stage.on_error, &self.dead_letter) {
            (FailurePolicy::DeadLetter, None) => {
                return Err(EngineError::Config(
                    "stage.on_error = \"dead_letter\" requires a [dead_letter] section".into(),
                ));
            }
            (policy, Some(_)) if policy != FailurePolicy::DeadLetter => {
                tracing::warn!(?policy, "[dead_letter] is configured but unused");
            }
            _ => {}
        }

        if let SourceConfig::Lines(lines) = &self.source {
            require_non_empty("source.path", &lines.path)?;
            if lines.poll_interval_ms == 0 {
                return Err(EngineError::Config("source.poll_interval_ms must be positive".into()));
            }
        }
        if let SinkConfig::File(file) = &self.sink {
            require_non_empty("sink.path", &file.path)?;
        }

        Ok(())
    }
}

fn require_non_empty(key: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::Config(format!("'{key}' must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use source_lines::InitialPosition;

    use super::*;

    const MINIMAL: &str = r#"
        [application_properties]
        input_stream = "data-multi-tenant-stream"
        delivery_stream = "delivery-multi-tenant-stream"

        [source]
        kind = "lines"
        path = "input.log"

        [sink]
        kind = "file"
        path = "out/records.jsonl"
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = IngestConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.application_properties.region, "us-west-2");
        assert_eq!(config.stage, StageConfig::default());
        assert_eq!(config.stage.on_error, FailurePolicy::Fail);
        assert!(config.dead_letter.is_none());

        match &config.source {
            SourceConfig::Lines(lines) => {
                assert_eq!(lines.path, "input.log");
                assert_eq!(lines.initial_position, InitialPosition::Latest);
                assert!(!lines.follow);
            }
            other => panic!("unexpected source: {other:?}"),
        }
        match &config.sink {
            SinkConfig::File(file) => assert!(file.append),
        }
    }

    #[test]
    fn accepts_exported_property_names() {
        let config = IngestConfig::parse(
            r#"
            [FlinkApplicationProperties]
            Region = "eu-central-1"
            InputKinesisStream = "in"
            FirehoseStreamName = "out"

            [source]
            kind = "tcp"
            port = 7400

            [sink]
            kind = "file"
            "#,
        )
        .unwrap();

        let props = &config.application_properties;
        assert_eq!(props.region, "eu-central-1");
        assert_eq!(props.input_stream, "in");
        assert_eq!(props.delivery_stream, "out");
        match &config.source {
            SourceConfig::Tcp(tcp) => {
                assert_eq!(tcp.port, 7400);
                assert_eq!(tcp.host, "0.0.0.0");
            }
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[test]
    fn missing_stream_name_is_rejected() {
        let err = IngestConfig::parse(
            r#"
            [application_properties]
            input_stream = "in"
            [source]
            kind = "lines"
            [sink]
            kind = "file"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("delivery_stream"), "{err}");

        let err = IngestConfig::parse(&MINIMAL.replace("\"data-multi-tenant-stream\"", "\"  \"")).unwrap_err();
        assert!(err.to_string().contains("input_stream"), "{err}");
    }

    #[test]
    fn dead_letter_policy_requires_sink() {
        let toml = format!("{MINIMAL}\n[stage]\non_error = \"dead_letter\"\n");
        let err = IngestConfig::parse(&toml).unwrap_err();
        assert!(err.to_string().contains("[dead_letter]"), "{err}");

        let toml = format!("{toml}\n[dead_letter]\nkind = \"file\"\npath = \"dlq.jsonl\"\n");
        let config = IngestConfig::parse(&toml).unwrap();
        assert_eq!(config.stage.on_error, FailurePolicy::DeadLetter);
        assert!(config.dead_letter.is_some());
    }

    #[test]
    fn stage_limits_are_checked() {
        for stage in [
            "parallelism = 0",
            "channel_buffer = 0",
            "tenant_field = \"\"",
            "tenant_field = \"ts\"\ntimestamp_field = \"ts\"",
        ] {
            let toml = format!("{MINIMAL}\n[stage]\n{stage}\n");
            assert!(IngestConfig::parse(&toml).is_err(), "{stage}");
        }
    }

    #[test]
    fn unknown_source_kind_is_rejected() {
        let toml = MINIMAL.replace("kind = \"lines\"", "kind = \"kinesis\"");
        assert!(matches!(IngestConfig::parse(&toml), Err(EngineError::Config(_))));
    }

    #[test]
    fn load_reports_path() {
        let err = IngestConfig::load("/nonexistent/ingest.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ingest.toml"));
    }
}
