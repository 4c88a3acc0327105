pub mod clock;
pub mod config;
pub mod connectors;
pub mod dead_letter;
pub mod enrich;
pub mod error;
pub mod memory;
pub mod pipeline;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{FailurePolicy, IngestConfig, SinkConfig, SourceConfig, StageConfig};
pub use enrich::{TenantStamp, enrich};
pub use error::{EngineError, EnrichError};
pub use memory::{ChannelSource, MemorySink, channel_source};
pub use pipeline::{Pipeline, PipelineStats};
