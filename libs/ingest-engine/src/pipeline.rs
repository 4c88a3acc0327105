use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ingest_api::{EnrichedRecord, RecordSink, RecordSource, StreamRecord};

use crate::clock::{Clock, SystemClock};
use crate::config::{FailurePolicy, IngestConfig, StageConfig};
use crate::connectors::{open_sink, open_source};
use crate::dead_letter::dead_letter_record;
use crate::enrich::TenantStamp;
use crate::error::EngineError;

/// Counters reported when a run ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Records read from the source and handed to a worker.
    pub received: u64,
    /// Enriched records accepted by the sink.
    pub delivered: u64,
    /// Records dropped under `on_error = "skip"`.
    pub skipped: u64,
    /// Records forwarded to the dead-letter sink.
    pub dead_lettered: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    skipped: AtomicU64,
    dead_lettered: AtomicU64,
}

/// Source -> enrichment stage -> sink.
///
/// Records of one shard are always routed to the same worker, so their
/// relative order is kept end to end.
pub struct Pipeline {
    stage: Arc<TenantStamp>,
    settings: StageConfig,
    source: Box<dyn RecordSource>,
    sink: Arc<dyn RecordSink>,
    dead_letter: Option<Arc<dyn RecordSink>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stage", &self.stage)
            .field("settings", &self.settings)
            .field("source", &self.source.describe())
            .field("sink", &self.sink.describe())
            .field("dead_letter", &self.dead_letter.as_ref().map(|s| s.describe()))
            .finish()
    }
}

impl Pipeline {
    pub fn new(
        settings: StageConfig,
        source: Box<dyn RecordSource>,
        sink: Arc<dyn RecordSink>,
        dead_letter: Option<Arc<dyn RecordSink>>,
    ) -> Self {
        Self {
            stage: Arc::new(TenantStamp::new(
                settings.tenant_field.clone(),
                settings.timestamp_field.clone(),
            )),
            settings,
            source,
            sink,
            dead_letter,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the wall clock, e.g. for replays with a fixed instant.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Open the configured connectors and wire them into a pipeline.
    pub async fn bootstrap(config: &IngestConfig) -> Result<Self, EngineError> {
        let props = &config.application_properties;
        tracing::info!(
            region = %props.region,
            input = %props.input_stream,
            delivery = %props.delivery_stream,
            "bootstrapping pipeline"
        );

        let source = open_source(&config.source, props).await?;
        let sink = open_sink(&config.sink, &props.delivery_stream).await?;

        // The dead-letter destination is only opened when it will be used.
        let dead_letter = match &config.dead_letter {
            Some(cfg) if config.stage.on_error == FailurePolicy::DeadLetter => {
                Some(open_sink(cfg, "dead_letter").await?)
            }
            _ => None,
        };

        Ok(Self::new(config.stage.clone(), source, sink, dead_letter))
    }

    /// Run until the source ends, `shutdown` is cancelled, or a fatal
    /// error occurs.
    ///
    /// Both the end of the source and cancellation drain the records
    /// already handed to workers and flush the sinks before returning.
    pub async fn run(self, shutdown: CancellationToken) -> Result<PipelineStats, EngineError> {
        let Pipeline {
            stage,
            settings,
            mut source,
            sink,
            dead_letter,
            clock,
        } = self;

        let on_error = match (settings.on_error, &dead_letter) {
            (FailurePolicy::Fail, _) => OnError::Fail,
            (FailurePolicy::Skip, _) => OnError::Skip,
            (FailurePolicy::DeadLetter, Some(sink)) => OnError::DeadLetter(Arc::clone(sink)),
            (FailurePolicy::DeadLetter, None) => {
                return Err(EngineError::Config(
                    "dead-letter policy selected but no dead-letter sink given".into(),
                ));
            }
        };

        let parallelism = settings.parallelism.max(1);
        let abort = CancellationToken::new();
        let counters = Arc::new(Counters::default());

        // --- 1. Spawn workers ---
        let mut senders = Vec::with_capacity(parallelism);
        let mut workers: Vec<JoinHandle<Result<(), EngineError>>> = Vec::with_capacity(parallelism);
        for index in 0..parallelism {
            let (tx, rx) = mpsc::channel(settings.channel_buffer.max(1));
            senders.push(tx);
            let worker = Worker {
                index,
                stage: Arc::clone(&stage),
                on_error: on_error.clone(),
                sink: Arc::clone(&sink),
                clock: Arc::clone(&clock),
                counters: Arc::clone(&counters),
                abort: abort.clone(),
            };
            workers.push(tokio::spawn(worker.run(rx)));
        }

        tracing::info!(
            source = %source.describe(),
            sink = %sink.describe(),
            parallelism,
            policy = ?settings.on_error,
            "pipeline started"
        );

        // --- 2. Dispatch ---
        let mut received = 0u64;
        let mut source_error = None;
        loop {
            let next = tokio::select! {
                biased;
                _ = abort.cancelled() => break,
                _ = shutdown.cancelled() => {
                    tracing::info!("shutdown requested, draining");
                    break;
                }
                next = source.next() => next,
            };

            let record = match next {
                Ok(Some(record)) => record,
                Ok(None) => {
                    tracing::info!(source = %source.describe(), "source exhausted");
                    break;
                }
                Err(e) => {
                    tracing::error!(source = %source.describe(), error = %e, "source failed");
                    source_error = Some(EngineError::from(e.with_context(source.describe())));
                    abort.cancel();
                    break;
                }
            };

            let slot = worker_for(&record.shard_id, parallelism);
            let handed = tokio::select! {
                biased;
                _ = abort.cancelled() => false,
                sent = senders[slot].send(record) => sent.is_ok(),
            };
            if !handed {
                break;
            }
            received += 1;
        }

        // Closing the channels lets workers drain and exit.
        drop(senders);
        drop(source);

        // --- 3. Join workers ---
        let mut worker_error = None;
        for (index, handle) in workers.into_iter().enumerate() {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(EngineError::Join(format!("worker {index}: {e}"))),
            };
            if let Err(e) = outcome {
                worker_error.get_or_insert(e);
            }
        }

        // --- 4. Flush ---
        let mut flush_error = None;
        for target in std::iter::once(&sink).chain(dead_letter.as_ref()) {
            if let Err(e) = target.flush().await {
                tracing::error!(sink = %target.describe(), error = %e, "flush failed");
                flush_error.get_or_insert(EngineError::from(e.with_context(target.describe())));
            }
        }

        let stats = PipelineStats {
            received,
            delivered: counters.delivered.load(Ordering::Relaxed),
            skipped: counters.skipped.load(Ordering::Relaxed),
            dead_lettered: counters.dead_lettered.load(Ordering::Relaxed),
        };
        tracing::info!(
            received = stats.received,
            delivered = stats.delivered,
            skipped = stats.skipped,
            dead_lettered = stats.dead_lettered,
            "pipeline stopped"
        );

        match worker_error.or(source_error).or(flush_error) {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }
}

/// Worker index for a shard. Stable for the lifetime of a run.
fn worker_for(shard_id: &str, workers: usize) -> usize {
    if workers <= 1 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    shard_id.hash(&mut hasher);
    (hasher.finish() % workers as u64) as usize
}

/// Failure policy resolved against the sinks actually given.
#[derive(Clone)]
enum OnError {
    Fail,
    Skip,
    DeadLetter(Arc<dyn RecordSink>),
}

struct Worker {
    index: usize,
    stage: Arc<TenantStamp>,
    on_error: OnError,
    sink: Arc<dyn RecordSink>,
    clock: Arc<dyn Clock>,
    counters: Arc<Counters>,
    abort: CancellationToken,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<StreamRecord>) -> Result<(), EngineError> {
        loop {
            let record = tokio::select! {
                biased;
                _ = self.abort.cancelled() => return Ok(()),
                next = rx.recv() => match next {
                    Some(record) => record,
                    None => return Ok(()),
                },
            };

            if let Err(e) = self.process(record).await {
                tracing::error!(worker = self.index, error = %e, "worker stopped");
                self.abort.cancel();
                return Err(e);
            }
        }
    }

    async fn process(&self, record: StreamRecord) -> Result<(), EngineError> {
        let now = self.clock.now();
        let error = match self.stage.apply(&record.data, &record.partition_key, now) {
            Ok(line) => {
                self.sink
                    .send(EnrichedRecord::new(line))
                    .await
                    .map_err(|e| e.with_context(self.sink.describe()))?;
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            Err(error) => error,
        };

        match &self.on_error {
            OnError::Fail => Err(EngineError::Enrich {
                sequence_number: record.sequence_number,
                shard_id: record.shard_id,
                source: error,
            }),
            OnError::Skip => {
                tracing::warn!(
                    shard = %record.shard_id,
                    sequence = %record.sequence_number,
                    error = %error,
                    "skipping record"
                );
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            OnError::DeadLetter(dead_letter) => {
                tracing::warn!(
                    shard = %record.shard_id,
                    sequence = %record.sequence_number,
                    error = %error,
                    "dead-lettering record"
                );
                dead_letter
                    .send(dead_letter_record(&record, &error))
                    .await
                    .map_err(|e| e.with_context(dead_letter.describe()))?;
                self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }
}
