use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use tokio::sync::mpsc;

use ingest_api::{ConnectorError, EnrichedRecord, RecordSink, RecordSource, StreamRecord};

/// In-process source fed through a bounded channel. Ends when every
/// sender is dropped.
pub struct ChannelSource {
    rx: mpsc::Receiver<StreamRecord>,
}

/// Create a channel source and the sender that feeds it.
pub fn channel_source(buffer: usize) -> (mpsc::Sender<StreamRecord>, ChannelSource) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (tx, ChannelSource { rx })
}

impl RecordSource for ChannelSource {
    fn next(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<StreamRecord>, ConnectorError>> + Send + '_>> {
        Box::pin(async move { Ok(self.rx.recv().await) })
    }

    fn describe(&self) -> String {
        "memory:channel".into()
    }
}

/// Collects delivered records in memory.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<EnrichedRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far.
    pub fn records(&self) -> Vec<EnrichedRecord> {
        match self.records.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordSink for MemorySink {
    fn send(
        &self,
        record: EnrichedRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), ConnectorError>> + Send + '_>> {
        Box::pin(async move {
            let mut guard = match self.records.lock() {
                Ok(g) => g,
                Err(poisoned) => {
                    tracing::warn!("memory sink lock was poisoned, recovering");
                    poisoned.into_inner()
                }
            };
            guard.push(record);
            Ok(())
        })
    }

    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), ConnectorError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }

    fn describe(&self) -> String {
        "memory:vec".into()
    }
}
