use std::future::Future;
use std::pin::Pin;

use crate::error::ConnectorError;
use crate::record::{EnrichedRecord, StreamRecord};

/// Produces raw records from an upstream stream.
///
/// The sequence is lazy, possibly infinite and not restartable: once a
/// record has been returned it is never returned again by this instance.
pub trait RecordSource: Send {
    /// Next record. `Ok(None)` = end of stream, no further calls expected.
    fn next(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<StreamRecord>, ConnectorError>> + Send + '_>>;

    /// Human-readable description for logs (e.g. `lines:/var/data/in.log`).
    fn describe(&self) -> String;
}

/// Consumes enriched text records. Delivery semantics are up to the
/// implementation.
///
/// `send` may be called concurrently from several pipeline workers.
pub trait RecordSink: Send + Sync {
    fn send(
        &self,
        record: EnrichedRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), ConnectorError>> + Send + '_>>;

    /// Flush buffers (end of stream, graceful shutdown).
    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), ConnectorError>> + Send + '_>>;

    fn describe(&self) -> String;
}
