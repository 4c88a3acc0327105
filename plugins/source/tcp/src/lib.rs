use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ingest_api::{ConnectorError, RecordSource, StreamRecord, now_ms, shard_id};

const LENGTH_BYTES: usize = 4;

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_max_payload() -> usize {
    1024 * 1024
}
fn default_buffer() -> usize {
    1024
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TcpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Maximum frame size in bytes (0 = unlimited).
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,
    /// Records buffered between connection readers and the pipeline.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
}

type Delivery = Result<StreamRecord, ConnectorError>;

/// TCP source. Every accepted connection is one shard.
///
/// Wire format per record: two frames, each a 4-byte big-endian length
/// followed by that many bytes: partition key (UTF-8), then payload.
///
/// Dropping the source stops the listener and closes every connection.
pub struct TcpSource {
    rx: mpsc::Receiver<Delivery>,
    local_addr: SocketAddr,
    token: CancellationToken,
}

impl TcpSource {
    /// Bind the listener and start accepting connections.
    pub async fn bind(config: &TcpConfig, stream_name: &str) -> Result<Self, ConnectorError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ConnectorError::io(format!("bind {addr}: {e}")))?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, max_payload = config.max_payload, "tcp source listening");

        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let token = CancellationToken::new();
        tokio::spawn(accept_loop(
            listener,
            tx,
            stream_name.to_string(),
            config.max_payload,
            token.clone(),
        ));

        Ok(Self {
            rx,
            local_addr,
            token,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for TcpSource {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl RecordSource for TcpSource {
    fn next(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<StreamRecord>, ConnectorError>> + Send + '_>> {
        Box::pin(async move { self.rx.recv().await.transpose() })
    }

    fn describe(&self) -> String {
        format!("tcp:{}", self.local_addr)
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: mpsc::Sender<Delivery>,
    stream_name: String,
    max_payload: usize,
    token: CancellationToken,
) {
    let mut next_shard = 0u64;
    loop {
        let accepted = tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                let shard = shard_id(next_shard);
                next_shard += 1;
                tracing::info!(%peer, shard = %shard, "tcp source client connected");

                let tx = tx.clone();
                let stream_name = stream_name.clone();
                let conn_token = token.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = conn_token.cancelled() => {}
                        _ = handle_connection(stream, &shard, &stream_name, max_payload, &tx) => {}
                    }
                    tracing::info!(%peer, shard = %shard, "connection closed");
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "accept error");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            }
        }
    }
    tracing::info!("tcp source listener stopped");
}

async fn handle_connection(
    stream: TcpStream,
    shard: &str,
    stream_name: &str,
    max_payload: usize,
    tx: &mpsc::Sender<Delivery>,
) {
    let mut reader = BufReader::new(stream);
    let mut sequence = 0u64;

    loop {
        let key = match read_frame(&mut reader, max_payload).await {
            Ok(Some(key)) => key,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(shard = %shard, error = %e, "framing error, disconnecting");
                return;
            }
        };
        let data = match read_frame(&mut reader, max_payload).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::warn!(shard = %shard, "connection closed between key and payload");
                return;
            }
            Err(e) => {
                tracing::error!(shard = %shard, error = %e, "framing error, disconnecting");
                return;
            }
        };

        let partition_key = match String::from_utf8(key) {
            Ok(k) => k,
            Err(e) => {
                let err = ConnectorError::format(format!(
                    "{shard} record {sequence}: partition key is not UTF-8: {e}"
                ));
                let _ = tx.send(Err(err)).await;
                return;
            }
        };

        let record = StreamRecord {
            data,
            partition_key,
            sequence_number: sequence.to_string(),
            approx_arrival_ms: now_ms(),
            stream_name: stream_name.to_string(),
            shard_id: shard.to_string(),
        };
        sequence += 1;

        if tx.send(Ok(record)).await.is_err() {
            return;
        }
    }
}

/// Read one length-prefixed frame. `Ok(None)` = clean EOF on a frame
/// boundary.
///
/// The payload buffer grows with the bytes actually received, so a
/// header claiming a huge length costs nothing until the data arrives.
pub async fn read_frame<R>(reader: &mut R, max_payload: usize) -> Result<Option<Vec<u8>>, ConnectorError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; LENGTH_BYTES];
    let mut filled = 0;
    while filled < LENGTH_BYTES {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ConnectorError::format(format!(
                "truncated frame header: {filled} of {LENGTH_BYTES} bytes"
            )));
        }
        filled += n;
    }

    let len = u32::from_be_bytes(header) as usize;
    if max_payload > 0 && len > max_payload {
        return Err(ConnectorError::format(format!(
            "payload too large: {len} bytes (max {max_payload})"
        )));
    }

    let mut payload = Vec::new();
    let got = (&mut *reader).take(len as u64).read_to_end(&mut payload).await?;
    if got < len {
        return Err(ConnectorError::format(format!(
            "truncated frame: expected {len} bytes, got {got}"
        )));
    }
    Ok(Some(payload))
}

/// Append one record (key frame + payload frame) to `buf`.
pub fn encode_envelope(partition_key: &str, data: &[u8], buf: &mut Vec<u8>) -> Result<(), ConnectorError> {
    for frame in [partition_key.as_bytes(), data] {
        let len = u32::try_from(frame.len()).map_err(|_| {
            ConnectorError::format(format!("frame too large for 4-byte header: {}", frame.len()))
        })?;
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(frame);
    }
    Ok(())
}
