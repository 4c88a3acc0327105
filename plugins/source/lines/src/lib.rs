use std::future::Future;
use std::io::SeekFrom;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncSeekExt, BufReader};

use ingest_api::{ConnectorError, RecordSource, StreamRecord, now_ms, shard_id};

/// Where to start reading when the source opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialPosition {
    /// Everything already in the file.
    #[serde(alias = "TRIM_HORIZON")]
    TrimHorizon,
    /// Only lines appended after open.
    #[default]
    #[serde(alias = "LATEST")]
    Latest,
}

fn default_path() -> String {
    "-".into()
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_shard_id() -> String {
    shard_id(0)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LinesConfig {
    /// File to read. `-` = stdin.
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub initial_position: InitialPosition,
    /// Keep polling for appended lines at end of file.
    #[serde(default)]
    pub follow: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Partition key for lines without a tab separator.
    #[serde(default)]
    pub default_partition_key: Option<String>,
    #[serde(default = "default_shard_id")]
    pub shard_id: String,
}

impl Default for LinesConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            initial_position: InitialPosition::default(),
            follow: false,
            poll_interval_ms: default_poll_interval_ms(),
            default_partition_key: None,
            shard_id: default_shard_id(),
        }
    }
}

/// Line-delimited source: one record per line, `partition_key<TAB>payload`.
///
/// The payload is kept as raw bytes, so non-UTF-8 input reaches the
/// enrichment stage untouched.
pub struct LinesSource {
    reader: Box<dyn AsyncBufRead + Unpin + Send>,
    label: String,
    stream_name: String,
    shard_id: String,
    default_partition_key: Option<String>,
    follow: bool,
    poll_interval: Duration,
    next_sequence: u64,
    buf: Vec<u8>,
}

impl LinesSource {
    /// Open the configured file (or stdin).
    pub async fn open(config: &LinesConfig, stream_name: &str) -> Result<Self, ConnectorError> {
        if config.path == "-" {
            // stdin has no position to seek to, both settings read it from here on.
            let reader = BufReader::new(tokio::io::stdin());
            return Ok(Self::from_reader(reader, "lines:stdin".into(), config, stream_name));
        }

        let mut file = tokio::fs::File::open(&config.path)
            .await
            .map_err(|e| ConnectorError::io(format!("open {}: {e}", config.path)))?;
        if config.initial_position == InitialPosition::Latest {
            let pos = file
                .seek(SeekFrom::End(0))
                .await
                .map_err(|e| ConnectorError::io(format!("seek {}: {e}", config.path)))?;
            tracing::debug!(path = %config.path, offset = pos, "starting at end of file");
        }

        let label = format!("lines:{}", config.path);
        Ok(Self::from_reader(BufReader::new(file), label, config, stream_name))
    }

    pub fn from_reader<R>(reader: R, label: String, config: &LinesConfig, stream_name: &str) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        Self {
            reader: Box::new(reader),
            label,
            stream_name: stream_name.to_string(),
            shard_id: config.shard_id.clone(),
            default_partition_key: config.default_partition_key.clone(),
            follow: config.follow,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            next_sequence: 0,
            buf: Vec::with_capacity(4096),
        }
    }

    /// Read one complete line into `self.buf`. Returns `false` at end of
    /// input (never in follow mode).
    async fn read_line(&mut self) -> Result<bool, ConnectorError> {
        self.buf.clear();
        loop {
            let n = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .await
                .map_err(|e| ConnectorError::io(format!("{}: read: {e}", self.label)))?;

            if self.buf.last() == Some(&b'\n') {
                return Ok(true);
            }
            if !self.follow {
                // Last line without terminator still counts.
                return Ok(n > 0 || !self.buf.is_empty());
            }
            // Partial line or nothing new yet, wait for the writer.
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn build_record(&mut self, key: String, data: Vec<u8>) -> StreamRecord {
        let sequence_number = self.next_sequence.to_string();
        self.next_sequence += 1;
        StreamRecord {
            data,
            partition_key: key,
            sequence_number,
            approx_arrival_ms: now_ms(),
            stream_name: self.stream_name.clone(),
            shard_id: self.shard_id.clone(),
        }
    }
}

/// Split one line into `(partition_key, payload)`.
///
/// Returns `Ok(None)` for blank lines. The line terminator (`\n` or `\r\n`)
/// is stripped.
pub fn parse_line(
    line: &[u8],
    default_partition_key: Option<&str>,
) -> Result<Option<(String, Vec<u8>)>, ConnectorError> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.is_empty() {
        return Ok(None);
    }

    match line.iter().position(|&b| b == b'\t') {
        Some(pos) => {
            let key = std::str::from_utf8(&line[..pos])
                .map_err(|e| ConnectorError::format(format!("partition key is not UTF-8: {e}")))?;
            Ok(Some((key.to_string(), line[pos + 1..].to_vec())))
        }
        None => match default_partition_key {
            Some(key) => Ok(Some((key.to_string(), line.to_vec()))),
            None => Err(ConnectorError::format(
                "line has no partition key and no default_partition_key is configured",
            )),
        },
    }
}

impl RecordSource for LinesSource {
    fn next(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<StreamRecord>, ConnectorError>> + Send + '_>> {
        Box::pin(async move {
            loop {
                if !self.read_line().await? {
                    tracing::info!(source = %self.label, records = self.next_sequence, "end of input");
                    return Ok(None);
                }

                let line = self.next_sequence;
                match parse_line(&self.buf, self.default_partition_key.as_deref()) {
                    Ok(Some((key, data))) => return Ok(Some(self.build_record(key, data))),
                    Ok(None) => continue,
                    Err(e) => {
                        return Err(e.with_context(format!("{} after record {line}", self.label)));
                    }
                }
            }
        })
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn source_over(input: &'static [u8], config: &LinesConfig) -> LinesSource {
        LinesSource::from_reader(BufReader::new(input), "lines:test".into(), config, "in-stream")
    }

    #[test]
    fn parse_line_splits_on_first_tab() {
        let (key, data) = parse_line(b"tenant-a\t{\"a\":\"x\ty\"}\r\n", None).unwrap().unwrap();
        assert_eq!(key, "tenant-a");
        assert_eq!(data, b"{\"a\":\"x\ty\"}");
    }

    #[test]
    fn parse_line_uses_default_key() {
        let (key, data) = parse_line(b"{}\n", Some("shared")).unwrap().unwrap();
        assert_eq!(key, "shared");
        assert_eq!(data, b"{}");
        assert!(parse_line(b"{}\n", None).is_err());
        assert!(parse_line(b"\r\n", None).unwrap().is_none());
    }

    #[test]
    fn parse_line_keeps_non_utf8_payload() {
        let (_, data) = parse_line(b"t\t\xff\xfe\n", None).unwrap().unwrap();
        assert_eq!(data, vec![0xff, 0xfe]);
    }

    #[tokio::test]
    async fn reads_records_with_metadata() {
        let config = LinesConfig::default();
        let mut source = source_over(b"t1\t{\"a\":1}\n\nt2\t{\"b\":2}", &config);

        let first = source.next().await.unwrap().unwrap();
        assert_eq!(first.partition_key, "t1");
        assert_eq!(first.data, b"{\"a\":1}");
        assert_eq!(first.sequence_number, "0");
        assert_eq!(first.stream_name, "in-stream");
        assert_eq!(first.shard_id, "shardId-000000000000");
        assert!(first.approx_arrival_ms > 0);

        // The blank line is skipped; the last line has no terminator but is
        // still delivered.
        let second = source.next().await.unwrap().unwrap();
        assert_eq!(second.partition_key, "t2");
        assert_eq!(second.sequence_number, "1");

        assert!(source.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn line_without_key_is_a_format_error() {
        let config = LinesConfig::default();
        let mut source = source_over(b"t1\t{}\n{\"a\":1}\n", &config);

        assert_eq!(source.next().await.unwrap().unwrap().partition_key, "t1");
        let err = source.next().await.unwrap_err();
        assert_eq!(err.kind(), ingest_api::ErrorKind::Format);
        assert!(err.message().starts_with("lines:test after record 1"), "{err}");
    }

    #[tokio::test]
    async fn non_utf8_key_is_a_format_error() {
        let mut source = source_over(b"\xff\t{}\n", &LinesConfig::default());
        let err = source.next().await.unwrap_err();
        assert_eq!(err.kind(), ingest_api::ErrorKind::Format);
    }

    #[test]
    fn starts_at_latest_by_default() {
        assert_eq!(LinesConfig::default().initial_position, InitialPosition::Latest);
    }

    #[tokio::test]
    async fn latest_skips_existing_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "old\t{{}}").unwrap();
        file.flush().unwrap();

        let config = LinesConfig {
            path: file.path().display().to_string(),
            initial_position: InitialPosition::Latest,
            ..LinesConfig::default()
        };
        let mut source = LinesSource::open(&config, "in").await.unwrap();
        assert!(source.next().await.unwrap().is_none());

        let config = LinesConfig {
            initial_position: InitialPosition::TrimHorizon,
            ..config
        };
        let mut source = LinesSource::open(&config, "in").await.unwrap();
        let record = source.next().await.unwrap().unwrap();
        assert_eq!(record.partition_key, "old");
    }

    #[tokio::test]
    async fn follow_picks_up_appended_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let config = LinesConfig {
            path: file.path().display().to_string(),
            follow: true,
            poll_interval_ms: 10,
            ..LinesConfig::default()
        };
        let mut source = LinesSource::open(&config, "in").await.unwrap();

        let pending = tokio::spawn(async move { source.next().await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        write!(file, "late\t{{\"x\":1}}").unwrap();
        file.flush().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        writeln!(file).unwrap();
        file.flush().unwrap();

        let record = pending.await.unwrap().unwrap().unwrap();
        assert_eq!(record.partition_key, "late");
        assert_eq!(record.data, b"{\"x\":1}");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let config = LinesConfig {
            path: "/nonexistent/ingest/input.log".into(),
            ..LinesConfig::default()
        };
        let err = LinesSource::open(&config, "in").await.err().unwrap();
        assert_eq!(err.kind(), ingest_api::ErrorKind::Io);
    }
}
