use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use ingest_api::{ConnectorError, EnrichedRecord, RecordSink};

fn default_path() -> String {
    "-".into()
}
fn default_append() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileSinkConfig {
    /// Output file. `-` = stdout.
    #[serde(default = "default_path")]
    pub path: String,
    /// Append to an existing file instead of truncating it.
    #[serde(default = "default_append")]
    pub append: bool,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            append: default_append(),
        }
    }
}

/// Line-delimited sink. Records already carry their newline, so they are
/// written verbatim.
pub struct FileSink {
    writer: Mutex<BufWriter<Box<dyn AsyncWrite + Unpin + Send>>>,
    label: String,
    written: AtomicU64,
}

impl FileSink {
    pub async fn open(config: &FileSinkConfig) -> Result<Self, ConnectorError> {
        if config.path == "-" {
            return Ok(Self::from_writer(tokio::io::stdout(), "file:stdout".into()));
        }

        let path = Path::new(&config.path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConnectorError::io(format!("mkdir {}: {e}", parent.display())))?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(config.append)
            .truncate(!config.append)
            .open(path)
            .await
            .map_err(|e| ConnectorError::io(format!("open {}: {e}", config.path)))?;

        tracing::info!(path = %config.path, append = config.append, "file sink opened");
        Ok(Self::from_writer(file, format!("file:{}", config.path)))
    }

    pub fn from_writer<W>(writer: W, label: String) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer: Box<dyn AsyncWrite + Unpin + Send> = Box::new(writer);
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            label,
            written: AtomicU64::new(0),
        }
    }

    /// Records accepted so far.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

impl RecordSink for FileSink {
    fn send(
        &self,
        record: EnrichedRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), ConnectorError>> + Send + '_>> {
        Box::pin(async move {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(record.as_bytes())
                .await
                .map_err(|e| ConnectorError::io(format!("{}: write: {e}", self.label)))?;
            self.written.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    }

    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), ConnectorError>> + Send + '_>> {
        Box::pin(async move {
            let mut writer = self.writer.lock().await;
            writer
                .flush()
                .await
                .map_err(|e| ConnectorError::io(format!("{}: flush: {e}", self.label)))?;
            tracing::debug!(sink = %self.label, written = self.written(), "flushed");
            Ok(())
        })
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(line: &str) -> EnrichedRecord {
        EnrichedRecord::new(line.to_string())
    }

    #[tokio::test]
    async fn writes_lines_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/records.jsonl");
        let config = FileSinkConfig {
            path: path.display().to_string(),
            append: true,
        };

        let sink = FileSink::open(&config).await.unwrap();
        sink.send(record("{\"a\":1}")).await.unwrap();
        sink.send(record("{\"b\":2}\n")).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(sink.written(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"a\":1}\n{\"b\":2}\n");
    }

    #[tokio::test]
    async fn append_and_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        std::fs::write(&path, "existing\n").unwrap();

        let config = FileSinkConfig {
            path: path.display().to_string(),
            append: true,
        };
        let sink = FileSink::open(&config).await.unwrap();
        sink.send(record("new")).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "existing\nnew\n");

        let config = FileSinkConfig {
            append: false,
            ..config
        };
        let sink = FileSink::open(&config).await.unwrap();
        sink.send(record("fresh")).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fresh\n");
    }
}
