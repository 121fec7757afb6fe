use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use spinneret_core::{CrawlResult, CrawlSink};

/// Collects results in memory. Useful in tests and for small crawls where
/// the caller wants everything at the end.
#[derive(Debug, Default)]
pub struct MemorySink {
    results: Mutex<Vec<CrawlResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<CrawlResult> {
        self.results.lock().expect("sink poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.results.lock().expect("sink poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CrawlSink for MemorySink {
    async fn deliver(&self, result: CrawlResult) -> anyhow::Result<()> {
        self.results.lock().expect("sink poisoned").push(result);
        Ok(())
    }
}

/// Writes one JSON object per line. Writes from concurrent engines are
/// serialized behind the writer lock, so lines never interleave.
pub struct JsonLinesSink {
    writer: tokio::sync::Mutex<BufWriter<Box<dyn AsyncWrite + Send + Unpin>>>,
}

impl JsonLinesSink {
    pub fn stdout() -> Self {
        Self {
            writer: tokio::sync::Mutex::new(BufWriter::new(Box::new(tokio::io::stdout()))),
        }
    }

    pub async fn create(path: &Path) -> anyhow::Result<Self> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Self {
            writer: tokio::sync::Mutex::new(BufWriter::new(Box::new(file))),
        })
    }

    pub async fn flush(&self) -> anyhow::Result<()> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl CrawlSink for JsonLinesSink {
    async fn deliver(&self, result: CrawlResult) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(&result)?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        // Streaming consumers read line by line; don't sit on buffered lines.
        writer.flush().await?;
        Ok(())
    }
}
