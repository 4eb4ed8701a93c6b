//! Batch sources
//!
//! A batch is one delivery from the partitioned log: an ordered list of
//! records, each wrapping one base64 envelope. Sources yield batches to the
//! delivery loop; the ingest API builds them from request bodies instead.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

// ============================================================================
// Wire Shapes
// ============================================================================

/// One record of a log delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Base64 envelope. Missing data decodes as an empty envelope and fails
    /// that record alone.
    #[serde(default)]
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
}

impl LogRecord {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            partition_key: None,
            sequence_number: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub kinesis: LogRecord,
}

/// A log delivery event: `{"Records":[{"kinesis":{...}}, ...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<DeliveryRecord>,
}

// ============================================================================
// Envelope Batch
// ============================================================================

/// Ordered batch of log records handed to the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeBatch {
    pub records: Vec<LogRecord>,
}

impl EnvelopeBatch {
    pub fn new(records: Vec<LogRecord>) -> Self {
        Self { records }
    }

    /// Batch of bare base64 payloads with no log metadata.
    pub fn from_payloads<I, S>(payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(payloads.into_iter().map(LogRecord::new).collect())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_event(self) -> DeliveryEvent {
        DeliveryEvent {
            records: self
                .records
                .into_iter()
                .map(|kinesis| DeliveryRecord { kinesis })
                .collect(),
        }
    }
}

impl From<DeliveryEvent> for EnvelopeBatch {
    fn from(event: DeliveryEvent) -> Self {
        Self::new(event.records.into_iter().map(|r| r.kinesis).collect())
    }
}

// ============================================================================
// Source Trait
// ============================================================================

/// Events produced by a batch source.
pub enum BatchEvent {
    Batch(EnvelopeBatch),
    /// Source reached end of data
    Eof,
}

/// Trait abstracting where batches come from.
///
/// The delivery loop calls [`next_batch`](BatchSource::next_batch) in a
/// `select!` with cancellation.
#[async_trait]
pub trait BatchSource: Send + 'static {
    /// Read the next batch. Returns `BatchEvent::Eof` when no more data is
    /// available and `Err` on unrecoverable read errors.
    async fn next_batch(&mut self) -> Result<BatchEvent>;

    /// Human-readable name for logging
    fn source_name(&self) -> &str;
}

// ============================================================================
// JSON Lines Source (stdin)
// ============================================================================

/// Reads one delivery event JSON per line.
///
/// Used with the load generator:
/// `load-generator --count 1000 | telemetry-scorer --stdin`
pub struct JsonLinesSource<R> {
    reader: R,
    line_buffer: String,
    name: &'static str,
}

/// Delivery events from standard input.
pub type StdinSource = JsonLinesSource<BufReader<Stdin>>;

impl StdinSource {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R, name: &'static str) -> Self {
        Self {
            reader,
            line_buffer: String::with_capacity(4096),
            name,
        }
    }
}

#[async_trait]
impl<R> BatchSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn next_batch(&mut self) -> Result<BatchEvent> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(BatchEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<DeliveryEvent>(line) {
                Ok(event) => return Ok(BatchEvent::Batch(event.into())),
                Err(e) => {
                    // Skip malformed lines and keep reading
                    tracing::warn!(source = self.name, "Failed to parse delivery event: {}", e);
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        self.name
    }
}

// ============================================================================
// Replay Source
// ============================================================================

/// Replays pre-built batches with an optional delay between them.
pub struct ReplaySource {
    batches: std::vec::IntoIter<EnvelopeBatch>,
    delay_ms: u64,
    yielded_first: bool,
}

impl ReplaySource {
    pub fn new(batches: Vec<EnvelopeBatch>, delay_ms: u64) -> Self {
        Self {
            batches: batches.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }
}

#[async_trait]
impl BatchSource for ReplaySource {
    async fn next_batch(&mut self) -> Result<BatchEvent> {
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.batches.next() {
            Some(b) => {
                self.yielded_first = true;
                Ok(BatchEvent::Batch(b))
            }
            None => Ok(BatchEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &str = r#"{"Records":[{"kinesis":{"data":"eyJ9","partitionKey":"dev-1","sequenceNumber":"49590338271490256608559692538361571095921575989136588898"}},{"kinesis":{"data":"e30="}}]}"#;

    #[test]
    fn test_delivery_event_shape() {
        let event: DeliveryEvent = serde_json::from_str(EVENT).unwrap();
        let batch = EnvelopeBatch::from(event.clone());
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.records[0].partition_key.as_deref(), Some("dev-1"));
        assert_eq!(batch.records[1].sequence_number, None);
        assert_eq!(batch.into_event(), event);
    }

    #[test]
    fn test_record_without_data_is_kept() {
        let event: DeliveryEvent =
            serde_json::from_str(r#"{"Records":[{"kinesis":{"partitionKey":"x"}}]}"#).unwrap();
        let batch = EnvelopeBatch::from(event);
        assert_eq!(batch.records[0].data, "");
    }

    #[tokio::test]
    async fn test_json_lines_skips_blank_and_malformed_lines() {
        let input = format!("\n{{not json\n{EVENT}\n\n");
        let mut source = JsonLinesSource::new(BufReader::new(std::io::Cursor::new(input.into_bytes())), "test");

        match source.next_batch().await.unwrap() {
            BatchEvent::Batch(b) => assert_eq!(b.len(), 2),
            BatchEvent::Eof => panic!("expected a batch"),
        }
        assert!(matches!(source.next_batch().await.unwrap(), BatchEvent::Eof));
        assert_eq!(source.source_name(), "test");
    }

    #[tokio::test]
    async fn test_replay_source_yields_in_order() {
        let mut source = ReplaySource::new(
            vec![
                EnvelopeBatch::from_payloads(["a"]),
                EnvelopeBatch::from_payloads(["b", "c"]),
            ],
            0,
        );
        let mut sizes = Vec::new();
        while let BatchEvent::Batch(b) = source.next_batch().await.unwrap() {
            sizes.push(b.len());
        }
        assert_eq!(sizes, vec![1, 2]);
    }
}
