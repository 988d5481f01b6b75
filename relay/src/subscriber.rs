//! Buffered topic subscriber
//!
//! A single long-lived task reads the topic one message at a time and
//! appends to an in-memory buffer; `GET /api/consume` drains the buffer
//! wholesale. Ingestion is push-driven and consumption is pull-driven, so
//! the hand-off needs exactly one guarantee: append and drain never
//! interleave partially. One mutex guards both.

use crate::config::Config;
use crate::error::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// One topic message as received: key plus opaque payload, arrival ordered
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub key: String,
    pub value: Bytes,
}

/// Thread-safe message buffer with wholesale drain
///
/// Unbounded: entries accumulate until the next drain. Drain swaps the
/// buffer for an empty one under the lock, so callers see every entry
/// exactly once regardless of concurrent appends.
#[derive(Default)]
pub struct MessageBuffer {
    entries: Mutex<Vec<QueueEntry>>,
    metrics: BufferMetrics,
}

/// Counters for buffer monitoring
#[derive(Default)]
struct BufferMetrics {
    /// Total entries appended
    appended: AtomicU64,
    /// Total entries drained
    drained: AtomicU64,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry
    ///
    /// The lock is held only for the push, never across I/O.
    pub fn append(&self, entry: QueueEntry) {
        self.entries.lock().push(entry);
        self.metrics.appended.fetch_add(1, Ordering::Relaxed);
    }

    /// Take every buffered entry, leaving the buffer empty
    ///
    /// Returns entries in arrival order.
    pub fn drain(&self) -> Vec<QueueEntry> {
        let entries = std::mem::take(&mut *self.entries.lock());
        self.metrics
            .drained
            .fetch_add(entries.len() as u64, Ordering::Relaxed);
        entries
    }

    /// Current number of buffered entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Total entries appended over the buffer's lifetime
    pub fn total_appended(&self) -> u64 {
        self.metrics.appended.load(Ordering::Relaxed)
    }

    /// Total entries drained over the buffer's lifetime
    pub fn total_drained(&self) -> u64 {
        self.metrics.drained.load(Ordering::Relaxed)
    }
}

/// Topic subscriber feeding a [`MessageBuffer`]
pub struct Subscriber {
    consumer: StreamConsumer,
    buffer: Arc<MessageBuffer>,
}

impl Subscriber {
    /// Create a consumer subscribed to the configured topic
    pub fn new(config: &Config) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_brokers)
            .set("group.id", &config.kafka_group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .create()?;

        consumer.subscribe(&[config.kafka_topic.as_str()])?;

        Ok(Self {
            consumer,
            buffer: Arc::new(MessageBuffer::new()),
        })
    }

    /// Shared handle to the buffer this subscriber fills
    pub fn buffer(&self) -> Arc<MessageBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Read messages until cancellation or a read error
    ///
    /// A read error is terminal for the loop: it is logged and the task
    /// exits without restarting. Buffered-but-undrained entries are
    /// discarded with the process; the buffer promises no persistence.
    /// Dropping the consumer on exit releases the subscription.
    pub async fn run(self, cancel: CancellationToken) {
        info!("Subscriber started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Subscriber shutting down");
                    break;
                }
                result = self.consumer.recv() => match result {
                    Ok(msg) => {
                        let key = msg
                            .key()
                            .map(|k| String::from_utf8_lossy(k).into_owned())
                            .unwrap_or_default();
                        let value = Bytes::copy_from_slice(msg.payload().unwrap_or_default());
                        debug!(key = %key, bytes = value.len(), "Message buffered");
                        self.buffer.append(QueueEntry { key, value });
                    }
                    Err(e) => {
                        error!(error = %e, "Subscriber read failed, stopping");
                        break;
                    }
                },
            }
        }
    }
}
