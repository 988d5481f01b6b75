//! Kafka publisher
//!
//! Serializes the persisted message and sends it to the configured topic,
//! awaiting the broker acknowledgment. Transient send failures are retried
//! up to a fixed attempt bound; no idempotency key is attached, so a retry
//! after a lost ack can deliver twice (at-least-once).

use crate::config::Config;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempt bound for a single publish call
pub const MAX_PUBLISH_ATTEMPTS: usize = 3;

/// Bound on waiting for in-flight deliveries at shutdown
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Payload relayed to the topic: the stored id plus the original content
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub id: i64,
    pub content: String,
}

/// Broker seam for the relay
///
/// Production uses [`KafkaPublisher`]; tests inject fakes that fail on
/// demand.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publisher name for logging
    fn name(&self) -> &'static str;

    /// Serialize and send one message under the given key, awaiting the
    /// broker acknowledgment
    async fn publish(&self, key: &str, message: &OutboundMessage) -> Result<()>;

    /// Release the underlying connection, waiting for in-flight sends up to
    /// a bound. Safe to call once during shutdown.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Kafka-backed publisher over a [`FutureProducer`]
#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaPublisher {
    /// Build a producer from the relay configuration
    pub fn new(config: &Config) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            topic: config.kafka_topic.clone(),
        })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn publish(&self, key: &str, message: &OutboundMessage) -> Result<()> {
        let payload =
            serde_json::to_string(message).map_err(|e| RelayError::Encode(e.to_string()))?;

        let mut last_err = None;
        for attempt in 1..=MAX_PUBLISH_ATTEMPTS {
            let record = FutureRecord::to(&self.topic).key(key).payload(&payload);

            match self.producer.send(record, Duration::from_secs(0)).await {
                Ok((partition, offset)) => {
                    debug!(
                        topic = %self.topic,
                        partition,
                        offset,
                        id = message.id,
                        "Message delivered"
                    );
                    return Ok(());
                }
                Err((e, _)) => {
                    warn!(
                        topic = %self.topic,
                        attempt,
                        error = %e,
                        "Publish attempt failed"
                    );
                    last_err = Some(e);
                }
            }
        }

        let err = last_err.map(|e| e.to_string()).unwrap_or_default();
        Err(RelayError::Publish(format!(
            "all {MAX_PUBLISH_ATTEMPTS} attempts failed: {err}"
        )))
    }

    async fn shutdown(&self) -> Result<()> {
        self.producer.flush(FLUSH_TIMEOUT)?;
        Ok(())
    }
}

/// Create the topic if it does not exist
///
/// Existence is checked via cluster metadata first; the create call still
/// tolerates `TopicAlreadyExists` since another instance can win the race.
pub async fn ensure_topic(config: &Config) -> Result<()> {
    let probe: BaseConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.kafka_brokers)
        .create()?;
    let metadata =
        probe.fetch_metadata(Some(config.kafka_topic.as_str()), Duration::from_secs(5))?;
    let exists = metadata
        .topics()
        .iter()
        .any(|t| t.name() == config.kafka_topic && !t.partitions().is_empty());
    if exists {
        info!(topic = %config.kafka_topic, "Topic already exists");
        return Ok(());
    }

    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", &config.kafka_brokers)
        .create()?;
    let new_topic = NewTopic::new(
        &config.kafka_topic,
        config.topic_partitions,
        TopicReplication::Fixed(config.topic_replication),
    );
    let results = admin
        .create_topics([&new_topic], &AdminOptions::new())
        .await?;

    for result in results {
        match result {
            Ok(topic) => info!(%topic, "Topic created"),
            Err((topic, code)) => {
                if code == RDKafkaErrorCode::TopicAlreadyExists {
                    info!(%topic, "Topic already exists");
                } else {
                    return Err(KafkaError::AdminOp(code).into());
                }
            }
        }
    }

    Ok(())
}
