//! Kafka backend built on `rdkafka`.
//!
//! Producer settings: lz4 compression, 5 ms linger, leader acknowledgement,
//! up to 10 client retries. Consumers join `{topic}-group`, start from the
//! latest offset and auto-commit only offsets stored by `acknowledge`, so a
//! record that is redelivered is never committed past.

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message as _;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::Offset;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::traits::{BrokerClient, BrokerRecord, TopicAdmin, TopicConsumer, TopicProducer};
use crate::config::QueueConfig;
use crate::messaging::errors::{MessagingError, MessagingResult};
use crate::messaging::topics::TopicSpec;

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct KafkaBroker {
    host: String,
    producer: Arc<KafkaProducer>,
    admin: Arc<KafkaAdmin>,
}

impl KafkaBroker {
    pub fn connect(config: &QueueConfig) -> MessagingResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.host)
            .set("compression.type", "lz4")
            .set("linger.ms", "5")
            .set("acks", "1")
            .set("retries", "10")
            .set(
                "message.timeout.ms",
                config.producer_flush_ttl_ms.max(1_000).to_string(),
            )
            .create()
            .map_err(|e| MessagingError::configuration("kafka.producer", e.to_string()))?;

        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &config.host)
            .set(
                "socket.timeout.ms",
                config.admin_timeout().as_millis().to_string(),
            )
            .create()
            .map_err(|e| MessagingError::configuration("kafka.admin", e.to_string()))?;

        info!(host = %config.host, "📤 Kafka clients created");

        Ok(Self {
            host: config.host.clone(),
            producer: Arc::new(KafkaProducer {
                producer,
                send_timeout: config.producer_flush_timeout(),
            }),
            admin: Arc::new(KafkaAdmin {
                client: Arc::new(admin_client),
                operation_timeout: config.admin_timeout(),
                metadata_timeout: config.metadata_timeout(),
            }),
        })
    }
}

impl BrokerClient for KafkaBroker {
    fn producer(&self) -> Arc<dyn TopicProducer> {
        Arc::clone(&self.producer) as Arc<dyn TopicProducer>
    }

    fn admin(&self) -> Arc<dyn TopicAdmin> {
        Arc::clone(&self.admin) as Arc<dyn TopicAdmin>
    }

    fn consumer(&self, group_id: &str) -> MessagingResult<Box<dyn TopicConsumer>> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.host)
            .set("group.id", group_id)
            .set("auto.offset.reset", "latest")
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .create()
            .map_err(|e| MessagingError::configuration("kafka.consumer", e.to_string()))?;

        Ok(Box::new(KafkaConsumer {
            consumer,
            topic: None,
        }))
    }
}

pub struct KafkaProducer {
    producer: FutureProducer,
    send_timeout: Duration,
}

#[async_trait]
impl TopicProducer for KafkaProducer {
    async fn produce(&self, topic: &str, key: &[u8], payload: &[u8]) -> MessagingResult<()> {
        let record = FutureRecord::to(topic).payload(payload).key(key);

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map_err(|(e, _)| MessagingError::produce(topic, e.to_string()))?;

        debug!(topic, partition, offset, "Record delivered");
        Ok(())
    }

    async fn flush(&self, timeout: Duration) -> MessagingResult<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| MessagingError::flush(timeout.as_millis() as u64, e.to_string()))?
            .map_err(|e| MessagingError::flush(timeout.as_millis() as u64, e.to_string()))
    }
}

pub struct KafkaAdmin {
    client: Arc<AdminClient<DefaultClientContext>>,
    operation_timeout: Duration,
    metadata_timeout: Duration,
}

#[async_trait]
impl TopicAdmin for KafkaAdmin {
    async fn existing_topics(&self) -> MessagingResult<HashSet<String>> {
        let client = Arc::clone(&self.client);
        let timeout = self.metadata_timeout;
        tokio::task::spawn_blocking(move || -> MessagingResult<HashSet<String>> {
            let metadata = client
                .inner()
                .fetch_metadata(None, Timeout::After(timeout))
                .map_err(|e| MessagingError::admin("fetch_metadata", e.to_string()))?;
            Ok(metadata
                .topics()
                .iter()
                .map(|topic| topic.name().to_string())
                .collect())
        })
        .await
        .map_err(|e| MessagingError::admin("fetch_metadata", e.to_string()))?
    }

    async fn create_topics(&self, specs: &[TopicSpec]) -> MessagingResult<()> {
        let new_topics: Vec<NewTopic<'_>> = specs
            .iter()
            .map(|spec| {
                spec.config.iter().fold(
                    NewTopic::new(
                        &spec.name,
                        spec.partitions,
                        TopicReplication::Fixed(spec.replication_factor),
                    ),
                    |topic, (key, value)| topic.set(key, value),
                )
            })
            .collect();

        let options =
            AdminOptions::new().operation_timeout(Some(Timeout::After(self.operation_timeout)));

        let results = self
            .client
            .create_topics(&new_topics, &options)
            .await
            .map_err(|e| MessagingError::admin("create_topics", e.to_string()))?;

        for result in results {
            match result {
                Ok(name) => info!(topic = %name, "Topic created"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!(topic = %name, "Topic already exists")
                }
                Err((name, code)) => {
                    return Err(MessagingError::admin(
                        "create_topics",
                        format!("{name}: {code}"),
                    ))
                }
            }
        }
        Ok(())
    }
}

pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topic: Option<String>,
}

#[async_trait]
impl TopicConsumer for KafkaConsumer {
    async fn subscribe(&mut self, topic: &str) -> MessagingResult<()> {
        self.consumer
            .subscribe(&[topic])
            .map_err(|e| MessagingError::subscribe(topic, e.to_string()))?;
        self.topic = Some(topic.to_string());
        Ok(())
    }

    async fn read_message(&mut self, timeout: Duration) -> MessagingResult<BrokerRecord> {
        let topic = self.topic.as_deref().ok_or(MessagingError::NotSubscribed)?;

        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Err(MessagingError::read_timeout(
                topic,
                timeout.as_millis() as u64,
            )),
            Ok(Err(e)) => Err(MessagingError::consumer(topic, e.to_string())),
            Ok(Ok(message)) => Ok(BrokerRecord {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message.key().map(<[u8]>::to_vec),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            }),
        }
    }

    async fn acknowledge(&mut self, record: &BrokerRecord) -> MessagingResult<()> {
        // stored offset is the next one to read
        self.consumer
            .store_offset(&record.topic, record.partition, record.offset + 1)
            .map_err(|e| MessagingError::consumer(record.topic.as_str(), e.to_string()))
    }

    async fn redeliver(&mut self, record: BrokerRecord) -> MessagingResult<()> {
        self.consumer
            .seek(
                &record.topic,
                record.partition,
                Offset::Offset(record.offset),
                Timeout::After(SEEK_TIMEOUT),
            )
            .map_err(|e| MessagingError::consumer(record.topic.as_str(), e.to_string()))
    }

    async fn close(&mut self) -> MessagingResult<()> {
        self.consumer.unsubscribe();
        self.topic = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_metadata_fetch_leaves_the_runtime_free() {
        let config = QueueConfig {
            host: "127.0.0.1:1".to_string(),
            metadata_timeout_seconds: 1,
            ..QueueConfig::default()
        };
        let broker = KafkaBroker::connect(&config).unwrap();

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        let result = broker.admin().existing_topics().await;
        ticker.abort();

        assert!(matches!(result, Err(MessagingError::Admin { .. })));
        assert!(ticks.load(Ordering::SeqCst) > 10);
    }
}
