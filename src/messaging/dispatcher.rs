//! # Dispatcher
//!
//! Thin publishing facade over a [`TopicProducer`]. Every publish is a produce
//! followed by a flush bounded by the configured flush timeout, so a caller
//! that gets `Ok` knows the record left the process.

use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use super::clients::{BrokerRecord, TopicProducer};
use super::envelope::Envelope;
use super::errors::MessagingResult;
use crate::constants::operations;
use crate::logging::log_queue_operation;

#[derive(Clone)]
pub struct Dispatcher {
    producer: Arc<dyn TopicProducer>,
    flush_timeout: Duration,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("flush_timeout", &self.flush_timeout)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(producer: Arc<dyn TopicProducer>, flush_timeout: Duration) -> Self {
        Self {
            producer,
            flush_timeout,
        }
    }

    /// Produce raw bytes and wait for the flush
    pub async fn produce(&self, topic: &str, key: &[u8], payload: &[u8]) -> MessagingResult<()> {
        self.producer.produce(topic, key, payload).await?;
        self.producer.flush(self.flush_timeout).await?;
        log_queue_operation(
            operations::QUEUE_PRODUCE,
            topic,
            "flushed",
            Some(&format!("{} bytes", payload.len())),
        );
        Ok(())
    }

    /// Publish an envelope keyed by its content hash
    #[instrument(skip(self, envelope), fields(message_id = envelope.message_id, outbox_id = envelope.outbox_id))]
    pub async fn publish(&self, topic: &str, envelope: &Envelope) -> MessagingResult<()> {
        let payload = envelope.to_bytes()?;
        self.produce(topic, envelope.key(), &payload).await
    }

    /// Republish a consumed record to another topic, payload and key unchanged
    pub async fn forward(&self, topic: &str, record: &BrokerRecord) -> MessagingResult<()> {
        let key = record.key.as_deref().unwrap_or_default();
        self.produce(topic, key, &record.payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::clients::{BrokerFault, InMemoryBroker};
    use crate::state_machine::MessageStatus;

    fn envelope() -> Envelope {
        Envelope {
            tenant_id: 1,
            message_id: 2,
            outbox_id: 3,
            channel: "event.prod".to_string(),
            mobile: "09121234567".to_string(),
            message_text: "hello".to_string(),
            message_hash: "a".repeat(64),
            status: MessageStatus::Queued,
        }
    }

    #[tokio::test]
    async fn test_publish_keys_by_hash() {
        let broker = InMemoryBroker::new();
        let dispatcher = Dispatcher::new(Arc::new(broker.clone()), Duration::from_millis(100));

        dispatcher.publish("event.prod", &envelope()).await.unwrap();

        let records = broker.published("event.prod");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key.as_deref(), Some("a".repeat(64).as_bytes()));
        assert_eq!(Envelope::from_bytes(&records[0].payload).unwrap(), envelope());
    }

    #[tokio::test]
    async fn test_forward_is_verbatim() {
        let broker = InMemoryBroker::new();
        let dispatcher = Dispatcher::new(Arc::new(broker.clone()), Duration::from_millis(100));
        let record = BrokerRecord {
            topic: "event.prod".to_string(),
            partition: 4,
            offset: 99,
            key: Some(b"hash".to_vec()),
            payload: b"not even json".to_vec(),
        };

        dispatcher.forward("event.retry", &record).await.unwrap();

        let forwarded = &broker.published("event.retry")[0];
        assert_eq!(forwarded.payload, record.payload);
        assert_eq!(forwarded.key, record.key);
    }

    #[tokio::test]
    async fn test_flush_failure_surfaces() {
        let broker = InMemoryBroker::new();
        broker.inject(BrokerFault::Flush);
        let dispatcher = Dispatcher::new(Arc::new(broker), Duration::from_millis(100));

        assert!(dispatcher.publish("event.prod", &envelope()).await.is_err());
    }
}
