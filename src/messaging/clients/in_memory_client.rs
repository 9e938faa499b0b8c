//! # In-Memory Broker
//!
//! In-process broker for tests and local runs. Each topic is a queue shared by
//! the consumers subscribed to it, so one consumer group per topic is the
//! supported shape. Produced records are also kept in a history that tests can
//! inspect after the queue has been drained.
//!
//! Failures can be injected per topic with [`InMemoryBroker::inject`].

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::traits::{BrokerClient, BrokerRecord, TopicAdmin, TopicConsumer, TopicProducer};
use crate::messaging::errors::{MessagingError, MessagingResult};
use crate::messaging::topics::TopicSpec;

/// A one-shot failure for the next matching call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerFault {
    Produce { topic: String },
    Flush,
    Subscribe { topic: String },
    Read { topic: String },
}

#[derive(Debug, Default)]
struct TopicLog {
    queue: Mutex<VecDeque<BrokerRecord>>,
    notify: Notify,
    next_offset: Mutex<i64>,
}

impl TopicLog {
    fn append(&self, topic: &str, key: &[u8], payload: &[u8]) -> BrokerRecord {
        let offset = {
            let mut next = self.next_offset.lock();
            let offset = *next;
            *next += 1;
            offset
        };
        let record = BrokerRecord {
            topic: topic.to_string(),
            partition: 0,
            offset,
            key: Some(key.to_vec()),
            payload: payload.to_vec(),
        };
        self.queue.lock().push_back(record.clone());
        self.notify.notify_one();
        record
    }
}

#[derive(Debug, Default)]
struct BrokerInner {
    topics: DashMap<String, Arc<TopicLog>>,
    specs: DashMap<String, TopicSpec>,
    history: Mutex<Vec<BrokerRecord>>,
    faults: Mutex<Vec<BrokerFault>>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&self, fault: BrokerFault) {
        self.inner.faults.lock().push(fault);
    }

    /// Injected faults that have not fired yet
    pub fn pending_faults(&self) -> usize {
        self.inner.faults.lock().len()
    }

    fn take_fault(&self, fault: &BrokerFault) -> bool {
        let mut faults = self.inner.faults.lock();
        match faults.iter().position(|f| f == fault) {
            Some(index) => {
                faults.remove(index);
                true
            }
            None => false,
        }
    }

    fn log(&self, topic: &str) -> Arc<TopicLog> {
        Arc::clone(
            self.inner
                .topics
                .entry(topic.to_string())
                .or_default()
                .value(),
        )
    }

    /// Every record ever produced to `topic`, consumed or not
    pub fn published(&self, topic: &str) -> Vec<BrokerRecord> {
        self.inner
            .history
            .lock()
            .iter()
            .filter(|r| r.topic == topic)
            .cloned()
            .collect()
    }

    /// Records waiting to be read from `topic`
    pub fn pending(&self, topic: &str) -> usize {
        self.inner
            .topics
            .get(topic)
            .map(|log| log.queue.lock().len())
            .unwrap_or(0)
    }

    /// Specs passed to `create_topics`, by name
    pub fn created_topic(&self, name: &str) -> Option<TopicSpec> {
        self.inner.specs.get(name).map(|spec| spec.value().clone())
    }
}

#[async_trait]
impl TopicProducer for InMemoryBroker {
    async fn produce(&self, topic: &str, key: &[u8], payload: &[u8]) -> MessagingResult<()> {
        if self.take_fault(&BrokerFault::Produce {
            topic: topic.to_string(),
        }) {
            return Err(MessagingError::produce(topic, "injected produce failure"));
        }

        let record = self.log(topic).append(topic, key, payload);
        self.inner.history.lock().push(record);
        Ok(())
    }

    async fn flush(&self, timeout: Duration) -> MessagingResult<()> {
        if self.take_fault(&BrokerFault::Flush) {
            return Err(MessagingError::flush(
                timeout.as_millis() as u64,
                "injected flush failure",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl TopicAdmin for InMemoryBroker {
    async fn existing_topics(&self) -> MessagingResult<HashSet<String>> {
        Ok(self
            .inner
            .specs
            .iter()
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn create_topics(&self, specs: &[TopicSpec]) -> MessagingResult<()> {
        for spec in specs {
            self.inner.specs.insert(spec.name.clone(), spec.clone());
            self.log(&spec.name);
        }
        Ok(())
    }
}

impl BrokerClient for InMemoryBroker {
    fn producer(&self) -> Arc<dyn TopicProducer> {
        Arc::new(self.clone())
    }

    fn admin(&self) -> Arc<dyn TopicAdmin> {
        Arc::new(self.clone())
    }

    /// Every consumer shares the topic queue; groups are not modelled
    fn consumer(&self, _group_id: &str) -> MessagingResult<Box<dyn TopicConsumer>> {
        Ok(Box::new(InMemoryConsumer {
            broker: self.clone(),
            subscription: None,
        }))
    }
}

pub struct InMemoryConsumer {
    broker: InMemoryBroker,
    subscription: Option<(String, Arc<TopicLog>)>,
}

#[async_trait]
impl TopicConsumer for InMemoryConsumer {
    async fn subscribe(&mut self, topic: &str) -> MessagingResult<()> {
        if self.broker.take_fault(&BrokerFault::Subscribe {
            topic: topic.to_string(),
        }) {
            return Err(MessagingError::subscribe(topic, "injected subscribe failure"));
        }
        self.subscription = Some((topic.to_string(), self.broker.log(topic)));
        Ok(())
    }

    async fn read_message(&mut self, timeout: Duration) -> MessagingResult<BrokerRecord> {
        let (topic, log) = self
            .subscription
            .as_ref()
            .ok_or(MessagingError::NotSubscribed)?;

        if self.broker.take_fault(&BrokerFault::Read {
            topic: topic.clone(),
        }) {
            return Err(MessagingError::consumer(topic.as_str(), "injected read failure"));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let next = log.queue.lock().pop_front();
            if let Some(record) = next {
                return Ok(record);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero()
                || tokio::time::timeout(remaining, log.notify.notified())
                    .await
                    .is_err()
            {
                return Err(MessagingError::read_timeout(
                    topic.as_str(),
                    timeout.as_millis() as u64,
                ));
            }
        }
    }

    async fn acknowledge(&mut self, _record: &BrokerRecord) -> MessagingResult<()> {
        Ok(())
    }

    async fn redeliver(&mut self, record: BrokerRecord) -> MessagingResult<()> {
        let (_, log) = self
            .subscription
            .as_ref()
            .ok_or(MessagingError::NotSubscribed)?;
        log.queue.lock().push_front(record);
        log.notify.notify_one();
        Ok(())
    }

    async fn close(&mut self) -> MessagingResult<()> {
        self.subscription = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::topics::Topic;

    #[tokio::test]
    async fn test_produce_then_read() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.consumer("event.prod-group").unwrap();
        consumer.subscribe("event.prod").await.unwrap();

        broker.produce("event.prod", b"key", b"payload").await.unwrap();
        let record = consumer.read_message(Duration::from_millis(50)).await.unwrap();

        assert_eq!(record.payload, b"payload");
        assert_eq!(record.key.as_deref(), Some(&b"key"[..]));
        assert_eq!(broker.pending("event.prod"), 0);
        assert_eq!(broker.published("event.prod").len(), 1);
    }

    #[tokio::test]
    async fn test_read_times_out_when_idle() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.consumer("event.retry-group").unwrap();
        consumer.subscribe("event.retry").await.unwrap();

        let err = consumer
            .read_message(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_reader_wakes_on_produce() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.consumer("g").unwrap();
        consumer.subscribe("event.express").await.unwrap();

        let producer = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.produce("event.express", b"k", b"late").await.unwrap();
        });

        let record = consumer.read_message(Duration::from_secs(2)).await.unwrap();
        assert_eq!(record.payload, b"late");
    }

    #[tokio::test]
    async fn test_redeliver_returns_record_first() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.consumer("g").unwrap();
        consumer.subscribe("event.dlq").await.unwrap();
        broker.produce("event.dlq", b"a", b"first").await.unwrap();
        broker.produce("event.dlq", b"b", b"second").await.unwrap();

        let first = consumer.read_message(Duration::from_millis(50)).await.unwrap();
        consumer.redeliver(first).await.unwrap();
        let again = consumer.read_message(Duration::from_millis(50)).await.unwrap();
        assert_eq!(again.payload, b"first");
    }

    #[tokio::test]
    async fn test_injected_faults_fire_once() {
        let broker = InMemoryBroker::new();
        broker.inject(BrokerFault::Produce {
            topic: "event.retry".to_string(),
        });

        assert!(broker.produce("event.retry", b"k", b"v").await.is_err());
        assert!(broker.produce("event.retry", b"k", b"v").await.is_ok());

        let mut consumer = broker.consumer("g").unwrap();
        assert!(matches!(
            consumer.read_message(Duration::from_millis(1)).await,
            Err(MessagingError::NotSubscribed)
        ));
    }

    #[tokio::test]
    async fn test_admin_reports_created_topics() {
        let broker = InMemoryBroker::new();
        assert!(broker.existing_topics().await.unwrap().is_empty());

        broker.create_topics(&[Topic::Retry.spec(1)]).await.unwrap();
        let existing = broker.existing_topics().await.unwrap();
        assert!(existing.contains("event.retry"));
        assert_eq!(broker.created_topic("event.retry").unwrap().partitions, 20);
    }
}
