use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::messaging::errors::MessagingResult;
use crate::messaging::topics::TopicSpec;

/// One record read from a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

/// Publishing side of the broker, shared by the orchestrator and every consumer loop
#[async_trait]
pub trait TopicProducer: Send + Sync {
    /// Hand a record to the client's buffer
    async fn produce(&self, topic: &str, key: &[u8], payload: &[u8]) -> MessagingResult<()>;

    /// Wait until buffered records have left the process, bounded by `timeout`
    async fn flush(&self, timeout: Duration) -> MessagingResult<()>;
}

/// A subscription owned by exactly one consumer loop
#[async_trait]
pub trait TopicConsumer: Send {
    async fn subscribe(&mut self, topic: &str) -> MessagingResult<()>;

    /// Next record, or `MessagingError::ReadTimeout` when none arrives in time
    async fn read_message(&mut self, timeout: Duration) -> MessagingResult<BrokerRecord>;

    /// Mark the record as processed
    async fn acknowledge(&mut self, record: &BrokerRecord) -> MessagingResult<()>;

    /// Leave the record unprocessed so a later read returns it again
    async fn redeliver(&mut self, record: BrokerRecord) -> MessagingResult<()>;

    async fn close(&mut self) -> MessagingResult<()>;
}

/// Topic administration used at bootstrap
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    async fn existing_topics(&self) -> MessagingResult<HashSet<String>>;

    async fn create_topics(&self, specs: &[TopicSpec]) -> MessagingResult<()>;
}

/// Entry point to a broker backend
pub trait BrokerClient: Send + Sync {
    fn producer(&self) -> Arc<dyn TopicProducer>;

    fn admin(&self) -> Arc<dyn TopicAdmin>;

    /// A fresh consumer in the given consumer group
    fn consumer(&self, group_id: &str) -> MessagingResult<Box<dyn TopicConsumer>>;
}
