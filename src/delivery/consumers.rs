//! # Consumer Group
//!
//! One long-running loop per enabled topic. Each loop owns its consumer
//! handle, reads with the configured poll timeout and stops when the shared
//! shutdown channel fires. Work for a record already read always completes
//! before the loop looks at the shutdown signal again.
//!
//! - channel topics (`event.prod`, `event.express`): deliver once; on any
//!   failure forward the record unchanged to `event.retry`
//! - `event.retry`: up to `max_attempts - 1` delayed deliveries, then record
//!   the attempt count and forward to `event.dlq`
//! - `event.dlq`: mark the message and outbox `failed`
//!
//! A record whose forward or terminal status write fails is handed back to
//! the consumer for redelivery, one read timeout later, instead of being
//! acknowledged.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::status_coordinator::StatusCoordinator;
use crate::config::QueueConfig;
use crate::constants::{operations, topics};
use crate::error::{SmsGateError, SmsGateResult};
use crate::ledger::LedgerStore;
use crate::logging::{log_delivery_operation, log_error};
use crate::messaging::{BrokerClient, BrokerRecord, Dispatcher, Envelope, Topic, TopicConsumer};
use crate::providers::SmsProvider;
use crate::state_machine::DeliveryStage;

/// Timing and retry bounds for the loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub read_timeout: Duration,
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl ConsumerSettings {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            read_timeout: config.consumer_read_timeout(),
            max_attempts: config.max_retry_attempts,
            backoff_unit: config.retry_backoff_unit(),
        }
    }
}

/// Everything a loop needs to process one record
struct DeliveryWorker {
    dispatcher: Dispatcher,
    coordinator: StatusCoordinator,
    provider: Arc<dyn SmsProvider>,
    ledger: Arc<dyn LedgerStore>,
    settings: ConsumerSettings,
}

impl DeliveryWorker {
    async fn handle(&self, topic: Topic, consumer: &mut dyn TopicConsumer, record: BrokerRecord) {
        match topic {
            Topic::Normal | Topic::Express => self.handle_channel(topic, consumer, record).await,
            Topic::Retry => self.handle_retry(consumer, record).await,
            Topic::DeadLetter => self.handle_dead_letter(consumer, record).await,
        }
    }

    /// Decode, mark sending, call the provider, mark sent
    async fn deliver(&self, topic: Topic, record: &BrokerRecord) -> SmsGateResult<Envelope> {
        let envelope = Envelope::from_bytes(&record.payload).map_err(|err| {
            log_error(
                "ConsumerGroup",
                operations::CONSUMER_DECODE,
                &err.to_string(),
                Some(topic.name()),
            );
            err
        })?;

        self.coordinator
            .update_status(envelope.message_id, envelope.outbox_id, DeliveryStage::Sending)
            .await?;

        if let Err(err) = self
            .provider
            .send(&envelope.mobile, &envelope.message_text)
            .await
        {
            warn!(
                operation = operations::PROVIDER_SEND,
                topic = %topic,
                message_id = envelope.message_id,
                error = %err,
                "Provider send failed"
            );
            return Err(err.into());
        }

        self.coordinator
            .update_status(envelope.message_id, envelope.outbox_id, DeliveryStage::Sent)
            .await?;

        log_delivery_operation(
            operations::PROVIDER_SEND,
            Some(envelope.message_id),
            Some(envelope.outbox_id),
            DeliveryStage::Sent.message_status().as_str(),
            Some(topic.name()),
        );
        Ok(envelope)
    }

    async fn handle_channel(
        &self,
        topic: Topic,
        consumer: &mut dyn TopicConsumer,
        record: BrokerRecord,
    ) {
        match self.deliver(topic, &record).await {
            Ok(_) => acknowledge(consumer, &record).await,
            Err(err) => {
                debug!(topic = %topic, error = %err, "Forwarding record to retry topic");
                self.forward_or_redeliver(consumer, record, topics::RETRY)
                    .await
            }
        }
    }

    async fn handle_retry(&self, consumer: &mut dyn TopicConsumer, record: BrokerRecord) {
        let max_attempts = self.settings.max_attempts;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if attempt >= max_attempts {
                self.persist_retries(&record, attempt).await;
                log_delivery_operation(
                    operations::DEAD_LETTER_ROUTE,
                    None,
                    None,
                    "exhausted",
                    Some(&format!("attempts={attempt}")),
                );
                self.forward_or_redeliver(consumer, record, topics::DEAD_LETTER)
                    .await;
                return;
            }

            tokio::time::sleep(self.settings.backoff_unit * attempt).await;
            debug!(operation = operations::RETRY_ATTEMPT, attempt, "Retrying delivery");

            match self.deliver(Topic::Retry, &record).await {
                Ok(envelope) => {
                    if let Err(err) = self
                        .ledger
                        .update_outbox_retries(envelope.outbox_id, attempt as i32)
                        .await
                    {
                        log_error(
                            "ConsumerGroup",
                            operations::RETRY_ATTEMPT,
                            &err.to_string(),
                            Some(&format!("outbox_id={}", envelope.outbox_id)),
                        );
                    }
                    acknowledge(consumer, &record).await;
                    return;
                }
                Err(err) => {
                    warn!(
                        operation = operations::RETRY_ATTEMPT,
                        attempt,
                        error = %err,
                        "Retry attempt failed"
                    );
                }
            }
        }
    }

    /// Best effort; a record that cannot be decoded still moves on
    async fn persist_retries(&self, record: &BrokerRecord, attempt: u32) {
        let outbox_id = match Envelope::from_bytes(&record.payload) {
            Ok(envelope) => envelope.outbox_id,
            Err(err) => {
                log_error(
                    "ConsumerGroup",
                    operations::CONSUMER_DECODE,
                    &err.to_string(),
                    Some(topics::RETRY),
                );
                return;
            }
        };

        if let Err(err) = self
            .ledger
            .update_outbox_retries(outbox_id, attempt as i32)
            .await
        {
            log_error(
                "ConsumerGroup",
                operations::DEAD_LETTER_ROUTE,
                &err.to_string(),
                Some(&format!("outbox_id={outbox_id}")),
            );
        }
    }

    async fn handle_dead_letter(&self, consumer: &mut dyn TopicConsumer, record: BrokerRecord) {
        let envelope = match Envelope::from_bytes(&record.payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                log_error(
                    "ConsumerGroup",
                    operations::CONSUMER_DECODE,
                    &err.to_string(),
                    Some(&format!("{} offset={} dropped", topics::DEAD_LETTER, record.offset)),
                );
                acknowledge(consumer, &record).await;
                return;
            }
        };

        match self
            .coordinator
            .update_status(envelope.message_id, envelope.outbox_id, DeliveryStage::Failed)
            .await
        {
            Ok(()) => acknowledge(consumer, &record).await,
            Err(err) => {
                log_error(
                    "ConsumerGroup",
                    operations::STATUS_UPDATE,
                    &err.to_string(),
                    Some(&format!("message_id={} redelivering", envelope.message_id)),
                );
                redeliver(consumer, record, self.settings.read_timeout).await;
            }
        }
    }

    async fn forward_or_redeliver(
        &self,
        consumer: &mut dyn TopicConsumer,
        record: BrokerRecord,
        target: &str,
    ) {
        match self.dispatcher.forward(target, &record).await {
            Ok(()) => acknowledge(consumer, &record).await,
            Err(err) => {
                log_error(
                    "ConsumerGroup",
                    operations::QUEUE_PRODUCE,
                    &err.to_string(),
                    Some(&format!("{} -> {target} redelivering", record.topic)),
                );
                redeliver(consumer, record, self.settings.read_timeout).await;
            }
        }
    }
}

async fn acknowledge(consumer: &mut dyn TopicConsumer, record: &BrokerRecord) {
    if let Err(err) = consumer.acknowledge(record).await {
        log_error(
            "ConsumerGroup",
            operations::CONSUMER_READ,
            &err.to_string(),
            Some(&format!("ack {} offset={}", record.topic, record.offset)),
        );
    }
}

/// Hands the record back after `delay` so a persistent fault does not spin
async fn redeliver(consumer: &mut dyn TopicConsumer, record: BrokerRecord, delay: Duration) {
    tokio::time::sleep(delay).await;
    let topic = record.topic.clone();
    if let Err(err) = consumer.redeliver(record).await {
        log_error(
            "ConsumerGroup",
            operations::CONSUMER_READ,
            &err.to_string(),
            Some(&format!("redeliver {topic}")),
        );
    }
}

/// Read loop for one topic; returns after shutdown
async fn consume(
    worker: Arc<DeliveryWorker>,
    topic: Topic,
    mut consumer: Box<dyn TopicConsumer>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!(topic = %topic, "Consumer loop started");

    loop {
        let read = tokio::select! {
            _ = shutdown_rx.recv() => break,
            read = consumer.read_message(worker.settings.read_timeout) => read,
        };

        match read {
            Ok(record) => worker.handle(topic, consumer.as_mut(), record).await,
            Err(err) if err.is_timeout() => {}
            Err(err) => log_error(
                "ConsumerGroup",
                operations::CONSUMER_READ,
                &err.to_string(),
                Some(topic.name()),
            ),
        }
    }

    match consumer.close().await {
        Ok(()) => info!(topic = %topic, "Consumer closed"),
        Err(err) => log_error(
            "ConsumerGroup",
            operations::CONSUMER_READ,
            &err.to_string(),
            Some(&format!("close {topic}")),
        ),
    }
}

/// The four delivery loops and their shared shutdown signal
pub struct ConsumerGroup {
    worker: Arc<DeliveryWorker>,
    broker: Arc<dyn BrokerClient>,
    topics: Vec<Topic>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for ConsumerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerGroup")
            .field("topics", &self.topics)
            .field("settings", &self.worker.settings)
            .field("running", &self.handles.len())
            .finish()
    }
}

impl ConsumerGroup {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        dispatcher: Dispatcher,
        coordinator: StatusCoordinator,
        provider: Arc<dyn SmsProvider>,
        ledger: Arc<dyn LedgerStore>,
        settings: ConsumerSettings,
        topics: Vec<Topic>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            worker: Arc::new(DeliveryWorker {
                dispatcher,
                coordinator,
                provider,
                ledger,
                settings,
            }),
            broker,
            topics,
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    pub fn settings(&self) -> ConsumerSettings {
        self.worker.settings
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty() && self.handles.iter().all(|h| !h.is_finished())
    }

    /// Subscribe every loop, then spawn them.
    ///
    /// Subscriptions all happen before the first loop starts, so a failure
    /// leaves nothing running.
    pub async fn start(&mut self) -> SmsGateResult<()> {
        if !self.handles.is_empty() {
            return Err(SmsGateError::conflict("consumer group already started"));
        }

        let mut subscribed: Vec<(Topic, Box<dyn TopicConsumer>)> =
            Vec::with_capacity(self.topics.len());
        for topic in &self.topics {
            let mut consumer = self.broker.consumer(&format!("{topic}-group"))?;
            if let Err(err) = consumer.subscribe(topic.name()).await {
                log_error(
                    "ConsumerGroup",
                    operations::CONSUMER_READ,
                    &err.to_string(),
                    Some(&format!("subscribe {topic}")),
                );
                for (_, mut opened) in subscribed {
                    let _ = opened.close().await;
                }
                return Err(err.into());
            }
            subscribed.push((*topic, consumer));
        }

        for (topic, consumer) in subscribed {
            let worker = Arc::clone(&self.worker);
            let shutdown_rx = self.shutdown_tx.subscribe();
            self.handles
                .push(tokio::spawn(consume(worker, topic, consumer, shutdown_rx)));
        }

        info!(loops = self.handles.len(), "Consumer group started");
        Ok(())
    }

    /// Signal every loop and wait for all of them to return
    pub async fn shutdown(&mut self) -> SmsGateResult<()> {
        if self.handles.is_empty() {
            return Ok(());
        }

        // no receivers only means every loop already exited
        let _ = self.shutdown_tx.send(());

        let results = join_all(self.handles.drain(..)).await;
        let panicked = results.iter().filter(|r| r.is_err()).count();
        if panicked > 0 {
            return Err(SmsGateError::failed(format!(
                "{panicked} consumer loop(s) did not exit cleanly"
            )));
        }

        info!("Consumer group stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::messaging::{InMemoryBroker, TopicProducer};
    use crate::providers::SimulatedProvider;
    use tracing_test::traced_test;

    fn worker(broker: &InMemoryBroker, read_timeout: Duration) -> Arc<DeliveryWorker> {
        let ledger: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        Arc::new(DeliveryWorker {
            dispatcher: Dispatcher::new(Arc::new(broker.clone()), Duration::from_millis(50)),
            coordinator: StatusCoordinator::new(Arc::clone(&ledger)),
            provider: Arc::new(SimulatedProvider::reliable()),
            ledger,
            settings: ConsumerSettings {
                read_timeout,
                max_attempts: 3,
                backoff_unit: Duration::from_millis(1),
            },
        })
    }

    #[tokio::test]
    #[traced_test]
    async fn test_idle_loop_neither_fails_nor_exits() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.consumer("event.prod-group").unwrap();
        consumer.subscribe(topics::NORMAL).await.unwrap();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let outcome = tokio::time::timeout(
            Duration::from_millis(100),
            consume(
                worker(&broker, Duration::from_millis(5)),
                Topic::Normal,
                consumer,
                shutdown_rx,
            ),
        )
        .await;

        assert!(outcome.is_err(), "idle loop returned on its own");
        assert!(logs_contain("Consumer loop started"));
        assert!(!logs_contain("ERROR"));
    }

    #[tokio::test]
    async fn test_loop_returns_on_shutdown() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.consumer("event.dlq-group").unwrap();
        consumer.subscribe(topics::DEAD_LETTER).await.unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(consume(
            worker(&broker, Duration::from_millis(5)),
            Topic::DeadLetter,
            consumer,
            shutdown_rx,
        ));
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_undecodable_dead_letter_is_dropped() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.consumer("event.dlq-group").unwrap();
        consumer.subscribe(topics::DEAD_LETTER).await.unwrap();
        broker
            .produce(topics::DEAD_LETTER, b"k", b"{not json")
            .await
            .unwrap();

        let record = consumer
            .read_message(Duration::from_millis(50))
            .await
            .unwrap();
        worker(&broker, Duration::from_millis(5))
            .handle(Topic::DeadLetter, consumer.as_mut(), record)
            .await;

        assert_eq!(broker.pending(topics::DEAD_LETTER), 0);
    }

    #[tokio::test]
    async fn test_failed_dead_letter_write_is_redelivered_after_read_timeout() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.consumer("event.dlq-group").unwrap();
        consumer.subscribe(topics::DEAD_LETTER).await.unwrap();
        let envelope = Envelope {
            tenant_id: 1,
            message_id: 404,
            outbox_id: 405,
            channel: topics::EXPRESS.to_string(),
            mobile: "09120000000".to_string(),
            message_text: "hi".to_string(),
            message_hash: "a".repeat(64),
            status: crate::state_machine::MessageStatus::Queued,
        };
        broker
            .produce(topics::DEAD_LETTER, envelope.key(), &envelope.to_bytes().unwrap())
            .await
            .unwrap();

        let record = consumer
            .read_message(Duration::from_millis(50))
            .await
            .unwrap();
        let read_timeout = Duration::from_millis(40);
        let started = std::time::Instant::now();
        worker(&broker, read_timeout)
            .handle(Topic::DeadLetter, consumer.as_mut(), record)
            .await;

        assert!(started.elapsed() >= read_timeout);
        assert_eq!(broker.pending(topics::DEAD_LETTER), 1);
    }
}
