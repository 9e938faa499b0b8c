//! # Delivery System Bootstrap
//!
//! Wires configuration, the ledger, the broker and the provider into one
//! [`DeliverySystem`] and manages its lifecycle:
//!
//! - [`DeliveryBootstrap::bootstrap_with_config`] connects the broker, connects
//!   and migrates the database, then starts the consumers
//! - [`DeliverySystem::assemble`] builds the same graph from parts that are
//!   already constructed, which is how tests and embedders use it
//! - [`DeliverySystem::stop`] stops the consumer loops and flushes the producer

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{ConfigManager, QueueConfig, SmsGateConfig};
use crate::database::{run_migrations, DatabaseConnection};
use crate::delivery::{
    ConsumerGroup, ConsumerSettings, DeliveryOrchestrator, OutboxReplayer, StatusCoordinator,
};
use crate::error::{SmsGateError, SmsGateResult};
use crate::ledger::{LedgerStore, PgLedger};
use crate::messaging::{
    ensure_topics, topology, BrokerClient, Dispatcher, MessagingError, Topic, TopicAdmin,
    TopicProducer,
};
use crate::providers::{SimulatedProvider, SmsProvider};
use crate::validation::MessageValidator;

/// Snapshot for health reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemStatus {
    pub running: bool,
    pub topics: Vec<String>,
    pub max_retry_attempts: u32,
}

pub struct DeliverySystem {
    orchestrator: Arc<DeliveryOrchestrator>,
    replayer: Arc<OutboxReplayer>,
    consumers: ConsumerGroup,
    producer: Arc<dyn TopicProducer>,
    admin: Arc<dyn TopicAdmin>,
    queue: QueueConfig,
}

impl std::fmt::Debug for DeliverySystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliverySystem")
            .field("orchestrator", &self.orchestrator)
            .field("consumers", &self.consumers)
            .finish_non_exhaustive()
    }
}

impl DeliverySystem {
    /// Build the component graph; nothing is started
    pub fn assemble(
        config: &SmsGateConfig,
        ledger: Arc<dyn LedgerStore>,
        broker: Arc<dyn BrokerClient>,
        provider: Arc<dyn SmsProvider>,
    ) -> SmsGateResult<Self> {
        config.validate()?;

        let producer = broker.producer();
        let dispatcher = Dispatcher::new(
            Arc::clone(&producer),
            config.queue.producer_flush_timeout(),
        );
        let validator = MessageValidator::new(config.billing.max_message_length)?;
        let price = config.billing.message_price()?;

        let orchestrator = Arc::new(DeliveryOrchestrator::new(
            Arc::clone(&ledger),
            dispatcher.clone(),
            validator,
            price,
        ));
        let replayer = Arc::new(OutboxReplayer::new(
            Arc::clone(&ledger),
            dispatcher.clone(),
        ));

        let topics = config
            .queue
            .topics
            .iter()
            .map(|name| {
                Topic::from_name(name).ok_or_else(|| MessagingError::UnknownTopic {
                    topic: name.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let consumers = ConsumerGroup::new(
            Arc::clone(&broker),
            dispatcher,
            StatusCoordinator::new(Arc::clone(&ledger)),
            provider,
            ledger,
            ConsumerSettings::from_config(&config.queue),
            topics,
        );

        Ok(Self {
            orchestrator,
            replayer,
            consumers,
            producer,
            admin: broker.admin(),
            queue: config.queue.clone(),
        })
    }

    pub fn orchestrator(&self) -> Arc<DeliveryOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn replayer(&self) -> Arc<OutboxReplayer> {
        Arc::clone(&self.replayer)
    }

    /// Create missing topics, then start the consumer loops
    pub async fn start(&mut self) -> SmsGateResult<()> {
        let specs = topology(&self.queue.topics, self.queue.replication_factor)?;
        let admin = Arc::clone(&self.admin);
        let created = tokio::time::timeout(
            self.queue.admin_timeout(),
            ensure_topics(admin.as_ref(), &specs),
        )
        .await
        .map_err(|_| {
            MessagingError::admin(
                "ensure_topics",
                format!("timed out after {:?}", self.queue.admin_timeout()),
            )
        })??;
        info!(created = ?created, "✅ BOOTSTRAP: Topics ready");

        self.consumers.start().await?;
        info!("✅ BOOTSTRAP: Consumer group running");
        Ok(())
    }

    /// Stop the consumers and flush whatever the producer still buffers
    pub async fn stop(&mut self) -> SmsGateResult<()> {
        self.consumers.shutdown().await?;
        if let Err(err) = self
            .producer
            .flush(self.queue.producer_flush_timeout())
            .await
        {
            warn!(error = %err, "Producer flush on shutdown failed");
        }
        info!("🛑 Delivery system stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.consumers.is_running()
    }

    pub fn status(&self) -> SystemStatus {
        SystemStatus {
            running: self.is_running(),
            topics: self.queue.topics.clone(),
            max_retry_attempts: self.consumers.settings().max_attempts,
        }
    }
}

/// Bootstrap entry point for the worker binary
pub struct DeliveryBootstrap;

impl DeliveryBootstrap {
    /// Connect the database and broker for an already loaded configuration
    pub async fn bootstrap_with_config(
        config_manager: &ConfigManager,
        auto_start_consumers: bool,
    ) -> SmsGateResult<DeliverySystem> {
        info!(
            environment = config_manager.environment(),
            "🚀 BOOTSTRAP: Starting delivery system"
        );
        let config = config_manager.config();
        let broker = connect_broker(&config.queue)?;

        let database = DatabaseConnection::connect(&config.database).await?;
        if config.database.run_migrations {
            run_migrations(database.pool())
                .await
                .map_err(|e| SmsGateError::Database(sqlx::Error::Migrate(Box::new(e))))?;
        }
        let ledger: Arc<dyn LedgerStore> = Arc::new(PgLedger::new(database.pool().clone()));
        let provider: Arc<dyn SmsProvider> = Arc::new(SimulatedProvider::new());

        let mut system = DeliverySystem::assemble(config, ledger, broker, provider)?;
        if auto_start_consumers {
            system.start().await?;
        } else {
            info!("📋 BOOTSTRAP: Consumers not auto-started");
        }
        Ok(system)
    }
}

#[cfg(feature = "kafka")]
fn connect_broker(config: &QueueConfig) -> SmsGateResult<Arc<dyn BrokerClient>> {
    let broker = crate::messaging::KafkaBroker::connect(config)?;
    Ok(Arc::new(broker))
}

/// Only the Kafka backend reaches other processes
#[cfg(not(feature = "kafka"))]
fn connect_broker(config: &QueueConfig) -> SmsGateResult<Arc<dyn BrokerClient>> {
    Err(crate::config::ConfigurationError::BrokerBackendMissing {
        host: config.host.clone(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigurationError;
    use crate::ledger::InMemoryLedger;
    use crate::messaging::InMemoryBroker;

    fn config() -> SmsGateConfig {
        let mut config = SmsGateConfig::default();
        config.queue.consumer_read_ttl_ms = 10;
        config
    }

    #[tokio::test]
    async fn test_start_creates_topics_and_stop_joins_loops() {
        let broker = InMemoryBroker::new();
        let mut system = DeliverySystem::assemble(
            &config(),
            Arc::new(InMemoryLedger::new()),
            Arc::new(broker.clone()),
            Arc::new(SimulatedProvider::reliable()),
        )
        .unwrap();
        assert!(!system.is_running());

        system.start().await.unwrap();
        assert!(system.is_running());
        for topic in Topic::ALL {
            assert!(broker.created_topic(topic.name()).is_some());
        }

        system.stop().await.unwrap();
        assert!(!system.status().running);
    }

    #[test]
    fn test_assemble_rejects_unknown_topics() {
        let mut config = config();
        config.queue.topics.push("event.unknown".to_string());

        let result = DeliverySystem::assemble(
            &config,
            Arc::new(InMemoryLedger::new()),
            Arc::new(InMemoryBroker::new()),
            Arc::new(SimulatedProvider::reliable()),
        );
        assert!(matches!(
            result,
            Err(SmsGateError::Messaging(MessagingError::UnknownTopic { .. }))
        ));
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn test_worker_without_broker_backend_is_refused() {
        let result = connect_broker(&QueueConfig::default());
        assert!(matches!(
            result,
            Err(SmsGateError::Configuration(
                ConfigurationError::BrokerBackendMissing { ref host }
            )) if host == "localhost:9092"
        ));
    }
}
