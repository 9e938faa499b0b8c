//! # Broker Client Module
//!
//! Broker backends behind one set of traits.
//!
//! - `traits.rs` - Producer, consumer, admin and client-factory traits
//! - `in_memory_client.rs` - In-process broker for tests and local runs
//! - `kafka_client.rs` - Kafka backend (`kafka` feature)
//!
//! ```rust,ignore
//! use smsgate_core::messaging::clients::{BrokerClient, InMemoryBroker};
//!
//! let broker = InMemoryBroker::new();
//! let producer = broker.producer();
//! let mut consumer = broker.consumer("event.prod-group")?;
//! consumer.subscribe("event.prod").await?;
//! ```

pub mod in_memory_client;
#[cfg(feature = "kafka")]
pub mod kafka_client;
pub mod traits;

pub use in_memory_client::{BrokerFault, InMemoryBroker};
#[cfg(feature = "kafka")]
pub use kafka_client::KafkaBroker;
pub use traits::{BrokerClient, BrokerRecord, TopicAdmin, TopicConsumer, TopicProducer};
