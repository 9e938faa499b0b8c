//! # Messaging Module
//!
//! Broker-facing side of delivery: the four-topic topology, the JSON envelope
//! carried on every topic, the publishing dispatcher and the pluggable broker
//! backends (in-memory always, Kafka behind the `kafka` feature).

pub mod clients;
pub mod dispatcher;
pub mod envelope;
pub mod errors;
pub mod topics;

pub use clients::{
    BrokerClient, BrokerFault, BrokerRecord, InMemoryBroker, TopicAdmin, TopicConsumer,
    TopicProducer,
};
#[cfg(feature = "kafka")]
pub use clients::KafkaBroker;
pub use dispatcher::Dispatcher;
pub use envelope::Envelope;
pub use errors::{MessagingError, MessagingResult};
pub use topics::{ensure_topics, topology, Topic, TopicSpec};
