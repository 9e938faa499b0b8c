//! # Delivery
//!
//! The billing and delivery core: the orchestrator that accepts and bills a
//! message, the consumer group that drives it through the provider, the
//! coordinator that keeps message and outbox statuses paired, and the replay
//! of outbox rows whose first publish was lost.

pub mod consumers;
pub mod hashing;
pub mod orchestrator;
pub mod replay;
pub mod status_coordinator;

pub use consumers::{ConsumerGroup, ConsumerSettings};
pub use hashing::{content_hash, transaction_id};
pub use orchestrator::{DeliveryOrchestrator, MessageDetail};
pub use replay::{OutboxReplayer, ReplayReport};
pub use status_coordinator::StatusCoordinator;
