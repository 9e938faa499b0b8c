#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # SMS Gate Core
//!
//! Billing-safe SMS delivery. A message is accepted, billed and written to a
//! transactional outbox in one database transaction, then published to a
//! broker topic and delivered by consumers that retry with a linear backoff
//! and give up into a dead-letter topic.
//!
//! ## Flow
//!
//! 1. [`delivery::DeliveryOrchestrator::send`] validates the request, debits
//!    the tenant's credit and records the message, its outbox row and the
//!    credit transaction atomically
//! 2. After commit the envelope goes to `event.prod` or `event.express`
//! 3. Channel consumers hand the message to the [`providers::SmsProvider`];
//!    a failure moves the record to `event.retry`
//! 4. The retry consumer backs off and tries again, routing to `event.dlq`
//!    once the attempts are spent
//! 5. The dead-letter consumer marks the message `failed`
//!
//! Every status change goes through [`delivery::StatusCoordinator`], which
//! writes the message row and its outbox row in the same transaction.
//!
//! ## Module Organization
//!
//! - [`bootstrap`] - Component wiring and lifecycle
//! - [`config`] - Layered configuration
//! - [`delivery`] - Orchestrator, status coordinator, consumers and replay
//! - [`ledger`] - Transactional persistence seam (PostgreSQL and in-memory)
//! - [`messaging`] - Topics, envelopes and broker clients
//! - [`models`] - Row types and their SQL
//! - [`providers`] - SMS provider seam and the simulated provider
//! - [`state_machine`] - Message and outbox statuses
//! - [`validation`] - Request validation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use smsgate_core::bootstrap::DeliverySystem;
//! use smsgate_core::config::SmsGateConfig;
//! use smsgate_core::ledger::InMemoryLedger;
//! use smsgate_core::messaging::InMemoryBroker;
//! use smsgate_core::providers::SimulatedProvider;
//! use smsgate_core::validation::SendMessageRequest;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = Arc::new(InMemoryLedger::new());
//! let account = ledger.seed_tenant("acme", 100.into());
//!
//! let mut system = DeliverySystem::assemble(
//!     &SmsGateConfig::default(),
//!     ledger,
//!     Arc::new(InMemoryBroker::new()),
//!     Arc::new(SimulatedProvider::new()),
//! )?;
//! system.start().await?;
//!
//! let message = system
//!     .orchestrator()
//!     .send(&account, SendMessageRequest::new("event.express", "09123456789", "hello"))
//!     .await?;
//! println!("queued message {}", message.uuid);
//!
//! system.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod database;
pub mod delivery;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod providers;
pub mod state_machine;
pub mod validation;

pub use bootstrap::{DeliveryBootstrap, DeliverySystem, SystemStatus};
pub use config::{ConfigManager, SmsGateConfig};
pub use delivery::{DeliveryOrchestrator, OutboxReplayer, StatusCoordinator};
pub use error::{SmsGateError, SmsGateResult};
pub use state_machine::{DeliveryStage, MessageStatus, OutboxStatus};
