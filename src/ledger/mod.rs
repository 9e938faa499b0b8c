//! # Ledger Store
//!
//! Transactional storage for tenants, credits, the debit ledger, messages and
//! their outbox rows. Callers work against [`LedgerStore`] and
//! [`LedgerTransaction`]; [`PgLedger`] backs them with PostgreSQL and
//! [`InMemoryLedger`] with process memory for tests and local runs.
//!
//! A transaction handle is consumed by `commit` or `rollback`. [`resolve`]
//! picks between them from the outcome of the work done inside it.

pub mod errors;
pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    Credit, CreditTransaction, Message, MessageListQuery, NewCreditTransaction, NewMessage,
    NewOutbox, Outbox, Page, TenantAccount,
};
use crate::state_machine::{MessageStatus, OutboxStatus};

pub use errors::{LedgerError, LedgerResult};
pub use in_memory::{InMemoryLedger, LedgerOperation};
pub use postgres::PgLedger;

/// Reads and single-statement writes outside an explicit transaction
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTransaction>>;

    async fn find_message(&self, id: i64) -> LedgerResult<Message>;

    async fn find_message_by_uuid(&self, uuid: Uuid) -> LedgerResult<Message>;

    async fn find_outbox(&self, id: i64) -> LedgerResult<Outbox>;

    async fn find_outbox_by_uuid(&self, uuid: Uuid) -> LedgerResult<Outbox>;

    /// The outbox row written alongside a message, if any
    async fn find_outbox_for_message(&self, message_id: i64) -> LedgerResult<Option<Outbox>>;

    /// Tenant with its credit row
    async fn find_tenant_account(&self, tenant_uuid: Uuid) -> LedgerResult<TenantAccount>;

    async fn list_messages(&self, query: &MessageListQuery) -> LedgerResult<Page<Message>>;

    async fn list_transactions(&self, credit_id: i64) -> LedgerResult<Vec<CreditTransaction>>;

    /// Persist the retry counter of an outbox row
    async fn update_outbox_retries(&self, outbox_id: i64, retries: i32) -> LedgerResult<()>;

    /// Outbox rows still `pending` that were created before `older_than`
    async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> LedgerResult<Vec<Outbox>>;
}

/// Typed operations inside one open database transaction
#[async_trait]
pub trait LedgerTransaction: Send {
    async fn create_message(&mut self, new_message: NewMessage) -> LedgerResult<Message>;

    async fn create_outbox(&mut self, new_outbox: NewOutbox) -> LedgerResult<Outbox>;

    async fn update_outbox_payload(
        &mut self,
        outbox_id: i64,
        payload: serde_json::Value,
    ) -> LedgerResult<()>;

    /// Read the credit row and hold its lock until commit or rollback
    async fn lock_credit(&mut self, credit_id: i64) -> LedgerResult<Credit>;

    async fn update_credit_balance(
        &mut self,
        credit_id: i64,
        balance: &BigDecimal,
    ) -> LedgerResult<Credit>;

    async fn create_transaction(
        &mut self,
        new_transaction: NewCreditTransaction,
    ) -> LedgerResult<CreditTransaction>;

    async fn update_message_status(
        &mut self,
        message_id: i64,
        status: MessageStatus,
    ) -> LedgerResult<()>;

    async fn update_outbox_status(&mut self, outbox_id: i64, status: OutboxStatus)
        -> LedgerResult<()>;

    async fn commit(self: Box<Self>) -> LedgerResult<()>;

    async fn rollback(self: Box<Self>) -> LedgerResult<()>;
}

/// Commit when the work succeeded, roll back when it failed.
///
/// A commit failure replaces the success value with the commit error. A
/// rollback failure is logged and the original error is returned.
pub async fn resolve<T, E>(tx: Box<dyn LedgerTransaction>, result: Result<T, E>) -> Result<T, E>
where
    E: From<LedgerError> + std::fmt::Display,
{
    match result {
        Ok(value) => {
            tx.commit().await?;
            debug!("Ledger transaction committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(
                    error = %err,
                    rollback_error = %rollback_err,
                    "Ledger transaction rollback failed"
                );
            } else {
                debug!(error = %err, "Ledger transaction rolled back");
            }
            Err(err)
        }
    }
}
