//! PostgreSQL-backed ledger.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{LedgerError, LedgerResult, LedgerStore, LedgerTransaction};
use crate::models::{
    Credit, CreditTransaction, Message, MessageListQuery, NewCreditTransaction, NewMessage,
    NewOutbox, Outbox, Page, Tenant, TenantAccount,
};
use crate::state_machine::{MessageStatus, OutboxStatus};

#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Fail with `NotFound` when an update matched no row
fn expect_row(rows: u64, entity: &str, id: i64) -> LedgerResult<()> {
    if rows == 0 {
        return Err(LedgerError::not_found(entity, id));
    }
    Ok(())
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::from_sqlx("transaction.begin", e))?;
        Ok(Box::new(PgLedgerTransaction { tx }))
    }

    async fn find_message(&self, id: i64) -> LedgerResult<Message> {
        Message::find_by_id(&self.pool, id)
            .await
            .map_err(|e| LedgerError::from_sqlx("message.find", e))?
            .ok_or_else(|| LedgerError::not_found("message", id))
    }

    async fn find_message_by_uuid(&self, uuid: Uuid) -> LedgerResult<Message> {
        Message::find_by_uuid(&self.pool, uuid)
            .await
            .map_err(|e| LedgerError::from_sqlx("message.find", e))?
            .ok_or_else(|| LedgerError::not_found("message", uuid))
    }

    async fn find_outbox(&self, id: i64) -> LedgerResult<Outbox> {
        Outbox::find_by_id(&self.pool, id)
            .await
            .map_err(|e| LedgerError::from_sqlx("outbox.find", e))?
            .ok_or_else(|| LedgerError::not_found("outbox", id))
    }

    async fn find_outbox_by_uuid(&self, uuid: Uuid) -> LedgerResult<Outbox> {
        Outbox::find_by_uuid(&self.pool, uuid)
            .await
            .map_err(|e| LedgerError::from_sqlx("outbox.find", e))?
            .ok_or_else(|| LedgerError::not_found("outbox", uuid))
    }

    async fn find_outbox_for_message(&self, message_id: i64) -> LedgerResult<Option<Outbox>> {
        Outbox::find_by_message_id(&self.pool, message_id)
            .await
            .map_err(|e| LedgerError::from_sqlx("outbox.find", e))
    }

    async fn find_tenant_account(&self, tenant_uuid: Uuid) -> LedgerResult<TenantAccount> {
        let tenant = Tenant::find_by_uuid(&self.pool, tenant_uuid)
            .await
            .map_err(|e| LedgerError::from_sqlx("tenant.find", e))?
            .ok_or_else(|| LedgerError::not_found("tenant", tenant_uuid))?;

        let credit = Credit::find_by_tenant(&self.pool, tenant.id)
            .await
            .map_err(|e| LedgerError::from_sqlx("credit.find", e))?
            .ok_or_else(|| LedgerError::not_found("credit for tenant", tenant_uuid))?;

        Ok(TenantAccount { tenant, credit })
    }

    async fn list_messages(&self, query: &MessageListQuery) -> LedgerResult<Page<Message>> {
        Message::list(&self.pool, query)
            .await
            .map_err(|e| LedgerError::from_sqlx("message.list", e))
    }

    async fn list_transactions(&self, credit_id: i64) -> LedgerResult<Vec<CreditTransaction>> {
        CreditTransaction::list_for_credit(&self.pool, credit_id)
            .await
            .map_err(|e| LedgerError::from_sqlx("transaction.list", e))
    }

    async fn update_outbox_retries(&self, outbox_id: i64, retries: i32) -> LedgerResult<()> {
        let rows = Outbox::update_retries(&self.pool, outbox_id, retries)
            .await
            .map_err(|e| LedgerError::from_sqlx("outbox.update_retries", e))?;
        expect_row(rows, "outbox", outbox_id)
    }

    async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> LedgerResult<Vec<Outbox>> {
        Outbox::find_stale_pending(&self.pool, older_than, limit)
            .await
            .map_err(|e| LedgerError::from_sqlx("outbox.find_stale_pending", e))
    }
}

pub struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn create_message(&mut self, new_message: NewMessage) -> LedgerResult<Message> {
        Message::create(&mut *self.tx, new_message)
            .await
            .map_err(|e| LedgerError::from_sqlx("message.create", e))
    }

    async fn create_outbox(&mut self, new_outbox: NewOutbox) -> LedgerResult<Outbox> {
        Outbox::create(&mut *self.tx, new_outbox)
            .await
            .map_err(|e| LedgerError::from_sqlx("outbox.create", e))
    }

    async fn update_outbox_payload(
        &mut self,
        outbox_id: i64,
        payload: serde_json::Value,
    ) -> LedgerResult<()> {
        let rows = Outbox::update_payload(&mut *self.tx, outbox_id, payload)
            .await
            .map_err(|e| LedgerError::from_sqlx("outbox.update_payload", e))?;
        expect_row(rows, "outbox", outbox_id)
    }

    async fn lock_credit(&mut self, credit_id: i64) -> LedgerResult<Credit> {
        Credit::lock_by_id(&mut *self.tx, credit_id)
            .await
            .map_err(|e| LedgerError::from_sqlx("credit.lock", e))?
            .ok_or_else(|| LedgerError::not_found("credit", credit_id))
    }

    async fn update_credit_balance(
        &mut self,
        credit_id: i64,
        balance: &BigDecimal,
    ) -> LedgerResult<Credit> {
        Credit::update_balance(&mut *self.tx, credit_id, balance)
            .await
            .map_err(|e| LedgerError::from_sqlx("credit.update_balance", e))
    }

    async fn create_transaction(
        &mut self,
        new_transaction: NewCreditTransaction,
    ) -> LedgerResult<CreditTransaction> {
        CreditTransaction::create(&mut *self.tx, new_transaction)
            .await
            .map_err(|e| LedgerError::from_sqlx("transaction.create", e))
    }

    async fn update_message_status(
        &mut self,
        message_id: i64,
        status: MessageStatus,
    ) -> LedgerResult<()> {
        let rows = Message::update_status(&mut *self.tx, message_id, status)
            .await
            .map_err(|e| LedgerError::from_sqlx("message.update_status", e))?;
        expect_row(rows, "message", message_id)
    }

    async fn update_outbox_status(
        &mut self,
        outbox_id: i64,
        status: OutboxStatus,
    ) -> LedgerResult<()> {
        let rows = Outbox::update_status(&mut *self.tx, outbox_id, status)
            .await
            .map_err(|e| LedgerError::from_sqlx("outbox.update_status", e))?;
        expect_row(rows, "outbox", outbox_id)
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| LedgerError::from_sqlx("transaction.commit", e))
    }

    async fn rollback(self: Box<Self>) -> LedgerResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| LedgerError::from_sqlx("transaction.rollback", e))
    }
}
