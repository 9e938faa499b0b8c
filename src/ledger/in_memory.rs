//! # In-Memory Ledger
//!
//! Process-local ledger for tests and local runs. A transaction takes an
//! exclusive lock, works on a copy of the committed state and swaps it in on
//! commit, so a rolled-back transaction leaves nothing behind. The exclusive
//! lock stands in for row locks: transactions never interleave.
//!
//! Failures can be injected per operation with [`InMemoryLedger::fail_next`].

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{LedgerError, LedgerResult, LedgerStore, LedgerTransaction};
use crate::models::{
    Credit, CreditTransaction, Message, MessageListQuery, MessageSortField, NewCreditTransaction,
    NewMessage, NewOutbox, Outbox, Page, SortOrder, Tenant, TenantAccount,
};
use crate::state_machine::{MessageStatus, OutboxStatus};

/// Operations that can be made to fail on their next invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOperation {
    Begin,
    CreateMessage,
    CreateOutbox,
    LockCredit,
    UpdateCreditBalance,
    CreateTransaction,
    UpdateMessageStatus,
    UpdateOutboxStatus,
    UpdateOutboxRetries,
    Commit,
}

impl LedgerOperation {
    fn name(&self) -> &'static str {
        match self {
            Self::Begin => "transaction.begin",
            Self::CreateMessage => "message.create",
            Self::CreateOutbox => "outbox.create",
            Self::LockCredit => "credit.lock",
            Self::UpdateCreditBalance => "credit.update_balance",
            Self::CreateTransaction => "transaction.create",
            Self::UpdateMessageStatus => "message.update_status",
            Self::UpdateOutboxStatus => "outbox.update_status",
            Self::UpdateOutboxRetries => "outbox.update_retries",
            Self::Commit => "transaction.commit",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    tenants: BTreeMap<i64, Tenant>,
    credits: BTreeMap<i64, Credit>,
    transactions: Vec<CreditTransaction>,
    messages: BTreeMap<i64, Message>,
    outboxes: BTreeMap<i64, Outbox>,
    next_id: i64,
}

impl LedgerState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    write_lock: Arc<AsyncMutex<()>>,
    faults: Arc<Mutex<Vec<LedgerOperation>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next invocation of `operation` fail with a database error
    pub fn fail_next(&self, operation: LedgerOperation) {
        self.faults.lock().push(operation);
    }

    pub fn pending_faults(&self) -> usize {
        self.faults.lock().len()
    }

    fn check_fault(faults: &Mutex<Vec<LedgerOperation>>, operation: LedgerOperation) -> LedgerResult<()> {
        let mut faults = faults.lock();
        if let Some(index) = faults.iter().position(|f| *f == operation) {
            faults.remove(index);
            return Err(LedgerError::database(operation.name(), "injected failure"));
        }
        Ok(())
    }

    /// Create an active tenant with a credit row holding `balance`
    pub fn seed_tenant(&self, username: &str, balance: BigDecimal) -> TenantAccount {
        let mut state = self.state.lock();
        let now = Utc::now();

        let tenant = Tenant {
            id: state.next_id(),
            uuid: Uuid::new_v4(),
            username: username.to_string(),
            tenant_name: username.to_string(),
            active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let credit = Credit {
            id: state.next_id(),
            uuid: Uuid::new_v4(),
            tenant_id: tenant.id,
            balance,
            created_at: now,
            updated_at: now,
        };

        state.tenants.insert(tenant.id, tenant.clone());
        state.credits.insert(credit.id, credit.clone());
        TenantAccount { tenant, credit }
    }

    pub fn credit(&self, credit_id: i64) -> Option<Credit> {
        self.state.lock().credits.get(&credit_id).cloned()
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn outbox_count(&self) -> usize {
        self.state.lock().outboxes.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.state.lock().transactions.len()
    }

    pub fn outboxes(&self) -> Vec<Outbox> {
        self.state.lock().outboxes.values().cloned().collect()
    }
}

fn sort_messages(items: &mut [Message], sort: MessageSortField, order: SortOrder) {
    items.sort_by(|a, b| {
        let ordering = match sort {
            MessageSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            MessageSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            MessageSortField::Id => a.id.cmp(&b.id),
            MessageSortField::Status => a.status.as_str().cmp(b.status.as_str()),
        }
        .then(a.id.cmp(&b.id));

        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerTransaction>> {
        Self::check_fault(&self.faults, LedgerOperation::Begin)?;
        let guard = Arc::clone(&self.write_lock).lock_owned().await;
        let working = self.state.lock().clone();

        Ok(Box::new(InMemoryLedgerTransaction {
            state: Arc::clone(&self.state),
            faults: Arc::clone(&self.faults),
            working,
            _guard: guard,
        }))
    }

    async fn find_message(&self, id: i64) -> LedgerResult<Message> {
        self.state
            .lock()
            .messages
            .get(&id)
            .filter(|m| m.deleted_at.is_none())
            .cloned()
            .ok_or_else(|| LedgerError::not_found("message", id))
    }

    async fn find_message_by_uuid(&self, uuid: Uuid) -> LedgerResult<Message> {
        self.state
            .lock()
            .messages
            .values()
            .find(|m| m.uuid == uuid && m.deleted_at.is_none())
            .cloned()
            .ok_or_else(|| LedgerError::not_found("message", uuid))
    }

    async fn find_outbox(&self, id: i64) -> LedgerResult<Outbox> {
        self.state
            .lock()
            .outboxes
            .get(&id)
            .filter(|o| o.deleted_at.is_none())
            .cloned()
            .ok_or_else(|| LedgerError::not_found("outbox", id))
    }

    async fn find_outbox_by_uuid(&self, uuid: Uuid) -> LedgerResult<Outbox> {
        self.state
            .lock()
            .outboxes
            .values()
            .find(|o| o.uuid == uuid && o.deleted_at.is_none())
            .cloned()
            .ok_or_else(|| LedgerError::not_found("outbox", uuid))
    }

    async fn find_outbox_for_message(&self, message_id: i64) -> LedgerResult<Option<Outbox>> {
        Ok(self
            .state
            .lock()
            .outboxes
            .values()
            .find(|o| o.message_id == message_id && o.deleted_at.is_none())
            .cloned())
    }

    async fn find_tenant_account(&self, tenant_uuid: Uuid) -> LedgerResult<TenantAccount> {
        let state = self.state.lock();
        let tenant = state
            .tenants
            .values()
            .find(|t| t.uuid == tenant_uuid && t.deleted_at.is_none())
            .cloned()
            .ok_or_else(|| LedgerError::not_found("tenant", tenant_uuid))?;
        let credit = state
            .credits
            .values()
            .find(|c| c.tenant_id == tenant.id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("credit for tenant", tenant_uuid))?;

        Ok(TenantAccount { tenant, credit })
    }

    async fn list_messages(&self, query: &MessageListQuery) -> LedgerResult<Page<Message>> {
        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut matching: Vec<Message> = self
            .state
            .lock()
            .messages
            .values()
            .filter(|m| m.deleted_at.is_none() && m.tenant_id == query.tenant_id)
            .filter(|m| match &needle {
                Some(needle) => m.message_text.to_lowercase().contains(needle),
                None => true,
            })
            .filter(|m| query.items.is_empty() || query.items.contains(&m.uuid))
            .cloned()
            .collect();

        sort_messages(&mut matching, query.sort, query.order);
        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect();

        Ok(Page {
            items,
            total,
            page: query.page(),
            limit: query.limit(),
        })
    }

    async fn list_transactions(&self, credit_id: i64) -> LedgerResult<Vec<CreditTransaction>> {
        let mut transactions: Vec<CreditTransaction> = self
            .state
            .lock()
            .transactions
            .iter()
            .filter(|t| t.credit_id == credit_id)
            .cloned()
            .collect();
        transactions.reverse();
        Ok(transactions)
    }

    async fn update_outbox_retries(&self, outbox_id: i64, retries: i32) -> LedgerResult<()> {
        Self::check_fault(&self.faults, LedgerOperation::UpdateOutboxRetries)?;
        let _guard = self.write_lock.lock().await;

        let mut state = self.state.lock();
        let outbox = state
            .outboxes
            .get_mut(&outbox_id)
            .ok_or_else(|| LedgerError::not_found("outbox", outbox_id))?;
        let now = Utc::now();
        outbox.retries = retries;
        outbox.retry_at = Some(now);
        outbox.updated_at = now;
        Ok(())
    }

    async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> LedgerResult<Vec<Outbox>> {
        let mut stale: Vec<Outbox> = self
            .state
            .lock()
            .outboxes
            .values()
            .filter(|o| {
                o.status == OutboxStatus::Pending
                    && o.created_at < older_than
                    && o.deleted_at.is_none()
            })
            .cloned()
            .collect();
        stale.sort_by_key(|o| o.created_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }
}

pub struct InMemoryLedgerTransaction {
    state: Arc<Mutex<LedgerState>>,
    faults: Arc<Mutex<Vec<LedgerOperation>>>,
    working: LedgerState,
    _guard: OwnedMutexGuard<()>,
}

impl InMemoryLedgerTransaction {
    fn check_fault(&self, operation: LedgerOperation) -> LedgerResult<()> {
        InMemoryLedger::check_fault(&self.faults, operation)
    }
}

#[async_trait]
impl LedgerTransaction for InMemoryLedgerTransaction {
    async fn create_message(&mut self, new_message: NewMessage) -> LedgerResult<Message> {
        self.check_fault(LedgerOperation::CreateMessage)?;
        if !self.working.tenants.contains_key(&new_message.tenant_id) {
            return Err(LedgerError::database(
                "message.create",
                format!("tenant {} does not exist", new_message.tenant_id),
            ));
        }

        let now = Utc::now();
        let message = Message {
            id: self.working.next_id(),
            uuid: Uuid::new_v4(),
            tenant_id: new_message.tenant_id,
            channel: new_message.channel,
            mobile: new_message.mobile,
            message_text: new_message.message_text,
            message_hash: new_message.message_hash,
            status: MessageStatus::Queued,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.working.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn create_outbox(&mut self, new_outbox: NewOutbox) -> LedgerResult<Outbox> {
        self.check_fault(LedgerOperation::CreateOutbox)?;
        if self
            .working
            .outboxes
            .values()
            .any(|o| o.message_id == new_outbox.message_id)
        {
            return Err(LedgerError::UniqueViolation {
                detail: format!(
                    "Key (message_id)=({}) already exists.",
                    new_outbox.message_id
                ),
            });
        }

        let now = Utc::now();
        let outbox = Outbox {
            id: self.working.next_id(),
            uuid: Uuid::new_v4(),
            event_type: new_outbox.event_type,
            message_id: new_outbox.message_id,
            payload: new_outbox.payload,
            status: OutboxStatus::Pending,
            retries: 0,
            created_at: now,
            updated_at: now,
            retry_at: None,
            deleted_at: None,
        };
        self.working.outboxes.insert(outbox.id, outbox.clone());
        Ok(outbox)
    }

    async fn update_outbox_payload(
        &mut self,
        outbox_id: i64,
        payload: serde_json::Value,
    ) -> LedgerResult<()> {
        let outbox = self
            .working
            .outboxes
            .get_mut(&outbox_id)
            .ok_or_else(|| LedgerError::not_found("outbox", outbox_id))?;
        outbox.payload = payload;
        outbox.updated_at = Utc::now();
        Ok(())
    }

    async fn lock_credit(&mut self, credit_id: i64) -> LedgerResult<Credit> {
        self.check_fault(LedgerOperation::LockCredit)?;
        self.working
            .credits
            .get(&credit_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("credit", credit_id))
    }

    async fn update_credit_balance(
        &mut self,
        credit_id: i64,
        balance: &BigDecimal,
    ) -> LedgerResult<Credit> {
        self.check_fault(LedgerOperation::UpdateCreditBalance)?;
        if *balance < BigDecimal::from(0) {
            return Err(LedgerError::ConstraintViolation {
                detail: format!("Failing row contains negative balance {balance}."),
            });
        }

        let credit = self
            .working
            .credits
            .get_mut(&credit_id)
            .ok_or_else(|| LedgerError::not_found("credit", credit_id))?;
        credit.balance = balance.clone();
        credit.updated_at = Utc::now();
        Ok(credit.clone())
    }

    async fn create_transaction(
        &mut self,
        new_transaction: NewCreditTransaction,
    ) -> LedgerResult<CreditTransaction> {
        self.check_fault(LedgerOperation::CreateTransaction)?;
        if self
            .working
            .transactions
            .iter()
            .any(|t| t.id == new_transaction.id)
        {
            return Err(LedgerError::UniqueViolation {
                detail: format!(
                    "Key (id)=(\\x{}) already exists.",
                    hex::encode(&new_transaction.id)
                ),
            });
        }

        let transaction = CreditTransaction {
            id: new_transaction.id,
            credit_id: new_transaction.credit_id,
            amount: new_transaction.amount,
            message_hash_id: new_transaction.message_hash_id,
            created_at: Utc::now(),
        };
        self.working.transactions.push(transaction.clone());
        Ok(transaction)
    }

    async fn update_message_status(
        &mut self,
        message_id: i64,
        status: MessageStatus,
    ) -> LedgerResult<()> {
        self.check_fault(LedgerOperation::UpdateMessageStatus)?;
        let message = self
            .working
            .messages
            .get_mut(&message_id)
            .filter(|m| m.deleted_at.is_none())
            .ok_or_else(|| LedgerError::not_found("message", message_id))?;
        message.status = status;
        message.updated_at = Utc::now();
        Ok(())
    }

    async fn update_outbox_status(
        &mut self,
        outbox_id: i64,
        status: OutboxStatus,
    ) -> LedgerResult<()> {
        self.check_fault(LedgerOperation::UpdateOutboxStatus)?;
        let outbox = self
            .working
            .outboxes
            .get_mut(&outbox_id)
            .filter(|o| o.deleted_at.is_none())
            .ok_or_else(|| LedgerError::not_found("outbox", outbox_id))?;
        outbox.status = status;
        outbox.updated_at = Utc::now();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        self.check_fault(LedgerOperation::Commit)?;
        let this = *self;
        *this.state.lock() = this.working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> LedgerResult<()> {
        Ok(())
    }
}
