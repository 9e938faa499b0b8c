//! # Delivery Orchestrator
//!
//! Accepts a message for a tenant. In one ledger transaction it records the
//! message and its outbox row, debits the tenant's credit by the message price
//! and appends the debit to the ledger. Only after commit is the envelope
//! published to the channel topic.
//!
//! A publish failure after commit is logged and leaves the outbox row
//! `pending`; [`OutboxReplayer`](super::OutboxReplayer) picks such rows up.

use bigdecimal::BigDecimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::hashing::{content_hash, transaction_id};
use crate::constants::operations;
use crate::error::{SmsGateError, SmsGateResult};
use crate::ledger::{self, LedgerStore, LedgerTransaction};
use crate::logging::{log_delivery_operation, log_error};
use crate::messaging::{Dispatcher, Envelope};
use crate::models::{
    CreditTransaction, Message, MessageListQuery, NewCreditTransaction, NewMessage, NewOutbox,
    Outbox, Page, TenantAccount,
};
use crate::validation::{MessageValidator, SendMessageRequest};

/// A message with its outbox row preloaded on request
#[derive(Debug, Clone, Serialize)]
pub struct MessageDetail {
    pub message: Message,
    pub outbox: Option<Outbox>,
}

pub struct DeliveryOrchestrator {
    ledger: Arc<dyn LedgerStore>,
    dispatcher: Dispatcher,
    validator: MessageValidator,
    price: BigDecimal,
}

impl std::fmt::Debug for DeliveryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryOrchestrator")
            .field("price", &self.price)
            .field("max_length", &self.validator.max_length())
            .finish_non_exhaustive()
    }
}

impl DeliveryOrchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        dispatcher: Dispatcher,
        validator: MessageValidator,
        price: BigDecimal,
    ) -> Self {
        Self {
            ledger,
            dispatcher,
            validator,
            price,
        }
    }

    pub fn price(&self) -> &BigDecimal {
        &self.price
    }

    /// Resolve the tenant by UUID, then send
    pub async fn send_for_tenant(
        &self,
        tenant_uuid: Uuid,
        request: SendMessageRequest,
    ) -> SmsGateResult<Message> {
        let account = self.ledger.find_tenant_account(tenant_uuid).await?;
        self.send(&account, request).await
    }

    /// Bill and enqueue one message.
    ///
    /// Errors before commit leave no rows behind and no debit. The returned
    /// message is the committed row, still `queued`.
    #[instrument(skip(self, account, request), fields(tenant_id = account.tenant.id, channel = %request.channel))]
    pub async fn send(
        &self,
        account: &TenantAccount,
        request: SendMessageRequest,
    ) -> SmsGateResult<Message> {
        self.validator.validate(&request)?;
        self.ensure_balance(&account.credit.balance)?;

        let hash = content_hash(account.tenant.id, &request.mobile, &request.text);

        let mut tx = self.ledger.begin().await?;
        debug!(operation = operations::MESSAGE_CREATE_TX_BEGIN, "Ledger transaction opened");

        let result = self.record(tx.as_mut(), account, request, hash).await;
        let committed = result.is_ok();
        if let Err(err) = &result {
            log_error(
                "DeliveryOrchestrator",
                operations::MESSAGE_CREATE_TX_ROLLBACK,
                &err.to_string(),
                Some(&format!("tenant_id={}", account.tenant.id)),
            );
        }

        let (message, envelope) = ledger::resolve(tx, result).await.map_err(|err| {
            if committed {
                log_error(
                    "DeliveryOrchestrator",
                    operations::MESSAGE_CREATE_TX_COMMIT,
                    &err.to_string(),
                    None,
                );
                SmsGateError::failed("could not commit the message")
            } else {
                err
            }
        })?;

        log_delivery_operation(
            operations::MESSAGE_CREATE_TX_COMMIT,
            Some(message.id),
            Some(envelope.outbox_id),
            message.status.as_str(),
            None,
        );

        self.publish(&message.channel, &envelope).await;
        Ok(message)
    }

    async fn record(
        &self,
        tx: &mut dyn LedgerTransaction,
        account: &TenantAccount,
        request: SendMessageRequest,
        hash: String,
    ) -> SmsGateResult<(Message, Envelope)> {
        let message = tx
            .create_message(NewMessage {
                tenant_id: account.tenant.id,
                channel: request.channel,
                mobile: request.mobile,
                message_text: request.text,
                message_hash: hash.clone(),
            })
            .await?;

        let envelope = Envelope::from_message(&message);
        let outbox = tx
            .create_outbox(NewOutbox {
                event_type: message.channel.clone(),
                message_id: message.id,
                payload: envelope.to_value()?,
            })
            .await?;
        let envelope = envelope.with_outbox_id(outbox.id);
        tx.update_outbox_payload(outbox.id, envelope.to_value()?)
            .await?;

        let credit = tx.lock_credit(account.credit.id).await?;
        self.ensure_balance(&credit.balance)?;
        let remaining = &credit.balance - &self.price;
        let credit = tx.update_credit_balance(credit.id, &remaining).await?;

        tx.create_transaction(NewCreditTransaction {
            id: transaction_id(
                account.tenant.uuid,
                credit.uuid,
                &credit.balance,
                &self.price,
                &hash,
            ),
            credit_id: credit.id,
            amount: self.price.clone(),
            message_hash_id: hash.into_bytes(),
        })
        .await?;

        Ok((message, envelope))
    }

    fn ensure_balance(&self, balance: &BigDecimal) -> SmsGateResult<()> {
        if *balance < self.price {
            return Err(SmsGateError::conflict(format!(
                "insufficient balance: {balance} is below the message price {}",
                self.price
            )));
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, envelope: &Envelope) {
        match self.dispatcher.publish(topic, envelope).await {
            Ok(()) => log_delivery_operation(
                operations::MESSAGE_PUBLISH,
                Some(envelope.message_id),
                Some(envelope.outbox_id),
                "published",
                Some(topic),
            ),
            Err(err) => log_error(
                "DeliveryOrchestrator",
                operations::MESSAGE_PUBLISH,
                &err.to_string(),
                Some(&format!(
                    "message_id={} outbox_id={} left pending",
                    envelope.message_id, envelope.outbox_id
                )),
            ),
        }
    }

    pub async fn list_messages(&self, query: &MessageListQuery) -> SmsGateResult<Page<Message>> {
        Ok(self.ledger.list_messages(query).await?)
    }

    pub async fn message_detail(
        &self,
        message_uuid: Uuid,
        with_outbox: bool,
    ) -> SmsGateResult<MessageDetail> {
        let message = self.ledger.find_message_by_uuid(message_uuid).await?;
        let outbox = if with_outbox {
            self.ledger.find_outbox_for_message(message.id).await?
        } else {
            None
        };
        Ok(MessageDetail { message, outbox })
    }

    pub async fn outbox_detail(&self, outbox_uuid: Uuid) -> SmsGateResult<Outbox> {
        Ok(self.ledger.find_outbox_by_uuid(outbox_uuid).await?)
    }

    pub async fn transactions(&self, account: &TenantAccount) -> SmsGateResult<Vec<CreditTransaction>> {
        Ok(self.ledger.list_transactions(account.credit.id).await?)
    }
}
