//! # Status Coordinator
//!
//! Writes a message status and its outbox status together. Every consumer path
//! goes through [`StatusCoordinator::update_status`], and the only way to name
//! the pair is a [`DeliveryStage`], so the two rows never disagree.

use std::sync::Arc;
use tracing::instrument;

use crate::constants::operations;
use crate::error::{SmsGateError, SmsGateResult};
use crate::ledger::{self, LedgerResult, LedgerStore, LedgerTransaction};
use crate::logging::{log_delivery_operation, log_error};
use crate::state_machine::DeliveryStage;

#[derive(Clone)]
pub struct StatusCoordinator {
    ledger: Arc<dyn LedgerStore>,
}

impl std::fmt::Debug for StatusCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusCoordinator").finish_non_exhaustive()
    }
}

impl StatusCoordinator {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Move a message and its outbox row to `stage` in one transaction
    #[instrument(skip(self), fields(stage = %stage))]
    pub async fn update_status(
        &self,
        message_id: i64,
        outbox_id: i64,
        stage: DeliveryStage,
    ) -> SmsGateResult<()> {
        let mut tx = self.ledger.begin().await?;
        let result = write_pair(tx.as_mut(), message_id, outbox_id, stage).await;

        if let Err(err) = &result {
            log_error(
                "StatusCoordinator",
                operations::STATUS_UPDATE,
                &err.to_string(),
                Some(&format!("message_id={message_id} outbox_id={outbox_id} stage={stage}")),
            );
        }

        ledger::resolve(tx, result.map_err(SmsGateError::from)).await?;

        log_delivery_operation(
            operations::STATUS_UPDATE,
            Some(message_id),
            Some(outbox_id),
            &stage.to_string(),
            None,
        );
        Ok(())
    }
}

async fn write_pair(
    tx: &mut dyn LedgerTransaction,
    message_id: i64,
    outbox_id: i64,
    stage: DeliveryStage,
) -> LedgerResult<()> {
    let (message_status, outbox_status) = stage.pair();
    tx.update_message_status(message_id, message_status).await?;
    tx.update_outbox_status(outbox_id, outbox_status).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use crate::ledger::{InMemoryLedger, LedgerOperation};
    use crate::models::{NewMessage, NewOutbox};
    use crate::state_machine::{MessageStatus, OutboxStatus};

    async fn seeded() -> (InMemoryLedger, i64, i64) {
        let ledger = InMemoryLedger::new();
        let account = ledger.seed_tenant("tenant", BigDecimal::from(10));
        let mut tx = ledger.begin().await.unwrap();
        let message = tx
            .create_message(NewMessage {
                tenant_id: account.tenant.id,
                channel: "event.prod".to_string(),
                mobile: "09120000000".to_string(),
                message_text: "hi".to_string(),
                message_hash: "h".to_string(),
            })
            .await
            .unwrap();
        let outbox = tx
            .create_outbox(NewOutbox {
                event_type: "event.prod".to_string(),
                message_id: message.id,
                payload: serde_json::json!({}),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (ledger, message.id, outbox.id)
    }

    #[tokio::test]
    async fn test_update_writes_both_rows() {
        let (ledger, message_id, outbox_id) = seeded().await;
        let coordinator = StatusCoordinator::new(Arc::new(ledger.clone()));

        coordinator
            .update_status(message_id, outbox_id, DeliveryStage::Sent)
            .await
            .unwrap();

        let message = ledger.find_message(message_id).await.unwrap();
        let outbox = ledger.find_outbox(outbox_id).await.unwrap();
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(outbox.status, OutboxStatus::Published);
    }

    #[tokio::test]
    async fn test_outbox_failure_rolls_back_message() {
        let (ledger, message_id, outbox_id) = seeded().await;
        ledger.fail_next(LedgerOperation::UpdateOutboxStatus);
        let coordinator = StatusCoordinator::new(Arc::new(ledger.clone()));

        let result = coordinator
            .update_status(message_id, outbox_id, DeliveryStage::Sending)
            .await;
        assert!(result.is_err());

        let message = ledger.find_message(message_id).await.unwrap();
        let outbox = ledger.find_outbox(outbox_id).await.unwrap();
        assert_eq!(
            DeliveryStage::from_pair(message.status, outbox.status),
            Some(DeliveryStage::Queued)
        );
    }

    #[tokio::test]
    async fn test_unknown_message_is_not_found() {
        let (ledger, _, outbox_id) = seeded().await;
        let coordinator = StatusCoordinator::new(Arc::new(ledger));

        let err = coordinator
            .update_status(9_999, outbox_id, DeliveryStage::Failed)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
