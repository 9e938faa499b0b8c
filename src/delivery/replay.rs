//! Republishing of outbox rows whose post-commit publish never happened.
//!
//! Operator-triggered. Rows stay `pending` until a consumer picks the record
//! up, so running a replay twice before the consumers catch up publishes the
//! same envelope twice.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use crate::constants::operations;
use crate::error::{SmsGateError, SmsGateResult};
use crate::ledger::LedgerStore;
use crate::logging::{log_delivery_operation, log_error};
use crate::messaging::{Dispatcher, Envelope};
use crate::models::Outbox;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub scanned: usize,
    pub replayed: usize,
    pub failed: usize,
}

pub struct OutboxReplayer {
    ledger: Arc<dyn LedgerStore>,
    dispatcher: Dispatcher,
}

impl OutboxReplayer {
    pub fn new(ledger: Arc<dyn LedgerStore>, dispatcher: Dispatcher) -> Self {
        Self { ledger, dispatcher }
    }

    /// Outbox rows still `pending` after `min_age`
    pub async fn find_stale_pending(
        &self,
        min_age: Duration,
        limit: i64,
    ) -> SmsGateResult<Vec<Outbox>> {
        let age = ChronoDuration::from_std(min_age)
            .map_err(|e| SmsGateError::validation(format!("replay age out of range: {e}")))?;
        Ok(self
            .ledger
            .find_stale_pending(Utc::now() - age, limit)
            .await?)
    }

    /// Publish the stored payload of every stale row to its event-type topic
    #[instrument(skip(self))]
    pub async fn replay_pending(&self, min_age: Duration, limit: i64) -> SmsGateResult<ReplayReport> {
        let stale = self.find_stale_pending(min_age, limit).await?;
        let mut report = ReplayReport {
            scanned: stale.len(),
            ..ReplayReport::default()
        };

        for outbox in stale {
            match self.replay_one(&outbox).await {
                Ok(()) => {
                    report.replayed += 1;
                    log_delivery_operation(
                        operations::OUTBOX_REPLAY,
                        Some(outbox.message_id),
                        Some(outbox.id),
                        "republished",
                        Some(&outbox.event_type),
                    );
                }
                Err(err) => {
                    report.failed += 1;
                    log_error(
                        "OutboxReplayer",
                        operations::OUTBOX_REPLAY,
                        &err.to_string(),
                        Some(&format!("outbox_id={}", outbox.id)),
                    );
                }
            }
        }

        info!(
            scanned = report.scanned,
            replayed = report.replayed,
            failed = report.failed,
            "Outbox replay finished"
        );
        Ok(report)
    }

    async fn replay_one(&self, outbox: &Outbox) -> SmsGateResult<()> {
        let envelope = Envelope::from_value(outbox.payload.clone())?;
        self.dispatcher.publish(&outbox.event_type, &envelope).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{InMemoryLedger, LedgerTransaction};
    use crate::messaging::{BrokerFault, InMemoryBroker};
    use crate::models::{NewMessage, NewOutbox};
    use bigdecimal::BigDecimal;

    async fn pending_outbox(ledger: &InMemoryLedger, payload: serde_json::Value) -> i64 {
        let account = ledger.seed_tenant("replay", BigDecimal::from(10));
        let mut tx = ledger.begin().await.unwrap();
        let message = tx
            .create_message(NewMessage {
                tenant_id: account.tenant.id,
                channel: "event.express".to_string(),
                mobile: "09120000000".to_string(),
                message_text: "hi".to_string(),
                message_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        let outbox = tx
            .create_outbox(NewOutbox {
                event_type: "event.express".to_string(),
                message_id: message.id,
                payload,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        outbox.id
    }

    fn envelope_value(outbox_id: i64) -> serde_json::Value {
        serde_json::json!({
            "tenantId": 1, "messageId": 1, "outboxId": outbox_id,
            "channel": "event.express", "mobile": "09120000000",
            "messageText": "hi", "messageHash": "hash", "status": "queued"
        })
    }

    #[tokio::test]
    async fn test_replays_stale_rows_to_their_topic() {
        let ledger = InMemoryLedger::new();
        pending_outbox(&ledger, envelope_value(2)).await;
        let broker = InMemoryBroker::new();
        let replayer = OutboxReplayer::new(
            Arc::new(ledger),
            Dispatcher::new(Arc::new(broker.clone()), Duration::from_millis(100)),
        );

        tokio::time::sleep(Duration::from_millis(5)).await;
        let report = replayer.replay_pending(Duration::ZERO, 100).await.unwrap();

        assert_eq!(report.replayed, 1);
        let records = broker.published("event.express");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key.as_deref(), Some(&b"hash"[..]));
    }

    #[tokio::test]
    async fn test_fresh_rows_are_left_alone() {
        let ledger = InMemoryLedger::new();
        pending_outbox(&ledger, envelope_value(2)).await;
        let broker = InMemoryBroker::new();
        let replayer = OutboxReplayer::new(
            Arc::new(ledger),
            Dispatcher::new(Arc::new(broker.clone()), Duration::from_millis(100)),
        );

        let report = replayer
            .replay_pending(Duration::from_secs(3600), 100)
            .await
            .unwrap();
        assert_eq!(report, ReplayReport::default());
        assert!(broker.published("event.express").is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let ledger = InMemoryLedger::new();
        pending_outbox(&ledger, serde_json::json!({"garbage": true})).await;
        pending_outbox(&ledger, envelope_value(4)).await;
        let broker = InMemoryBroker::new();
        broker.inject(BrokerFault::Produce {
            topic: "event.express".to_string(),
        });
        let replayer = OutboxReplayer::new(
            Arc::new(ledger),
            Dispatcher::new(Arc::new(broker), Duration::from_millis(100)),
        );

        tokio::time::sleep(Duration::from_millis(5)).await;
        let report = replayer.replay_pending(Duration::ZERO, 100).await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.replayed, 0);
    }
}
