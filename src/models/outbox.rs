use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::state_machine::OutboxStatus;

/// At-least-once delivery obligation, 1:1 with a message
/// Maps to `outboxes` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Outbox {
    pub id: i64,
    pub uuid: Uuid,
    /// Channel topic the payload is published to
    pub event_type: String,
    pub message_id: i64,
    /// Envelope snapshot as published
    pub payload: serde_json::Value,
    #[sqlx(try_from = "String")]
    pub status: OutboxStatus,
    pub retries: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub retry_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOutbox {
    pub event_type: String,
    pub message_id: i64,
    pub payload: serde_json::Value,
}

const OUTBOX_COLUMNS: &str = "id, uuid, event_type, message_id, payload, status, retries, \
                              created_at, updated_at, retry_at, deleted_at";

impl Outbox {
    /// Insert an outbox row in the `pending` status
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        new_outbox: NewOutbox,
    ) -> Result<Outbox, sqlx::Error> {
        sqlx::query_as::<_, Outbox>(&format!(
            r#"
            INSERT INTO outboxes (uuid, event_type, message_id, payload, status, retries, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, NOW(), NOW())
            RETURNING {OUTBOX_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new_outbox.event_type)
        .bind(new_outbox.message_id)
        .bind(new_outbox.payload)
        .bind(OutboxStatus::Pending.as_str())
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: i64,
    ) -> Result<Option<Outbox>, sqlx::Error> {
        sqlx::query_as::<_, Outbox>(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outboxes WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_uuid<'e, E: PgExecutor<'e>>(
        executor: E,
        uuid: Uuid,
    ) -> Result<Option<Outbox>, sqlx::Error> {
        sqlx::query_as::<_, Outbox>(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outboxes WHERE uuid = $1 AND deleted_at IS NULL"
        ))
        .bind(uuid)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_message_id<'e, E: PgExecutor<'e>>(
        executor: E,
        message_id: i64,
    ) -> Result<Option<Outbox>, sqlx::Error> {
        sqlx::query_as::<_, Outbox>(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outboxes WHERE message_id = $1 AND deleted_at IS NULL"
        ))
        .bind(message_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn update_payload<'e, E: PgExecutor<'e>>(
        executor: E,
        id: i64,
        payload: serde_json::Value,
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("UPDATE outboxes SET payload = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(payload)
                .execute(executor)
                .await?;

        Ok(result.rows_affected())
    }

    pub async fn update_status<'e, E: PgExecutor<'e>>(
        executor: E,
        id: i64,
        status: OutboxStatus,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE outboxes SET status = $2, updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Record how many retry attempts the row has consumed
    pub async fn update_retries<'e, E: PgExecutor<'e>>(
        executor: E,
        id: i64,
        retries: i32,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE outboxes
            SET retries = $2, retry_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(retries)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Rows still `pending` that were created before `older_than`, oldest first
    pub async fn find_stale_pending<'e, E: PgExecutor<'e>>(
        executor: E,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Outbox>, sqlx::Error> {
        sqlx::query_as::<_, Outbox>(&format!(
            r#"
            SELECT {OUTBOX_COLUMNS}
            FROM outboxes
            WHERE status = $1 AND created_at < $2 AND deleted_at IS NULL
            ORDER BY created_at ASC
            LIMIT $3
            "#
        ))
        .bind(OutboxStatus::Pending.as_str())
        .bind(older_than)
        .bind(limit)
        .fetch_all(executor)
        .await
    }
}
