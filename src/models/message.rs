use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::pagination::{MessageListQuery, Page};
use crate::state_machine::MessageStatus;

/// One SMS send request
/// Maps to `messages` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub uuid: Uuid,
    pub tenant_id: i64,
    /// Channel topic the message was submitted to
    pub channel: String,
    pub mobile: String,
    pub message_text: String,
    /// SHA-256 hex of `{tenant_id}:{mobile}:{text}`
    pub message_hash: String,
    #[sqlx(try_from = "String")]
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// New Message for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub tenant_id: i64,
    pub channel: String,
    pub mobile: String,
    pub message_text: String,
    pub message_hash: String,
}

const MESSAGE_COLUMNS: &str = "id, uuid, tenant_id, channel, mobile, message_text, message_hash, \
                               status, created_at, updated_at, deleted_at";

impl Message {
    /// Insert a message in the `queued` status
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        new_message: NewMessage,
    ) -> Result<Message, sqlx::Error> {
        sqlx::query_as::<_, Message>(&format!(
            r#"
            INSERT INTO messages
                (uuid, tenant_id, channel, mobile, message_text, message_hash, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new_message.tenant_id)
        .bind(new_message.channel)
        .bind(new_message.mobile)
        .bind(new_message.message_text)
        .bind(new_message.message_hash)
        .bind(MessageStatus::Queued.as_str())
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: i64,
    ) -> Result<Option<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_uuid<'e, E: PgExecutor<'e>>(
        executor: E,
        uuid: Uuid,
    ) -> Result<Option<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE uuid = $1 AND deleted_at IS NULL"
        ))
        .bind(uuid)
        .fetch_optional(executor)
        .await
    }

    /// Set the status; returns the number of rows touched
    pub async fn update_status<'e, E: PgExecutor<'e>>(
        executor: E,
        id: i64,
        status: MessageStatus,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE messages SET status = $2, updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Tenant-scoped, filtered, paginated listing with the total match count
    pub async fn list(pool: &PgPool, query: &MessageListQuery) -> Result<Page<Message>, sqlx::Error> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM messages");
        push_list_filters(&mut count_query, query);
        let (total,): (i64,) = count_query.build_query_as().fetch_one(pool).await?;

        let mut page_query =
            QueryBuilder::<Postgres>::new(format!("SELECT {MESSAGE_COLUMNS} FROM messages"));
        push_list_filters(&mut page_query, query);
        page_query.push(format!(
            " ORDER BY {} {}, id {}",
            query.sort.column(),
            query.order.as_sql(),
            query.order.as_sql()
        ));
        page_query.push(" LIMIT ");
        page_query.push_bind(i64::from(query.limit()));
        page_query.push(" OFFSET ");
        page_query.push_bind(query.offset());

        let items = page_query.build_query_as::<Message>().fetch_all(pool).await?;

        Ok(Page {
            items,
            total,
            page: query.page(),
            limit: query.limit(),
        })
    }
}

fn push_list_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &MessageListQuery) {
    builder.push(" WHERE deleted_at IS NULL AND tenant_id = ");
    builder.push_bind(query.tenant_id);

    if let Some(pattern) = query.search_pattern() {
        builder.push(" AND message_text ILIKE ");
        builder.push_bind(pattern);
    }

    if !query.items.is_empty() {
        builder.push(" AND uuid = ANY(");
        builder.push_bind(query.items.clone());
        builder.push(")");
    }
}
