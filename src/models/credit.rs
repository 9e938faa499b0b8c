use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

/// Prepaid balance of a tenant
/// Maps to `credits` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Credit {
    pub id: i64,
    pub uuid: Uuid,
    pub tenant_id: i64,
    pub balance: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCredit {
    pub tenant_id: i64,
    pub balance: BigDecimal,
}

const CREDIT_COLUMNS: &str = "id, uuid, tenant_id, balance, created_at, updated_at";

impl Credit {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        new_credit: NewCredit,
    ) -> Result<Credit, sqlx::Error> {
        sqlx::query_as::<_, Credit>(&format!(
            r#"
            INSERT INTO credits (uuid, tenant_id, balance, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            RETURNING {CREDIT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new_credit.tenant_id)
        .bind(new_credit.balance)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_tenant<'e, E: PgExecutor<'e>>(
        executor: E,
        tenant_id: i64,
    ) -> Result<Option<Credit>, sqlx::Error> {
        sqlx::query_as::<_, Credit>(&format!(
            "SELECT {CREDIT_COLUMNS} FROM credits WHERE tenant_id = $1 AND deleted_at IS NULL"
        ))
        .bind(tenant_id)
        .fetch_optional(executor)
        .await
    }

    /// Read the credit row and hold its lock until the surrounding transaction ends
    pub async fn lock_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: i64,
    ) -> Result<Option<Credit>, sqlx::Error> {
        sqlx::query_as::<_, Credit>(&format!(
            "SELECT {CREDIT_COLUMNS} FROM credits WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn update_balance<'e, E: PgExecutor<'e>>(
        executor: E,
        id: i64,
        balance: &BigDecimal,
    ) -> Result<Credit, sqlx::Error> {
        sqlx::query_as::<_, Credit>(&format!(
            r#"
            UPDATE credits
            SET balance = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {CREDIT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(balance)
        .fetch_one(executor)
        .await
    }
}
