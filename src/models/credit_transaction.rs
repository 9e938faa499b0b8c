use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};

/// Immutable debit record
/// Maps to `credit_transactions` table; `id` is a 32-byte digest and the primary key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CreditTransaction {
    pub id: Vec<u8>,
    pub credit_id: i64,
    pub amount: BigDecimal,
    pub message_hash_id: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCreditTransaction {
    pub id: Vec<u8>,
    pub credit_id: i64,
    pub amount: BigDecimal,
    pub message_hash_id: Vec<u8>,
}

impl CreditTransaction {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        new_transaction: NewCreditTransaction,
    ) -> Result<CreditTransaction, sqlx::Error> {
        sqlx::query_as::<_, CreditTransaction>(
            r#"
            INSERT INTO credit_transactions (id, credit_id, amount, message_hash_id, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, credit_id, amount, message_hash_id, created_at
            "#,
        )
        .bind(new_transaction.id)
        .bind(new_transaction.credit_id)
        .bind(new_transaction.amount)
        .bind(new_transaction.message_hash_id)
        .fetch_one(executor)
        .await
    }

    /// Ledger entries of one credit, newest first
    pub async fn list_for_credit<'e, E: PgExecutor<'e>>(
        executor: E,
        credit_id: i64,
    ) -> Result<Vec<CreditTransaction>, sqlx::Error> {
        sqlx::query_as::<_, CreditTransaction>(
            r#"
            SELECT id, credit_id, amount, message_hash_id, created_at
            FROM credit_transactions
            WHERE credit_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(credit_id)
        .fetch_all(executor)
        .await
    }
}
