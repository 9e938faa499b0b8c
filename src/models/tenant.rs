use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use super::credit::Credit;

/// Tenant owning one prepaid credit balance
/// Maps to `tenants` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: i64,
    pub uuid: Uuid,
    pub username: String,
    pub tenant_name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// New Tenant for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTenant {
    pub username: String,
    pub tenant_name: String,
}

/// A tenant together with its credit row, the input to a send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantAccount {
    pub tenant: Tenant,
    pub credit: Credit,
}

const TENANT_COLUMNS: &str =
    "id, uuid, username, tenant_name, active, created_at, updated_at, deleted_at";

impl Tenant {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        new_tenant: NewTenant,
    ) -> Result<Tenant, sqlx::Error> {
        sqlx::query_as::<_, Tenant>(&format!(
            r#"
            INSERT INTO tenants (uuid, username, tenant_name, active, created_at, updated_at)
            VALUES ($1, $2, $3, TRUE, NOW(), NOW())
            RETURNING {TENANT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new_tenant.username)
        .bind(new_tenant.tenant_name)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_uuid<'e, E: PgExecutor<'e>>(
        executor: E,
        uuid: Uuid,
    ) -> Result<Option<Tenant>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants WHERE uuid = $1 AND deleted_at IS NULL"
        ))
        .bind(uuid)
        .fetch_optional(executor)
        .await
    }
}
