//! Embedded schema migrations.
//!
//! The SQL files under `migrations/` are compiled into the binary. Tests use
//! `#[sqlx::test(migrator = "smsgate_core::database::MIGRATOR")]` to get a fresh,
//! migrated database per test.

use sqlx::PgPool;
use tracing::info;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Apply any pending migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await?;
    info!(
        migrations = MIGRATOR.iter().count(),
        "💾 Database migrations applied"
    );
    Ok(())
}
