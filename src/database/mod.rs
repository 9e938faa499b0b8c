//! # Database Operations
//!
//! PostgreSQL connection management, embedded schema migrations and SQLSTATE
//! codes used when translating driver errors.
//!
//! - [`connection`] - Pool construction from configuration and health checks
//! - [`migrations`] - Embedded `migrations/` directory
//! - [`error_codes`] - SQLSTATE constants

pub mod connection;
pub mod error_codes;
pub mod migrations;

pub use connection::DatabaseConnection;
pub use error_codes::PgErrorCode;
pub use migrations::{run_migrations, MIGRATOR};
