//! # Data Models
//!
//! Row types of the billing and delivery schema, each carrying the SQL that
//! reads and writes it. Every query takes a generic `PgExecutor`, so the same
//! call runs against the pool or inside an open transaction.

pub mod credit;
pub mod credit_transaction;
pub mod message;
pub mod outbox;
pub mod pagination;
pub mod tenant;

pub use credit::{Credit, NewCredit};
pub use credit_transaction::{CreditTransaction, NewCreditTransaction};
pub use message::{Message, NewMessage};
pub use outbox::{NewOutbox, Outbox};
pub use pagination::{MessageListQuery, MessageSortField, Page, SortOrder};
pub use tenant::{NewTenant, Tenant, TenantAccount};
