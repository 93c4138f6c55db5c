//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the billing engine using SQLx:
//!
//! - [`adapters::PostgresBillingStore`]: invoices, money records, policies and
//!   the idempotency rows behind reminders and late fees
//! - [`adapters::PostgresJobQueue`]: the durable delayed-job queue, leased with
//!   `FOR UPDATE SKIP LOCKED`
//! - [`adapters::PostgresAuditLog`]: the append-only audit trail
//!
//! # Architecture
//!
//! Repositories own the SQL and return row types; adapters implement the
//! `domain_automation` ports on top of them.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig};
//! use infra_db::adapters::PostgresBillingStore;
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/billing")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresBillingStore::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, run_migrations, DatabaseConfig};
pub use error::DatabaseError;
pub use adapters::{PostgresAuditLog, PostgresBillingStore, PostgresJobQueue};
