//! Domain Adapters
//!
//! PostgreSQL implementations of the automation ports. Each adapter:
//! - Implements the port trait from `domain_automation`
//! - Translates between domain models and repository row types
//! - Reports database health through `HealthCheckable`
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::{PostgresBillingStore, PostgresJobQueue};
//!
//! let store = PostgresBillingStore::new(pool.clone());
//! let queue = PostgresJobQueue::new(pool, Arc::new(SystemClock));
//! ```

pub mod audit_log;
pub mod billing_store;
pub mod job_queue;

pub use audit_log::PostgresAuditLog;
pub use billing_store::PostgresBillingStore;
pub use job_queue::PostgresJobQueue;
