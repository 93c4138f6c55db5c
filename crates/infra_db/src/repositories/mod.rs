//! Repository implementations for billing tables
//!
//! Repositories encapsulate SQL and return row types that mirror the table
//! columns. Writes that must be atomic (invoice numbering, late fees, policy
//! inserts) run in a single transaction inside the repository method.

pub mod invoice;
pub mod automation;
pub mod jobs;
pub mod audit;

pub use invoice::InvoiceRepository;
pub use automation::{AutomationRepository, LateFeeInsert};
pub use jobs::JobRepository;
pub use audit::AuditRepository;
