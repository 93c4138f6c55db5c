//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! billing engine test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built organizations, customers, timezones and dates
//! - `builders`: Builders for invoices and automation policies
//! - `database`: PostgreSQL testcontainer harness
//! - `assertions`: Assertion helpers for billing types
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
