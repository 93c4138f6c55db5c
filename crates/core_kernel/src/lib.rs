//! Core Kernel - Foundational types and utilities for the billing engine
//!
//! This crate provides the fundamental building blocks used across all domain modules:
//! - Integer-cent arithmetic with exact half-up rounding
//! - Organization timezones and the local-hour anchoring used by automation
//! - Strongly-typed identifiers
//! - The port error type shared by every adapter seam

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;

pub use money::{Cents, Currency, MoneyError, round_half_up, percent_of, clamp_cents, format_cents};
pub use temporal::{Timezone, TemporalError, Clock, SystemClock, FixedClock};
pub use identifiers::{
    OrganizationId, CustomerId, InvoiceId, LineItemId, PaymentId, CreditNoteId,
    ReminderPolicyId, ReminderRuleId, LateFeePolicyId, LateFeeApplicationId,
    ReminderLogId, JobId, AuditEventId, UserId,
};
pub use ports::{PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth};
