//! Billing Domain - invoice computation, reconciliation, and lifecycle
//!
//! This crate holds the pure core of the billing engine. Nothing here performs
//! I/O; the automation crate drives it through ports.
//!
//! # Components
//!
//! - **InvoiceCalculator**: per-line and per-invoice totals with discount and
//!   tax composition, half-up rounding to the cent
//! - **BalanceReconciler**: amount due from totals, successful payments and
//!   credit notes
//! - **InvoiceLifecycle**: the status state machine and the side effects each
//!   transition requests
//! - Dunning and late-fee policy types plus their idempotency records
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{BalanceReconciler, InvoiceCalculator};
//!
//! let totals = InvoiceCalculator::compute_invoice_totals(&invoice);
//! let due = BalanceReconciler::amount_due(&invoice, &payments, &credit_notes);
//! assert!(due.due_cents <= totals.total_cents);
//! ```

pub mod invoice;
pub mod payment;
pub mod organization;
pub mod calculator;
pub mod reconciler;
pub mod lifecycle;
pub mod automation;
pub mod audit;
pub mod error;

pub use invoice::{
    Invoice, InvoiceStatus, LineItem, LineItemKind, Discount, DiscountType, format_invoice_number,
};
pub use payment::{Payment, PaymentStatus, CreditNote};
pub use organization::{Organization, Customer};
pub use calculator::{InvoiceCalculator, InvoiceTotals, LineTotals};
pub use reconciler::{BalanceReconciler, AmountDue};
pub use lifecycle::{InvoiceLifecycle, InvoiceEvent, SideEffect, Transition};
pub use automation::{
    ReminderPolicy, ReminderRule, ReminderTemplate, LateFeePolicy, LateFeeCharge,
    ReminderJobLog, ReminderLogStatus, ReminderDelivery, LateFeeApplication, SkipReason,
};
pub use audit::{AuditAction, AuditEntry};
pub use error::BillingError;
