//! Billing Automation
//!
//! Drives the pure billing domain through ports:
//!
//! - [`InvoiceService`]: the lifecycle commands (`send`, `mark_viewed`,
//!   `mark_paid`, `void`) plus invoice creation, payments and credit notes
//! - [`AutomationScheduler`]: turns an invoice's due date and its
//!   organization's policies into delayed jobs
//! - [`AutomationWorker`]: the reminder and late-fee handlers, safe under
//!   at-least-once delivery and concurrent execution
//! - [`AutomationRunner`]: polls the durable queue and dispatches jobs to the
//!   worker with bounded concurrency and retry backoff
//!
//! All collaborators are injected as `Arc<dyn Port>`; nothing here reaches for
//! global state.

pub mod commands;
pub mod error;
pub mod jobs;
pub mod ports;
pub mod runner;
pub mod scheduler;
pub mod service;
pub mod worker;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use commands::{
    CreateInvoiceCommand, NewLineItem, DiscountInput, RecordPaymentCommand,
    IssueCreditNoteCommand,
};
pub use error::AutomationError;
pub use jobs::{
    AutomationTask, SendReminderPayload, ApplyLateFeePayload, SEND_REMINDER_TOPIC,
    APPLY_LATE_FEE_TOPIC,
};
pub use ports::{
    AuditLog, BillingStore, ComplianceGate, ComplianceIssue, ComplianceReport, DocumentService,
    Attachment, EmailTemplate, InvoiceAggregate, Job, JobQueue, JobSource, LateFeeWrite,
    LateFeeWriteResult, Mailer, NewInvoice, NewJob, OutboundEmail, SettlementWrite,
    LEASE_EXPIRED_ERROR,
};
pub use runner::{AutomationRunner, RunnerConfig, JobDisposition, retry_backoff};
pub use scheduler::{
    AutomationScheduler, ScheduledTask, ScheduleReport, MAX_REMINDER_RULES, JOB_MAX_ATTEMPTS,
    LOCAL_SEND_HOUR,
};
pub use service::{
    InvoiceService, InvoiceServicePorts, PaymentOutcome, SendOutcome, MAX_LIFECYCLE_ATTEMPTS,
};
pub use worker::{AutomationWorker, ReminderOutcome, LateFeeOutcome, TaskOutcome};
