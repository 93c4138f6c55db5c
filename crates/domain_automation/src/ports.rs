//! Automation Ports
//!
//! The collaborators the billing core consumes but does not implement. The
//! PostgreSQL and SMTP adapters live in `infra_db` and `interface_api`; the
//! in-memory adapters in [`crate::mock`] back the tests.
//!
//! Every method returns `Result<T, PortError>`. Precondition misses are not
//! port errors: `find_*` methods return `Ok(None)` and the idempotent writes
//! report conflicts through their result types.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use core_kernel::{
    Cents, Currency, CustomerId, DomainPort, HealthCheckable, InvoiceId, JobId, LateFeePolicyId,
    OrganizationId, PortError, ReminderRuleId,
};
use domain_billing::{
    AmountDue, AuditEntry, BalanceReconciler, CreditNote, Customer, Discount, Invoice,
    InvoiceStatus, LateFeeApplication, LateFeePolicy, LineItem, Organization, Payment,
    ReminderDelivery, ReminderJobLog, ReminderPolicy, ReminderRule,
};

/// An invoice with everything needed to reconcile and communicate it
#[derive(Debug, Clone)]
pub struct InvoiceAggregate {
    pub organization: Organization,
    pub customer: Customer,
    pub invoice: Invoice,
    pub payments: Vec<Payment>,
    pub credit_notes: Vec<CreditNote>,
}

impl InvoiceAggregate {
    pub fn amount_due(&self) -> AmountDue {
        BalanceReconciler::amount_due(&self.invoice, &self.payments, &self.credit_notes)
    }
}

/// Insert request for a draft invoice; the store allocates the number
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub id: InvoiceId,
    pub organization_id: OrganizationId,
    pub customer_id: CustomerId,
    pub public_token: String,
    pub currency: Currency,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub payment_terms_days: u32,
    pub discount: Option<Discount>,
    pub tax_label: Option<String>,
    pub tax_percent: Option<Decimal>,
    pub notes: Option<String>,
    pub line_items: Vec<LineItem>,
    pub created_at: DateTime<Utc>,
}

/// The atomic late-fee write
///
/// Appends `line`, inserts the application row and moves the invoice to
/// `OVERDUE` in one transaction.
#[derive(Debug, Clone)]
pub struct LateFeeWrite {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub policy_id: LateFeePolicyId,
    pub fee_cents: Cents,
    pub line: LineItem,
    pub applied_at: DateTime<Utc>,
}

/// Result of [`BillingStore::apply_late_fee`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LateFeeWriteResult {
    Applied(LateFeeApplication),
    /// The (invoice, policy) uniqueness constraint rejected the insert
    AlreadyApplied,
    /// The invoice became `PAID` or `VOID` before the write
    InvoiceClosed,
}

/// Result of [`BillingStore::settle_invoice`]
///
/// The balance is recomputed from the records read under the invoice's row
/// lock, so a late fee or refund that lands first is always counted.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementWrite {
    /// The invoice moved to `PAID` in this call
    Settled(Invoice),
    /// The invoice was already `PAID`
    AlreadyPaid(Invoice),
    Outstanding { due_cents: Cents },
    /// A void invoice cannot be settled
    Void,
}

/// Persistence for invoices, their money records, and automation state
#[async_trait]
pub trait BillingStore: DomainPort + HealthCheckable {
    /// Loads an invoice scoped to its organization
    ///
    /// Returns `PortError::NotFound` when the invoice does not exist or
    /// belongs to another organization.
    async fn load_invoice(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceAggregate, PortError>;

    async fn find_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<Organization>, PortError>;

    /// Looks up a customer within the organization
    async fn find_customer(
        &self,
        organization_id: OrganizationId,
        customer_id: CustomerId,
    ) -> Result<Option<Customer>, PortError>;

    /// Loads an invoice by its hosted-link token
    async fn load_invoice_by_token(&self, token: &str) -> Result<InvoiceAggregate, PortError>;

    /// Inserts a draft invoice and its lines, allocating the next number
    async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice, PortError>;

    /// Persists status and lifecycle timestamps if the stored status is
    /// still `expected`
    ///
    /// Returns `Ok(false)` and writes nothing when another writer moved the
    /// invoice first. Callers re-load and decide again.
    async fn save_lifecycle(
        &self,
        invoice: &Invoice,
        expected: InvoiceStatus,
    ) -> Result<bool, PortError>;

    /// Re-derives the `PAID` transition from locked state and persists it
    async fn settle_invoice(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        at: DateTime<Utc>,
    ) -> Result<SettlementWrite, PortError>;

    async fn append_payment(&self, payment: &Payment) -> Result<(), PortError>;

    async fn append_credit_note(&self, credit_note: &CreditNote) -> Result<(), PortError>;

    /// All reminder policies of the organization, in creation order
    async fn reminder_policies(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ReminderPolicy>, PortError>;

    async fn find_reminder_rule(
        &self,
        organization_id: OrganizationId,
        rule_id: ReminderRuleId,
    ) -> Result<Option<ReminderRule>, PortError>;

    /// The organization's enabled late-fee policy, if any
    async fn enabled_late_fee_policy(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<LateFeePolicy>, PortError>;

    async fn find_late_fee_policy(
        &self,
        organization_id: OrganizationId,
        policy_id: LateFeePolicyId,
    ) -> Result<Option<LateFeePolicy>, PortError>;

    async fn find_late_fee_application(
        &self,
        invoice_id: InvoiceId,
        policy_id: LateFeePolicyId,
    ) -> Result<Option<LateFeeApplication>, PortError>;

    /// Applies a late fee atomically; see [`LateFeeWrite`]
    async fn apply_late_fee(&self, write: LateFeeWrite) -> Result<LateFeeWriteResult, PortError>;

    /// Claims a reminder delivery
    ///
    /// Returns `false` when the (invoice, rule, due date) claim already exists.
    async fn claim_reminder_delivery(&self, delivery: &ReminderDelivery) -> Result<bool, PortError>;

    /// Drops a claim after a failed send so a retry may deliver
    async fn release_reminder_delivery(
        &self,
        invoice_id: InvoiceId,
        rule_id: ReminderRuleId,
        due_date: NaiveDate,
    ) -> Result<(), PortError>;

    async fn append_reminder_log(&self, log: &ReminderJobLog) -> Result<(), PortError>;
}

/// A file attached to an outbound email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Template key and the values it renders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTemplate {
    /// e.g. `invoice.issued`, `reminder.friendly`
    pub key: String,
    pub context: serde_json::Value,
}

impl EmailTemplate {
    pub fn new(key: impl Into<String>, context: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            context,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub template: EmailTemplate,
    pub attachments: Vec<Attachment>,
}

/// Outbound mail delivery
#[async_trait]
pub trait Mailer: DomainPort {
    async fn send(&self, email: OutboundEmail) -> Result<(), PortError>;
}

/// Append-only audit trail
#[async_trait]
pub trait AuditLog: DomainPort {
    async fn record(&self, entry: AuditEntry) -> Result<(), PortError>;
}

/// One reason the compliance gate refused an invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceIssue {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub issues: Vec<ComplianceIssue>,
}

impl ComplianceReport {
    pub fn pass() -> Self {
        Self { issues: Vec::new() }
    }

    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Validation run before the send transition
#[async_trait]
pub trait ComplianceGate: DomainPort {
    async fn check(&self, aggregate: &InvoiceAggregate) -> Result<ComplianceReport, PortError>;
}

/// PDF/UBL rendering and storage
#[async_trait]
pub trait DocumentService: DomainPort {
    /// Renders the invoice documents, returning them for attachment
    async fn generate_invoice_documents(
        &self,
        aggregate: &InvoiceAggregate,
    ) -> Result<Vec<Attachment>, PortError>;

    async fn generate_receipt(&self, aggregate: &InvoiceAggregate) -> Result<(), PortError>;
}

/// A job to enqueue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub topic: String,
    pub payload: serde_json::Value,
    /// Recorded for tracing; the queue does not deduplicate on it
    pub idempotency_key: String,
    pub delay: Duration,
    pub max_attempts: u32,
}

/// A job leased from the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub topic: String,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
    /// Includes the current attempt
    pub attempts: u32,
    pub max_attempts: u32,
    pub run_at: DateTime<Utc>,
}

/// `last_error` of a job whose final lease ran out without a result
pub const LEASE_EXPIRED_ERROR: &str = "lease expired after final attempt";

impl Job {
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Producer side of the durable delayed-job queue
#[async_trait]
pub trait JobQueue: DomainPort {
    async fn enqueue(&self, job: NewJob) -> Result<JobId, PortError>;
}

/// Consumer side of the durable delayed-job queue
#[async_trait]
pub trait JobSource: DomainPort {
    /// Leases up to `limit` due jobs for `lease`, incrementing their attempts
    async fn claim_due(&self, limit: u32, lease: Duration) -> Result<Vec<Job>, PortError>;

    async fn complete(&self, job_id: JobId) -> Result<(), PortError>;

    /// Makes the job eligible again at `retry_at`
    async fn retry(
        &self,
        job_id: JobId,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<(), PortError>;

    /// Marks the job permanently failed
    async fn dead_letter(&self, job_id: JobId, error: &str) -> Result<(), PortError>;
}
