//! In-memory adapters for every automation port
//!
//! `MockBillingStore` keeps all state behind one mutex, so each port call is
//! atomic the way a database transaction is. That makes the uniqueness rules
//! (late-fee applications, reminder deliveries) hold under concurrent
//! callers, which is what the concurrency tests rely on.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use core_kernel::{
    AdapterHealth, Clock, CustomerId, DomainPort, FixedClock, HealthCheckResult, HealthCheckable,
    InvoiceId, JobId, LateFeeApplicationId, LateFeePolicyId, OrganizationId, PortError,
    ReminderRuleId,
};
use domain_billing::{
    format_invoice_number, AuditAction, AuditEntry, CreditNote, Customer, Invoice, InvoiceEvent,
    InvoiceLifecycle, InvoiceStatus, LateFeeApplication, LateFeePolicy, Organization, Payment,
    ReminderDelivery, ReminderJobLog, ReminderPolicy, ReminderRule,
};

use crate::ports::{
    Attachment, AuditLog, BillingStore, ComplianceGate, ComplianceIssue, ComplianceReport,
    DocumentService, InvoiceAggregate, Job, JobQueue, JobSource, LateFeeWrite, LateFeeWriteResult,
    Mailer, NewInvoice, NewJob, OutboundEmail, SettlementWrite, LEASE_EXPIRED_ERROR,
};
use crate::runner::{AutomationRunner, RunnerConfig};
use crate::service::{InvoiceService, InvoiceServicePorts};
use crate::worker::AutomationWorker;

fn healthy(adapter_id: &str) -> HealthCheckResult {
    HealthCheckResult::new(
        adapter_id,
        AdapterHealth::Healthy,
        0,
        Some("Mock adapter always healthy".to_string()),
    )
}

// ============================================================================
// Billing store
// ============================================================================

#[derive(Debug, Default)]
struct StoreState {
    organizations: HashMap<OrganizationId, Organization>,
    customers: HashMap<CustomerId, Customer>,
    invoices: HashMap<InvoiceId, Invoice>,
    payments: Vec<Payment>,
    credit_notes: Vec<CreditNote>,
    reminder_policies: Vec<ReminderPolicy>,
    late_fee_policies: Vec<LateFeePolicy>,
    late_fee_applications: Vec<LateFeeApplication>,
    deliveries: HashSet<(InvoiceId, ReminderRuleId, NaiveDate)>,
    reminder_logs: Vec<ReminderJobLog>,
    sequences: HashMap<OrganizationId, i64>,
}

impl StoreState {
    fn aggregate(&self, invoice: &Invoice) -> Result<InvoiceAggregate, PortError> {
        let organization = self
            .organizations
            .get(&invoice.organization_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Organization", invoice.organization_id))?;
        let customer = self
            .customers
            .get(&invoice.customer_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Customer", invoice.customer_id))?;

        Ok(InvoiceAggregate {
            organization,
            customer,
            invoice: invoice.clone(),
            payments: self
                .payments
                .iter()
                .filter(|p| p.invoice_id == invoice.id)
                .cloned()
                .collect(),
            credit_notes: self
                .credit_notes
                .iter()
                .filter(|c| c.invoice_id == invoice.id)
                .cloned()
                .collect(),
        })
    }
}

/// In-memory implementation of [`BillingStore`]
#[derive(Debug, Default)]
pub struct MockBillingStore {
    state: Mutex<StoreState>,
}

impl MockBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_organization(&self, organization: Organization) {
        self.state
            .lock()
            .await
            .organizations
            .insert(organization.id, organization);
    }

    pub async fn insert_customer(&self, customer: Customer) {
        self.state.lock().await.customers.insert(customer.id, customer);
    }

    pub async fn insert_invoice(&self, invoice: Invoice) {
        self.state.lock().await.invoices.insert(invoice.id, invoice);
    }

    pub async fn insert_payment(&self, payment: Payment) {
        self.state.lock().await.payments.push(payment);
    }

    pub async fn insert_reminder_policy(&self, policy: ReminderPolicy) {
        self.state.lock().await.reminder_policies.push(policy);
    }

    pub async fn insert_late_fee_policy(&self, policy: LateFeePolicy) {
        self.state.lock().await.late_fee_policies.push(policy);
    }

    /// Replaces a stored late-fee policy, e.g. to disable it mid-test
    pub async fn update_late_fee_policy(&self, policy: LateFeePolicy) {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.late_fee_policies.iter_mut().find(|p| p.id == policy.id) {
            *existing = policy;
        }
    }

    pub async fn update_reminder_rule(&self, rule: ReminderRule) {
        let mut state = self.state.lock().await;
        for policy in state.reminder_policies.iter_mut() {
            if let Some(existing) = policy.rules.iter_mut().find(|r| r.id == rule.id) {
                *existing = rule.clone();
            }
        }
    }

    pub async fn invoice(&self, invoice_id: InvoiceId) -> Option<Invoice> {
        self.state.lock().await.invoices.get(&invoice_id).cloned()
    }

    pub async fn late_fee_applications(&self) -> Vec<LateFeeApplication> {
        self.state.lock().await.late_fee_applications.clone()
    }

    pub async fn reminder_logs(&self) -> Vec<ReminderJobLog> {
        self.state.lock().await.reminder_logs.clone()
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.state.lock().await.payments.clone()
    }

    pub async fn delivery_count(&self) -> usize {
        self.state.lock().await.deliveries.len()
    }
}

impl DomainPort for MockBillingStore {}

#[async_trait]
impl HealthCheckable for MockBillingStore {
    async fn health_check(&self) -> HealthCheckResult {
        healthy("mock-billing-store")
    }
}

#[async_trait]
impl BillingStore for MockBillingStore {
    async fn load_invoice(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceAggregate, PortError> {
        let state = self.state.lock().await;
        let invoice = state
            .invoices
            .get(&invoice_id)
            .filter(|invoice| invoice.organization_id == organization_id)
            .ok_or_else(|| PortError::not_found("Invoice", invoice_id))?;
        state.aggregate(invoice)
    }

    async fn find_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<Organization>, PortError> {
        Ok(self.state.lock().await.organizations.get(&organization_id).cloned())
    }

    async fn find_customer(
        &self,
        organization_id: OrganizationId,
        customer_id: CustomerId,
    ) -> Result<Option<Customer>, PortError> {
        Ok(self
            .state
            .lock()
            .await
            .customers
            .get(&customer_id)
            .filter(|c| c.organization_id == organization_id)
            .cloned())
    }

    async fn load_invoice_by_token(&self, token: &str) -> Result<InvoiceAggregate, PortError> {
        let state = self.state.lock().await;
        let invoice = state
            .invoices
            .values()
            .find(|invoice| invoice.public_token == token)
            .ok_or_else(|| PortError::not_found("Invoice", "token"))?;
        state.aggregate(invoice)
    }

    async fn create_invoice(&self, new: NewInvoice) -> Result<Invoice, PortError> {
        let mut state = self.state.lock().await;
        let sequence = state.sequences.entry(new.organization_id).or_insert(0);
        *sequence += 1;
        let number = format_invoice_number(*sequence);

        let invoice = Invoice {
            id: new.id,
            organization_id: new.organization_id,
            customer_id: new.customer_id,
            number,
            public_token: new.public_token,
            status: InvoiceStatus::Draft,
            currency: new.currency,
            issue_date: new.issue_date,
            due_date: new.due_date,
            payment_terms_days: new.payment_terms_days,
            discount: new.discount,
            tax_label: new.tax_label,
            tax_percent: new.tax_percent,
            notes: new.notes,
            line_items: new.line_items,
            sent_at: None,
            viewed_at: None,
            paid_at: None,
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        state.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    async fn save_lifecycle(
        &self,
        invoice: &Invoice,
        expected: InvoiceStatus,
    ) -> Result<bool, PortError> {
        let mut state = self.state.lock().await;
        let stored = state
            .invoices
            .get_mut(&invoice.id)
            .filter(|stored| stored.organization_id == invoice.organization_id)
            .ok_or_else(|| PortError::not_found("Invoice", invoice.id))?;
        if stored.status != expected {
            return Ok(false);
        }
        stored.status = invoice.status;
        stored.sent_at = invoice.sent_at;
        stored.viewed_at = invoice.viewed_at;
        stored.paid_at = invoice.paid_at;
        stored.updated_at = invoice.updated_at;
        Ok(true)
    }

    async fn settle_invoice(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        at: DateTime<Utc>,
    ) -> Result<SettlementWrite, PortError> {
        let mut state = self.state.lock().await;
        let mut invoice = state
            .invoices
            .get(&invoice_id)
            .filter(|invoice| invoice.organization_id == organization_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Invoice", invoice_id))?;

        let due_cents = state.aggregate(&invoice)?.amount_due().due_cents;
        if due_cents > 0 {
            return Ok(SettlementWrite::Outstanding { due_cents });
        }
        let transition = match InvoiceLifecycle::apply(&mut invoice, InvoiceEvent::SettledInFull, at) {
            Ok(transition) => transition,
            Err(_) => return Ok(SettlementWrite::Void),
        };
        if !transition.changed() {
            return Ok(SettlementWrite::AlreadyPaid(invoice));
        }
        state.invoices.insert(invoice.id, invoice.clone());
        Ok(SettlementWrite::Settled(invoice))
    }

    async fn append_payment(&self, payment: &Payment) -> Result<(), PortError> {
        self.state.lock().await.payments.push(payment.clone());
        Ok(())
    }

    async fn append_credit_note(&self, credit_note: &CreditNote) -> Result<(), PortError> {
        self.state.lock().await.credit_notes.push(credit_note.clone());
        Ok(())
    }

    async fn reminder_policies(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ReminderPolicy>, PortError> {
        Ok(self
            .state
            .lock()
            .await
            .reminder_policies
            .iter()
            .filter(|p| p.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn find_reminder_rule(
        &self,
        organization_id: OrganizationId,
        rule_id: ReminderRuleId,
    ) -> Result<Option<ReminderRule>, PortError> {
        Ok(self
            .state
            .lock()
            .await
            .reminder_policies
            .iter()
            .filter(|p| p.organization_id == organization_id)
            .find_map(|p| p.rule(rule_id).cloned()))
    }

    async fn enabled_late_fee_policy(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<LateFeePolicy>, PortError> {
        Ok(self
            .state
            .lock()
            .await
            .late_fee_policies
            .iter()
            .find(|p| p.organization_id == organization_id && p.enabled)
            .cloned())
    }

    async fn find_late_fee_policy(
        &self,
        organization_id: OrganizationId,
        policy_id: LateFeePolicyId,
    ) -> Result<Option<LateFeePolicy>, PortError> {
        Ok(self
            .state
            .lock()
            .await
            .late_fee_policies
            .iter()
            .find(|p| p.organization_id == organization_id && p.id == policy_id)
            .cloned())
    }

    async fn find_late_fee_application(
        &self,
        invoice_id: InvoiceId,
        policy_id: LateFeePolicyId,
    ) -> Result<Option<LateFeeApplication>, PortError> {
        Ok(self
            .state
            .lock()
            .await
            .late_fee_applications
            .iter()
            .find(|a| a.invoice_id == invoice_id && a.policy_id == policy_id)
            .cloned())
    }

    async fn apply_late_fee(&self, write: LateFeeWrite) -> Result<LateFeeWriteResult, PortError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let already_applied = state
            .late_fee_applications
            .iter()
            .any(|a| a.invoice_id == write.invoice_id && a.policy_id == write.policy_id);

        let invoice = state
            .invoices
            .get_mut(&write.invoice_id)
            .filter(|invoice| invoice.organization_id == write.organization_id)
            .ok_or_else(|| PortError::not_found("Invoice", write.invoice_id))?;
        if invoice.status.is_terminal() {
            return Ok(LateFeeWriteResult::InvoiceClosed);
        }
        if already_applied {
            return Ok(LateFeeWriteResult::AlreadyApplied);
        }

        let application = LateFeeApplication {
            id: LateFeeApplicationId::new_v7(),
            invoice_id: write.invoice_id,
            policy_id: write.policy_id,
            fee_cents: write.fee_cents,
            line_item_id: write.line.id,
            applied_at: write.applied_at,
        };
        invoice.line_items.push(write.line);
        invoice.status = InvoiceStatus::Overdue;
        invoice.updated_at = write.applied_at;
        state.late_fee_applications.push(application.clone());

        Ok(LateFeeWriteResult::Applied(application))
    }

    async fn claim_reminder_delivery(&self, delivery: &ReminderDelivery) -> Result<bool, PortError> {
        Ok(self.state.lock().await.deliveries.insert((
            delivery.invoice_id,
            delivery.rule_id,
            delivery.due_date,
        )))
    }

    async fn release_reminder_delivery(
        &self,
        invoice_id: InvoiceId,
        rule_id: ReminderRuleId,
        due_date: NaiveDate,
    ) -> Result<(), PortError> {
        self.state
            .lock()
            .await
            .deliveries
            .remove(&(invoice_id, rule_id, due_date));
        Ok(())
    }

    async fn append_reminder_log(&self, log: &ReminderJobLog) -> Result<(), PortError> {
        self.state.lock().await.reminder_logs.push(log.clone());
        Ok(())
    }
}

// ============================================================================
// Job queue
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockJobStatus {
    Pending,
    Leased,
    Completed,
    Dead,
}

#[derive(Debug, Clone)]
pub struct MockJobRecord {
    pub job: Job,
    pub status: MockJobStatus,
    pub leased_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// In-memory delayed-job queue implementing both [`JobQueue`] and [`JobSource`]
pub struct MockJobQueue {
    clock: Arc<dyn Clock>,
    jobs: Mutex<Vec<MockJobRecord>>,
}

impl MockJobQueue {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub async fn records(&self) -> Vec<MockJobRecord> {
        self.jobs.lock().await.clone()
    }

    pub async fn jobs_with_status(&self, status: MockJobStatus) -> Vec<Job> {
        self.jobs
            .lock()
            .await
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.job.clone())
            .collect()
    }
}

impl DomainPort for MockJobQueue {}

#[async_trait]
impl JobQueue for MockJobQueue {
    async fn enqueue(&self, new: NewJob) -> Result<JobId, PortError> {
        let delay = chrono::Duration::from_std(new.delay)
            .map_err(|e| PortError::validation(format!("delay out of range: {e}")))?;
        let job = Job {
            id: JobId::new_v7(),
            topic: new.topic,
            payload: new.payload,
            idempotency_key: new.idempotency_key,
            attempts: 0,
            max_attempts: new.max_attempts,
            run_at: self.clock.now() + delay,
        };
        let id = job.id;
        self.jobs.lock().await.push(MockJobRecord {
            job,
            status: MockJobStatus::Pending,
            leased_until: None,
            last_error: None,
        });
        Ok(id)
    }
}

#[async_trait]
impl JobSource for MockJobQueue {
    async fn claim_due(&self, limit: u32, lease: Duration) -> Result<Vec<Job>, PortError> {
        let now = self.clock.now();
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| PortError::validation(format!("lease out of range: {e}")))?;
        let mut jobs = self.jobs.lock().await;

        for record in jobs.iter_mut().filter(|r| {
            r.status == MockJobStatus::Leased
                && r.leased_until.is_some_and(|until| until <= now)
                && r.job.attempts_exhausted()
        }) {
            record.status = MockJobStatus::Dead;
            record.leased_until = None;
            record.last_error = Some(LEASE_EXPIRED_ERROR.to_string());
        }

        let mut due: Vec<&mut MockJobRecord> = jobs
            .iter_mut()
            .filter(|r| match r.status {
                MockJobStatus::Pending => r.job.run_at <= now,
                MockJobStatus::Leased => r.leased_until.is_some_and(|until| until <= now),
                _ => false,
            })
            .collect();
        due.sort_by_key(|r| r.job.run_at);

        Ok(due
            .into_iter()
            .take(limit as usize)
            .map(|record| {
                record.job.attempts += 1;
                record.status = MockJobStatus::Leased;
                record.leased_until = Some(now + lease);
                record.job.clone()
            })
            .collect())
    }

    async fn complete(&self, job_id: JobId) -> Result<(), PortError> {
        self.update(job_id, |record| record.status = MockJobStatus::Completed)
            .await
    }

    async fn retry(
        &self,
        job_id: JobId,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<(), PortError> {
        self.update(job_id, |record| {
            record.status = MockJobStatus::Pending;
            record.job.run_at = retry_at;
            record.leased_until = None;
            record.last_error = Some(error.to_string());
        })
        .await
    }

    async fn dead_letter(&self, job_id: JobId, error: &str) -> Result<(), PortError> {
        self.update(job_id, |record| {
            record.status = MockJobStatus::Dead;
            record.leased_until = None;
            record.last_error = Some(error.to_string());
        })
        .await
    }
}

impl MockJobQueue {
    async fn update(
        &self,
        job_id: JobId,
        apply: impl FnOnce(&mut MockJobRecord),
    ) -> Result<(), PortError> {
        let mut jobs = self.jobs.lock().await;
        let record = jobs
            .iter_mut()
            .find(|r| r.job.id == job_id)
            .ok_or_else(|| PortError::not_found("Job", job_id))?;
        apply(record);
        Ok(())
    }
}

// ============================================================================
// Mailer, audit log, compliance, documents
// ============================================================================

/// Records outbound mail; can be told to fail the next `n` sends
#[derive(Debug, Default)]
pub struct MockMailer {
    sent: Mutex<Vec<OutboundEmail>>,
    failures_remaining: AtomicUsize,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().await.clone()
    }
}

impl DomainPort for MockMailer {}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), PortError> {
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PortError::unavailable("smtp"));
        }
        self.sent.lock().await.push(email);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MockAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn actions(&self) -> Vec<AuditAction> {
        self.entries.lock().await.iter().map(|e| e.action).collect()
    }
}

impl DomainPort for MockAuditLog {}

#[async_trait]
impl AuditLog for MockAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), PortError> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}

/// Passes every invoice unless issues are configured
#[derive(Debug, Default)]
pub struct MockComplianceGate {
    issues: Mutex<Vec<ComplianceIssue>>,
}

impl MockComplianceGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_with(&self, field: &str, message: &str) {
        self.issues.lock().await.push(ComplianceIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub async fn clear(&self) {
        self.issues.lock().await.clear();
    }
}

impl DomainPort for MockComplianceGate {}

#[async_trait]
impl ComplianceGate for MockComplianceGate {
    async fn check(&self, _aggregate: &InvoiceAggregate) -> Result<ComplianceReport, PortError> {
        Ok(ComplianceReport {
            issues: self.issues.lock().await.clone(),
        })
    }
}

/// Renders placeholder PDFs; can be told to fail the next `n` invoice renders
#[derive(Debug, Default)]
pub struct MockDocumentService {
    invoices_rendered: AtomicUsize,
    receipts_rendered: AtomicUsize,
    failures_remaining: AtomicUsize,
}

impl MockDocumentService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn invoices_rendered(&self) -> usize {
        self.invoices_rendered.load(Ordering::SeqCst)
    }

    pub fn receipts_rendered(&self) -> usize {
        self.receipts_rendered.load(Ordering::SeqCst)
    }
}

impl DomainPort for MockDocumentService {}

#[async_trait]
impl DocumentService for MockDocumentService {
    async fn generate_invoice_documents(
        &self,
        aggregate: &InvoiceAggregate,
    ) -> Result<Vec<Attachment>, PortError> {
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PortError::unavailable("document-renderer"));
        }
        self.invoices_rendered.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Attachment {
            filename: format!("{}.pdf", aggregate.invoice.number),
            content_type: "application/pdf".to_string(),
            content: b"%PDF-mock".to_vec(),
        }])
    }

    async fn generate_receipt(&self, _aggregate: &InvoiceAggregate) -> Result<(), PortError> {
        self.receipts_rendered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub const MOCK_PUBLIC_BASE_URL: &str = "https://billing.test";

/// Every mock port, sharing one controllable clock
pub struct MockPorts {
    pub store: Arc<MockBillingStore>,
    pub queue: Arc<MockJobQueue>,
    pub mailer: Arc<MockMailer>,
    pub audit: Arc<MockAuditLog>,
    pub compliance: Arc<MockComplianceGate>,
    pub documents: Arc<MockDocumentService>,
    pub clock: Arc<FixedClock>,
}

impl MockPorts {
    pub fn new(clock: FixedClock) -> Self {
        let clock = Arc::new(clock);
        Self {
            store: Arc::new(MockBillingStore::new()),
            queue: Arc::new(MockJobQueue::new(clock.clone())),
            mailer: Arc::new(MockMailer::new()),
            audit: Arc::new(MockAuditLog::new()),
            compliance: Arc::new(MockComplianceGate::new()),
            documents: Arc::new(MockDocumentService::new()),
            clock,
        }
    }

    pub fn service_ports(&self) -> InvoiceServicePorts {
        InvoiceServicePorts {
            store: self.store.clone(),
            queue: self.queue.clone(),
            mailer: self.mailer.clone(),
            audit: self.audit.clone(),
            compliance: self.compliance.clone(),
            documents: self.documents.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn service(&self) -> InvoiceService {
        InvoiceService::new(self.service_ports(), MOCK_PUBLIC_BASE_URL)
    }

    pub fn worker(&self) -> AutomationWorker {
        AutomationWorker::new(
            self.store.clone(),
            self.mailer.clone(),
            self.audit.clone(),
            self.clock.clone(),
            MOCK_PUBLIC_BASE_URL,
        )
    }

    pub fn runner(&self, config: RunnerConfig) -> AutomationRunner {
        AutomationRunner::new(
            self.queue.clone(),
            Arc::new(self.worker()),
            self.clock.clone(),
            config,
        )
    }
}
