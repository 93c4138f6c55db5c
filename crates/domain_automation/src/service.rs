//! Invoice command service
//!
//! The lifecycle transitions exposed to the outside world (`send`,
//! `mark_viewed`, `mark_paid`, `void`) and the commands that create the
//! records they act on. Each command loads fresh state, asks
//! [`InvoiceLifecycle`] for the transition, persists it, and then performs
//! the side effects the transition requested.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{format_cents, Cents, Clock, InvoiceId, OrganizationId, PortError, UserId};
use domain_billing::{
    AmountDue, AuditAction, AuditEntry, BillingError, CreditNote, Invoice, InvoiceEvent,
    InvoiceLifecycle, InvoiceStatus, Payment, SideEffect, Transition,
};

use crate::commands::{CreateInvoiceCommand, IssueCreditNoteCommand, RecordPaymentCommand};
use crate::error::AutomationError;
use crate::ports::{
    Attachment, AuditLog, BillingStore, ComplianceGate, DocumentService, EmailTemplate,
    InvoiceAggregate, JobQueue, Mailer, NewInvoice, OutboundEmail, SettlementWrite,
};
use crate::scheduler::{AutomationScheduler, ScheduleReport};

/// Reads a lifecycle command makes before giving up on a contended invoice
pub const MAX_LIFECYCLE_ATTEMPTS: u32 = 3;

/// Counts a lost compare-and-set on the invoice status
///
/// Fails with a transient error once [`MAX_LIFECYCLE_ATTEMPTS`] is reached,
/// so a queued job is retried rather than dead-lettered.
pub(crate) fn lost_race(attempt: &mut u32, invoice_id: InvoiceId) -> Result<(), AutomationError> {
    *attempt += 1;
    if *attempt >= MAX_LIFECYCLE_ATTEMPTS {
        return Err(PortError::connection(format!(
            "invoice {invoice_id} kept changing after {attempt} attempts"
        ))
        .into());
    }
    debug!(invoice_id = %invoice_id, attempt = *attempt, "Invoice status changed concurrently; re-reading");
    Ok(())
}

/// Whether a balance change settled the invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Paid { paid_at: DateTime<Utc> },
    Outstanding { due_cents: Cents },
}

/// Result of the send transition
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub invoice: Invoice,
    pub transition: Transition,
    /// False when the buyer has no address or the mail server refused
    pub emailed: bool,
    pub schedule: ScheduleReport,
}

/// Collaborators of [`InvoiceService`]
#[derive(Clone)]
pub struct InvoiceServicePorts {
    pub store: Arc<dyn BillingStore>,
    pub queue: Arc<dyn JobQueue>,
    pub mailer: Arc<dyn Mailer>,
    pub audit: Arc<dyn AuditLog>,
    pub compliance: Arc<dyn ComplianceGate>,
    pub documents: Arc<dyn DocumentService>,
    pub clock: Arc<dyn Clock>,
}

pub struct InvoiceService {
    store: Arc<dyn BillingStore>,
    mailer: Arc<dyn Mailer>,
    audit: Arc<dyn AuditLog>,
    compliance: Arc<dyn ComplianceGate>,
    documents: Arc<dyn DocumentService>,
    clock: Arc<dyn Clock>,
    scheduler: AutomationScheduler,
    public_base_url: String,
}

impl InvoiceService {
    pub fn new(ports: InvoiceServicePorts, public_base_url: impl Into<String>) -> Self {
        let scheduler = AutomationScheduler::new(
            ports.store.clone(),
            ports.queue,
            ports.audit.clone(),
            ports.clock.clone(),
        );
        Self {
            store: ports.store,
            mailer: ports.mailer,
            audit: ports.audit,
            compliance: ports.compliance,
            documents: ports.documents,
            clock: ports.clock,
            scheduler,
            public_base_url: public_base_url.into(),
        }
    }

    pub fn scheduler(&self) -> &AutomationScheduler {
        &self.scheduler
    }

    /// Creates a draft invoice with its line items
    #[instrument(skip(self, command), fields(organization_id = %organization_id))]
    pub async fn create_invoice(
        &self,
        organization_id: OrganizationId,
        actor_id: Option<UserId>,
        command: CreateInvoiceCommand,
    ) -> Result<Invoice, AutomationError> {
        command.validate()?;

        let organization = self
            .store
            .find_organization(organization_id)
            .await?
            .ok_or_else(|| PortError::not_found("Organization", organization_id))?;
        if self
            .store
            .find_customer(organization_id, command.customer_id)
            .await?
            .is_none()
        {
            return Err(AutomationError::Validation(format!(
                "customer {} does not belong to this organization",
                command.customer_id
            )));
        }

        let now = self.clock.now();
        let issue_date = command
            .issue_date
            .unwrap_or_else(|| organization.timezone.local_date(now));
        let due_date = command.resolve_due_date(issue_date);

        let new_invoice = NewInvoice {
            id: InvoiceId::new_v7(),
            organization_id,
            customer_id: command.customer_id,
            public_token: Uuid::new_v4().simple().to_string(),
            currency: command.currency,
            issue_date,
            due_date,
            payment_terms_days: command.payment_terms_days,
            discount: command.discount.map(|d| d.into_discount()),
            tax_label: command.tax_label,
            tax_percent: command.tax_percent,
            notes: command.notes,
            line_items: command
                .line_items
                .into_iter()
                .enumerate()
                .map(|(position, line)| line.into_line_item(position as i32))
                .collect(),
            created_at: now,
        };

        let invoice = self.store.create_invoice(new_invoice).await?;
        self.audit
            .record(
                AuditEntry::new(
                    organization_id,
                    actor_id,
                    AuditAction::InvoiceCreated,
                    "invoice",
                    invoice.id,
                )
                .at(now)
                .with_data(serde_json::json!({ "number": invoice.number })),
            )
            .await?;

        info!(invoice_id = %invoice.id, number = %invoice.number, "Invoice created");
        Ok(invoice)
    }

    /// Loads an invoice, applying the lazy overdue transition
    pub async fn get_invoice(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceAggregate, AutomationError> {
        let mut aggregate = self.load(organization_id, invoice_id).await?;
        self.refresh_overdue(&mut aggregate).await?;
        Ok(aggregate)
    }

    pub async fn amount_due(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<AmountDue, AutomationError> {
        Ok(self.get_invoice(organization_id, invoice_id).await?.amount_due())
    }

    /// Sends (or re-sends) an invoice to the buyer
    ///
    /// The compliance gate runs first and can block the transition. After
    /// the status is persisted the documents are rendered, the buyer is
    /// emailed and automation is scheduled. A rendering failure only drops
    /// the attachments.
    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id))]
    pub async fn send(
        &self,
        organization_id: OrganizationId,
        actor_id: Option<UserId>,
        invoice_id: InvoiceId,
    ) -> Result<SendOutcome, AutomationError> {
        let mut attempt = 0;
        let (aggregate, transition, now) = loop {
            let mut aggregate = self.load(organization_id, invoice_id).await?;
            InvoiceLifecycle::next_status(aggregate.invoice.status, InvoiceEvent::Send)
                .map_err(AutomationError::SendRejected)?;

            let report = self.compliance.check(&aggregate).await?;
            if !report.passed() {
                warn!(issues = report.issues.len(), "Compliance gate blocked send");
                return Err(AutomationError::ComplianceFailed {
                    issues: report.issues,
                });
            }

            let now = self.clock.now();
            let transition =
                InvoiceLifecycle::apply(&mut aggregate.invoice, InvoiceEvent::Send, now)
                    .map_err(AutomationError::SendRejected)?;
            if self.store.save_lifecycle(&aggregate.invoice, transition.from).await? {
                break (aggregate, transition, now);
            }
            lost_race(&mut attempt, invoice_id)?;
        };

        let attachments = if transition.has_effect(SideEffect::GenerateDocuments) {
            match self.documents.generate_invoice_documents(&aggregate).await {
                Ok(attachments) => attachments,
                Err(err) => {
                    warn!(error = %err, "Failed to render invoice documents; sending without attachments");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let emailed = if transition.has_effect(SideEffect::EmailBuyer) {
            self.email_invoice(&aggregate, attachments).await
        } else {
            false
        };

        let schedule = if transition.has_effect(SideEffect::ScheduleAutomation) {
            self.scheduler.schedule(organization_id, invoice_id).await?
        } else {
            ScheduleReport::default()
        };

        self.audit
            .record(
                AuditEntry::new(organization_id, actor_id, AuditAction::InvoiceSent, "invoice", invoice_id)
                    .at(now)
                    .with_data(serde_json::json!({
                        "resend": !transition.changed(),
                        "emailed": emailed,
                    })),
            )
            .await?;

        info!(resend = !transition.changed(), emailed, "Invoice sent");
        Ok(SendOutcome {
            invoice: aggregate.invoice,
            transition,
            emailed,
            schedule,
        })
    }

    /// Records that the buyer opened the hosted link
    ///
    /// Drafts are not visible through the link and read as not found.
    #[instrument(skip(self, token))]
    pub async fn mark_viewed(&self, token: &str) -> Result<InvoiceAggregate, AutomationError> {
        let mut attempt = 0;
        let mut aggregate = loop {
            let mut aggregate = match self.store.load_invoice_by_token(token).await {
                Ok(aggregate) => aggregate,
                Err(err) if err.is_not_found() => {
                    return Err(AutomationError::InvoiceNotFound("hosted link".to_string()))
                }
                Err(err) => return Err(err.into()),
            };
            if aggregate.invoice.status == InvoiceStatus::Draft {
                return Err(AutomationError::InvoiceNotFound("hosted link".to_string()));
            }

            let now = self.clock.now();
            let transition =
                InvoiceLifecycle::apply(&mut aggregate.invoice, InvoiceEvent::View, now)?;
            if !transition.has_effect(SideEffect::Audit(AuditAction::InvoiceViewed)) {
                break aggregate;
            }
            if !self.store.save_lifecycle(&aggregate.invoice, transition.from).await? {
                lost_race(&mut attempt, aggregate.invoice.id)?;
                continue;
            }

            self.audit
                .record(
                    AuditEntry::new(
                        aggregate.invoice.organization_id,
                        None,
                        AuditAction::InvoiceViewed,
                        "invoice",
                        aggregate.invoice.id,
                    )
                    .at(now),
                )
                .await?;
            info!(invoice_id = %aggregate.invoice.id, "Invoice viewed");
            break aggregate;
        };

        self.refresh_overdue(&mut aggregate).await?;
        Ok(aggregate)
    }

    /// Transitions to `PAID` when payments and credits cover the total
    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id))]
    pub async fn mark_paid(
        &self,
        organization_id: OrganizationId,
        actor_id: Option<UserId>,
        invoice_id: InvoiceId,
    ) -> Result<PaymentOutcome, AutomationError> {
        let mut aggregate = self.load(organization_id, invoice_id).await?;
        self.settle(&mut aggregate, actor_id).await
    }

    /// Voids an invoice; voiding a void invoice is a no-op
    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id))]
    pub async fn void(
        &self,
        organization_id: OrganizationId,
        actor_id: Option<UserId>,
        invoice_id: InvoiceId,
    ) -> Result<Invoice, AutomationError> {
        let mut attempt = 0;
        let (aggregate, transition, now) = loop {
            let mut aggregate = self.load(organization_id, invoice_id).await?;
            let now = self.clock.now();
            let transition =
                InvoiceLifecycle::apply(&mut aggregate.invoice, InvoiceEvent::Void, now)?;
            if !transition.changed()
                || self.store.save_lifecycle(&aggregate.invoice, transition.from).await?
            {
                break (aggregate, transition, now);
            }
            lost_race(&mut attempt, invoice_id)?;
        };

        if transition.changed() {
            self.audit
                .record(
                    AuditEntry::new(
                        organization_id,
                        actor_id,
                        AuditAction::InvoiceVoided,
                        "invoice",
                        invoice_id,
                    )
                    .at(now)
                    .with_data(serde_json::json!({ "from": transition.from })),
                )
                .await?;
            info!(from = %transition.from, "Invoice voided");
        }
        Ok(aggregate.invoice)
    }

    /// Appends a payment and re-evaluates the `PAID` transition
    #[instrument(skip(self, command), fields(organization_id = %organization_id, invoice_id = %invoice_id))]
    pub async fn record_payment(
        &self,
        organization_id: OrganizationId,
        actor_id: Option<UserId>,
        invoice_id: InvoiceId,
        command: RecordPaymentCommand,
    ) -> Result<(Payment, PaymentOutcome), AutomationError> {
        command.validate()?;
        let mut aggregate = self.load(organization_id, invoice_id).await?;
        if aggregate.invoice.status == InvoiceStatus::Void {
            return Err(AutomationError::invalid_state(
                "cannot record a payment on a void invoice",
            ));
        }

        let now = self.clock.now();
        let mut payment = Payment::new(invoice_id, command.status, command.amount_cents, command.provider);
        payment.provider_reference = command.provider_reference;
        payment.created_at = now;

        self.store.append_payment(&payment).await?;
        self.audit
            .record(
                AuditEntry::new(
                    organization_id,
                    actor_id,
                    AuditAction::PaymentRecorded,
                    "payment",
                    payment.id,
                )
                .at(now)
                .with_data(serde_json::json!({
                    "invoice_id": invoice_id,
                    "amount_cents": payment.amount_cents,
                    "status": payment.status,
                })),
            )
            .await?;
        aggregate.payments.push(payment.clone());

        let outcome = if payment.status.counts_toward_balance() {
            self.settle(&mut aggregate, actor_id).await?
        } else {
            PaymentOutcome::Outstanding {
                due_cents: aggregate.amount_due().due_cents,
            }
        };
        Ok((payment, outcome))
    }

    /// Appends a credit note and re-evaluates the `PAID` transition
    #[instrument(skip(self, command), fields(organization_id = %organization_id, invoice_id = %invoice_id))]
    pub async fn issue_credit_note(
        &self,
        organization_id: OrganizationId,
        actor_id: Option<UserId>,
        invoice_id: InvoiceId,
        command: IssueCreditNoteCommand,
    ) -> Result<(CreditNote, PaymentOutcome), AutomationError> {
        command.validate()?;
        let mut aggregate = self.load(organization_id, invoice_id).await?;
        if aggregate.invoice.status == InvoiceStatus::Void {
            return Err(AutomationError::invalid_state(
                "cannot credit a void invoice",
            ));
        }

        let now = self.clock.now();
        let mut credit_note = CreditNote::new(invoice_id, command.amount_cents, command.reason);
        credit_note.created_at = now;

        self.store.append_credit_note(&credit_note).await?;
        self.audit
            .record(
                AuditEntry::new(
                    organization_id,
                    actor_id,
                    AuditAction::CreditNoteIssued,
                    "credit_note",
                    credit_note.id,
                )
                .at(now)
                .with_data(serde_json::json!({
                    "invoice_id": invoice_id,
                    "amount_cents": credit_note.amount_cents,
                })),
            )
            .await?;
        aggregate.credit_notes.push(credit_note.clone());

        let outcome = self.settle(&mut aggregate, actor_id).await?;
        Ok((credit_note, outcome))
    }

    /// Re-schedules automation for an invoice
    pub async fn schedule_automation(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<ScheduleReport, AutomationError> {
        self.scheduler.schedule(organization_id, invoice_id).await
    }

    async fn load(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceAggregate, AutomationError> {
        match self.store.load_invoice(organization_id, invoice_id).await {
            Ok(aggregate) => Ok(aggregate),
            Err(err) if err.is_not_found() => {
                Err(AutomationError::InvoiceNotFound(invoice_id.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Asks the store to settle the invoice from its locked, current records
    ///
    /// `aggregate` is re-loaded after a successful settlement so the receipt
    /// reflects what was persisted.
    async fn settle(
        &self,
        aggregate: &mut InvoiceAggregate,
        actor_id: Option<UserId>,
    ) -> Result<PaymentOutcome, AutomationError> {
        let organization_id = aggregate.invoice.organization_id;
        let invoice_id = aggregate.invoice.id;
        let now = self.clock.now();

        let invoice = match self.store.settle_invoice(organization_id, invoice_id, now).await? {
            SettlementWrite::Outstanding { due_cents } => {
                return Ok(PaymentOutcome::Outstanding { due_cents })
            }
            SettlementWrite::Void => {
                return Err(BillingError::invalid_transition(
                    InvoiceStatus::Void,
                    InvoiceEvent::SettledInFull,
                )
                .into())
            }
            SettlementWrite::AlreadyPaid(invoice) => {
                let paid_at = invoice.paid_at.unwrap_or(now);
                aggregate.invoice = invoice;
                return Ok(PaymentOutcome::Paid { paid_at });
            }
            SettlementWrite::Settled(invoice) => invoice,
        };

        *aggregate = self.load(organization_id, invoice_id).await?;
        self.documents.generate_receipt(aggregate).await?;
        self.audit
            .record(
                AuditEntry::new(
                    organization_id,
                    actor_id,
                    AuditAction::InvoicePaid,
                    "invoice",
                    invoice_id,
                )
                .at(now),
            )
            .await?;
        info!(invoice_id = %invoice_id, "Invoice paid in full");

        Ok(PaymentOutcome::Paid {
            paid_at: invoice.paid_at.unwrap_or(now),
        })
    }

    async fn refresh_overdue(&self, aggregate: &mut InvoiceAggregate) -> Result<(), AutomationError> {
        let mut attempt = 0;
        loop {
            let now = self.clock.now();
            let due_cents = aggregate.amount_due().due_cents;
            let Some(transition) = InvoiceLifecycle::refresh_overdue(
                &mut aggregate.invoice,
                due_cents,
                now,
                &aggregate.organization.timezone,
            )?
            else {
                return Ok(());
            };

            if self.store.save_lifecycle(&aggregate.invoice, transition.from).await? {
                self.audit
                    .record(
                        AuditEntry::new(
                            aggregate.invoice.organization_id,
                            None,
                            AuditAction::InvoiceOverdue,
                            "invoice",
                            aggregate.invoice.id,
                        )
                        .at(now),
                    )
                    .await?;
                return Ok(());
            }

            lost_race(&mut attempt, aggregate.invoice.id)?;
            *aggregate = self
                .load(aggregate.invoice.organization_id, aggregate.invoice.id)
                .await?;
        }
    }

    /// Emails the invoice; delivery problems are logged, not raised
    async fn email_invoice(&self, aggregate: &InvoiceAggregate, attachments: Vec<Attachment>) -> bool {
        let Some(to) = aggregate.customer.contact_email() else {
            warn!(invoice_id = %aggregate.invoice.id, "Buyer has no email address");
            return false;
        };

        let invoice = &aggregate.invoice;
        let due = aggregate.amount_due();
        let email = OutboundEmail {
            to: to.to_string(),
            subject: format!("Invoice {} from {}", invoice.number, aggregate.organization.name),
            template: EmailTemplate::new(
                "invoice.issued",
                serde_json::json!({
                    "organization_name": aggregate.organization.name,
                    "customer_name": aggregate.customer.name,
                    "invoice_number": invoice.number,
                    "total": format_cents(due.totals.total_cents, invoice.currency),
                    "amount_due": format_cents(due.due_cents, invoice.currency),
                    "due_date": invoice.due_date,
                    "invoice_url": format!(
                        "{}/i/{}",
                        self.public_base_url.trim_end_matches('/'),
                        invoice.public_token
                    ),
                }),
            ),
            attachments,
        };

        match self.mailer.send(email).await {
            Ok(()) => true,
            Err(err) => {
                warn!(invoice_id = %invoice.id, error = %err, "Failed to email invoice");
                false
            }
        }
    }
}
