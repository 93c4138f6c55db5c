//! Automation Worker
//!
//! The two effect handlers behind the job topics. Both may run more than once
//! for the same job, and several workers may run the same job concurrently.
//!
//! # Guarantees
//!
//! - Every run re-reads the invoice, its payments and the policy; the enqueue
//!   time snapshot is never trusted. If the status moves while a reminder is
//!   being prepared, the run re-reads and checks again.
//! - A precondition miss returns `Ok` with a skip reason and leaves an audit
//!   entry. Only infrastructure failures return `Err`, which the runner
//!   retries.
//! - A late fee is applied at most once per (invoice, policy). The storage
//!   uniqueness constraint decides races; losing one reads as "already
//!   applied".
//! - A reminder is delivered at most once per (invoice, rule, due date). The
//!   delivery is claimed before the email goes out and released again if the
//!   mail server refuses it.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use core_kernel::{format_cents, Cents, Clock};
use domain_billing::{
    AuditAction, AuditEntry, InvoiceLifecycle, LateFeeApplication, LineItem, ReminderDelivery,
    ReminderJobLog, ReminderLogStatus, ReminderRule, ReminderTemplate, SkipReason,
};

use crate::error::AutomationError;
use crate::jobs::{ApplyLateFeePayload, AutomationTask, SendReminderPayload};
use crate::ports::{
    AuditLog, BillingStore, EmailTemplate, InvoiceAggregate, LateFeeWrite, LateFeeWriteResult,
    Mailer, OutboundEmail,
};
use crate::service::lost_race;

/// Result of a reminder run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ReminderOutcome {
    Sent,
    Skipped(SkipReason),
    /// Not deliverable; no retry
    Failed(SkipReason),
}

/// Result of a late-fee run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LateFeeOutcome {
    Applied(LateFeeApplication),
    Skipped(SkipReason),
}

impl LateFeeOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, LateFeeOutcome::Applied(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Reminder(ReminderOutcome),
    LateFee(LateFeeOutcome),
}

pub struct AutomationWorker {
    store: Arc<dyn BillingStore>,
    mailer: Arc<dyn Mailer>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    public_base_url: String,
}

impl AutomationWorker {
    pub fn new(
        store: Arc<dyn BillingStore>,
        mailer: Arc<dyn Mailer>,
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            mailer,
            audit,
            clock,
            public_base_url: public_base_url.into(),
        }
    }

    /// Dispatches a decoded job to its handler
    pub async fn handle(&self, task: AutomationTask) -> Result<TaskOutcome, AutomationError> {
        match task {
            AutomationTask::SendReminder(payload) => {
                self.send_reminder(payload).await.map(TaskOutcome::Reminder)
            }
            AutomationTask::ApplyLateFee(payload) => {
                self.apply_late_fee(payload).await.map(TaskOutcome::LateFee)
            }
        }
    }

    #[instrument(skip(self), fields(invoice_id = %payload.invoice_id, rule_id = %payload.rule_id))]
    pub async fn send_reminder(
        &self,
        payload: SendReminderPayload,
    ) -> Result<ReminderOutcome, AutomationError> {
        let now = self.clock.now();

        let mut attempt = 0;
        let (aggregate, rule, due_cents, due_date, to) = loop {
            let mut aggregate = match self
                .store
                .load_invoice(payload.organization_id, payload.invoice_id)
                .await
            {
                Ok(aggregate) => aggregate,
                Err(err) if err.is_not_found() => {
                    warn!("Invoice vanished before reminder ran");
                    return Ok(ReminderOutcome::Skipped(SkipReason::InvoiceNotFound));
                }
                Err(err) => return Err(err.into()),
            };

            let rule = match self
                .store
                .find_reminder_rule(payload.organization_id, payload.rule_id)
                .await?
            {
                Some(rule) => rule,
                None => return self.skip_reminder(&payload, SkipReason::RuleNotFound).await,
            };
            if !rule.enabled {
                return self.skip_reminder(&payload, SkipReason::RuleDisabled).await;
            }
            if !aggregate.invoice.status.accepts_automation() {
                return self.skip_reminder(&payload, SkipReason::InvoiceNotOpen).await;
            }

            let due_cents = aggregate.amount_due().due_cents;
            if due_cents <= 0 {
                return self.skip_reminder(&payload, SkipReason::NothingDue).await;
            }
            let Some(due_date) = aggregate.invoice.due_date else {
                return self.skip_reminder(&payload, SkipReason::MissingDueDate).await;
            };
            let Some(to) = aggregate.customer.contact_email().map(str::to_string) else {
                let reason = SkipReason::MissingBuyerEmail;
                self.record_reminder(&payload, ReminderLogStatus::Failed, Some(reason.to_string()))
                    .await?;
                warn!("Buyer has no email address; reminder not sent");
                return Ok(ReminderOutcome::Failed(reason));
            };

            if self.refresh_overdue(&mut aggregate, due_cents).await? {
                break (aggregate, rule, due_cents, due_date, to);
            }
            lost_race(&mut attempt, payload.invoice_id)?;
        };

        let delivery = ReminderDelivery {
            invoice_id: payload.invoice_id,
            rule_id: payload.rule_id,
            due_date,
            claimed_at: now,
        };
        if !self.store.claim_reminder_delivery(&delivery).await? {
            return self.skip_reminder(&payload, SkipReason::AlreadySent).await;
        }

        let email = self.reminder_email(&aggregate, &rule, due_cents, to);
        if let Err(err) = self.mailer.send(email).await {
            if let Err(release_err) = self
                .store
                .release_reminder_delivery(payload.invoice_id, payload.rule_id, due_date)
                .await
            {
                warn!(error = %release_err, "Failed to release reminder claim");
            }
            self.record_reminder(&payload, ReminderLogStatus::Failed, Some(err.to_string()))
                .await?;
            warn!(error = %err, "Reminder delivery failed");
            return Err(err.into());
        }

        self.record_reminder(&payload, ReminderLogStatus::Sent, None)
            .await?;
        info!(due_cents, days_offset = rule.days_offset, "Reminder sent");
        Ok(ReminderOutcome::Sent)
    }

    #[instrument(skip(self), fields(invoice_id = %payload.invoice_id, policy_id = %payload.policy_id))]
    pub async fn apply_late_fee(
        &self,
        payload: ApplyLateFeePayload,
    ) -> Result<LateFeeOutcome, AutomationError> {
        let now = self.clock.now();

        let aggregate = match self
            .store
            .load_invoice(payload.organization_id, payload.invoice_id)
            .await
        {
            Ok(aggregate) => aggregate,
            Err(err) if err.is_not_found() => {
                warn!("Invoice vanished before late fee ran");
                return Ok(LateFeeOutcome::Skipped(SkipReason::InvoiceNotFound));
            }
            Err(err) => return Err(err.into()),
        };

        let policy = match self
            .store
            .find_late_fee_policy(payload.organization_id, payload.policy_id)
            .await?
        {
            Some(policy) => policy,
            None => return self.skip_late_fee(&payload, SkipReason::PolicyNotFound).await,
        };
        if !policy.enabled {
            return self.skip_late_fee(&payload, SkipReason::PolicyDisabled).await;
        }

        let invoice = &aggregate.invoice;
        if invoice.due_date.is_none() {
            return self.skip_late_fee(&payload, SkipReason::MissingDueDate).await;
        }
        if !invoice.status.accepts_automation() {
            return self.skip_late_fee(&payload, SkipReason::InvoiceNotOpen).await;
        }

        let due_cents = aggregate.amount_due().due_cents;
        if due_cents <= 0 {
            return self.skip_late_fee(&payload, SkipReason::NothingDue).await;
        }

        if self
            .store
            .find_late_fee_application(payload.invoice_id, payload.policy_id)
            .await?
            .is_some()
        {
            return self.skip_late_fee(&payload, SkipReason::AlreadyApplied).await;
        }

        let fee_cents = policy.fee_for(due_cents);
        if fee_cents <= 0 {
            return self.skip_late_fee(&payload, SkipReason::FeeNotPositive).await;
        }

        let line = LineItem::late_fee(
            policy.line_description(),
            fee_cents,
            invoice.next_line_position(),
        );
        let write = LateFeeWrite {
            organization_id: payload.organization_id,
            invoice_id: payload.invoice_id,
            policy_id: payload.policy_id,
            fee_cents,
            line,
            applied_at: now,
        };

        match self.store.apply_late_fee(write).await? {
            LateFeeWriteResult::Applied(application) => {
                self.audit
                    .record(
                        AuditEntry::new(
                            payload.organization_id,
                            None,
                            AuditAction::LateFeeApplied,
                            "invoice",
                            payload.invoice_id,
                        )
                        .at(now)
                        .with_data(serde_json::json!({
                            "policy_id": payload.policy_id,
                            "fee_cents": fee_cents,
                            "due_before_cents": due_cents,
                            "charge": policy.charge.type_str(),
                        })),
                    )
                    .await?;
                info!(fee_cents, due_before_cents = due_cents, "Late fee applied");
                Ok(LateFeeOutcome::Applied(application))
            }
            LateFeeWriteResult::AlreadyApplied => {
                debug!("Lost the late-fee race to another worker");
                self.skip_late_fee(&payload, SkipReason::AlreadyApplied).await
            }
            LateFeeWriteResult::InvoiceClosed => {
                self.skip_late_fee(&payload, SkipReason::InvoiceNotOpen).await
            }
        }
    }

    /// Moves the invoice to `OVERDUE` when its due date has passed
    ///
    /// Returns `false` when the stored status changed since `aggregate` was
    /// loaded; the caller re-reads and re-checks.
    async fn refresh_overdue(
        &self,
        aggregate: &mut InvoiceAggregate,
        due_cents: Cents,
    ) -> Result<bool, AutomationError> {
        let now = self.clock.now();
        let Some(transition) = InvoiceLifecycle::refresh_overdue(
            &mut aggregate.invoice,
            due_cents,
            now,
            &aggregate.organization.timezone,
        )?
        else {
            return Ok(true);
        };

        if !self.store.save_lifecycle(&aggregate.invoice, transition.from).await? {
            return Ok(false);
        }
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
        info!(invoice_id = %aggregate.invoice.id, "Invoice is now overdue");
        Ok(true)
    }

    async fn skip_reminder(
        &self,
        payload: &SendReminderPayload,
        reason: SkipReason,
    ) -> Result<ReminderOutcome, AutomationError> {
        debug!(reason = %reason, "Reminder skipped");
        self.record_reminder(payload, ReminderLogStatus::Skipped, Some(reason.to_string()))
            .await?;
        Ok(ReminderOutcome::Skipped(reason))
    }

    /// Writes the job log row and the matching audit entry
    async fn record_reminder(
        &self,
        payload: &SendReminderPayload,
        status: ReminderLogStatus,
        reason: Option<String>,
    ) -> Result<(), AutomationError> {
        let now = self.clock.now();
        let log = ReminderJobLog::new(
            payload.organization_id,
            payload.invoice_id,
            payload.rule_id,
            status,
            reason.clone(),
            now,
        );
        self.store.append_reminder_log(&log).await?;

        let action = match status {
            ReminderLogStatus::Sent => AuditAction::ReminderSent,
            ReminderLogStatus::Skipped => AuditAction::ReminderSkipped,
            ReminderLogStatus::Failed => AuditAction::ReminderFailed,
        };
        self.audit
            .record(
                AuditEntry::new(payload.organization_id, None, action, "invoice", payload.invoice_id)
                    .at(now)
                    .with_data(serde_json::json!({
                        "rule_id": payload.rule_id,
                        "reason": reason,
                    })),
            )
            .await?;
        Ok(())
    }

    async fn skip_late_fee(
        &self,
        payload: &ApplyLateFeePayload,
        reason: SkipReason,
    ) -> Result<LateFeeOutcome, AutomationError> {
        debug!(reason = %reason, "Late fee skipped");
        self.audit
            .record(
                AuditEntry::new(
                    payload.organization_id,
                    None,
                    AuditAction::LateFeeSkipped,
                    "invoice",
                    payload.invoice_id,
                )
                .at(self.clock.now())
                .with_data(serde_json::json!({
                    "policy_id": payload.policy_id,
                    "reason": reason,
                })),
            )
            .await?;
        Ok(LateFeeOutcome::Skipped(reason))
    }

    fn reminder_email(
        &self,
        aggregate: &InvoiceAggregate,
        rule: &ReminderRule,
        due_cents: Cents,
        to: String,
    ) -> OutboundEmail {
        let invoice = &aggregate.invoice;
        let amount = format_cents(due_cents, invoice.currency);
        let subject = match rule.template {
            ReminderTemplate::Friendly if rule.days_offset < 0 => {
                format!("Reminder: invoice {} for {} is due soon", invoice.number, amount)
            }
            ReminderTemplate::Friendly => {
                format!("Reminder: invoice {} for {} is due", invoice.number, amount)
            }
            ReminderTemplate::Firm => {
                format!("Payment required: invoice {} ({} outstanding)", invoice.number, amount)
            }
        };

        OutboundEmail {
            to,
            subject,
            template: EmailTemplate::new(
                format!("reminder.{}", rule.template.as_str()),
                serde_json::json!({
                    "organization_name": aggregate.organization.name,
                    "customer_name": aggregate.customer.name,
                    "invoice_number": invoice.number,
                    "amount_due": amount,
                    "amount_due_cents": due_cents,
                    "due_date": invoice.due_date,
                    "status": invoice.status,
                    "days_offset": rule.days_offset,
                    "invoice_url": format!(
                        "{}/i/{}",
                        self.public_base_url.trim_end_matches('/'),
                        invoice.public_token
                    ),
                }),
            ),
            attachments: Vec::new(),
        }
    }
}
