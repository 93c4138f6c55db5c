//! Automation Scheduler
//!
//! Turns an invoice's due date into delayed reminder and late-fee jobs.
//!
//! The anchor is the due date at 09:00 in the organization's timezone. A rule
//! with `days_offset = n` fires at 09:00 local on `due_date + n` calendar
//! days, so the local hour stays fixed across DST changes.
//!
//! Scheduling may run several times for one invoice (every re-send does).
//! The queue does not deduplicate, so duplicates are expected and the worker
//! handlers are idempotent at execution time.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use core_kernel::{Clock, InvoiceId, OrganizationId, Timezone};
use domain_billing::{AuditAction, AuditEntry, Invoice, LateFeePolicy, ReminderPolicy};

use crate::error::AutomationError;
use crate::jobs::{ApplyLateFeePayload, AutomationTask, SendReminderPayload};
use crate::ports::{AuditLog, BillingStore, JobQueue, NewJob};

/// At most this many enabled rules of a policy are scheduled
pub const MAX_REMINDER_RULES: usize = 5;

/// Retry budget for every automation job
pub const JOB_MAX_ATTEMPTS: u32 = 3;

/// Local hour at which automated communication fires
pub const LOCAL_SEND_HOUR: u32 = 9;

/// A job the scheduler decided to enqueue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub task: AutomationTask,
    pub run_at: DateTime<Utc>,
    /// `max(0, run_at - now)`
    pub delay: Duration,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScheduleReport {
    pub reminders: usize,
    pub late_fees: usize,
    #[serde(skip)]
    pub tasks: Vec<ScheduledTask>,
}

impl ScheduleReport {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

pub struct AutomationScheduler {
    store: Arc<dyn BillingStore>,
    queue: Arc<dyn JobQueue>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
}

impl AutomationScheduler {
    pub fn new(
        store: Arc<dyn BillingStore>,
        queue: Arc<dyn JobQueue>,
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            queue,
            audit,
            clock,
        }
    }

    /// Reads fresh policy state and enqueues the invoice's automation jobs
    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id))]
    pub async fn schedule(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<ScheduleReport, AutomationError> {
        let aggregate = self.store.load_invoice(organization_id, invoice_id).await?;
        if aggregate.invoice.due_date.is_none() {
            debug!("Invoice has no due date; nothing to schedule");
            return Ok(ScheduleReport::default());
        }

        let policies = self.store.reminder_policies(organization_id).await?;
        let late_fee = self.store.enabled_late_fee_policy(organization_id).await?;

        let tasks = plan(
            &aggregate.invoice,
            &aggregate.organization.timezone,
            ReminderPolicy::select(&policies),
            late_fee.as_ref(),
            self.clock.now(),
        )?;

        for scheduled in &tasks {
            let job = NewJob {
                topic: scheduled.task.topic().to_string(),
                payload: scheduled.task.to_payload()?,
                idempotency_key: scheduled.task.idempotency_key(),
                delay: scheduled.delay,
                max_attempts: JOB_MAX_ATTEMPTS,
            };
            let job_id = self.queue.enqueue(job).await?;
            debug!(job_id = %job_id, topic = scheduled.task.topic(), run_at = %scheduled.run_at, "Enqueued automation job");
        }

        let report = ScheduleReport {
            reminders: tasks
                .iter()
                .filter(|t| matches!(t.task, AutomationTask::SendReminder(_)))
                .count(),
            late_fees: tasks
                .iter()
                .filter(|t| matches!(t.task, AutomationTask::ApplyLateFee(_)))
                .count(),
            tasks,
        };

        self.audit
            .record(
                AuditEntry::new(
                    organization_id,
                    None,
                    AuditAction::AutomationScheduled,
                    "invoice",
                    invoice_id,
                )
                .at(self.clock.now())
                .with_data(serde_json::json!({
                    "reminders": report.reminders,
                    "late_fees": report.late_fees,
                })),
            )
            .await?;

        info!(reminders = report.reminders, late_fees = report.late_fees, "Automation scheduled");
        Ok(report)
    }
}

/// Computes the jobs for an invoice without touching the queue
pub fn plan(
    invoice: &Invoice,
    timezone: &Timezone,
    reminder_policy: Option<&ReminderPolicy>,
    late_fee_policy: Option<&LateFeePolicy>,
    now: DateTime<Utc>,
) -> Result<Vec<ScheduledTask>, AutomationError> {
    let Some(due_date) = invoice.due_date else {
        return Ok(Vec::new());
    };

    let mut tasks = Vec::new();

    if let Some(policy) = reminder_policy {
        for rule in policy.enabled_rules().into_iter().take(MAX_REMINDER_RULES) {
            let run_at = local_send_time(timezone, due_date, rule.days_offset)?;
            tasks.push(ScheduledTask {
                task: AutomationTask::SendReminder(SendReminderPayload {
                    organization_id: invoice.organization_id,
                    invoice_id: invoice.id,
                    rule_id: rule.id,
                }),
                run_at,
                delay: delay_until(run_at, now),
            });
        }
    }

    if let Some(policy) = late_fee_policy.filter(|p| p.enabled) {
        let run_at = local_send_time(timezone, due_date, policy.days_after_due)?;
        tasks.push(ScheduledTask {
            task: AutomationTask::ApplyLateFee(ApplyLateFeePayload {
                organization_id: invoice.organization_id,
                invoice_id: invoice.id,
                policy_id: policy.id,
            }),
            run_at,
            delay: delay_until(run_at, now),
        });
    }

    Ok(tasks)
}

/// 09:00 local on `due_date + offset_days`
pub fn local_send_time(
    timezone: &Timezone,
    due_date: NaiveDate,
    offset_days: i32,
) -> Result<DateTime<Utc>, AutomationError> {
    let days = Days::new(u64::from(offset_days.unsigned_abs()));
    let shifted = if offset_days >= 0 {
        due_date.checked_add_days(days)
    } else {
        due_date.checked_sub_days(days)
    };
    let date = shifted.ok_or_else(|| {
        AutomationError::invalid_state(format!("offset {offset_days} days out of range"))
    })?;

    Ok(timezone.at_local_time(date, LOCAL_SEND_HOUR, 0)?)
}

fn delay_until(run_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (run_at - now).to_std().unwrap_or(Duration::ZERO)
}
