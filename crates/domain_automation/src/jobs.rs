//! Automation job model
//!
//! Jobs carry ids only. Handlers re-read every entity when they run, so a
//! payload never goes stale.

use serde::{Deserialize, Serialize};

use core_kernel::{InvoiceId, LateFeePolicyId, OrganizationId, ReminderRuleId};

use crate::error::AutomationError;
use crate::ports::Job;

pub const SEND_REMINDER_TOPIC: &str = "automation.send_reminder";
pub const APPLY_LATE_FEE_TOPIC: &str = "automation.apply_late_fee";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReminderPayload {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub rule_id: ReminderRuleId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyLateFeePayload {
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub policy_id: LateFeePolicyId,
}

/// A decoded automation job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationTask {
    SendReminder(SendReminderPayload),
    ApplyLateFee(ApplyLateFeePayload),
}

impl AutomationTask {
    pub fn topic(&self) -> &'static str {
        match self {
            AutomationTask::SendReminder(_) => SEND_REMINDER_TOPIC,
            AutomationTask::ApplyLateFee(_) => APPLY_LATE_FEE_TOPIC,
        }
    }

    pub fn invoice_id(&self) -> InvoiceId {
        match self {
            AutomationTask::SendReminder(p) => p.invoice_id,
            AutomationTask::ApplyLateFee(p) => p.invoice_id,
        }
    }

    /// `(invoice, rule)` for reminders, `(invoice, policy)` for late fees
    pub fn idempotency_key(&self) -> String {
        match self {
            AutomationTask::SendReminder(p) => {
                format!("reminder:{}:{}", p.invoice_id.as_uuid(), p.rule_id.as_uuid())
            }
            AutomationTask::ApplyLateFee(p) => {
                format!("late_fee:{}:{}", p.invoice_id.as_uuid(), p.policy_id.as_uuid())
            }
        }
    }

    pub fn to_payload(&self) -> Result<serde_json::Value, AutomationError> {
        let value = match self {
            AutomationTask::SendReminder(p) => serde_json::to_value(p),
            AutomationTask::ApplyLateFee(p) => serde_json::to_value(p),
        };
        value.map_err(|e| AutomationError::MalformedJob(e.to_string()))
    }

    /// Decodes a leased job by topic
    pub fn from_job(job: &Job) -> Result<Self, AutomationError> {
        match job.topic.as_str() {
            SEND_REMINDER_TOPIC => serde_json::from_value(job.payload.clone())
                .map(AutomationTask::SendReminder)
                .map_err(|e| AutomationError::MalformedJob(e.to_string())),
            APPLY_LATE_FEE_TOPIC => serde_json::from_value(job.payload.clone())
                .map(AutomationTask::ApplyLateFee)
                .map_err(|e| AutomationError::MalformedJob(e.to_string())),
            other => Err(AutomationError::MalformedJob(format!("unknown topic {other}"))),
        }
    }
}
