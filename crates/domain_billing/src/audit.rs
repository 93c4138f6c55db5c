//! Audit trail entries
//!
//! Every money- or status-affecting operation, and every automation outcome,
//! leaves an entry. Entries are append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{AuditEventId, OrganizationId, UserId};

/// Audited action names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    InvoiceCreated,
    InvoiceSent,
    InvoiceViewed,
    InvoiceOverdue,
    InvoicePaid,
    InvoiceVoided,
    PaymentRecorded,
    CreditNoteIssued,
    AutomationScheduled,
    ReminderSent,
    ReminderSkipped,
    ReminderFailed,
    LateFeeApplied,
    LateFeeSkipped,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::InvoiceCreated => "invoice.created",
            AuditAction::InvoiceSent => "invoice.sent",
            AuditAction::InvoiceViewed => "invoice.viewed",
            AuditAction::InvoiceOverdue => "invoice.overdue",
            AuditAction::InvoicePaid => "invoice.paid",
            AuditAction::InvoiceVoided => "invoice.voided",
            AuditAction::PaymentRecorded => "payment.recorded",
            AuditAction::CreditNoteIssued => "credit_note.issued",
            AuditAction::AutomationScheduled => "automation.scheduled",
            AuditAction::ReminderSent => "reminder.sent",
            AuditAction::ReminderSkipped => "reminder.skipped",
            AuditAction::ReminderFailed => "reminder.failed",
            AuditAction::LateFeeApplied => "late_fee.applied",
            AuditAction::LateFeeSkipped => "late_fee.skipped",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEventId,
    pub organization_id: OrganizationId,
    /// `None` when the action was taken by automation
    pub actor_id: Option<UserId>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        organization_id: OrganizationId,
        actor_id: Option<UserId>,
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: impl ToString,
    ) -> Self {
        Self {
            id: AuditEventId::new_v7(),
            organization_id,
            actor_id,
            action,
            entity_type: entity_type.into(),
            entity_id: entity_id.to_string(),
            data: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Stamps the entry with an injected clock reading
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}
