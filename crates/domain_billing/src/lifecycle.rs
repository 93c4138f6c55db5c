//! Invoice lifecycle state machine
//!
//! ```text
//!            send           open link
//!   DRAFT ─────────▶ SENT ─────────▶ VIEWED
//!                     │  ╲             │
//!                     │   ╲ due passed │ due passed
//!                     │    ▼           ▼
//!                     │     OVERDUE ◀──┘
//!                     │        │
//!    settled in full  ▼        ▼
//!   (any non-terminal) ──▶ PAID        void (any non-terminal) ──▶ VOID
//! ```
//!
//! Transitions are computed here without I/O. The command service reads the
//! returned [`SideEffect`]s and performs them through its ports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::Timezone;

use crate::audit::AuditAction;
use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceStatus};

/// Something that happened to an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    /// The seller sends (or re-sends) the invoice
    Send,
    /// The buyer opened the hosted link
    View,
    /// The due date has passed with a balance outstanding
    DuePassed,
    /// Payments and credits now cover the total
    SettledInFull,
    /// The seller cancels the invoice
    Void,
}

impl InvoiceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InvoiceEvent::Send => "send",
            InvoiceEvent::View => "view",
            InvoiceEvent::DuePassed => "due_passed",
            InvoiceEvent::SettledInFull => "settled_in_full",
            InvoiceEvent::Void => "void",
        }
    }
}

/// Work the caller must perform after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SideEffect {
    /// Render PDF and UBL export
    GenerateDocuments,
    /// Email the invoice to the buyer
    EmailBuyer,
    /// Compute and enqueue reminders and the late fee
    ScheduleAutomation,
    /// Render the payment receipt
    GenerateReceipt,
    /// Append an audit entry
    Audit(AuditAction),
}

/// Outcome of applying an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: InvoiceStatus,
    pub to: InvoiceStatus,
    pub event: InvoiceEvent,
    pub side_effects: Vec<SideEffect>,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    pub fn has_effect(&self, effect: SideEffect) -> bool {
        self.side_effects.contains(&effect)
    }
}

pub struct InvoiceLifecycle;

impl InvoiceLifecycle {
    /// Computes the target status for `event`, or rejects it
    ///
    /// Events that do not apply to the current status (e.g. `DuePassed` on a
    /// paid invoice) leave the status unchanged rather than failing; only
    /// user-initiated events that contradict the state are errors.
    pub fn next_status(
        current: InvoiceStatus,
        event: InvoiceEvent,
    ) -> Result<InvoiceStatus, BillingError> {
        use InvoiceEvent as E;
        use InvoiceStatus as S;

        match (current, event) {
            (S::Void, E::Send) => Err(BillingError::SendVoid),
            (S::Draft, E::Send) => Ok(S::Sent),
            (S::Sent | S::Viewed | S::Overdue, E::Send) => Ok(current),

            (S::Sent, E::View) => Ok(S::Viewed),
            (S::Draft, E::View) => Err(BillingError::invalid_transition(current, event)),
            (_, E::View) => Ok(current),

            (S::Sent | S::Viewed, E::DuePassed) => Ok(S::Overdue),
            (_, E::DuePassed) => Ok(current),

            (S::Void, E::SettledInFull) => Err(BillingError::invalid_transition(current, event)),
            (S::Paid, E::SettledInFull) => Ok(current),
            (_, E::SettledInFull) => Ok(S::Paid),

            (S::Paid, E::Void) => Err(BillingError::invalid_transition(current, event)),
            (_, E::Void) => Ok(S::Void),

            (S::Paid, E::Send) => Err(BillingError::invalid_transition(current, event)),
        }
    }

    /// Applies `event` to the invoice, stamping lifecycle timestamps
    pub fn apply(
        invoice: &mut Invoice,
        event: InvoiceEvent,
        at: DateTime<Utc>,
    ) -> Result<Transition, BillingError> {
        let from = invoice.status;
        let to = Self::next_status(from, event)?;
        let mut side_effects = Vec::new();

        match event {
            InvoiceEvent::Send => {
                invoice.sent_at.get_or_insert(at);
                side_effects.extend([
                    SideEffect::GenerateDocuments,
                    SideEffect::EmailBuyer,
                    SideEffect::ScheduleAutomation,
                    SideEffect::Audit(AuditAction::InvoiceSent),
                ]);
            }
            InvoiceEvent::View => {
                if from != InvoiceStatus::Draft && invoice.viewed_at.is_none() {
                    invoice.viewed_at = Some(at);
                    side_effects.push(SideEffect::Audit(AuditAction::InvoiceViewed));
                }
            }
            InvoiceEvent::DuePassed => {
                if to != from {
                    side_effects.push(SideEffect::Audit(AuditAction::InvoiceOverdue));
                }
            }
            InvoiceEvent::SettledInFull => {
                if to != from {
                    invoice.paid_at = Some(at);
                    side_effects.extend([
                        SideEffect::GenerateReceipt,
                        SideEffect::Audit(AuditAction::InvoicePaid),
                    ]);
                }
            }
            InvoiceEvent::Void => {
                if to != from {
                    side_effects.push(SideEffect::Audit(AuditAction::InvoiceVoided));
                }
            }
        }

        invoice.status = to;
        if to != from || !side_effects.is_empty() {
            invoice.updated_at = at;
        }

        Ok(Transition {
            from,
            to,
            event,
            side_effects,
        })
    }

    /// Returns true once the due date has fully elapsed in the organization's timezone
    pub fn is_past_due(
        invoice: &Invoice,
        now: DateTime<Utc>,
        timezone: &Timezone,
    ) -> Result<bool, BillingError> {
        match invoice.due_date {
            Some(due_date) => Ok(now >= timezone.end_of_day(due_date)?),
            None => Ok(false),
        }
    }

    /// Lazily moves a `SENT`/`VIEWED` invoice to `OVERDUE`
    ///
    /// Returns `None` when nothing changed.
    pub fn refresh_overdue(
        invoice: &mut Invoice,
        due_cents: i64,
        now: DateTime<Utc>,
        timezone: &Timezone,
    ) -> Result<Option<Transition>, BillingError> {
        if !matches!(invoice.status, InvoiceStatus::Sent | InvoiceStatus::Viewed) {
            return Ok(None);
        }
        if due_cents <= 0 || !Self::is_past_due(invoice, now, timezone)? {
            return Ok(None);
        }
        Self::apply(invoice, InvoiceEvent::DuePassed, now).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_void_is_rejected_with_message() {
        let err = InvoiceLifecycle::next_status(InvoiceStatus::Void, InvoiceEvent::Send).unwrap_err();
        assert_eq!(err.to_string(), "cannot send a void invoice");
    }

    #[test]
    fn test_overdue_reentry_from_viewed() {
        assert_eq!(
            InvoiceLifecycle::next_status(InvoiceStatus::Viewed, InvoiceEvent::DuePassed).unwrap(),
            InvoiceStatus::Overdue
        );
    }

    #[test]
    fn test_terminal_states_ignore_due_passed() {
        assert_eq!(
            InvoiceLifecycle::next_status(InvoiceStatus::Paid, InvoiceEvent::DuePassed).unwrap(),
            InvoiceStatus::Paid
        );
        assert_eq!(
            InvoiceLifecycle::next_status(InvoiceStatus::Void, InvoiceEvent::DuePassed).unwrap(),
            InvoiceStatus::Void
        );
    }
}
