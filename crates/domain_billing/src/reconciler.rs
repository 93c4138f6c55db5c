//! Balance reconciliation
//!
//! The single place where "how much does the buyer still owe" is derived.
//! Payment initiation, reminders, late fees and the PAID transition all go
//! through [`BalanceReconciler::compute_amount_due`].

use serde::{Deserialize, Serialize};

use core_kernel::Cents;

use crate::calculator::{InvoiceCalculator, InvoiceTotals};
use crate::invoice::{Invoice, LineItem};
use crate::payment::{CreditNote, Payment};

/// Totals plus everything credited against them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountDue {
    pub totals: InvoiceTotals,
    /// Sum of `SUCCEEDED` payments only
    pub paid_cents: Cents,
    /// Sum of all credit notes
    pub credits_cents: Cents,
    /// `max(0, total − paid − credits)`
    pub due_cents: Cents,
}

impl AmountDue {
    pub fn is_settled(&self) -> bool {
        self.due_cents == 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceReconciler;

impl BalanceReconciler {
    /// Computes the amount due from explicit line items
    ///
    /// The line items are passed separately from the invoice so callers can
    /// evaluate a prospective set of lines against the invoice's settings.
    pub fn compute_amount_due(
        invoice: &Invoice,
        line_items: &[LineItem],
        payments: &[Payment],
        credit_notes: &[CreditNote],
    ) -> AmountDue {
        let totals = InvoiceCalculator::compute_totals(
            line_items,
            invoice.discount.as_ref(),
            invoice.tax_percent,
        );

        let paid_cents = payments
            .iter()
            .filter(|payment| payment.status.counts_toward_balance())
            .fold(0i64, |acc, payment| acc.saturating_add(payment.amount_cents));

        let credits_cents = credit_notes
            .iter()
            .fold(0i64, |acc, note| acc.saturating_add(note.amount_cents));

        let due_cents = totals
            .total_cents
            .saturating_sub(paid_cents)
            .saturating_sub(credits_cents)
            .max(0);

        AmountDue {
            totals,
            paid_cents,
            credits_cents,
            due_cents,
        }
    }

    /// Computes the amount due using the invoice's own line items
    pub fn amount_due(
        invoice: &Invoice,
        payments: &[Payment],
        credit_notes: &[CreditNote],
    ) -> AmountDue {
        Self::compute_amount_due(invoice, &invoice.line_items, payments, credit_notes)
    }
}
