//! Custom Test Assertions
//!
//! Assertion helpers for billing types that print the whole breakdown on
//! failure instead of a bare number mismatch.

use chrono::{DateTime, Timelike, Utc};

use core_kernel::{Cents, Timezone};
use domain_billing::{
    AmountDue, AuditAction, AuditEntry, Invoice, InvoiceCalculator, InvoiceStatus, LineItemKind,
};

/// Asserts an invoice's computed grand total
pub fn assert_invoice_total(invoice: &Invoice, expected_cents: Cents) {
    let totals = InvoiceCalculator::compute_invoice_totals(invoice);
    assert_eq!(
        totals.total_cents, expected_cents,
        "Invoice {} total mismatch: subtotal={}, tax={}, discount={}, total={}, expected={}",
        invoice.number,
        totals.subtotal_cents,
        totals.tax_cents,
        totals.invoice_discount_cents,
        totals.total_cents,
        expected_cents
    );
}

/// Asserts the outstanding balance
pub fn assert_amount_due(amount: &AmountDue, expected_cents: Cents) {
    assert_eq!(
        amount.due_cents, expected_cents,
        "Amount due mismatch: total={}, paid={}, credits={}, due={}, expected={}",
        amount.totals.total_cents,
        amount.paid_cents,
        amount.credits_cents,
        amount.due_cents,
        expected_cents
    );
}

pub fn assert_status(invoice: &Invoice, expected: InvoiceStatus) {
    assert_eq!(
        invoice.status, expected,
        "Invoice {} expected status {}, got {}",
        invoice.number, expected, invoice.status
    );
}

/// Asserts the number of appended late-fee lines
pub fn assert_late_fee_lines(invoice: &Invoice, expected: usize) {
    let count = invoice
        .line_items
        .iter()
        .filter(|line| line.kind == LineItemKind::LateFee)
        .count();
    assert_eq!(
        count, expected,
        "Invoice {} expected {} late-fee lines, found {}",
        invoice.number, expected, count
    );
}

/// Asserts an instant falls on the hour `hour:00` in the given zone
pub fn assert_local_hour(instant: DateTime<Utc>, timezone: &Timezone, hour: u32) {
    let local = timezone.to_local(instant);
    assert!(
        local.hour() == hour && local.minute() == 0 && local.second() == 0,
        "Expected {}:00 in {}, got {}",
        hour,
        timezone.name(),
        local
    );
}

/// Asserts how many audit entries carry `action`
pub fn assert_audit_count(entries: &[AuditEntry], action: AuditAction, expected: usize) {
    let count = entries.iter().filter(|entry| entry.action == action).count();
    assert_eq!(
        count,
        expected,
        "Expected {} audit entries for {}, found {} (recorded: {:?})",
        expected,
        action,
        count,
        entries.iter().map(|e| e.action).collect::<Vec<_>>()
    );
}
