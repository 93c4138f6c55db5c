//! Invoice Calculator
//!
//! Pure computation of line- and invoice-level totals. Every intermediate
//! value is whole cents, every rounding step is half-up, and every
//! discount/tax amount is clamped into `[0, base]`.
//!
//! # Per line
//!
//! ```text
//! net      = round(unit_price × quantity)
//! discount = PERCENT: round(net × value / 100)   FIXED: value      (clamped to [0, net])
//! subtotal = max(0, net − discount)
//! tax      = round(subtotal × effective_rate / 100)   (0 when rate ≤ 0)
//! total    = subtotal + tax
//! ```
//!
//! # Per invoice
//!
//! Subtotals and taxes are summed across lines. The invoice-level discount is
//! then taken off the pre-discount grand total (`subtotal + tax`) with the same
//! PERCENT/FIXED clamp rule. The discount is not reallocated across tax
//! categories; historical invoices depend on this exact arithmetic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{Cents, clamp_cents, percent_of, round_half_up};

use crate::invoice::{Discount, DiscountType, Invoice, LineItem};

/// Computed amounts for one line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTotals {
    pub net_cents: Cents,
    pub discount_cents: Cents,
    pub subtotal_cents: Cents,
    pub tax_cents: Cents,
    pub total_cents: Cents,
    pub effective_tax_percent: Decimal,
}

/// Computed amounts for a whole invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal_cents: Cents,
    pub tax_cents: Cents,
    pub invoice_discount_cents: Cents,
    pub total_cents: Cents,
    pub lines: Vec<LineTotals>,
}

impl InvoiceTotals {
    pub fn empty() -> Self {
        Self {
            subtotal_cents: 0,
            tax_cents: 0,
            invoice_discount_cents: 0,
            total_cents: 0,
            lines: Vec::new(),
        }
    }
}

/// Stateless calculator; all methods are pure
#[derive(Debug, Clone, Copy, Default)]
pub struct InvoiceCalculator;

impl InvoiceCalculator {
    /// Computes the amounts for a single line
    ///
    /// # Arguments
    ///
    /// * `line` - The line item
    /// * `fallback_tax_percent` - The invoice-level rate used when the line has none
    pub fn compute_line(line: &LineItem, fallback_tax_percent: Option<Decimal>) -> LineTotals {
        let net_cents = round_half_up(
            Decimal::from(line.unit_price_cents)
                .checked_mul(line.quantity)
                .unwrap_or(Decimal::MAX),
        )
        .max(0);

        let discount_cents = line
            .discount
            .as_ref()
            .map_or(0, |discount| discount_amount(discount, net_cents));
        let subtotal_cents = (net_cents - discount_cents).max(0);

        let effective_tax_percent = line
            .tax_percent
            .or(fallback_tax_percent)
            .unwrap_or(Decimal::ZERO);
        let tax_cents = if effective_tax_percent > Decimal::ZERO {
            percent_of(subtotal_cents, effective_tax_percent).max(0)
        } else {
            0
        };

        LineTotals {
            net_cents,
            discount_cents,
            subtotal_cents,
            tax_cents,
            total_cents: subtotal_cents.saturating_add(tax_cents),
            effective_tax_percent,
        }
    }

    /// Computes totals for a set of lines plus an optional invoice-level discount
    pub fn compute_totals(
        lines: &[LineItem],
        invoice_discount: Option<&Discount>,
        fallback_tax_percent: Option<Decimal>,
    ) -> InvoiceTotals {
        let lines: Vec<LineTotals> = lines
            .iter()
            .map(|line| Self::compute_line(line, fallback_tax_percent))
            .collect();

        let subtotal_cents = lines
            .iter()
            .fold(0i64, |acc, line| acc.saturating_add(line.subtotal_cents));
        let tax_cents = lines
            .iter()
            .fold(0i64, |acc, line| acc.saturating_add(line.tax_cents));

        let pre_discount_total = subtotal_cents.saturating_add(tax_cents);
        let invoice_discount_cents = invoice_discount
            .map_or(0, |discount| discount_amount(discount, pre_discount_total));

        InvoiceTotals {
            subtotal_cents,
            tax_cents,
            invoice_discount_cents,
            total_cents: (pre_discount_total - invoice_discount_cents).max(0),
            lines,
        }
    }

    /// Computes totals for an invoice from its own line items and settings
    pub fn compute_invoice_totals(invoice: &Invoice) -> InvoiceTotals {
        Self::compute_totals(
            &invoice.line_items,
            invoice.discount.as_ref(),
            invoice.tax_percent,
        )
    }
}

/// Discount amount on `base`, clamped into `[0, base]`
fn discount_amount(discount: &Discount, base: Cents) -> Cents {
    let raw = match discount.discount_type {
        DiscountType::Percent => percent_of(base, discount.value),
        DiscountType::Fixed => round_half_up(discount.value),
    };
    clamp_cents(raw, base)
}
