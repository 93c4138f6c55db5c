//! Invoice and line item model
//!
//! An invoice is created together with its line items as a draft. After that,
//! the only line items it ever gains are appended ones (late fees); existing
//! items are never edited once the invoice has left `DRAFT`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{Cents, Currency, CustomerId, InvoiceId, LineItemId, OrganizationId};

use crate::error::BillingError;

/// Invoice status
///
/// `Paid` and `Void` are terminal. Only `Overdue` may be re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Being prepared; not visible to the buyer
    Draft,
    /// Delivered to the buyer
    Sent,
    /// The buyer has opened the hosted link
    Viewed,
    /// Past the due date with a balance outstanding
    Overdue,
    /// Fully settled
    Paid,
    /// Cancelled; no further automation
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Sent => "SENT",
            InvoiceStatus::Viewed => "VIEWED",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Void => "VOID",
        }
    }

    /// Returns true for `Paid` and `Void`
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Void)
    }

    /// Returns true when time-based automation may act on the invoice
    pub fn accepts_automation(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Sent | InvoiceStatus::Viewed | InvoiceStatus::Overdue
        )
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(InvoiceStatus::Draft),
            "SENT" => Ok(InvoiceStatus::Sent),
            "VIEWED" => Ok(InvoiceStatus::Viewed),
            "OVERDUE" => Ok(InvoiceStatus::Overdue),
            "PAID" => Ok(InvoiceStatus::Paid),
            "VOID" => Ok(InvoiceStatus::Void),
            other => Err(BillingError::UnknownValue {
                kind: "invoice status",
                value: other.to_string(),
            }),
        }
    }
}

/// How a discount value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    /// `value` is a percentage of the base
    Percent,
    /// `value` is an amount in cents
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percent => "PERCENT",
            DiscountType::Fixed => "FIXED",
        }
    }
}

impl FromStr for DiscountType {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERCENT" => Ok(DiscountType::Percent),
            "FIXED" => Ok(DiscountType::Fixed),
            other => Err(BillingError::UnknownValue {
                kind: "discount type",
                value: other.to_string(),
            }),
        }
    }
}

/// A discount applied to a line or to a whole invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub discount_type: DiscountType,
    pub value: Decimal,
}

impl Discount {
    pub fn percent(value: Decimal) -> Self {
        Self {
            discount_type: DiscountType::Percent,
            value,
        }
    }

    pub fn fixed(cents: Cents) -> Self {
        Self {
            discount_type: DiscountType::Fixed,
            value: Decimal::from(cents),
        }
    }
}

/// What a line item represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineItemKind {
    /// Goods or services entered by the seller
    Standard,
    /// Appended by the late-fee automation
    LateFee,
}

impl LineItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineItemKind::Standard => "STANDARD",
            LineItemKind::LateFee => "LATE_FEE",
        }
    }
}

impl FromStr for LineItemKind {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STANDARD" => Ok(LineItemKind::Standard),
            "LATE_FEE" => Ok(LineItemKind::LateFee),
            other => Err(BillingError::UnknownValue {
                kind: "line item kind",
                value: other.to_string(),
            }),
        }
    }
}

/// A line on an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub description: String,
    /// Fractional quantities are allowed (hours, kilograms)
    pub quantity: Decimal,
    pub unit_price_cents: Cents,
    /// Per-line tax rate in percentage points; falls back to the invoice rate
    pub tax_percent: Option<Decimal>,
    pub discount: Option<Discount>,
    pub kind: LineItemKind,
    /// Display order within the invoice
    pub position: i32,
}

impl LineItem {
    /// Creates a standard line with quantity 1
    pub fn new(description: impl Into<String>, unit_price_cents: Cents) -> Self {
        Self {
            id: LineItemId::new_v7(),
            description: description.into(),
            quantity: Decimal::ONE,
            unit_price_cents,
            tax_percent: None,
            discount: None,
            kind: LineItemKind::Standard,
            position: 0,
        }
    }

    /// Creates the line appended when a late fee is applied
    ///
    /// The fee is never taxed. It is still part of the base an invoice-level
    /// PERCENT discount applies to, so under such a discount the balance
    /// grows by the discounted fee; otherwise it grows by exactly the fee.
    pub fn late_fee(description: impl Into<String>, fee_cents: Cents, position: i32) -> Self {
        Self {
            tax_percent: Some(Decimal::ZERO),
            kind: LineItemKind::LateFee,
            position,
            ..Self::new(description, fee_cents)
        }
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_tax_percent(mut self, percent: Decimal) -> Self {
        self.tax_percent = Some(percent);
        self
    }

    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn with_position(mut self, position: i32) -> Self {
        self.position = position;
        self
    }
}

/// An invoice issued by an organization to one of its customers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub organization_id: OrganizationId,
    pub customer_id: CustomerId,
    /// Human-readable number, monotonic per organization (`INV-000042`)
    pub number: String,
    /// Unguessable token addressing the hosted invoice link
    pub public_token: String,
    pub status: InvoiceStatus,
    pub currency: Currency,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub payment_terms_days: u32,
    /// Applied to the pre-discount grand total
    pub discount: Option<Discount>,
    pub tax_label: Option<String>,
    /// Fallback rate for lines without their own tax rate
    pub tax_percent: Option<Decimal>,
    pub notes: Option<String>,
    pub line_items: Vec<LineItem>,
    pub sent_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Position for the next appended line item
    pub fn next_line_position(&self) -> i32 {
        self.line_items
            .iter()
            .map(|line| line.position)
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Returns true if a late-fee line has been appended
    pub fn has_late_fee_line(&self) -> bool {
        self.line_items
            .iter()
            .any(|line| line.kind == LineItemKind::LateFee)
    }
}

/// Formats the per-organization sequence into an invoice number
pub fn format_invoice_number(sequence: i64) -> String {
    format!("INV-{:06}", sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::Sent,
            InvoiceStatus::Viewed,
            InvoiceStatus::Overdue,
            InvoiceStatus::Paid,
            InvoiceStatus::Void,
        ] {
            assert_eq!(status.as_str().parse::<InvoiceStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(InvoiceStatus::Paid.is_terminal());
        assert!(InvoiceStatus::Void.is_terminal());
        assert!(!InvoiceStatus::Overdue.is_terminal());
    }

    #[test]
    fn test_invoice_number_format() {
        assert_eq!(format_invoice_number(42), "INV-000042");
        assert_eq!(format_invoice_number(1_234_567), "INV-1234567");
    }

    #[test]
    fn test_late_fee_line_is_untaxed() {
        let line = LineItem::late_fee("Late fee", 500, 3);
        assert_eq!(line.tax_percent, Some(Decimal::ZERO));
        assert_eq!(line.kind, LineItemKind::LateFee);
        assert_eq!(line.position, 3);
    }
}
