//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random billing data that
//! stays inside the domain's input bounds.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::{Cents, Currency, InvoiceId};
use domain_billing::{Discount, LineItem, Payment, PaymentStatus};

/// Strategy for generating valid Currency values
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::USD),
        Just(Currency::EUR),
        Just(Currency::GBP),
        Just(Currency::JPY),
        Just(Currency::CHF),
        Just(Currency::INR),
        Just(Currency::AUD),
        Just(Currency::CAD),
        Just(Currency::SGD),
        Just(Currency::HKD),
    ]
}

/// Strategy for unit prices in cents
pub fn unit_price_strategy() -> impl Strategy<Value = Cents> {
    0i64..10_000_000i64
}

/// Strategy for positive payment or credit amounts
pub fn positive_cents_strategy() -> impl Strategy<Value = Cents> {
    1i64..5_000_000i64
}

/// Quantities with up to two decimal places
pub fn quantity_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..100_000i64).prop_map(|hundredths| Decimal::new(hundredths, 2))
}

/// Percentages in `[0, 100]` with up to two decimal places
pub fn percent_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=10_000i64).prop_map(|hundredths| Decimal::new(hundredths, 2))
}

/// Any discount, including fixed amounts larger than what they apply to
pub fn discount_strategy() -> impl Strategy<Value = Discount> {
    prop_oneof![
        percent_strategy().prop_map(Discount::percent),
        (0i64..20_000_000i64).prop_map(Discount::fixed),
    ]
}

/// A standard line item with optional tax and discount
pub fn line_item_strategy() -> impl Strategy<Value = LineItem> {
    (
        unit_price_strategy(),
        quantity_strategy(),
        proptest::option::of(percent_strategy()),
        proptest::option::of(discount_strategy()),
    )
        .prop_map(|(unit_price, quantity, tax, discount)| {
            let mut line = LineItem::new("Generated line", unit_price).with_quantity(quantity);
            line.tax_percent = tax;
            line.discount = discount;
            line
        })
}

pub fn line_items_strategy(max: usize) -> impl Strategy<Value = Vec<LineItem>> {
    proptest::collection::vec(line_item_strategy(), 0..=max)
}

pub fn payment_status_strategy() -> impl Strategy<Value = PaymentStatus> {
    prop_oneof![
        Just(PaymentStatus::Pending),
        Just(PaymentStatus::Succeeded),
        Just(PaymentStatus::Failed),
        Just(PaymentStatus::Refunded),
    ]
}

/// Payments against `invoice_id` in any status
pub fn payments_strategy(
    invoice_id: InvoiceId,
    max: usize,
) -> impl Strategy<Value = Vec<Payment>> {
    proptest::collection::vec(
        (payment_status_strategy(), positive_cents_strategy()),
        0..=max,
    )
    .prop_map(move |rows| {
        rows.into_iter()
            .map(|(status, amount)| Payment::new(invoice_id, status, amount, "generated"))
            .collect()
    })
}

/// Dates within 2026 and 2027
pub fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0i64..730i64).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap_or_default() + Duration::days(offset)
    })
}

/// Reminder offsets around the due date, in days
pub fn days_offset_strategy() -> impl Strategy<Value = i32> {
    -30i32..=60i32
}
