//! Integration tests for domain_billing

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{Currency, CustomerId, InvoiceId, OrganizationId, Timezone};

use domain_billing::{
    AuditAction, BalanceReconciler, CreditNote, Discount, Invoice, InvoiceCalculator,
    InvoiceEvent, InvoiceLifecycle, InvoiceStatus, LineItem, Payment, PaymentStatus, SideEffect,
};

fn invoice_with(lines: Vec<LineItem>) -> Invoice {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    Invoice {
        id: InvoiceId::new_v7(),
        organization_id: OrganizationId::new(),
        customer_id: CustomerId::new(),
        number: "INV-000001".to_string(),
        public_token: "0123456789abcdef0123456789abcdef".to_string(),
        status: InvoiceStatus::Draft,
        currency: Currency::USD,
        issue_date: now.date_naive(),
        due_date: chrono::NaiveDate::from_ymd_opt(2024, 3, 31),
        payment_terms_days: 30,
        discount: None,
        tax_label: None,
        tax_percent: None,
        notes: None,
        line_items: lines,
        sent_at: None,
        viewed_at: None,
        paid_at: None,
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// Calculator Tests
// ============================================================================

mod calculator_tests {
    use super::*;

    #[test]
    fn test_quantity_is_rounded_half_up() {
        // 333 × 1.5 = 499.5
        let line = LineItem::new("Hours", 333).with_quantity(dec!(1.5));
        assert_eq!(InvoiceCalculator::compute_line(&line, None).net_cents, 500);
    }

    #[test]
    fn test_zero_quantity_is_zero_net() {
        let line = LineItem::new("Nothing", 9999).with_quantity(Decimal::ZERO);
        let totals = InvoiceCalculator::compute_line(&line, Some(dec!(20)));
        assert_eq!(totals.net_cents, 0);
        assert_eq!(totals.total_cents, 0);
    }

    #[test]
    fn test_one_cent_split_three_ways() {
        let lines: Vec<LineItem> = (0..3)
            .map(|i| {
                LineItem::new("Share", 1)
                    .with_quantity(Decimal::ONE)
                    .with_discount(Discount::percent(dec!(66.67)))
                    .with_position(i)
            })
            .collect();

        // Each share: discount round(0.6667) = 1, subtotal 0
        let first = InvoiceCalculator::compute_totals(&lines, None, None);
        let second = InvoiceCalculator::compute_totals(&lines, None, None);
        assert_eq!(first, second);
        assert!(first.lines.iter().all(|l| l.discount_cents == 1 && l.subtotal_cents == 0));

        let share = LineItem::new("Share", 1).with_discount(Discount::percent(dec!(33.33)));
        let totals = InvoiceCalculator::compute_line(&share, None);
        // round(0.3333) = 0
        assert_eq!(totals.discount_cents, 0);
        assert_eq!(totals.subtotal_cents, 1);
    }

    #[test]
    fn test_percent_discount_then_tax() {
        let line = LineItem::new("Consulting", 10_000)
            .with_quantity(dec!(2))
            .with_discount(Discount::percent(dec!(10)))
            .with_tax_percent(dec!(8.25));
        let totals = InvoiceCalculator::compute_line(&line, None);

        assert_eq!(totals.net_cents, 20_000);
        assert_eq!(totals.discount_cents, 2_000);
        assert_eq!(totals.subtotal_cents, 18_000);
        assert_eq!(totals.tax_cents, 1_485);
        assert_eq!(totals.total_cents, 19_485);
        assert_eq!(totals.effective_tax_percent, dec!(8.25));
    }

    #[test]
    fn test_invoice_discount_applies_to_grand_total() {
        let mut invoice = invoice_with(vec![
            LineItem::new("A", 1000).with_tax_percent(dec!(10)),
            LineItem::new("B", 500),
        ]);
        invoice.discount = Some(Discount::percent(dec!(50)));

        let totals = InvoiceCalculator::compute_invoice_totals(&invoice);
        assert_eq!(totals.subtotal_cents, 1500);
        assert_eq!(totals.tax_cents, 100);
        // 50% of 1600, not of 1500
        assert_eq!(totals.invoice_discount_cents, 800);
        assert_eq!(totals.total_cents, 800);
    }

    #[test]
    fn test_invoice_fixed_discount_clamped() {
        let mut invoice = invoice_with(vec![LineItem::new("A", 1000)]);
        invoice.discount = Some(Discount::fixed(2500));

        let totals = InvoiceCalculator::compute_invoice_totals(&invoice);
        assert_eq!(totals.invoice_discount_cents, 1000);
        assert_eq!(totals.total_cents, 0);
    }

    #[test]
    fn test_negative_tax_rate_yields_no_tax() {
        let line = LineItem::new("A", 1000).with_tax_percent(dec!(-5));
        assert_eq!(InvoiceCalculator::compute_line(&line, None).tax_cents, 0);
    }

    #[test]
    fn test_invoice_fallback_tax_skips_late_fee_line() {
        let mut invoice = invoice_with(vec![
            LineItem::new("A", 1000),
            LineItem::late_fee("Late fee", 500, 1),
        ]);
        invoice.tax_percent = Some(dec!(10));

        let totals = InvoiceCalculator::compute_invoice_totals(&invoice);
        assert_eq!(totals.tax_cents, 100);
        assert_eq!(totals.total_cents, 1600);
    }
}

// ============================================================================
// Reconciler Tests
// ============================================================================

mod reconciler_tests {
    use super::*;

    #[test]
    fn test_only_succeeded_payments_count() {
        let invoice = invoice_with(vec![LineItem::new("A", 5000)]);
        let payments = vec![
            Payment::succeeded(invoice.id, 1000),
            Payment::new(invoice.id, PaymentStatus::Failed, 2000, "stripe"),
            Payment::new(invoice.id, PaymentStatus::Pending, 500, "stripe"),
        ];

        let due = BalanceReconciler::amount_due(&invoice, &payments, &[]);
        assert_eq!(due.paid_cents, 1000);
        assert_eq!(due.due_cents, 4000);
    }

    #[test]
    fn test_credits_count_unconditionally_and_floor_at_zero() {
        let invoice = invoice_with(vec![LineItem::new("A", 5000)]);
        let credits = vec![
            CreditNote::new(invoice.id, 3000, "Damaged goods"),
            CreditNote::new(invoice.id, 3000, "Goodwill"),
        ];

        let due = BalanceReconciler::amount_due(&invoice, &[], &credits);
        assert_eq!(due.credits_cents, 6000);
        assert_eq!(due.due_cents, 0);
        assert!(due.is_settled());
    }

    #[test]
    fn test_late_fee_follows_invoice_discount() {
        let due_with_fee = |discount: Discount| {
            let mut invoice = invoice_with(vec![LineItem::new("A", 5000)]);
            invoice.discount = Some(discount);
            let before = BalanceReconciler::amount_due(&invoice, &[], &[]).due_cents;
            invoice.line_items.push(LineItem::late_fee("Late fee", 500, 1));
            let after = BalanceReconciler::amount_due(&invoice, &[], &[]).due_cents;
            (before, after)
        };

        // a 10% invoice discount also takes 10% off the fee
        assert_eq!(due_with_fee(Discount::percent(dec!(10))), (4500, 4950));
        assert_eq!(due_with_fee(Discount::fixed(1000)), (4000, 4500));
    }

    #[test]
    fn test_prospective_lines_use_invoice_settings() {
        let mut invoice = invoice_with(vec![LineItem::new("A", 1000)]);
        invoice.tax_percent = Some(dec!(10));
        let prospective = vec![LineItem::new("A", 1000), LineItem::new("B", 1000)];

        let due = BalanceReconciler::compute_amount_due(&invoice, &prospective, &[], &[]);
        assert_eq!(due.due_cents, 2200);
    }
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

mod lifecycle_tests {
    use super::*;

    fn at(day: u32, hour: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_send_from_draft_requests_side_effects() {
        let mut invoice = invoice_with(vec![LineItem::new("A", 1000)]);
        let transition = InvoiceLifecycle::apply(&mut invoice, InvoiceEvent::Send, at(1, 9)).unwrap();

        assert_eq!(transition.to, InvoiceStatus::Sent);
        assert!(transition.changed());
        assert!(transition.has_effect(SideEffect::GenerateDocuments));
        assert!(transition.has_effect(SideEffect::EmailBuyer));
        assert!(transition.has_effect(SideEffect::ScheduleAutomation));
        assert!(transition.has_effect(SideEffect::Audit(AuditAction::InvoiceSent)));
        assert_eq!(invoice.sent_at, Some(at(1, 9)));
    }

    #[test]
    fn test_resend_keeps_status_and_first_sent_at() {
        let mut invoice = invoice_with(vec![LineItem::new("A", 1000)]);
        InvoiceLifecycle::apply(&mut invoice, InvoiceEvent::Send, at(1, 9)).unwrap();
        InvoiceLifecycle::apply(&mut invoice, InvoiceEvent::View, at(2, 9)).unwrap();

        let transition = InvoiceLifecycle::apply(&mut invoice, InvoiceEvent::Send, at(3, 9)).unwrap();
        assert!(!transition.changed());
        assert_eq!(invoice.status, InvoiceStatus::Viewed);
        assert_eq!(invoice.sent_at, Some(at(1, 9)));
    }

    #[test]
    fn test_view_is_recorded_once() {
        let mut invoice = invoice_with(vec![LineItem::new("A", 1000)]);
        InvoiceLifecycle::apply(&mut invoice, InvoiceEvent::Send, at(1, 9)).unwrap();
        InvoiceLifecycle::apply(&mut invoice, InvoiceEvent::View, at(2, 9)).unwrap();
        let second = InvoiceLifecycle::apply(&mut invoice, InvoiceEvent::View, at(3, 9)).unwrap();

        assert!(second.side_effects.is_empty());
        assert_eq!(invoice.viewed_at, Some(at(2, 9)));
    }

    #[test]
    fn test_view_on_draft_is_rejected() {
        let result = InvoiceLifecycle::next_status(InvoiceStatus::Draft, InvoiceEvent::View);
        assert!(result.is_err());
    }

    #[test]
    fn test_settle_from_each_open_status() {
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::Sent,
            InvoiceStatus::Viewed,
            InvoiceStatus::Overdue,
        ] {
            assert_eq!(
                InvoiceLifecycle::next_status(status, InvoiceEvent::SettledInFull).unwrap(),
                InvoiceStatus::Paid
            );
        }
    }

    #[test]
    fn test_settled_sets_paid_at_and_receipt() {
        let mut invoice = invoice_with(vec![LineItem::new("A", 1000)]);
        invoice.status = InvoiceStatus::Overdue;
        let transition =
            InvoiceLifecycle::apply(&mut invoice, InvoiceEvent::SettledInFull, at(5, 10)).unwrap();

        assert!(transition.has_effect(SideEffect::GenerateReceipt));
        assert_eq!(invoice.paid_at, Some(at(5, 10)));
    }

    #[test]
    fn test_void_rules() {
        assert!(InvoiceLifecycle::next_status(InvoiceStatus::Paid, InvoiceEvent::Void).is_err());
        assert_eq!(
            InvoiceLifecycle::next_status(InvoiceStatus::Void, InvoiceEvent::Void).unwrap(),
            InvoiceStatus::Void
        );
        assert!(InvoiceLifecycle::next_status(InvoiceStatus::Paid, InvoiceEvent::Send).is_err());
    }

    #[test]
    fn test_overdue_uses_end_of_day_in_org_timezone() {
        let tz = Timezone::parse("America/New_York").unwrap();
        let mut invoice = invoice_with(vec![LineItem::new("A", 1000)]);
        invoice.status = InvoiceStatus::Sent;
        invoice.due_date = chrono::NaiveDate::from_ymd_opt(2024, 4, 10);

        // 23:00 New York on the due date is still 2024-04-11 03:00 UTC
        let late_evening = Utc.with_ymd_and_hms(2024, 4, 11, 3, 0, 0).unwrap();
        assert!(InvoiceLifecycle::refresh_overdue(&mut invoice, 1000, late_evening, &tz)
            .unwrap()
            .is_none());

        let next_morning = Utc.with_ymd_and_hms(2024, 4, 11, 5, 0, 0).unwrap();
        let transition = InvoiceLifecycle::refresh_overdue(&mut invoice, 1000, next_morning, &tz)
            .unwrap()
            .unwrap();
        assert_eq!(transition.to, InvoiceStatus::Overdue);
        assert_eq!(invoice.status, InvoiceStatus::Overdue);
    }

    #[test]
    fn test_refresh_overdue_needs_positive_balance() {
        let tz = Timezone::parse("UTC").unwrap();
        let mut invoice = invoice_with(vec![LineItem::new("A", 1000)]);
        invoice.status = InvoiceStatus::Viewed;

        let long_after = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(InvoiceLifecycle::refresh_overdue(&mut invoice, 0, long_after, &tz)
            .unwrap()
            .is_none());
        assert_eq!(invoice.status, InvoiceStatus::Viewed);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn arb_discount() -> impl Strategy<Value = Option<Discount>> {
    prop_oneof![
        Just(None),
        (0i64..=10_000).prop_map(|cents| Some(Discount::fixed(cents))),
        (0u32..=10_000).prop_map(|bp| Some(Discount::percent(Decimal::new(bp as i64, 2)))),
    ]
}

fn arb_line() -> impl Strategy<Value = LineItem> {
    (
        0i64..=1_000_000,
        0u32..=10_000,
        proptest::option::of(0u32..=3_000),
        arb_discount(),
    )
        .prop_map(|(price, qty, tax, discount)| {
            let mut line = LineItem::new("Item", price).with_quantity(Decimal::new(qty as i64, 2));
            if let Some(tax) = tax {
                line = line.with_tax_percent(Decimal::new(tax as i64, 2));
            }
            if let Some(discount) = discount {
                line = line.with_discount(discount);
            }
            line
        })
}

proptest! {
    #[test]
    fn prop_totals_are_never_negative(
        lines in proptest::collection::vec(arb_line(), 0..8),
        discount in arb_discount(),
    ) {
        let totals = InvoiceCalculator::compute_totals(&lines, discount.as_ref(), Some(dec!(7)));
        prop_assert!(totals.total_cents >= 0);
        prop_assert!(totals.invoice_discount_cents <= totals.subtotal_cents + totals.tax_cents);
        for line in &totals.lines {
            prop_assert!(line.discount_cents >= 0 && line.discount_cents <= line.net_cents);
            prop_assert!(line.subtotal_cents >= 0);
            prop_assert!(line.tax_cents >= 0);
        }
    }

    #[test]
    fn prop_amount_due_is_non_increasing(
        lines in proptest::collection::vec(arb_line(), 1..5),
        amounts in proptest::collection::vec((0i64..=50_000, any::<bool>()), 0..10),
    ) {
        let invoice = invoice_with(lines);
        let mut payments = Vec::new();
        let mut credits = Vec::new();
        let mut previous = BalanceReconciler::amount_due(&invoice, &payments, &credits).due_cents;

        for (amount, as_credit) in amounts {
            if as_credit {
                credits.push(CreditNote::new(invoice.id, amount, "credit"));
            } else {
                payments.push(Payment::succeeded(invoice.id, amount));
            }
            let due = BalanceReconciler::amount_due(&invoice, &payments, &credits).due_cents;
            prop_assert!(due <= previous);
            prop_assert!(due >= 0);
            previous = due;
        }
    }
}
