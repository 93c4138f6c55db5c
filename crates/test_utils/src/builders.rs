//! Test Data Builders
//!
//! Provides builder patterns for constructing billing test data with
//! sensible defaults. Tests specify only the fields they care about.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use core_kernel::{
    Cents, Currency, CustomerId, InvoiceId, LateFeePolicyId, OrganizationId, ReminderPolicyId,
    ReminderRuleId,
};
use domain_billing::{
    format_invoice_number, Discount, Invoice, InvoiceStatus, LateFeeCharge, LateFeePolicy,
    LineItem, ReminderPolicy, ReminderRule, ReminderTemplate,
};

use crate::fixtures::TemporalFixtures;

/// Builder for invoices
///
/// Defaults to a `SENT` USD invoice of one 50.00 line, issued on
/// [`TemporalFixtures::issue_date`] and due on [`TemporalFixtures::due_date`].
pub struct TestInvoiceBuilder {
    id: InvoiceId,
    organization_id: OrganizationId,
    customer_id: CustomerId,
    sequence: i64,
    status: InvoiceStatus,
    currency: Currency,
    issue_date: NaiveDate,
    due_date: Option<NaiveDate>,
    discount: Option<Discount>,
    tax_percent: Option<Decimal>,
    line_items: Vec<LineItem>,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TestInvoiceBuilder {
    pub fn new(organization_id: OrganizationId, customer_id: CustomerId) -> Self {
        Self {
            id: InvoiceId::new(),
            organization_id,
            customer_id,
            sequence: 1,
            status: InvoiceStatus::Sent,
            currency: Currency::USD,
            issue_date: TemporalFixtures::issue_date(),
            due_date: Some(TemporalFixtures::due_date()),
            discount: None,
            tax_percent: None,
            line_items: vec![LineItem::new("Consulting", 5000)],
            sent_at: Some(TemporalFixtures::issued_at()),
            created_at: TemporalFixtures::issued_at(),
        }
    }

    pub fn with_id(mut self, id: InvoiceId) -> Self {
        self.id = id;
        self
    }

    pub fn with_sequence(mut self, sequence: i64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_status(mut self, status: InvoiceStatus) -> Self {
        self.status = status;
        self
    }

    /// Starts as a draft that has never been sent
    pub fn draft(mut self) -> Self {
        self.status = InvoiceStatus::Draft;
        self.sent_at = None;
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_issue_date(mut self, date: NaiveDate) -> Self {
        self.issue_date = date;
        self
    }

    pub fn with_due_date(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn without_due_date(mut self) -> Self {
        self.due_date = None;
        self
    }

    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn with_tax_percent(mut self, percent: Decimal) -> Self {
        self.tax_percent = Some(percent);
        self
    }

    /// Replaces the lines with a single untaxed line of `cents`
    pub fn with_total(mut self, cents: Cents) -> Self {
        self.line_items = vec![LineItem::new("Consulting", cents)];
        self
    }

    /// Replaces all lines; positions are assigned in order
    pub fn with_line_items(mut self, lines: Vec<LineItem>) -> Self {
        self.line_items = lines;
        self
    }

    pub fn with_line_item(mut self, line: LineItem) -> Self {
        self.line_items.push(line);
        self
    }

    pub fn build(self) -> Invoice {
        let line_items = self
            .line_items
            .into_iter()
            .enumerate()
            .map(|(position, line)| line.with_position(position as i32))
            .collect();

        Invoice {
            id: self.id,
            organization_id: self.organization_id,
            customer_id: self.customer_id,
            number: format_invoice_number(self.sequence),
            public_token: self.id.as_uuid().simple().to_string(),
            status: self.status,
            currency: self.currency,
            issue_date: self.issue_date,
            due_date: self.due_date,
            payment_terms_days: self
                .due_date
                .map(|due| (due - self.issue_date).num_days().max(0) as u32)
                .unwrap_or(0),
            discount: self.discount,
            tax_label: self.tax_percent.map(|_| "VAT".to_string()),
            tax_percent: self.tax_percent,
            notes: None,
            line_items,
            sent_at: self.sent_at,
            viewed_at: None,
            paid_at: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Builder for reminder policies
///
/// With no rules added, builds an enabled policy with the default cadence:
/// friendly 3 days before due, firm on the due date, firm 7 days after.
pub struct TestReminderPolicyBuilder {
    id: ReminderPolicyId,
    organization_id: OrganizationId,
    name: String,
    enabled: bool,
    rules: Vec<(i32, ReminderTemplate, bool)>,
}

impl TestReminderPolicyBuilder {
    pub fn new(organization_id: OrganizationId) -> Self {
        Self {
            id: ReminderPolicyId::new(),
            organization_id,
            name: "Default cadence".to_string(),
            enabled: true,
            rules: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Adds an enabled rule firing `days_offset` days from the due date
    pub fn with_rule(mut self, days_offset: i32, template: ReminderTemplate) -> Self {
        self.rules.push((days_offset, template, true));
        self
    }

    pub fn with_disabled_rule(mut self, days_offset: i32, template: ReminderTemplate) -> Self {
        self.rules.push((days_offset, template, false));
        self
    }

    pub fn build(self) -> ReminderPolicy {
        let rules = if self.rules.is_empty() {
            vec![
                (-3, ReminderTemplate::Friendly, true),
                (0, ReminderTemplate::Firm, true),
                (7, ReminderTemplate::Firm, true),
            ]
        } else {
            self.rules
        };

        ReminderPolicy {
            id: self.id,
            organization_id: self.organization_id,
            name: self.name,
            enabled: self.enabled,
            rules: rules
                .into_iter()
                .enumerate()
                .map(|(position, (days_offset, template, enabled))| ReminderRule {
                    id: ReminderRuleId::new(),
                    policy_id: self.id,
                    days_offset,
                    template,
                    enabled,
                    position: position as i32,
                })
                .collect(),
        }
    }
}

/// Builder for late-fee policies
///
/// Defaults to an enabled FLAT 5.00 fee charged 5 days after due.
pub struct TestLateFeePolicyBuilder {
    id: LateFeePolicyId,
    organization_id: OrganizationId,
    charge: LateFeeCharge,
    days_after_due: i32,
    enabled: bool,
}

impl TestLateFeePolicyBuilder {
    pub fn new(organization_id: OrganizationId) -> Self {
        Self {
            id: LateFeePolicyId::new(),
            organization_id,
            charge: LateFeeCharge::Flat { amount_cents: 500 },
            days_after_due: 5,
            enabled: true,
        }
    }

    pub fn flat(mut self, amount_cents: Cents) -> Self {
        self.charge = LateFeeCharge::Flat { amount_cents };
        self
    }

    pub fn percent(mut self, percent: Decimal) -> Self {
        self.charge = LateFeeCharge::Percent { percent };
        self
    }

    pub fn with_days_after_due(mut self, days: i32) -> Self {
        self.days_after_due = days;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn build(self) -> LateFeePolicy {
        LateFeePolicy {
            id: self.id,
            organization_id: self.organization_id,
            charge: self.charge,
            days_after_due: self.days_after_due,
            enabled: self.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_invoice_builder_defaults() {
        let invoice = TestInvoiceBuilder::new(OrganizationId::new(), CustomerId::new()).build();

        assert_eq!(invoice.status, InvoiceStatus::Sent);
        assert_eq!(invoice.number, "INV-000001");
        assert_eq!(invoice.payment_terms_days, 30);
        assert_eq!(invoice.public_token.len(), 32);
        assert_eq!(invoice.line_items.len(), 1);
    }

    #[test]
    fn test_invoice_builder_assigns_positions() {
        let invoice = TestInvoiceBuilder::new(OrganizationId::new(), CustomerId::new())
            .with_line_items(vec![LineItem::new("A", 100), LineItem::new("B", 200)])
            .build();

        let positions: Vec<i32> = invoice.line_items.iter().map(|l| l.position).collect();
        assert_eq!(positions, vec![0, 1]);
        assert_eq!(invoice.next_line_position(), 2);
    }

    #[test]
    fn test_reminder_policy_default_cadence() {
        let policy = TestReminderPolicyBuilder::new(OrganizationId::new()).build();

        let offsets: Vec<i32> = policy.rules.iter().map(|r| r.days_offset).collect();
        assert_eq!(offsets, vec![-3, 0, 7]);
        assert!(policy.rules.iter().all(|r| r.policy_id == policy.id));
    }

    #[test]
    fn test_late_fee_policy_builder() {
        let policy = TestLateFeePolicyBuilder::new(OrganizationId::new())
            .percent(dec!(1.5))
            .with_days_after_due(10)
            .build();

        assert_eq!(policy.charge.type_str(), "PERCENT");
        assert_eq!(policy.fee_for(10_000), 150);
        assert_eq!(policy.days_after_due, 10);
    }
}
