//! Invoice DTOs

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use core_kernel::{format_cents, Cents, Currency, CustomerId, InvoiceId};
use domain_automation::{InvoiceAggregate, PaymentOutcome, ScheduleReport, SendOutcome};
use domain_billing::{
    AmountDue, BalanceReconciler, CreditNote, Invoice, InvoiceStatus, InvoiceTotals, LineItem,
    Payment,
};

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub id: InvoiceId,
    pub number: String,
    pub status: InvoiceStatus,
    pub customer_id: CustomerId,
    pub currency: Currency,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub public_token: String,
    pub notes: Option<String>,
    pub line_items: Vec<LineItem>,
    pub totals: InvoiceTotals,
    pub paid_cents: Cents,
    pub credits_cents: Cents,
    pub due_cents: Cents,
    pub sent_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl InvoiceResponse {
    pub fn new(invoice: Invoice, due: AmountDue) -> Self {
        Self {
            id: invoice.id,
            number: invoice.number,
            status: invoice.status,
            customer_id: invoice.customer_id,
            currency: invoice.currency,
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            public_token: invoice.public_token,
            notes: invoice.notes,
            line_items: invoice.line_items,
            totals: due.totals,
            paid_cents: due.paid_cents,
            credits_cents: due.credits_cents,
            due_cents: due.due_cents,
            sent_at: invoice.sent_at,
            viewed_at: invoice.viewed_at,
            paid_at: invoice.paid_at,
            created_at: invoice.created_at,
        }
    }
}

impl From<InvoiceAggregate> for InvoiceResponse {
    fn from(aggregate: InvoiceAggregate) -> Self {
        let due = aggregate.amount_due();
        Self::new(aggregate.invoice, due)
    }
}

/// A freshly created or voided invoice, reconciled without its payments
impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        let due = BalanceReconciler::amount_due(&invoice, &[], &[]);
        Self::new(invoice, due)
    }
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub invoice_id: InvoiceId,
    pub status: InvoiceStatus,
    pub resent: bool,
    pub emailed: bool,
    pub schedule: ScheduleReport,
}

impl From<SendOutcome> for SendResponse {
    fn from(outcome: SendOutcome) -> Self {
        Self {
            invoice_id: outcome.invoice.id,
            status: outcome.invoice.status,
            resent: !outcome.transition.changed(),
            emailed: outcome.emailed,
            schedule: outcome.schedule,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub payment: Payment,
    pub settlement: PaymentOutcome,
}

#[derive(Debug, Serialize)]
pub struct CreditNoteResponse {
    pub credit_note: CreditNote,
    pub settlement: PaymentOutcome,
}

/// What the buyer sees behind the hosted link
#[derive(Debug, Serialize)]
pub struct PublicInvoiceResponse {
    pub organization_name: String,
    pub customer_name: String,
    pub number: String,
    pub status: InvoiceStatus,
    pub currency: Currency,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub line_items: Vec<PublicLineItem>,
    pub total_cents: Cents,
    pub due_cents: Cents,
    pub amount_due: String,
}

#[derive(Debug, Serialize)]
pub struct PublicLineItem {
    pub description: String,
    pub quantity: String,
    pub total_cents: Cents,
}

impl From<InvoiceAggregate> for PublicInvoiceResponse {
    fn from(aggregate: InvoiceAggregate) -> Self {
        let due = aggregate.amount_due();
        let invoice = aggregate.invoice;
        let line_items = invoice
            .line_items
            .iter()
            .zip(due.totals.lines.iter())
            .map(|(line, totals)| PublicLineItem {
                description: line.description.clone(),
                quantity: line.quantity.normalize().to_string(),
                total_cents: totals.total_cents,
            })
            .collect();

        Self {
            organization_name: aggregate.organization.name,
            customer_name: aggregate.customer.name,
            number: invoice.number,
            status: invoice.status,
            currency: invoice.currency,
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            line_items,
            total_cents: due.totals.total_cents,
            due_cents: due.due_cents,
            amount_due: format_cents(due.due_cents, invoice.currency),
        }
    }
}
