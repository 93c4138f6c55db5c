//! Plain-text invoice documents
//!
//! Renders the invoice as a text attachment for the buyer email. A PDF
//! renderer can replace it behind the `DocumentService` port.

use async_trait::async_trait;
use std::fmt::Write as _;
use tracing::info;

use core_kernel::{format_cents, DomainPort, PortError};
use domain_automation::{Attachment, DocumentService, InvoiceAggregate};

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextDocumentService;

impl PlainTextDocumentService {
    pub fn render(aggregate: &InvoiceAggregate) -> String {
        let invoice = &aggregate.invoice;
        let due = aggregate.amount_due();
        let money = |cents| format_cents(cents, invoice.currency);

        let mut doc = String::new();
        let _ = writeln!(doc, "{}", aggregate.organization.name);
        let _ = writeln!(doc, "Invoice {}", invoice.number);
        let _ = writeln!(doc, "Billed to: {}", aggregate.customer.name);
        let _ = writeln!(doc, "Issued: {}", invoice.issue_date);
        if let Some(due_date) = invoice.due_date {
            let _ = writeln!(doc, "Due: {}", due_date);
        }
        doc.push('\n');

        for (line, totals) in invoice.line_items.iter().zip(due.totals.lines.iter()) {
            let _ = writeln!(
                doc,
                "{} x{}  {}",
                line.description,
                line.quantity.normalize(),
                money(totals.total_cents)
            );
        }

        doc.push('\n');
        let _ = writeln!(doc, "Subtotal: {}", money(due.totals.subtotal_cents));
        if due.totals.invoice_discount_cents > 0 {
            let _ = writeln!(doc, "Discount: -{}", money(due.totals.invoice_discount_cents));
        }
        if due.totals.tax_cents > 0 {
            let label = invoice.tax_label.as_deref().unwrap_or("Tax");
            let _ = writeln!(doc, "{}: {}", label, money(due.totals.tax_cents));
        }
        let _ = writeln!(doc, "Total: {}", money(due.totals.total_cents));
        let _ = writeln!(doc, "Amount due: {}", money(due.due_cents));
        if let Some(notes) = &invoice.notes {
            let _ = write!(doc, "\n{}\n", notes);
        }
        doc
    }
}

impl DomainPort for PlainTextDocumentService {}

#[async_trait]
impl DocumentService for PlainTextDocumentService {
    async fn generate_invoice_documents(
        &self,
        aggregate: &InvoiceAggregate,
    ) -> Result<Vec<Attachment>, PortError> {
        Ok(vec![Attachment {
            filename: format!("{}.txt", aggregate.invoice.number),
            content_type: "text/plain; charset=utf-8".to_string(),
            content: Self::render(aggregate).into_bytes(),
        }])
    }

    async fn generate_receipt(&self, aggregate: &InvoiceAggregate) -> Result<(), PortError> {
        info!(
            invoice_id = %aggregate.invoice.id,
            number = %aggregate.invoice.number,
            "Receipt generated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_billing::Payment;
    use test_utils::{CustomerFixtures, OrganizationFixtures, TestInvoiceBuilder};

    #[test]
    fn test_render_shows_balance_after_payments() {
        let organization = OrganizationFixtures::acme();
        let customer = CustomerFixtures::with_email(organization.id);
        let invoice = TestInvoiceBuilder::new(organization.id, customer.id).build();
        let payment = Payment::succeeded(invoice.id, 2000);
        let aggregate = InvoiceAggregate {
            organization,
            customer,
            invoice,
            payments: vec![payment],
            credit_notes: Vec::new(),
        };

        let doc = PlainTextDocumentService::render(&aggregate);
        assert!(doc.starts_with("Acme Corp\nInvoice INV-000001"));
        assert!(doc.contains("Total: $50.00"));
        assert!(doc.contains("Amount due: $30.00"));
    }
}
