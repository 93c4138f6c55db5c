//! Pre-send compliance checks
//!
//! The built-in gate covers what every invoice needs before it reaches a
//! buyer. Jurisdiction-specific rules plug in behind the same port.

use async_trait::async_trait;

use core_kernel::{DomainPort, PortError};
use domain_automation::{ComplianceGate, ComplianceIssue, ComplianceReport, InvoiceAggregate};
use domain_billing::InvoiceCalculator;

#[derive(Debug, Default, Clone, Copy)]
pub struct InvoiceComplianceGate;

impl InvoiceComplianceGate {
    pub fn issues(aggregate: &InvoiceAggregate) -> Vec<ComplianceIssue> {
        let invoice = &aggregate.invoice;
        let mut issues = Vec::new();
        let mut issue = |field: &str, message: &str| {
            issues.push(ComplianceIssue {
                field: field.to_string(),
                message: message.to_string(),
            })
        };

        if invoice.line_items.is_empty() {
            issue("line_items", "at least one line item is required");
        }
        for (index, line) in invoice.line_items.iter().enumerate() {
            if line.description.trim().is_empty() {
                issue(
                    &format!("line_items[{}].description", index),
                    "description is required",
                );
            }
        }
        if let Some(due_date) = invoice.due_date {
            if due_date < invoice.issue_date {
                issue("due_date", "due date is before the issue date");
            }
        }
        if InvoiceCalculator::compute_invoice_totals(invoice).total_cents <= 0 {
            issue("total", "invoice total must be positive");
        }
        if aggregate.organization.name.trim().is_empty() {
            issue("organization.name", "seller name is required");
        }

        issues
    }
}

impl DomainPort for InvoiceComplianceGate {}

#[async_trait]
impl ComplianceGate for InvoiceComplianceGate {
    async fn check(&self, aggregate: &InvoiceAggregate) -> Result<ComplianceReport, PortError> {
        Ok(ComplianceReport {
            issues: Self::issues(aggregate),
        })
    }
}
