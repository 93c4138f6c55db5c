//! PostgreSQL Billing Store Adapter
//!
//! Implements the `BillingStore` port over the invoice and automation
//! repositories. The adapter:
//!
//! - Scopes every lookup to the caller's organization
//! - Decodes row types into domain types, reporting undecodable values as
//!   internal errors
//! - Translates database errors into `PortError`
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresBillingStore;
//! use domain_automation::BillingStore;
//! use std::sync::Arc;
//!
//! let store: Arc<dyn BillingStore> = Arc::new(PostgresBillingStore::new(pool));
//! let aggregate = store.load_invoice(organization_id, invoice_id).await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{debug, instrument};

use core_kernel::{
    AdapterHealth, Currency, CustomerId, DomainPort, HealthCheckResult, HealthCheckable,
    InvoiceId, LateFeePolicyId, OrganizationId, PortError, ReminderRuleId, Timezone,
};
use domain_automation::{
    BillingStore, InvoiceAggregate, LateFeeWrite, LateFeeWriteResult, NewInvoice, SettlementWrite,
};
use domain_billing::{
    BalanceReconciler, CreditNote, Customer, Discount, Invoice, InvoiceEvent, InvoiceLifecycle,
    InvoiceStatus, LateFeeApplication, LateFeeCharge, LateFeePolicy, LineItem, Organization,
    Payment, ReminderDelivery, ReminderJobLog, ReminderPolicy, ReminderRule,
};

use crate::error::DatabaseError;
use crate::repositories::automation::{
    LateFeeApplicationRow, LateFeePolicyRow, ReminderLogRow, ReminderPolicyRow, ReminderRuleRow,
};
use crate::repositories::invoice::{
    fetch_credit_notes, fetch_line_items, fetch_payments, lock_invoice, write_lifecycle,
    CreditNoteRow, CustomerRow, InvoiceRow, LineItemRow, OrganizationRow, PaymentRow,
};
use crate::repositories::{AutomationRepository, InvoiceRepository, LateFeeInsert};

/// PostgreSQL-backed implementation of the `BillingStore` port
///
/// # Error Handling
///
/// - Missing or foreign-organization rows -> `PortError::NotFound`
/// - Constraint violations -> `PortError::Conflict`
/// - Connection failures -> `PortError::Connection` (transient)
/// - Everything else -> `PortError::Internal`
#[derive(Debug, Clone)]
pub struct PostgresBillingStore {
    invoices: InvoiceRepository,
    automation: AutomationRepository,
    pool: PgPool,
}

impl PostgresBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            invoices: InvoiceRepository::new(pool.clone()),
            automation: AutomationRepository::new(pool.clone()),
            pool,
        }
    }

    /// Inserts a reminder policy with its rules
    pub async fn create_reminder_policy(&self, policy: &ReminderPolicy) -> Result<(), PortError> {
        self.automation
            .insert_reminder_policy(policy)
            .await
            .map_err(PortError::from)
    }

    /// Inserts a late-fee policy
    ///
    /// Fails with `PortError::Conflict` when enabling a second policy for
    /// the same organization.
    pub async fn create_late_fee_policy(&self, policy: &LateFeePolicy) -> Result<(), PortError> {
        self.automation
            .insert_late_fee_policy(policy)
            .await
            .map_err(PortError::from)
    }

    /// Reminder log rows of an invoice, oldest first
    pub async fn reminder_logs(&self, invoice_id: InvoiceId) -> Result<Vec<ReminderJobLog>, PortError> {
        self.automation
            .reminder_logs(*invoice_id.as_uuid())
            .await?
            .into_iter()
            .map(row_to_reminder_log)
            .collect()
    }

    async fn aggregate(&self, row: InvoiceRow) -> Result<InvoiceAggregate, PortError> {
        let organization = self
            .invoices
            .get_organization(row.organization_id)
            .await?
            .ok_or_else(|| PortError::not_found("Organization", row.organization_id))?;
        let customer = self
            .invoices
            .get_customer(row.organization_id, row.customer_id)
            .await?
            .ok_or_else(|| PortError::not_found("Customer", row.customer_id))?;
        let lines = self.invoices.line_items(row.id).await?;
        let payments = self.invoices.payments(row.id).await?;
        let credit_notes = self.invoices.credit_notes(row.id).await?;

        Ok(InvoiceAggregate {
            organization: row_to_organization(organization)?,
            customer: row_to_customer(customer),
            invoice: row_to_invoice(row, lines)?,
            payments: payments
                .into_iter()
                .map(row_to_payment)
                .collect::<Result<_, _>>()?,
            credit_notes: credit_notes.into_iter().map(row_to_credit_note).collect(),
        })
    }
}

impl DomainPort for PostgresBillingStore {}

#[async_trait]
impl HealthCheckable for PostgresBillingStore {
    async fn health_check(&self) -> HealthCheckResult {
        ping(&self.pool, "postgres-billing-store").await
    }
}

#[async_trait]
impl BillingStore for PostgresBillingStore {
    #[instrument(skip_all, fields(organization_id = %organization_id, invoice_id = %invoice_id))]
    async fn load_invoice(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceAggregate, PortError> {
        debug!("Loading invoice");
        let row = self
            .invoices
            .get_invoice(*organization_id.as_uuid(), *invoice_id.as_uuid())
            .await?
            .ok_or_else(|| PortError::not_found("Invoice", invoice_id))?;
        self.aggregate(row).await
    }

    async fn find_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<Organization>, PortError> {
        self.invoices
            .get_organization(*organization_id.as_uuid())
            .await?
            .map(row_to_organization)
            .transpose()
    }

    async fn find_customer(
        &self,
        organization_id: OrganizationId,
        customer_id: CustomerId,
    ) -> Result<Option<Customer>, PortError> {
        Ok(self
            .invoices
            .get_customer(*organization_id.as_uuid(), *customer_id.as_uuid())
            .await?
            .map(row_to_customer))
    }

    #[instrument(skip_all)]
    async fn load_invoice_by_token(&self, token: &str) -> Result<InvoiceAggregate, PortError> {
        let row = self
            .invoices
            .get_invoice_by_token(token)
            .await?
            .ok_or_else(|| PortError::not_found("Invoice", "token"))?;
        self.aggregate(row).await
    }

    #[instrument(skip(self, invoice), fields(organization_id = %invoice.organization_id, invoice_id = %invoice.id))]
    async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice, PortError> {
        let number = self.invoices.create_invoice(&invoice).await?;
        debug!(number = %number, "Invoice inserted");

        Ok(Invoice {
            id: invoice.id,
            organization_id: invoice.organization_id,
            customer_id: invoice.customer_id,
            number,
            public_token: invoice.public_token,
            status: InvoiceStatus::Draft,
            currency: invoice.currency,
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            payment_terms_days: invoice.payment_terms_days,
            discount: invoice.discount,
            tax_label: invoice.tax_label,
            tax_percent: invoice.tax_percent,
            notes: invoice.notes,
            line_items: invoice.line_items,
            sent_at: None,
            viewed_at: None,
            paid_at: None,
            created_at: invoice.created_at,
            updated_at: invoice.created_at,
        })
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id, status = %invoice.status.as_str()))]
    async fn save_lifecycle(
        &self,
        invoice: &Invoice,
        expected: InvoiceStatus,
    ) -> Result<bool, PortError> {
        let written = self.invoices.update_lifecycle(invoice, expected).await?;
        if !written {
            debug!(expected = %expected.as_str(), "Invoice status changed underneath; write skipped");
        }
        Ok(written)
    }

    /// Holds the invoice row lock while the balance is recomputed, so a
    /// concurrent late fee or refund either lands first and is counted, or
    /// waits for this transaction.
    #[instrument(skip(self), fields(organization_id = %organization_id, invoice_id = %invoice_id))]
    async fn settle_invoice(
        &self,
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        at: DateTime<Utc>,
    ) -> Result<SettlementWrite, PortError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;

        let row = lock_invoice(&mut *tx, *organization_id.as_uuid(), *invoice_id.as_uuid())
            .await?
            .ok_or_else(|| PortError::not_found("Invoice", invoice_id))?;
        let lines = fetch_line_items(&mut *tx, row.id).await?;
        let payments = fetch_payments(&mut *tx, row.id)
            .await?
            .into_iter()
            .map(row_to_payment)
            .collect::<Result<Vec<_>, _>>()?;
        let credit_notes: Vec<CreditNote> = fetch_credit_notes(&mut *tx, row.id)
            .await?
            .into_iter()
            .map(row_to_credit_note)
            .collect();
        let mut invoice = row_to_invoice(row, lines)?;

        let due_cents = BalanceReconciler::amount_due(&invoice, &payments, &credit_notes).due_cents;
        if due_cents > 0 {
            return Ok(SettlementWrite::Outstanding { due_cents });
        }

        let expected = invoice.status;
        let Ok(transition) = InvoiceLifecycle::apply(&mut invoice, InvoiceEvent::SettledInFull, at)
        else {
            return Ok(SettlementWrite::Void);
        };
        if !transition.changed() {
            return Ok(SettlementWrite::AlreadyPaid(invoice));
        }

        write_lifecycle(&mut *tx, &invoice, expected).await?;
        tx.commit().await.map_err(DatabaseError::from)?;
        debug!(from = %expected.as_str(), "Invoice settled");
        Ok(SettlementWrite::Settled(invoice))
    }

    async fn append_payment(&self, payment: &Payment) -> Result<(), PortError> {
        self.invoices.insert_payment(payment).await.map_err(PortError::from)
    }

    async fn append_credit_note(&self, credit_note: &CreditNote) -> Result<(), PortError> {
        self.invoices
            .insert_credit_note(credit_note)
            .await
            .map_err(PortError::from)
    }

    async fn reminder_policies(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ReminderPolicy>, PortError> {
        let policies = self
            .automation
            .reminder_policies(*organization_id.as_uuid())
            .await?;
        let rules = self
            .automation
            .reminder_rules(*organization_id.as_uuid())
            .await?;

        let mut rules_by_policy: HashMap<uuid::Uuid, Vec<ReminderRule>> = HashMap::new();
        for row in rules {
            let policy_id = row.policy_id;
            rules_by_policy
                .entry(policy_id)
                .or_default()
                .push(row_to_rule(row)?);
        }

        Ok(policies
            .into_iter()
            .map(|row| {
                let rules = rules_by_policy.remove(&row.id).unwrap_or_default();
                row_to_policy(row, rules)
            })
            .collect())
    }

    async fn find_reminder_rule(
        &self,
        organization_id: OrganizationId,
        rule_id: ReminderRuleId,
    ) -> Result<Option<ReminderRule>, PortError> {
        self.automation
            .get_reminder_rule(*organization_id.as_uuid(), *rule_id.as_uuid())
            .await?
            .map(row_to_rule)
            .transpose()
    }

    async fn enabled_late_fee_policy(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<LateFeePolicy>, PortError> {
        self.automation
            .enabled_late_fee_policy(*organization_id.as_uuid())
            .await?
            .map(row_to_late_fee_policy)
            .transpose()
    }

    async fn find_late_fee_policy(
        &self,
        organization_id: OrganizationId,
        policy_id: LateFeePolicyId,
    ) -> Result<Option<LateFeePolicy>, PortError> {
        self.automation
            .get_late_fee_policy(*organization_id.as_uuid(), *policy_id.as_uuid())
            .await?
            .map(row_to_late_fee_policy)
            .transpose()
    }

    async fn find_late_fee_application(
        &self,
        invoice_id: InvoiceId,
        policy_id: LateFeePolicyId,
    ) -> Result<Option<LateFeeApplication>, PortError> {
        Ok(self
            .automation
            .get_late_fee_application(*invoice_id.as_uuid(), *policy_id.as_uuid())
            .await?
            .map(row_to_application))
    }

    #[instrument(skip(self, write), fields(invoice_id = %write.invoice_id, policy_id = %write.policy_id, fee_cents = write.fee_cents))]
    async fn apply_late_fee(&self, write: LateFeeWrite) -> Result<LateFeeWriteResult, PortError> {
        let result = match self.automation.apply_late_fee(&write).await {
            Ok(result) => result,
            Err(e) if e.is_not_found() => {
                return Err(PortError::not_found("Invoice", write.invoice_id))
            }
            Err(e) => return Err(e.into()),
        };

        debug!(?result, "Late fee write finished");
        Ok(match result {
            LateFeeInsert::Applied(row) => LateFeeWriteResult::Applied(row_to_application(row)),
            LateFeeInsert::AlreadyApplied => LateFeeWriteResult::AlreadyApplied,
            LateFeeInsert::InvoiceClosed => LateFeeWriteResult::InvoiceClosed,
        })
    }

    #[instrument(skip(self, delivery), fields(invoice_id = %delivery.invoice_id, rule_id = %delivery.rule_id, due_date = %delivery.due_date))]
    async fn claim_reminder_delivery(&self, delivery: &ReminderDelivery) -> Result<bool, PortError> {
        self.automation
            .claim_delivery(delivery)
            .await
            .map_err(PortError::from)
    }

    async fn release_reminder_delivery(
        &self,
        invoice_id: InvoiceId,
        rule_id: ReminderRuleId,
        due_date: NaiveDate,
    ) -> Result<(), PortError> {
        self.automation
            .release_delivery(*invoice_id.as_uuid(), *rule_id.as_uuid(), due_date)
            .await
            .map_err(PortError::from)
    }

    async fn append_reminder_log(&self, log: &ReminderJobLog) -> Result<(), PortError> {
        self.automation
            .insert_reminder_log(log)
            .await
            .map_err(PortError::from)
    }
}

/// Runs `SELECT 1` and reports latency
pub(crate) async fn ping(pool: &PgPool, adapter_id: &str) -> HealthCheckResult {
    let start = std::time::Instant::now();

    let result = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await;

    let latency_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(_) => HealthCheckResult::new(adapter_id, AdapterHealth::Healthy, latency_ms, None),
        Err(e) => HealthCheckResult::new(
            adapter_id,
            AdapterHealth::Unhealthy,
            latency_ms,
            Some(format!("Database error: {}", e)),
        ),
    }
}

// ============================================================================
// Row decoding
// ============================================================================

fn decode<T, E: std::fmt::Display>(column: &str, result: Result<T, E>) -> Result<T, PortError> {
    result.map_err(|e| DatabaseError::decode(column, e).into())
}

fn decode_discount(
    column: &str,
    discount_type: Option<String>,
    value: Option<rust_decimal::Decimal>,
) -> Result<Option<Discount>, PortError> {
    match (discount_type, value) {
        (Some(discount_type), Some(value)) => Ok(Some(Discount {
            discount_type: decode(column, discount_type.parse())?,
            value,
        })),
        _ => Ok(None),
    }
}

fn row_to_organization(row: OrganizationRow) -> Result<Organization, PortError> {
    Ok(Organization {
        id: OrganizationId::from(row.id),
        name: row.name,
        timezone: decode("organizations.timezone", Timezone::parse(&row.timezone))?,
        billing_email: row.billing_email,
    })
}

fn row_to_customer(row: CustomerRow) -> Customer {
    Customer {
        id: CustomerId::from(row.id),
        organization_id: OrganizationId::from(row.organization_id),
        name: row.name,
        email: row.email,
    }
}

fn row_to_line_item(row: LineItemRow) -> Result<LineItem, PortError> {
    Ok(LineItem {
        id: row.id.into(),
        description: row.description,
        quantity: row.quantity,
        unit_price_cents: row.unit_price_cents,
        tax_percent: row.tax_percent,
        discount: decode_discount(
            "invoice_line_items.discount_type",
            row.discount_type,
            row.discount_value,
        )?,
        kind: decode("invoice_line_items.kind", row.kind.parse())?,
        position: row.position,
    })
}

fn row_to_invoice(row: InvoiceRow, lines: Vec<LineItemRow>) -> Result<Invoice, PortError> {
    Ok(Invoice {
        id: InvoiceId::from(row.id),
        organization_id: OrganizationId::from(row.organization_id),
        customer_id: CustomerId::from(row.customer_id),
        number: row.number,
        public_token: row.public_token,
        status: decode("invoices.status", row.status.parse())?,
        currency: decode("invoices.currency", row.currency.parse::<Currency>())?,
        issue_date: row.issue_date,
        due_date: row.due_date,
        payment_terms_days: row.payment_terms_days.max(0) as u32,
        discount: decode_discount("invoices.discount_type", row.discount_type, row.discount_value)?,
        tax_label: row.tax_label,
        tax_percent: row.tax_percent,
        notes: row.notes,
        line_items: lines
            .into_iter()
            .map(row_to_line_item)
            .collect::<Result<_, _>>()?,
        sent_at: row.sent_at,
        viewed_at: row.viewed_at,
        paid_at: row.paid_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn row_to_payment(row: PaymentRow) -> Result<Payment, PortError> {
    Ok(Payment {
        id: row.id.into(),
        invoice_id: InvoiceId::from(row.invoice_id),
        status: decode("payments.status", row.status.parse())?,
        amount_cents: row.amount_cents,
        provider: row.provider,
        provider_reference: row.provider_reference,
        created_at: row.created_at,
    })
}

fn row_to_credit_note(row: CreditNoteRow) -> CreditNote {
    CreditNote {
        id: row.id.into(),
        invoice_id: InvoiceId::from(row.invoice_id),
        amount_cents: row.amount_cents,
        reason: row.reason,
        created_at: row.created_at,
    }
}

fn row_to_rule(row: ReminderRuleRow) -> Result<ReminderRule, PortError> {
    Ok(ReminderRule {
        id: ReminderRuleId::from(row.id),
        policy_id: row.policy_id.into(),
        days_offset: row.days_offset,
        template: decode("reminder_rules.template", row.template.parse())?,
        enabled: row.enabled,
        position: row.position,
    })
}

fn row_to_policy(row: ReminderPolicyRow, rules: Vec<ReminderRule>) -> ReminderPolicy {
    ReminderPolicy {
        id: row.id.into(),
        organization_id: OrganizationId::from(row.organization_id),
        name: row.name,
        enabled: row.enabled,
        rules,
    }
}

fn row_to_late_fee_policy(row: LateFeePolicyRow) -> Result<LateFeePolicy, PortError> {
    let charge = match (row.fee_type.as_str(), row.amount_cents, row.percent) {
        ("FLAT", Some(amount_cents), _) => LateFeeCharge::Flat { amount_cents },
        ("PERCENT", _, Some(percent)) => LateFeeCharge::Percent { percent },
        (other, _, _) => {
            return Err(DatabaseError::decode(
                "late_fee_policies.fee_type",
                format!("'{}' without its amount", other),
            )
            .into())
        }
    };

    Ok(LateFeePolicy {
        id: LateFeePolicyId::from(row.id),
        organization_id: OrganizationId::from(row.organization_id),
        charge,
        days_after_due: row.days_after_due,
        enabled: row.enabled,
    })
}

fn row_to_application(row: LateFeeApplicationRow) -> LateFeeApplication {
    LateFeeApplication {
        id: row.id.into(),
        invoice_id: InvoiceId::from(row.invoice_id),
        policy_id: LateFeePolicyId::from(row.policy_id),
        fee_cents: row.fee_cents,
        line_item_id: row.line_item_id.into(),
        applied_at: row.applied_at,
    }
}

fn row_to_reminder_log(row: ReminderLogRow) -> Result<ReminderJobLog, PortError> {
    Ok(ReminderJobLog {
        id: row.id.into(),
        organization_id: OrganizationId::from(row.organization_id),
        invoice_id: InvoiceId::from(row.invoice_id),
        rule_id: ReminderRuleId::from(row.rule_id),
        status: decode("reminder_job_logs.status", row.status.parse())?,
        reason: row.reason,
        created_at: row.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn policy_row(fee_type: &str, amount_cents: Option<i64>, percent: Option<rust_decimal::Decimal>) -> LateFeePolicyRow {
        LateFeePolicyRow {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            fee_type: fee_type.to_string(),
            amount_cents,
            percent,
            days_after_due: 5,
            enabled: true,
        }
    }

    #[test]
    fn test_decodes_flat_and_percent_policies() {
        let flat = row_to_late_fee_policy(policy_row("FLAT", Some(500), None)).unwrap();
        assert_eq!(flat.charge, LateFeeCharge::Flat { amount_cents: 500 });

        let percent = row_to_late_fee_policy(policy_row("PERCENT", None, Some(dec!(1.5)))).unwrap();
        assert_eq!(percent.charge, LateFeeCharge::Percent { percent: dec!(1.5) });
    }

    #[test]
    fn test_policy_without_amount_is_internal_error() {
        let result = row_to_late_fee_policy(policy_row("FLAT", None, Some(dec!(2))));
        assert!(matches!(result, Err(PortError::Internal { .. })));
    }

    #[test]
    fn test_discount_needs_type_and_value() {
        assert_eq!(decode_discount("d", None, Some(dec!(10))).unwrap(), None);
        assert_eq!(
            decode_discount("d", Some("PERCENT".into()), Some(dec!(10))).unwrap(),
            Some(Discount::percent(dec!(10)))
        );
        assert!(decode_discount("d", Some("BOGO".into()), Some(dec!(10))).is_err());
    }

    #[test]
    fn test_unknown_timezone_fails_to_decode() {
        let row = OrganizationRow {
            id: Uuid::new_v4(),
            name: "Acme".into(),
            timezone: "Mars/Olympus_Mons".into(),
            billing_email: None,
        };
        assert!(row_to_organization(row).is_err());
    }
}
