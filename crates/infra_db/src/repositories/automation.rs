//! Automation repository implementation
//!
//! Reminder and late-fee policies, plus the rows that make automation
//! idempotent: `late_fee_applications` (unique per invoice and policy) and
//! `reminder_deliveries` (unique per invoice, rule and due date).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use domain_automation::LateFeeWrite;
use domain_billing::{
    InvoiceStatus, LateFeeCharge, LateFeePolicy, ReminderDelivery, ReminderJobLog, ReminderPolicy,
};

use crate::error::DatabaseError;
use crate::repositories::invoice::insert_line_item;

/// Result of the late-fee transaction, before domain decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LateFeeInsert {
    Applied(LateFeeApplicationRow),
    AlreadyApplied,
    InvoiceClosed,
}

/// Repository for automation policies and idempotency records
#[derive(Debug, Clone)]
pub struct AutomationRepository {
    pool: PgPool,
}

impl AutomationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn reminder_policies(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<ReminderPolicyRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, ReminderPolicyRow>(
            r#"
            SELECT id, organization_id, name, enabled
            FROM reminder_policies
            WHERE organization_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// All rules of the organization's policies, ordered by position
    pub async fn reminder_rules(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<ReminderRuleRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, ReminderRuleRow>(
            r#"
            SELECT r.id, r.policy_id, r.days_offset, r.template, r.enabled, r.position
            FROM reminder_rules r
            JOIN reminder_policies p ON p.id = r.policy_id
            WHERE p.organization_id = $1
            ORDER BY r.position, r.id
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_reminder_rule(
        &self,
        organization_id: Uuid,
        rule_id: Uuid,
    ) -> Result<Option<ReminderRuleRow>, DatabaseError> {
        let row = sqlx::query_as::<_, ReminderRuleRow>(
            r#"
            SELECT r.id, r.policy_id, r.days_offset, r.template, r.enabled, r.position
            FROM reminder_rules r
            JOIN reminder_policies p ON p.id = r.policy_id
            WHERE r.id = $1 AND p.organization_id = $2
            "#,
        )
        .bind(rule_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn enabled_late_fee_policy(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<LateFeePolicyRow>, DatabaseError> {
        let row = sqlx::query_as::<_, LateFeePolicyRow>(
            r#"
            SELECT id, organization_id, fee_type, amount_cents, percent, days_after_due, enabled
            FROM late_fee_policies
            WHERE organization_id = $1 AND enabled
            "#,
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_late_fee_policy(
        &self,
        organization_id: Uuid,
        policy_id: Uuid,
    ) -> Result<Option<LateFeePolicyRow>, DatabaseError> {
        let row = sqlx::query_as::<_, LateFeePolicyRow>(
            r#"
            SELECT id, organization_id, fee_type, amount_cents, percent, days_after_due, enabled
            FROM late_fee_policies
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(policy_id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_late_fee_application(
        &self,
        invoice_id: Uuid,
        policy_id: Uuid,
    ) -> Result<Option<LateFeeApplicationRow>, DatabaseError> {
        let row = sqlx::query_as::<_, LateFeeApplicationRow>(
            r#"
            SELECT id, invoice_id, policy_id, fee_cents, line_item_id, applied_at
            FROM late_fee_applications
            WHERE invoice_id = $1 AND policy_id = $2
            "#,
        )
        .bind(invoice_id)
        .bind(policy_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Applies a late fee in one transaction
    ///
    /// Locks the invoice row, appends the fee line, inserts the application
    /// and moves the invoice to `OVERDUE`. A conflicting application rolls the
    /// whole transaction back, line included.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the invoice does not exist in the organization
    pub async fn apply_late_fee(&self, write: &LateFeeWrite) -> Result<LateFeeInsert, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM invoices WHERE id = $1 AND organization_id = $2 FOR UPDATE",
        )
        .bind(write.invoice_id.as_uuid())
        .bind(write.organization_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let status = match status {
            Some(status) => status
                .parse::<InvoiceStatus>()
                .map_err(|e| DatabaseError::decode("invoices.status", e))?,
            None => return Err(DatabaseError::not_found("Invoice", write.invoice_id)),
        };
        if status.is_terminal() {
            tx.rollback().await?;
            return Ok(LateFeeInsert::InvoiceClosed);
        }

        insert_line_item(&mut *tx, *write.invoice_id.as_uuid(), &write.line).await?;

        let application = sqlx::query_as::<_, LateFeeApplicationRow>(
            r#"
            INSERT INTO late_fee_applications (
                id, invoice_id, policy_id, fee_cents, line_item_id, applied_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (invoice_id, policy_id) DO NOTHING
            RETURNING id, invoice_id, policy_id, fee_cents, line_item_id, applied_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(write.invoice_id.as_uuid())
        .bind(write.policy_id.as_uuid())
        .bind(write.fee_cents)
        .bind(write.line.id.as_uuid())
        .bind(write.applied_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(application) = application else {
            tx.rollback().await?;
            return Ok(LateFeeInsert::AlreadyApplied);
        };

        sqlx::query("UPDATE invoices SET status = 'OVERDUE', updated_at = $2 WHERE id = $1")
            .bind(write.invoice_id.as_uuid())
            .bind(write.applied_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(LateFeeInsert::Applied(application))
    }

    /// Inserts the delivery claim; `false` if it already existed
    pub async fn claim_delivery(&self, delivery: &ReminderDelivery) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO reminder_deliveries (invoice_id, rule_id, due_date, claimed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (invoice_id, rule_id, due_date) DO NOTHING
            "#,
        )
        .bind(delivery.invoice_id.as_uuid())
        .bind(delivery.rule_id.as_uuid())
        .bind(delivery.due_date)
        .bind(delivery.claimed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn release_delivery(
        &self,
        invoice_id: Uuid,
        rule_id: Uuid,
        due_date: NaiveDate,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "DELETE FROM reminder_deliveries WHERE invoice_id = $1 AND rule_id = $2 AND due_date = $3",
        )
        .bind(invoice_id)
        .bind(rule_id)
        .bind(due_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_reminder_log(&self, log: &ReminderJobLog) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO reminder_job_logs (
                id, organization_id, invoice_id, rule_id, status, reason, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(log.id.as_uuid())
        .bind(log.organization_id.as_uuid())
        .bind(log.invoice_id.as_uuid())
        .bind(log.rule_id.as_uuid())
        .bind(log.status.as_str())
        .bind(&log.reason)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reminder log rows of an invoice, oldest first
    pub async fn reminder_logs(&self, invoice_id: Uuid) -> Result<Vec<ReminderLogRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, ReminderLogRow>(
            r#"
            SELECT id, organization_id, invoice_id, rule_id, status, reason, created_at
            FROM reminder_job_logs
            WHERE invoice_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Inserts a policy with its rules in a single transaction
    pub async fn insert_reminder_policy(&self, policy: &ReminderPolicy) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO reminder_policies (id, organization_id, name, enabled) VALUES ($1, $2, $3, $4)",
        )
        .bind(policy.id.as_uuid())
        .bind(policy.organization_id.as_uuid())
        .bind(&policy.name)
        .bind(policy.enabled)
        .execute(&mut *tx)
        .await?;

        for rule in &policy.rules {
            sqlx::query(
                r#"
                INSERT INTO reminder_rules (id, policy_id, days_offset, template, enabled, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(rule.id.as_uuid())
            .bind(policy.id.as_uuid())
            .bind(rule.days_offset)
            .bind(rule.template.as_str())
            .bind(rule.enabled)
            .bind(rule.position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `UniqueViolation` if the organization already has an enabled
    /// policy and this one is enabled too
    pub async fn insert_late_fee_policy(&self, policy: &LateFeePolicy) -> Result<(), DatabaseError> {
        let (amount_cents, percent) = match policy.charge {
            LateFeeCharge::Flat { amount_cents } => (Some(amount_cents), None),
            LateFeeCharge::Percent { percent } => (None, Some(percent)),
        };

        sqlx::query(
            r#"
            INSERT INTO late_fee_policies (
                id, organization_id, fee_type, amount_cents, percent, days_after_due, enabled
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(policy.id.as_uuid())
        .bind(policy.organization_id.as_uuid())
        .bind(policy.charge.type_str())
        .bind(amount_cents)
        .bind(percent)
        .bind(policy.days_after_due)
        .bind(policy.enabled)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from(&e))?;
        Ok(())
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct ReminderPolicyRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct ReminderRuleRow {
    pub id: Uuid,
    pub policy_id: Uuid,
    pub days_offset: i32,
    pub template: String,
    pub enabled: bool,
    pub position: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct LateFeePolicyRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub fee_type: String,
    pub amount_cents: Option<i64>,
    pub percent: Option<Decimal>,
    pub days_after_due: i32,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LateFeeApplicationRow {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub policy_id: Uuid,
    pub fee_cents: i64,
    pub line_item_id: Uuid,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ReminderLogRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub invoice_id: Uuid,
    pub rule_id: Uuid,
    pub status: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}
