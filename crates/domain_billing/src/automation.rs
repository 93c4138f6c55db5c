//! Dunning and late-fee policies, and the records their execution leaves
//!
//! Policies belong to an organization and are read fresh every time a job
//! runs. `ReminderJobLog`, `ReminderDelivery` and `LateFeeApplication` are
//! append-only; the latter two double as idempotency guards.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{
    Cents, InvoiceId, LateFeeApplicationId, LateFeePolicyId, LineItemId, OrganizationId,
    ReminderLogId, ReminderPolicyId, ReminderRuleId, percent_of,
};

use crate::error::BillingError;

/// Tone of a reminder email
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderTemplate {
    Friendly,
    Firm,
}

impl ReminderTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderTemplate::Friendly => "friendly",
            ReminderTemplate::Firm => "firm",
        }
    }
}

impl FromStr for ReminderTemplate {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "friendly" => Ok(ReminderTemplate::Friendly),
            "firm" => Ok(ReminderTemplate::Firm),
            other => Err(BillingError::UnknownValue {
                kind: "reminder template",
                value: other.to_string(),
            }),
        }
    }
}

/// One reminder, relative to the due date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRule {
    pub id: ReminderRuleId,
    pub policy_id: ReminderPolicyId,
    /// Days relative to the due date; negative fires before it
    pub days_offset: i32,
    pub template: ReminderTemplate,
    pub enabled: bool,
    pub position: i32,
}

/// An ordered set of reminder rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPolicy {
    pub id: ReminderPolicyId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub enabled: bool,
    pub rules: Vec<ReminderRule>,
}

impl ReminderPolicy {
    /// Picks the organization's active policy: the first enabled one, else the first
    pub fn select(policies: &[ReminderPolicy]) -> Option<&ReminderPolicy> {
        policies
            .iter()
            .find(|policy| policy.enabled)
            .or_else(|| policies.first())
    }

    /// Enabled rules in display order
    pub fn enabled_rules(&self) -> Vec<&ReminderRule> {
        let mut rules: Vec<&ReminderRule> = self.rules.iter().filter(|r| r.enabled).collect();
        rules.sort_by_key(|rule| rule.position);
        rules
    }

    pub fn rule(&self, rule_id: ReminderRuleId) -> Option<&ReminderRule> {
        self.rules.iter().find(|rule| rule.id == rule_id)
    }
}

/// How a late fee is charged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LateFeeCharge {
    Flat { amount_cents: Cents },
    Percent { percent: Decimal },
}

impl LateFeeCharge {
    pub fn type_str(&self) -> &'static str {
        match self {
            LateFeeCharge::Flat { .. } => "FLAT",
            LateFeeCharge::Percent { .. } => "PERCENT",
        }
    }
}

/// Late-fee policy; an organization has at most one enabled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LateFeePolicy {
    pub id: LateFeePolicyId,
    pub organization_id: OrganizationId,
    pub charge: LateFeeCharge,
    pub days_after_due: i32,
    pub enabled: bool,
}

impl LateFeePolicy {
    /// Fee for the given outstanding balance
    pub fn fee_for(&self, due_cents: Cents) -> Cents {
        match self.charge {
            LateFeeCharge::Flat { amount_cents } => amount_cents,
            LateFeeCharge::Percent { percent } => percent_of(due_cents, percent),
        }
    }

    /// Description of the appended line item
    pub fn line_description(&self) -> String {
        match self.charge {
            LateFeeCharge::Flat { .. } => "Late fee".to_string(),
            LateFeeCharge::Percent { percent } => format!("Late fee ({}%)", percent.normalize()),
        }
    }
}

/// Outcome recorded for a reminder job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderLogStatus {
    Sent,
    Skipped,
    Failed,
}

impl ReminderLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderLogStatus::Sent => "SENT",
            ReminderLogStatus::Skipped => "SKIPPED",
            ReminderLogStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for ReminderLogStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENT" => Ok(ReminderLogStatus::Sent),
            "SKIPPED" => Ok(ReminderLogStatus::Skipped),
            "FAILED" => Ok(ReminderLogStatus::Failed),
            other => Err(BillingError::UnknownValue {
                kind: "reminder log status",
                value: other.to_string(),
            }),
        }
    }
}

/// Why an automation job did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    InvoiceNotFound,
    RuleNotFound,
    RuleDisabled,
    PolicyNotFound,
    PolicyDisabled,
    MissingBuyerEmail,
    MissingDueDate,
    NothingDue,
    InvoiceNotOpen,
    AlreadySent,
    AlreadyApplied,
    FeeNotPositive,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::InvoiceNotFound => "invoice_not_found",
            SkipReason::RuleNotFound => "rule_not_found",
            SkipReason::RuleDisabled => "rule_disabled",
            SkipReason::PolicyNotFound => "policy_not_found",
            SkipReason::PolicyDisabled => "policy_disabled",
            SkipReason::MissingBuyerEmail => "missing_buyer_email",
            SkipReason::MissingDueDate => "missing_due_date",
            SkipReason::NothingDue => "nothing_due",
            SkipReason::InvoiceNotOpen => "invoice_not_open",
            SkipReason::AlreadySent => "already_sent",
            SkipReason::AlreadyApplied => "already_applied",
            SkipReason::FeeNotPositive => "fee_not_positive",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row per reminder job run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderJobLog {
    pub id: ReminderLogId,
    pub organization_id: OrganizationId,
    pub invoice_id: InvoiceId,
    pub rule_id: ReminderRuleId,
    pub status: ReminderLogStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ReminderJobLog {
    pub fn new(
        organization_id: OrganizationId,
        invoice_id: InvoiceId,
        rule_id: ReminderRuleId,
        status: ReminderLogStatus,
        reason: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReminderLogId::new_v7(),
            organization_id,
            invoice_id,
            rule_id,
            status,
            reason,
            created_at,
        }
    }
}

/// Claim that a reminder has been (or is being) delivered
///
/// Unique per (invoice, rule, due date). The due date is the delivery epoch:
/// moving the due date and rescheduling allows the rule to fire again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderDelivery {
    pub invoice_id: InvoiceId,
    pub rule_id: ReminderRuleId,
    pub due_date: NaiveDate,
    pub claimed_at: DateTime<Utc>,
}

/// Record of a late fee applied to an invoice; unique per (invoice, policy)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LateFeeApplication {
    pub id: LateFeeApplicationId,
    pub invoice_id: InvoiceId,
    pub policy_id: LateFeePolicyId,
    pub fee_cents: Cents,
    pub line_item_id: LineItemId,
    pub applied_at: DateTime<Utc>,
}
