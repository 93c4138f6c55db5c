//! Payments and credit notes
//!
//! Both are append-only records against an invoice. Payment status changes
//! arrive as new rows from the payment provider, never as edits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use core_kernel::{Cents, CreditNoteId, InvoiceId, PaymentId};

use crate::error::BillingError;

/// Payment status as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    /// The only status that counts toward the balance
    Succeeded,
    Failed,
    Canceled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Succeeded => "SUCCEEDED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Canceled => "CANCELED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn counts_toward_balance(&self) -> bool {
        matches!(self, PaymentStatus::Succeeded)
    }
}

impl FromStr for PaymentStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "SUCCEEDED" => Ok(PaymentStatus::Succeeded),
            "FAILED" => Ok(PaymentStatus::Failed),
            "CANCELED" => Ok(PaymentStatus::Canceled),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            other => Err(BillingError::UnknownValue {
                kind: "payment status",
                value: other.to_string(),
            }),
        }
    }
}

/// A payment record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub status: PaymentStatus,
    pub amount_cents: Cents,
    /// Provider name, e.g. `stripe` or `manual`
    pub provider: String,
    /// Provider-side reference (charge id, bank reference)
    pub provider_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        invoice_id: InvoiceId,
        status: PaymentStatus,
        amount_cents: Cents,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            id: PaymentId::new_v7(),
            invoice_id,
            status,
            amount_cents,
            provider: provider.into(),
            provider_reference: None,
            created_at: Utc::now(),
        }
    }

    /// Creates a successful payment
    pub fn succeeded(invoice_id: InvoiceId, amount_cents: Cents) -> Self {
        Self::new(invoice_id, PaymentStatus::Succeeded, amount_cents, "manual")
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.provider_reference = Some(reference.into());
        self
    }
}

/// A credit note; always reduces the amount due
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNote {
    pub id: CreditNoteId,
    pub invoice_id: InvoiceId,
    pub amount_cents: Cents,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl CreditNote {
    pub fn new(invoice_id: InvoiceId, amount_cents: Cents, reason: impl Into<String>) -> Self {
        Self {
            id: CreditNoteId::new_v7(),
            invoice_id,
            amount_cents,
            reason: reason.into(),
            created_at: Utc::now(),
        }
    }
}
