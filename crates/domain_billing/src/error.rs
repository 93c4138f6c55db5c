//! Billing domain errors

use thiserror::Error;

use core_kernel::TemporalError;

use crate::invoice::InvoiceStatus;
use crate::lifecycle::InvoiceEvent;

/// Errors that can occur in the billing domain
#[derive(Debug, Error)]
pub enum BillingError {
    /// Sending a voided invoice
    #[error("cannot send a void invoice")]
    SendVoid,

    /// The event is not allowed from the current status
    #[error("cannot {event} an invoice in status {from}")]
    InvalidTransition {
        from: InvoiceStatus,
        event: &'static str,
    },

    /// A stored enum value could not be decoded
    #[error("Unknown {kind}: {value}")]
    UnknownValue {
        kind: &'static str,
        value: String,
    },

    /// Timezone arithmetic failed
    #[error("Temporal error: {0}")]
    Temporal(#[from] TemporalError),
}

impl BillingError {
    pub fn invalid_transition(from: InvoiceStatus, event: InvoiceEvent) -> Self {
        BillingError::InvalidTransition {
            from,
            event: event.name(),
        }
    }
}
