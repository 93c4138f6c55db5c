//! Automation error types

use thiserror::Error;
use validator::ValidationErrors;

use core_kernel::{PortError, TemporalError};
use domain_billing::BillingError;

use crate::ports::ComplianceIssue;

/// Errors raised by the command service, scheduler and worker
#[derive(Debug, Error)]
pub enum AutomationError {
    /// Invoice does not exist in the caller's organization
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    /// A command failed boundary validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The send transition was refused by the lifecycle
    #[error("{0}")]
    SendRejected(BillingError),

    /// The compliance gate blocked the send transition
    #[error("Invoice failed compliance validation ({} issue(s))", .issues.len())]
    ComplianceFailed { issues: Vec<ComplianceIssue> },

    /// The operation is not allowed in the invoice's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Any other lifecycle rule violation
    #[error(transparent)]
    Lifecycle(#[from] BillingError),

    /// A queued job could not be decoded
    #[error("Malformed job payload: {0}")]
    MalformedJob(String),

    #[error("Temporal error: {0}")]
    Temporal(#[from] TemporalError),

    /// Infrastructure failure from a port
    #[error("Port error: {0}")]
    Port(#[from] PortError),
}

impl AutomationError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        AutomationError::InvalidState(message.into())
    }

    /// Returns true when the queue should try the job again
    ///
    /// Only infrastructure failures qualify. Business outcomes are never
    /// errors in the worker, and malformed payloads will not improve.
    pub fn is_retryable(&self) -> bool {
        match self {
            AutomationError::Port(err) => !(err.is_not_found()
                || err.is_conflict()
                || matches!(err, PortError::Validation { .. })),
            _ => false,
        }
    }
}

impl From<ValidationErrors> for AutomationError {
    fn from(errors: ValidationErrors) -> Self {
        AutomationError::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_retryable() {
        let err = AutomationError::from(PortError::connection("pool exhausted"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_business_errors_are_not_retryable() {
        assert!(!AutomationError::MalformedJob("bad".into()).is_retryable());
        assert!(!AutomationError::from(PortError::not_found("Invoice", "x")).is_retryable());
        assert!(!AutomationError::SendRejected(BillingError::SendVoid).is_retryable());
    }

    #[test]
    fn test_send_rejected_message_is_user_facing() {
        let err = AutomationError::SendRejected(BillingError::SendVoid);
        assert_eq!(err.to_string(), "cannot send a void invoice");
    }
}
