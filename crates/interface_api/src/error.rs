//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use core_kernel::PortError;
use domain_automation::{AutomationError, ComplianceIssue};

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invoice failed compliance validation")]
    Compliance(Vec<ComplianceIssue>),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message, details) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg, None)
            }
            ApiError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg, None)
            }
            ApiError::Validation(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg, None)
            }
            ApiError::Compliance(issues) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "compliance_failed",
                "Invoice failed compliance validation".to_string(),
                serde_json::to_value(issues).ok(),
            ),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<PortError> for ApiError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            PortError::Validation { .. } => ApiError::Validation(err.to_string()),
            PortError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            err if err.is_transient() => ApiError::Unavailable(err.to_string()),
            err => {
                error!(error = %err, "Port failure");
                ApiError::Internal("unexpected storage failure".to_string())
            }
        }
    }
}

impl From<AutomationError> for ApiError {
    fn from(err: AutomationError) -> Self {
        match err {
            AutomationError::InvoiceNotFound(id) => {
                ApiError::NotFound(format!("invoice {} not found", id))
            }
            AutomationError::Validation(msg) => ApiError::Validation(msg),
            AutomationError::ComplianceFailed { issues } => ApiError::Compliance(issues),
            err @ (AutomationError::SendRejected(_)
            | AutomationError::InvalidState(_)
            | AutomationError::Lifecycle(_)) => ApiError::Conflict(err.to_string()),
            AutomationError::Port(port) => port.into(),
            err @ (AutomationError::MalformedJob(_) | AutomationError::Temporal(_)) => {
                error!(error = %err, "Automation failure");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_billing::BillingError;

    #[test]
    fn test_send_rejection_is_conflict() {
        let err = ApiError::from(AutomationError::SendRejected(BillingError::SendVoid));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_compliance_failure_is_unprocessable() {
        let err = ApiError::from(AutomationError::ComplianceFailed {
            issues: vec![ComplianceIssue {
                field: "line_items".into(),
                message: "at least one line item is required".into(),
            }],
        });
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_transient_port_error_is_unavailable() {
        let err = ApiError::from(PortError::connection("pool timed out"));
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
