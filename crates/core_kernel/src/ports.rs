//! Seam types shared by every port
//!
//! The billing store, job queue, mailer and audit log are traits defined in
//! `domain_automation`. Their adapters (PostgreSQL, SMTP, in-memory mocks) all
//! fail with [`PortError`] and report liveness through [`HealthCheckable`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by an adapter
///
/// The automation runner retries a job only when [`PortError::is_transient`]
/// holds; every other variant is final for that attempt.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("Not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    /// Rejected input; `field` names the offending attribute when known
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Uniqueness or state conflict with stored data
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// A downstream service (mail relay, database) refused work for now
    #[error("Service unavailable: {service}")]
    Unavailable { service: String },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn unavailable(service: impl Into<String>) -> Self {
        PortError::Unavailable {
            service: service.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the underlying cause to a connection or internal error
    pub fn with_source(self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        match self {
            PortError::Connection { message, .. } => PortError::Connection {
                message,
                source: Some(Box::new(cause)),
            },
            PortError::Internal { message, .. } => PortError::Internal {
                message,
                source: Some(Box::new(cause)),
            },
            other => other,
        }
    }

    /// Whether a retry of the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Connection { .. } | PortError::Unavailable { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, PortError::Conflict { .. })
    }
}

/// Marker for port traits, so adapters can be shared as `Arc<dyn Port>`
/// across tokio tasks
pub trait DomainPort: Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

/// One adapter's answer to a readiness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    /// Stamps a probe result with the current time
    pub fn new(
        adapter_id: impl Into<String>,
        status: AdapterHealth,
        latency_ms: u64,
        message: Option<String>,
    ) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == AdapterHealth::Healthy
    }
}

#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_entity_and_id() {
        let error = PortError::not_found("Invoice", "123");
        assert!(error.is_not_found());
        assert!(!error.is_transient());
        assert_eq!(error.to_string(), "Not found: Invoice with id 123");
    }

    #[test]
    fn test_unavailable_mail_relay_is_transient() {
        assert!(PortError::unavailable("smtp").is_transient());
        assert!(!PortError::validation("Invalid email").is_transient());
    }

    #[test]
    fn test_with_source_keeps_message() {
        let cause = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let error = PortError::connection("lost database").with_source(cause);
        assert_eq!(error.to_string(), "Connection error: lost database");
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_degraded_result_is_not_healthy() {
        let result = HealthCheckResult::new("smtp-mailer", AdapterHealth::Degraded, 12, None);
        assert!(!result.is_healthy());
        assert_eq!(result.adapter_id, "smtp-mailer");
    }
}
