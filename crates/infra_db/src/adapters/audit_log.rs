//! PostgreSQL Audit Log Adapter

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{DomainPort, HealthCheckResult, HealthCheckable, OrganizationId, PortError};
use domain_automation::AuditLog;
use domain_billing::AuditEntry;

use crate::adapters::billing_store::ping;
use crate::repositories::audit::AuditRow;
use crate::repositories::AuditRepository;

/// Appends audit entries to the `audit_log` table
#[derive(Debug, Clone)]
pub struct PostgresAuditLog {
    repository: AuditRepository,
    pool: PgPool,
}

impl PostgresAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: AuditRepository::new(pool.clone()),
            pool,
        }
    }

    /// Entries recorded against one entity, oldest first
    pub async fn entries_for(
        &self,
        organization_id: OrganizationId,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditRow>, PortError> {
        Ok(self
            .repository
            .for_entity(*organization_id.as_uuid(), entity_type, entity_id)
            .await?)
    }
}

impl DomainPort for PostgresAuditLog {}

#[async_trait]
impl HealthCheckable for PostgresAuditLog {
    async fn health_check(&self) -> HealthCheckResult {
        ping(&self.pool, "postgres-audit-log").await
    }
}

#[async_trait]
impl AuditLog for PostgresAuditLog {
    #[instrument(skip(self, entry), fields(action = %entry.action, entity_id = %entry.entity_id))]
    async fn record(&self, entry: AuditEntry) -> Result<(), PortError> {
        Ok(self.repository.insert(&entry).await?)
    }
}
