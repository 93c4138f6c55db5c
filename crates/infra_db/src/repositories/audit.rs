//! Audit log repository
//!
//! Append-only: rows are inserted and read, never updated.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use domain_billing::AuditEntry;

use crate::error::DatabaseError;

#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, entry: &AuditEntry) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, organization_id, actor_id, action, entity_type, entity_id, data, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.organization_id.as_uuid())
        .bind(entry.actor_id.map(Uuid::from))
        .bind(entry.action.as_str())
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.data)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Entries recorded against one entity, oldest first
    pub async fn for_entity(
        &self,
        organization_id: Uuid,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, organization_id, actor_id, action, entity_type, entity_id, data, created_at
            FROM audit_log
            WHERE organization_id = $1 AND entity_type = $2 AND entity_id = $3
            ORDER BY created_at, id
            "#,
        )
        .bind(organization_id)
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AuditRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
