//! Automation job repository
//!
//! The durable delayed-job queue on the `automation_jobs` table. Consumers
//! lease due rows with `FOR UPDATE SKIP LOCKED`, so several runner processes
//! can poll the same table without handing one job to two of them.
//!
//! | Status | Meaning |
//! |---|---|
//! | `PENDING` | waiting for `run_at` |
//! | `RUNNING` | leased until `leased_until`; eligible again once that passes, if attempts remain |
//! | `COMPLETED` | handled |
//! | `FAILED` | dead-lettered |

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::DatabaseError;

/// A row to insert into `automation_jobs`
#[derive(Debug, Clone)]
pub struct NewJobRow {
    pub id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
    pub max_attempts: i32,
    pub run_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, job: &NewJobRow, now: DateTime<Utc>) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO automation_jobs (
                id, topic, payload, idempotency_key, status, attempts, max_attempts,
                run_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, 'PENDING', 0, $5, $6, $7, $7)
            "#,
        )
        .bind(job.id)
        .bind(&job.topic)
        .bind(&job.payload)
        .bind(&job.idempotency_key)
        .bind(job.max_attempts)
        .bind(job.run_at)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Dead-letters `RUNNING` jobs whose lease expired on their final attempt
    ///
    /// Returns the number of rows moved to `FAILED`.
    pub async fn fail_expired_leases(
        &self,
        now: DateTime<Utc>,
        error: &str,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE automation_jobs
            SET status = 'FAILED', last_error = $2, leased_until = NULL, updated_at = $1
            WHERE status = 'RUNNING'
              AND leased_until <= $1
              AND attempts >= max_attempts
            "#,
        )
        .bind(now)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Leases up to `limit` due jobs until `leased_until`
    ///
    /// A job is due when it is `PENDING` with `run_at <= now`, or `RUNNING`
    /// with an expired lease and attempts left. Each leased job's attempt
    /// counter is incremented.
    pub async fn lease_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        leased_until: DateTime<Utc>,
    ) -> Result<Vec<JobRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE automation_jobs
            SET status = 'RUNNING',
                attempts = attempts + 1,
                leased_until = $3,
                updated_at = $1
            WHERE id IN (
                SELECT id FROM automation_jobs
                WHERE (status = 'PENDING' AND run_at <= $1)
                   OR (status = 'RUNNING' AND leased_until <= $1 AND attempts < max_attempts)
                ORDER BY run_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, topic, payload, idempotency_key, status, attempts, max_attempts,
                      run_at, leased_until, last_error
            "#,
        )
        .bind(now)
        .bind(limit)
        .bind(leased_until)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn mark_completed(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE automation_jobs
            SET status = 'COMPLETED', leased_until = NULL, updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        expect_one("Job", id, result.rows_affected())
    }

    pub async fn reschedule(
        &self,
        id: Uuid,
        error: &str,
        run_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE automation_jobs
            SET status = 'PENDING', run_at = $2, last_error = $3,
                leased_until = NULL, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(run_at)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;
        expect_one("Job", id, result.rows_affected())
    }

    pub async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE automation_jobs
            SET status = 'FAILED', last_error = $2, leased_until = NULL, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;
        expect_one("Job", id, result.rows_affected())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<JobRow>, DatabaseError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, topic, payload, idempotency_key, status, attempts, max_attempts,
                   run_at, leased_until, last_error
            FROM automation_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

fn expect_one(entity: &str, id: Uuid, rows_affected: u64) -> Result<(), DatabaseError> {
    if rows_affected == 0 {
        return Err(DatabaseError::not_found(entity, id));
    }
    Ok(())
}

#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: DateTime<Utc>,
    pub leased_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
