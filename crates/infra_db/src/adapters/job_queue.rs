//! PostgreSQL Job Queue Adapter
//!
//! Both sides of the durable delayed-job queue, backed by `automation_jobs`.
//! All timestamps come from the injected clock so `run_at` agrees with the
//! scheduler's delay computation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use core_kernel::{Clock, DomainPort, HealthCheckResult, HealthCheckable, JobId, PortError};
use domain_automation::{Job, JobQueue, JobSource, NewJob, LEASE_EXPIRED_ERROR};

use crate::adapters::billing_store::ping;
use crate::repositories::jobs::{JobRow, NewJobRow};
use crate::repositories::JobRepository;

fn to_chrono(duration: Duration, what: &str) -> Result<chrono::Duration, PortError> {
    chrono::Duration::from_std(duration)
        .map_err(|e| PortError::validation(format!("{what} out of range: {e}")))
}

/// PostgreSQL-backed `JobQueue` and `JobSource`
#[derive(Clone)]
pub struct PostgresJobQueue {
    repository: JobRepository,
    clock: Arc<dyn Clock>,
    pool: PgPool,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository: JobRepository::new(pool.clone()),
            clock,
            pool,
        }
    }

    /// Current row for a job, including status and last error
    pub async fn job_record(&self, job_id: JobId) -> Result<Option<JobRow>, PortError> {
        Ok(self.repository.get(*job_id.as_uuid()).await?)
    }
}

impl DomainPort for PostgresJobQueue {}

#[async_trait]
impl HealthCheckable for PostgresJobQueue {
    async fn health_check(&self) -> HealthCheckResult {
        ping(&self.pool, "postgres-job-queue").await
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    #[instrument(skip(self, job), fields(topic = %job.topic, key = %job.idempotency_key))]
    async fn enqueue(&self, job: NewJob) -> Result<JobId, PortError> {
        let now = self.clock.now();
        let id = JobId::new_v7();
        let row = NewJobRow {
            id: *id.as_uuid(),
            topic: job.topic,
            payload: job.payload,
            idempotency_key: job.idempotency_key,
            max_attempts: i32::try_from(job.max_attempts)
                .map_err(|_| PortError::validation("max_attempts out of range"))?,
            run_at: now + to_chrono(job.delay, "delay")?,
        };

        self.repository.insert(&row, now).await?;
        debug!(job_id = %id, run_at = %row.run_at, "Job enqueued");
        Ok(id)
    }
}

#[async_trait]
impl JobSource for PostgresJobQueue {
    async fn claim_due(&self, limit: u32, lease: Duration) -> Result<Vec<Job>, PortError> {
        let now = self.clock.now();
        let leased_until = now + to_chrono(lease, "lease")?;
        let expired = self
            .repository
            .fail_expired_leases(now, LEASE_EXPIRED_ERROR)
            .await?;
        if expired > 0 {
            warn!(count = expired, "Dead-lettered jobs whose final lease expired");
        }
        let rows = self
            .repository
            .lease_due(now, i64::from(limit), leased_until)
            .await?;

        Ok(rows.into_iter().map(row_to_job).collect())
    }

    async fn complete(&self, job_id: JobId) -> Result<(), PortError> {
        Ok(self
            .repository
            .mark_completed(*job_id.as_uuid(), self.clock.now())
            .await?)
    }

    async fn retry(
        &self,
        job_id: JobId,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<(), PortError> {
        Ok(self
            .repository
            .reschedule(*job_id.as_uuid(), error, retry_at, self.clock.now())
            .await?)
    }

    async fn dead_letter(&self, job_id: JobId, error: &str) -> Result<(), PortError> {
        warn!(job_id = %job_id, error = %error, "Dead-lettering job");
        Ok(self
            .repository
            .mark_failed(*job_id.as_uuid(), error, self.clock.now())
            .await?)
    }
}

fn row_to_job(row: JobRow) -> Job {
    Job {
        id: JobId::from(row.id),
        topic: row.topic,
        payload: row.payload,
        idempotency_key: row.idempotency_key,
        attempts: row.attempts.max(0) as u32,
        max_attempts: row.max_attempts.max(0) as u32,
        run_at: row.run_at,
    }
}
