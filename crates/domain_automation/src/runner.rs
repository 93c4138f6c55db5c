//! Queue consumer
//!
//! Polls the durable job source, runs leased jobs on the worker with bounded
//! concurrency, and settles each job:
//!
//! | Handler result | Job |
//! |---|---|
//! | `Ok(_)` (including skips) | completed |
//! | retryable `Err`, attempts left | retried after `base × 2^(attempt-1)` |
//! | retryable `Err`, attempts exhausted | dead-lettered |
//! | malformed payload or non-retryable `Err` | dead-lettered |

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use core_kernel::Clock;

use crate::error::AutomationError;
use crate::jobs::AutomationTask;
use crate::ports::{Job, JobSource};
use crate::worker::AutomationWorker;

/// Consumer settings
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Jobs processed in parallel
    pub concurrency: usize,
    /// Sleep between polls when the queue is empty
    pub poll_interval: Duration,
    /// Jobs leased per poll
    pub batch_size: u32,
    /// How long a leased job stays invisible to other consumers
    pub lease: Duration,
    /// First retry delay; doubles per attempt
    pub retry_backoff: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(1000),
            batch_size: 16,
            lease: Duration::from_secs(300),
            retry_backoff: Duration::from_secs(30),
        }
    }
}

/// How a job was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDisposition {
    Completed,
    Retried,
    DeadLettered,
}

/// Delay before retrying after `attempt` failed attempts
pub fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent)
}

pub struct AutomationRunner {
    source: Arc<dyn JobSource>,
    worker: Arc<AutomationWorker>,
    clock: Arc<dyn Clock>,
    config: RunnerConfig,
}

impl AutomationRunner {
    pub fn new(
        source: Arc<dyn JobSource>,
        worker: Arc<AutomationWorker>,
        clock: Arc<dyn Clock>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            source,
            worker,
            clock,
            config,
        }
    }

    /// Runs until `shutdown` flips to `true`, then drains in-flight jobs
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            concurrency = self.config.concurrency,
            batch_size = self.config.batch_size,
            "Automation runner started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let processed = match self.clone().run_once().await {
                Ok(processed) => processed,
                Err(err) => {
                    warn!(error = %err, "Failed to poll job queue");
                    0
                }
            };

            if processed == 0 {
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!("Automation runner stopped");
    }

    /// Leases one batch and processes it to completion
    ///
    /// Returns the number of jobs settled.
    pub async fn run_once(self: Arc<Self>) -> Result<usize, AutomationError> {
        let jobs = self
            .source
            .claim_due(self.config.batch_size, self.config.lease)
            .await?;
        if jobs.is_empty() {
            return Ok(0);
        }
        debug!(count = jobs.len(), "Leased automation jobs");

        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for job in jobs {
            let runner = self.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                runner.process(job).await
            });
        }

        let mut settled = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(_)) => settled += 1,
                Ok(Err(err)) => error!(error = %err, "Failed to settle job"),
                Err(join_err) => error!(error = %join_err, "Job task panicked"),
            }
        }
        Ok(settled)
    }

    /// Runs one job and records the outcome on the queue
    pub async fn process(&self, job: Job) -> Result<JobDisposition, AutomationError> {
        let task = match AutomationTask::from_job(&job) {
            Ok(task) => task,
            Err(err) => {
                warn!(job_id = %job.id, topic = %job.topic, error = %err, "Dead-lettering malformed job");
                self.source.dead_letter(job.id, &err.to_string()).await?;
                return Ok(JobDisposition::DeadLettered);
            }
        };

        match self.worker.handle(task).await {
            Ok(outcome) => {
                debug!(job_id = %job.id, ?outcome, "Job completed");
                self.source.complete(job.id).await?;
                Ok(JobDisposition::Completed)
            }
            Err(err) if err.is_retryable() && !job.attempts_exhausted() => {
                let delay = retry_backoff(self.config.retry_backoff, job.attempts);
                let retry_at = self.clock.now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                warn!(
                    job_id = %job.id,
                    attempt = job.attempts,
                    max_attempts = job.max_attempts,
                    retry_at = %retry_at,
                    error = %err,
                    "Job failed; will retry"
                );
                self.source.retry(job.id, &err.to_string(), retry_at).await?;
                Ok(JobDisposition::Retried)
            }
            Err(err) => {
                error!(
                    job_id = %job.id,
                    attempt = job.attempts,
                    invoice_id = %task.invoice_id(),
                    error = %err,
                    "Job failed permanently"
                );
                self.source.dead_letter(job.id, &err.to_string()).await?;
                Ok(JobDisposition::DeadLettered)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let base = Duration::from_secs(30);
        assert_eq!(retry_backoff(base, 1), Duration::from_secs(30));
        assert_eq!(retry_backoff(base, 2), Duration::from_secs(60));
        assert_eq!(retry_backoff(base, 3), Duration::from_secs(120));
    }

    #[test]
    fn test_backoff_saturates() {
        let base = Duration::from_secs(u64::MAX / 2);
        assert_eq!(retry_backoff(base, 40), Duration::MAX);
    }
}
