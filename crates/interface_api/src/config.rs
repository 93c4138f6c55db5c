//! API configuration
//!
//! Every field can be set through an `API_`-prefixed environment variable,
//! e.g. `API_PORT=9000` or `API_WORKER_ENABLED=false`.

use serde::Deserialize;
use std::time::Duration;
use validator::Validate;

use domain_automation::RunnerConfig;

/// API configuration
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    #[validate(range(min = 1))]
    pub port: u16,
    /// Database URL
    #[validate(length(min = 1))]
    pub database_url: String,
    /// Log level
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,

    /// Run the automation runner inside the API process
    pub worker_enabled: bool,
    #[validate(range(min = 1, max = 64))]
    pub worker_concurrency: usize,
    #[validate(range(min = 10))]
    pub worker_poll_interval_ms: u64,
    #[validate(range(min = 1, max = 500))]
    pub worker_batch_size: u32,
    #[validate(range(min = 1))]
    pub job_lease_secs: u64,
    pub retry_backoff_ms: u64,

    /// SMTP relay; outbound mail is only logged when unset
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    #[validate(email)]
    pub mail_from: String,

    /// Base of the hosted invoice links sent to buyers
    #[validate(url)]
    pub public_base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let runner = RunnerConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "postgres://localhost/billing".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            worker_enabled: true,
            worker_concurrency: runner.concurrency,
            worker_poll_interval_ms: runner.poll_interval.as_millis() as u64,
            worker_batch_size: runner.batch_size,
            job_lease_secs: runner.lease.as_secs(),
            retry_backoff_ms: runner.retry_backoff.as_millis() as u64,
            smtp_host: None,
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
            mail_from: "billing@localhost.localdomain".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

/// Configuration could not be loaded or is out of range
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: ApiConfig = config::Config::builder()
            .add_source(config::Environment::with_prefix("API").try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings for the in-process automation runner
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            concurrency: self.worker_concurrency,
            poll_interval: Duration::from_millis(self.worker_poll_interval_ms),
            batch_size: self.worker_batch_size,
            lease: Duration::from_secs(self.job_lease_secs),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ApiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_runner_config_mirrors_worker_settings() {
        let config = ApiConfig {
            worker_concurrency: 2,
            worker_batch_size: 8,
            job_lease_secs: 60,
            retry_backoff_ms: 500,
            ..ApiConfig::default()
        };
        let runner = config.runner_config();
        assert_eq!(runner.concurrency, 2);
        assert_eq!(runner.batch_size, 8);
        assert_eq!(runner.lease, Duration::from_secs(60));
        assert_eq!(runner.retry_backoff, Duration::from_millis(500));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let config = ApiConfig {
            worker_concurrency: 0,
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
