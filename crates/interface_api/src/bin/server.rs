//! Billing API Server Binary
//!
//! Starts the HTTP API and, unless disabled, the automation runner that
//! executes scheduled reminders and late fees.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin billing-api
//!
//! # Run with environment variables
//! API_PORT=8080 API_DATABASE_URL=postgres://... cargo run --bin billing-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` / `API_PORT` - Listen address (default: 0.0.0.0:8080)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `API_LOG_JSON` - Emit JSON log lines (default: false)
//! * `API_WORKER_ENABLED` - Run the automation runner in this process (default: true)
//! * `API_SMTP_HOST` - SMTP relay; mail is only logged when unset
//! * `API_PUBLIC_BASE_URL` - Base URL of hosted invoice links

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use core_kernel::{Clock, HealthCheckable, SystemClock};
use domain_automation::{
    AutomationRunner, AutomationWorker, InvoiceService, InvoiceServicePorts, Mailer,
};
use infra_db::{
    create_pool, run_migrations, DatabaseConfig, PostgresAuditLog, PostgresBillingStore,
    PostgresJobQueue,
};
use interface_api::adapters::{
    InvoiceComplianceGate, LoggingMailer, PlainTextDocumentService, SmtpMailer,
};
use interface_api::{config::ApiConfig, create_router, AppState};

/// Main entry point for the API server.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - Database connection or migrations fail
/// - Server fails to bind to the configured address
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("failed to load configuration")?;

    init_tracing(&config.log_level, config.log_json);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        worker_enabled = config.worker_enabled,
        "Starting billing API server"
    );

    let workers = if config.worker_enabled {
        config.worker_concurrency as u32
    } else {
        0
    };
    let db_config = DatabaseConfig::new(config.database_url.clone()).sized_for_workers(workers);
    let pool = create_pool(db_config)
        .await
        .context("failed to connect to database")?;
    run_migrations(&pool).await.context("failed to run migrations")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(PostgresBillingStore::new(pool.clone()));
    let queue = Arc::new(PostgresJobQueue::new(pool.clone(), clock.clone()));
    let audit = Arc::new(PostgresAuditLog::new(pool.clone()));

    let mut health: Vec<Arc<dyn HealthCheckable>> = vec![
        store.clone() as Arc<dyn HealthCheckable>,
        queue.clone() as Arc<dyn HealthCheckable>,
        audit.clone() as Arc<dyn HealthCheckable>,
    ];
    let mailer: Arc<dyn Mailer> = match &config.smtp_host {
        Some(host) => {
            let credentials = config.smtp_user.clone().zip(config.smtp_password.clone());
            let smtp = Arc::new(
                SmtpMailer::new(host, config.smtp_port, credentials, &config.mail_from)
                    .context("failed to configure SMTP mailer")?,
            );
            health.push(smtp.clone());
            smtp as Arc<dyn Mailer>
        }
        None => {
            tracing::warn!("API_SMTP_HOST not set; outbound mail will only be logged");
            Arc::new(LoggingMailer) as Arc<dyn Mailer>
        }
    };

    let service = Arc::new(InvoiceService::new(
        InvoiceServicePorts {
            store: store.clone(),
            queue: queue.clone(),
            mailer: mailer.clone(),
            audit: audit.clone(),
            compliance: Arc::new(InvoiceComplianceGate),
            documents: Arc::new(PlainTextDocumentService),
            clock: clock.clone(),
        },
        config.public_base_url.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner_handle = if config.worker_enabled {
        let worker = Arc::new(AutomationWorker::new(
            store.clone(),
            mailer,
            audit.clone(),
            clock.clone(),
            config.public_base_url.clone(),
        ));
        let runner = Arc::new(AutomationRunner::new(
            queue.clone(),
            worker,
            clock,
            config.runner_config(),
        ));
        Some(tokio::spawn(runner.run(shutdown_rx)))
    } else {
        None
    };

    let app = create_router(AppState::new(service, health));

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .context("invalid listen address")?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the runner and let in-flight jobs settle
    let _ = shutdown_tx.send(true);
    if let Some(handle) = runner_handle {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Automation runner exited abnormally");
        }
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
