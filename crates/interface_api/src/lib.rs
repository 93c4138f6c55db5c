//! HTTP API Layer
//!
//! This crate provides the REST API for the billing engine using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Invoice commands, the hosted buyer link, health checks
//! - **Middleware**: Tenant scoping and request logging
//! - **DTOs**: Response bodies
//! - **Adapters**: SMTP mailer, compliance gate, document rendering
//! - **Error Handling**: Consistent error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let app = create_router(AppState::new(service, health_checks));
//! axum::serve(listener, app).await?;
//! ```

pub mod adapters;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use core_kernel::HealthCheckable;
use domain_automation::InvoiceService;

use crate::handlers::{health, invoices, public};
use crate::middleware::{request_log_middleware, tenant_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<InvoiceService>,
    /// Adapters probed by `/health/ready`
    pub health: Arc<Vec<Arc<dyn HealthCheckable>>>,
}

impl AppState {
    pub fn new(service: Arc<InvoiceService>, health: Vec<Arc<dyn HealthCheckable>>) -> Self {
        Self {
            service,
            health: Arc::new(health),
        }
    }
}

/// Creates the main API router
///
/// # Arguments
///
/// * `state` - The command service and the adapters to health-check
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    // Public routes (no tenant header)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/public/invoices/:token", get(public::view_invoice))
        .route("/i/:token", get(public::view_invoice));

    // Invoice routes
    let invoice_routes = Router::new()
        .route("/", post(invoices::create_invoice))
        .route("/:id", get(invoices::get_invoice))
        .route("/:id/totals", get(invoices::get_totals))
        .route("/:id/send", post(invoices::send_invoice))
        .route("/:id/mark-paid", post(invoices::mark_paid))
        .route("/:id/void", post(invoices::void_invoice))
        .route("/:id/payments", post(invoices::record_payment))
        .route("/:id/credit-notes", post(invoices::issue_credit_note))
        .route("/:id/automation/schedule", post(invoices::schedule_automation));

    // Tenant-scoped API routes
    let api_routes = Router::new()
        .nest("/invoices", invoice_routes)
        .layer(axum_middleware::from_fn(request_log_middleware))
        .layer(axum_middleware::from_fn(tenant_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
