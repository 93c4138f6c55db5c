//! API middleware

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::str::FromStr;
use tracing::{info, warn};

use core_kernel::{OrganizationId, UserId};

use crate::error::ApiError;

pub const ORGANIZATION_HEADER: &str = "x-organization-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

/// The tenant and acting user a request is scoped to
#[derive(Debug, Clone, Copy)]
pub struct TenantContext {
    pub organization_id: OrganizationId,
    pub actor_id: Option<UserId>,
}

fn header_id<T: FromStr>(headers: &HeaderMap, name: &str) -> Result<Option<T>, ApiError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .map(Some)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid {} header", name)))
}

/// Tenant scoping middleware
///
/// Requires `X-Organization-Id` and accepts an optional `X-Actor-Id`; both
/// are stored in the request extensions as a [`TenantContext`].
pub async fn tenant_middleware(mut request: Request<Body>, next: Next) -> Response {
    let context = header_id::<OrganizationId>(request.headers(), ORGANIZATION_HEADER).and_then(
        |organization_id| {
            let organization_id = organization_id.ok_or_else(|| {
                ApiError::BadRequest(format!("missing {} header", ORGANIZATION_HEADER))
            })?;
            let actor_id = header_id::<UserId>(request.headers(), ACTOR_HEADER)?;
            Ok(TenantContext {
                organization_id,
                actor_id,
            })
        },
    );

    match context {
        Ok(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(err) => {
            warn!(uri = %request.uri(), error = %err, "Rejected request without tenant");
            err.into_response()
        }
    }
}

/// Request logging middleware
pub async fn request_log_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let organization = request
        .extensions()
        .get::<TenantContext>()
        .map(|c| c.organization_id.to_string())
        .unwrap_or_else(|| "public".to_string());

    let start = Utc::now();

    let response = next.run(request).await;

    let duration = Utc::now() - start;
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        organization = %organization,
        status = %status.as_u16(),
        duration_ms = duration.num_milliseconds(),
        "API request"
    );

    response
}
