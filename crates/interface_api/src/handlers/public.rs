//! Hosted invoice link

use axum::{
    extract::{Path, State},
    Json,
};

use crate::dto::invoice::PublicInvoiceResponse;
use crate::{error::ApiError, AppState};

/// Shows an invoice to its buyer and records the first view
pub async fn view_invoice(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<PublicInvoiceResponse>, ApiError> {
    let aggregate = state.service.mark_viewed(&token).await?;
    Ok(Json(aggregate.into()))
}
