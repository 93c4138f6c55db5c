//! Invoice handlers
//!
//! Every route here sits behind the tenant middleware; lookups are scoped to
//! the caller's organization.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::instrument;

use core_kernel::InvoiceId;
use domain_automation::{
    CreateInvoiceCommand, IssueCreditNoteCommand, PaymentOutcome, RecordPaymentCommand,
    ScheduleReport,
};
use domain_billing::AmountDue;

use crate::dto::invoice::*;
use crate::middleware::TenantContext;
use crate::{error::ApiError, AppState};

fn parse_invoice_id(raw: &str) -> Result<InvoiceId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid invoice id '{}'", raw)))
}

/// Creates a draft invoice
#[instrument(skip_all, fields(organization_id = %tenant.organization_id))]
pub async fn create_invoice(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Json(command): Json<CreateInvoiceCommand>,
) -> Result<(StatusCode, Json<InvoiceResponse>), ApiError> {
    let invoice = state
        .service
        .create_invoice(tenant.organization_id, tenant.actor_id, command)
        .await?;
    Ok((StatusCode::CREATED, Json(invoice.into())))
}

/// Gets an invoice with its computed balance
pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let aggregate = state
        .service
        .get_invoice(tenant.organization_id, parse_invoice_id(&id)?)
        .await?;
    Ok(Json(aggregate.into()))
}

/// Totals and amount due
pub async fn get_totals(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Json<AmountDue>, ApiError> {
    let due = state
        .service
        .amount_due(tenant.organization_id, parse_invoice_id(&id)?)
        .await?;
    Ok(Json(due))
}

/// Sends or re-sends an invoice
#[instrument(skip_all, fields(invoice_id = %id))]
pub async fn send_invoice(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Json<SendResponse>, ApiError> {
    let outcome = state
        .service
        .send(tenant.organization_id, tenant.actor_id, parse_invoice_id(&id)?)
        .await?;
    Ok(Json(outcome.into()))
}

/// Marks an invoice paid when its balance is settled
pub async fn mark_paid(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Json<PaymentOutcome>, ApiError> {
    let outcome = state
        .service
        .mark_paid(tenant.organization_id, tenant.actor_id, parse_invoice_id(&id)?)
        .await?;
    Ok(Json(outcome))
}

/// Voids an invoice
#[instrument(skip_all, fields(invoice_id = %id))]
pub async fn void_invoice(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let invoice_id = parse_invoice_id(&id)?;
    state
        .service
        .void(tenant.organization_id, tenant.actor_id, invoice_id)
        .await?;
    let aggregate = state
        .service
        .get_invoice(tenant.organization_id, invoice_id)
        .await?;
    Ok(Json(aggregate.into()))
}

/// Records a payment against an invoice
pub async fn record_payment(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(command): Json<RecordPaymentCommand>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let (payment, settlement) = state
        .service
        .record_payment(
            tenant.organization_id,
            tenant.actor_id,
            parse_invoice_id(&id)?,
            command,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(PaymentResponse { payment, settlement })))
}

/// Issues a credit note against an invoice
pub async fn issue_credit_note(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(command): Json<IssueCreditNoteCommand>,
) -> Result<(StatusCode, Json<CreditNoteResponse>), ApiError> {
    let (credit_note, settlement) = state
        .service
        .issue_credit_note(
            tenant.organization_id,
            tenant.actor_id,
            parse_invoice_id(&id)?,
            command,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreditNoteResponse {
            credit_note,
            settlement,
        }),
    ))
}

/// Re-runs the automation scheduler for an invoice
pub async fn schedule_automation(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Json<ScheduleReport>, ApiError> {
    let report = state
        .service
        .schedule_automation(tenant.organization_id, parse_invoice_id(&id)?)
        .await?;
    Ok(Json(report))
}
