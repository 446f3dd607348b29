use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use agora_billing::models::{CheckoutInfo, Payment, PaymentStatus};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/invoices/{id}/payments/checkout", post(initiate_payment))
        .route("/v1/payments/return", get(gateway_return))
        .route("/v1/payments/{id}/retry", post(retry_payment))
}

#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    pub buyer_user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct GatewayReturnQuery {
    pub checkout_id: String,
}

/// POST /v1/invoices/:id/payments/checkout
async fn initiate_payment(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<Json<CheckoutInfo>, ApiError> {
    let info = state
        .processor
        .initiate_online_payment(invoice_id, payload.buyer_user_id)
        .await?;
    state.metrics.payments_initiated.inc();
    Ok(Json(info))
}

/// GET /v1/payments/return?checkout_id=...
///
/// The buyer lands here after the hosted checkout; reconciles against the
/// provider's authoritative status.
async fn gateway_return(
    State(state): State<AppState>,
    Query(query): Query<GatewayReturnQuery>,
) -> Result<Json<Payment>, ApiError> {
    let payment = state.processor.process_gateway_return(&query.checkout_id).await?;
    if payment.status == PaymentStatus::Succeeded {
        state.metrics.payments_succeeded.inc();
    }
    Ok(Json(payment))
}

/// POST /v1/payments/:id/retry
async fn retry_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<Json<CheckoutInfo>, ApiError> {
    let info = state
        .processor
        .retry_payment(payment_id, payload.buyer_user_id)
        .await?;
    state.metrics.payments_initiated.inc();
    Ok(Json(info))
}
