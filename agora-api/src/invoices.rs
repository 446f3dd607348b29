use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use agora_billing::models::{Invoice, OfflinePaymentRequest, Payment, PaymentMethod};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/invoices/{id}", get(get_invoice))
        .route("/v1/invoices/{id}/send", post(send_invoice))
        .route("/v1/invoices/{id}/cancel", post(cancel_invoice))
        .route("/v1/invoices/{id}/payments", get(list_payments))
        .route("/v1/invoices/{id}/payments/offline", post(record_offline_payment))
        .route("/v1/invoices/{id}/confirm-payment", post(confirm_payment))
}

#[derive(Debug, Deserialize)]
pub struct RecordOfflinePaymentRequest {
    pub buyer_user_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub payment_date: DateTime<Utc>,
    pub notes: Option<String>,
    /// Admin entering the record; auth integration resolves this upstream
    pub recorded_by: Uuid,
}

/// GET /v1/invoices/:id
async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, ApiError> {
    Ok(Json(state.generator.find_invoice(id).await?))
}

/// POST /v1/invoices/:id/send
async fn send_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, ApiError> {
    Ok(Json(state.generator.send_invoice(id).await?))
}

/// POST /v1/invoices/:id/cancel
async fn cancel_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, ApiError> {
    Ok(Json(state.generator.cancel_invoice(id).await?))
}

/// GET /v1/invoices/:id/payments
async fn list_payments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    Ok(Json(state.processor.payments_for_invoice(id).await?))
}

/// POST /v1/invoices/:id/payments/offline
async fn record_offline_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordOfflinePaymentRequest>,
) -> Result<Json<Payment>, ApiError> {
    let request = OfflinePaymentRequest {
        buyer_user_id: payload.buyer_user_id,
        amount: payload.amount,
        method: payload.method,
        payment_date: payload.payment_date,
        notes: payload.notes,
    };
    let payment = state
        .processor
        .record_offline_payment(id, request, payload.recorded_by)
        .await?;
    state.metrics.payments_succeeded.inc();
    Ok(Json(payment))
}

/// POST /v1/invoices/:id/confirm-payment
async fn confirm_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, ApiError> {
    Ok(Json(state.processor.confirm_offline_payment(id).await?))
}
