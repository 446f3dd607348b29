use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};

use agora_billing::BillingError;
use agora_core::gateway::PaymentProvider;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments/{provider}", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments/:provider
///
/// Receives asynchronous payment status updates. The raw body is handed to
/// the provider gateway for signature verification before anything is
/// parsed.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let provider = PaymentProvider::parse(&provider)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown payment provider {}", provider)))?;

    let signature = headers
        .get("x-webhook-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    tracing::info!(provider = provider.as_str(), "Received payment webhook");

    match state.processor.handle_webhook(provider, &body, signature).await {
        Ok(()) => Ok(StatusCode::OK),
        Err(e @ BillingError::InvalidWebhookSignature) => {
            state.metrics.webhooks_rejected.inc();
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
