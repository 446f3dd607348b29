use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use agora_billing::BillingError;
use agora_campaign::CampaignError;
use agora_pledge::PledgeError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Validation(String),
    Conflict(String),
    Unauthorized(String),
    Forbidden(String),
    Upstream(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match &e {
            BillingError::InvoiceNotFound(_) | BillingError::PaymentNotFound(_) => {
                ApiError::NotFound(e.to_string())
            }
            BillingError::InvalidInvoiceTransition { .. }
            | BillingError::InvalidPaymentTransition { .. }
            | BillingError::NotRetryable(_)
            | BillingError::DuplicateSuccessfulPayment => ApiError::Conflict(e.to_string()),
            BillingError::InvoiceNotPayable(_)
            | BillingError::AmountMismatch { .. }
            | BillingError::InvalidPaymentMethod(_) => ApiError::Validation(e.to_string()),
            BillingError::InvalidWebhookSignature => ApiError::Unauthorized(e.to_string()),
            BillingError::OwnershipMismatch => ApiError::Forbidden(e.to_string()),
            BillingError::Gateway(_) => ApiError::Upstream(e.to_string()),
            BillingError::Pledge(inner) => return pledge_error(inner, e.to_string()),
            BillingError::Store(_) => ApiError::Internal(e.to_string()),
        }
    }
}

fn pledge_error(inner: &PledgeError, msg: String) -> ApiError {
    match inner {
        PledgeError::NotFound(_) => ApiError::NotFound(msg),
        PledgeError::DuplicatePledge | PledgeError::InvalidTransition { .. } => ApiError::Conflict(msg),
        PledgeError::InvalidQuantity(_) => ApiError::Validation(msg),
        PledgeError::Storage(_) => ApiError::Internal(msg),
    }
}

impl From<PledgeError> for ApiError {
    fn from(e: PledgeError) -> Self {
        let msg = e.to_string();
        pledge_error(&e, msg)
    }
}

impl From<CampaignError> for ApiError {
    fn from(e: CampaignError) -> Self {
        match &e {
            CampaignError::NotFound(_) => ApiError::NotFound(e.to_string()),
            CampaignError::InvalidTransition { .. } | CampaignError::BracketsImmutable => {
                ApiError::Conflict(e.to_string())
            }
            CampaignError::InvalidBrackets(_) => ApiError::Validation(e.to_string()),
            CampaignError::Storage(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<agora_campaign::PricingError> for ApiError {
    fn from(e: agora_campaign::PricingError) -> Self {
        match e {
            agora_campaign::PricingError::NoPricingAvailable => ApiError::NotFound(e.to_string()),
            agora_campaign::PricingError::MalformedBrackets(_) => ApiError::Validation(e.to_string()),
        }
    }
}
