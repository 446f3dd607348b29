use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Supported online payment providers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentProvider {
    Mock,
    Stripe,
}

impl PaymentProvider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Some(PaymentProvider::Mock),
            "stripe" => Some(PaymentProvider::Stripe),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Mock => "mock",
            PaymentProvider::Stripe => "stripe",
        }
    }
}

/// Status as reported by the provider, before mapping to local payment state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayPaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
    Expired,
}

/// Request to open a hosted checkout session with the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub payment_id: Uuid,
    pub invoice_number: String,
    pub amount: Decimal,
    pub currency: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub checkout_id: String,
    pub redirect_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Parsed, signature-verified webhook notification
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub checkout_id: String,
    pub status: GatewayPaymentStatus,
    pub provider_transaction_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Checkout creation failed: {0}")]
    CheckoutFailed(String),

    #[error("Status lookup failed for checkout {0}")]
    StatusLookupFailed(String),

    #[error("Gateway call timed out")]
    Timeout,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("No gateway registered for provider {0}")]
    UnsupportedProvider(String),
}

/// Uniform capability interface over provider-specific payment APIs.
///
/// Implementations must bound every network call with a timeout so a slow
/// provider surfaces as `GatewayError::Timeout` instead of hanging the
/// request thread.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted checkout session for the given payment attempt
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError>;

    /// Fetch the authoritative status of a checkout from the provider
    async fn get_payment_status(&self, checkout_id: &str) -> Result<GatewayPaymentStatus, GatewayError>;

    /// Check the webhook signature against the shared secret
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool;

    /// Parse a raw webhook body into a provider-neutral event
    fn parse_webhook_payload(&self, payload: &[u8]) -> Result<WebhookEvent, GatewayError>;
}

/// Factory keyed on `PaymentProvider`, avoids inheritance-style dispatch
pub struct GatewayRegistry {
    gateways: HashMap<PaymentProvider, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self {
            gateways: HashMap::new(),
        }
    }

    pub fn register(mut self, provider: PaymentProvider, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(provider, gateway);
        self
    }

    pub fn get(&self, provider: PaymentProvider) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        self.gateways
            .get(&provider)
            .cloned()
            .ok_or_else(|| GatewayError::UnsupportedProvider(provider.as_str().to_string()))
    }
}

impl Default for GatewayRegistry {
    fn default() -> Self {
        Self::new()
    }
}
