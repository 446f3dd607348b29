use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

use agora_core::gateway::{
    CheckoutRequest, CheckoutSession, GatewayError, GatewayPaymentStatus, PaymentGateway, WebhookEvent,
};

#[derive(Debug, Deserialize)]
struct MockWebhookPayload {
    checkout_id: String,
    status: GatewayPaymentStatus,
    transaction_id: Option<String>,
}

#[derive(Default)]
struct MockState {
    fail_on_create: bool,
    statuses: HashMap<String, GatewayPaymentStatus>,
    /// Provider-side idempotency: one session per key
    sessions: HashMap<String, CheckoutSession>,
}

/// Deterministic in-process gateway for tests and local development.
///
/// Checkout state lives in memory; tests drive outcomes with
/// `complete_checkout` and `set_fail_on_create`. Webhook signatures are
/// SHA-256 over secret + payload, matching what `sign_payload` produces.
pub struct MockGateway {
    secret: String,
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Make the next `create_checkout` calls fail, for outage simulation
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.lock().unwrap().fail_on_create = fail;
    }

    /// Record the provider-side outcome of a checkout
    pub fn complete_checkout(&self, checkout_id: &str, status: GatewayPaymentStatus) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(checkout_id.to_string(), status);
    }

    /// Produce a valid signature for a webhook body
    pub fn sign_payload(&self, payload: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(payload);
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_on_create {
            return Err(GatewayError::CheckoutFailed("simulated gateway outage".to_string()));
        }

        if let Some(existing) = state.sessions.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }

        let checkout_id = format!("mock_co_{}", request.payment_id.simple());
        state.statuses.insert(checkout_id.clone(), GatewayPaymentStatus::Pending);
        let session = CheckoutSession {
            redirect_url: format!("https://checkout.mock.invalid/{}", checkout_id),
            checkout_id,
            expires_at: Utc::now() + Duration::minutes(30),
        };
        state
            .sessions
            .insert(request.idempotency_key.clone(), session.clone());

        Ok(session)
    }

    async fn get_payment_status(&self, checkout_id: &str) -> Result<GatewayPaymentStatus, GatewayError> {
        let state = self.state.lock().unwrap();
        state
            .statuses
            .get(checkout_id)
            .copied()
            .ok_or_else(|| GatewayError::StatusLookupFailed(checkout_id.to_string()))
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        self.sign_payload(payload) == signature
    }

    fn parse_webhook_payload(&self, payload: &[u8]) -> Result<WebhookEvent, GatewayError> {
        let parsed: MockWebhookPayload =
            serde_json::from_slice(payload).map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;
        Ok(WebhookEvent {
            checkout_id: parsed.checkout_id,
            status: parsed.status,
            provider_transaction_id: parsed.transaction_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            payment_id: Uuid::new_v4(),
            invoice_number: "AGR-202507-0001".to_string(),
            amount: dec!(2856),
            currency: "EUR".to_string(),
            idempotency_key: "key".to_string(),
        }
    }

    #[tokio::test]
    async fn checkout_roundtrip() {
        let gateway = MockGateway::new("whsec_test");
        let session = gateway.create_checkout(&request()).await.unwrap();

        assert_eq!(
            gateway.get_payment_status(&session.checkout_id).await.unwrap(),
            GatewayPaymentStatus::Pending
        );

        gateway.complete_checkout(&session.checkout_id, GatewayPaymentStatus::Succeeded);
        assert_eq!(
            gateway.get_payment_status(&session.checkout_id).await.unwrap(),
            GatewayPaymentStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn scripted_outage_fails_checkout() {
        let gateway = MockGateway::new("whsec_test");
        gateway.set_fail_on_create(true);
        assert!(matches!(
            gateway.create_checkout(&request()).await,
            Err(GatewayError::CheckoutFailed(_))
        ));
    }

    #[test]
    fn signature_verification() {
        let gateway = MockGateway::new("whsec_test");
        let payload = br#"{"checkout_id":"mock_co_1","status":"SUCCEEDED"}"#;
        let signature = gateway.sign_payload(payload);

        assert!(gateway.verify_webhook_signature(payload, &signature));
        assert!(!gateway.verify_webhook_signature(payload, "deadbeef"));
    }

    #[test]
    fn parses_webhook_payload() {
        let gateway = MockGateway::new("whsec_test");
        let payload = br#"{"checkout_id":"mock_co_1","status":"FAILED","transaction_id":"txn_9"}"#;
        let event = gateway.parse_webhook_payload(payload).unwrap();
        assert_eq!(event.checkout_id, "mock_co_1");
        assert_eq!(event.status, GatewayPaymentStatus::Failed);
        assert_eq!(event.provider_transaction_id.as_deref(), Some("txn_9"));

        assert!(gateway.parse_webhook_payload(b"not json").is_err());
    }
}
