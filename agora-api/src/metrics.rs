use axum::extract::State;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

use crate::state::AppState;

pub struct Metrics {
    registry: Registry,
    pub invoices_generated: IntCounter,
    pub payments_initiated: IntCounter,
    pub payments_succeeded: IntCounter,
    pub webhooks_rejected: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let invoices_generated =
            IntCounter::new("agora_invoices_generated_total", "Invoices generated").unwrap();
        let payments_initiated =
            IntCounter::new("agora_payments_initiated_total", "Online payments initiated").unwrap();
        let payments_succeeded =
            IntCounter::new("agora_payments_succeeded_total", "Payments reconciled as succeeded").unwrap();
        let webhooks_rejected =
            IntCounter::new("agora_webhooks_rejected_total", "Webhooks with invalid signatures").unwrap();

        registry.register(Box::new(invoices_generated.clone())).unwrap();
        registry.register(Box::new(payments_initiated.clone())).unwrap();
        registry.register(Box::new(payments_succeeded.clone())).unwrap();
        registry.register(Box::new(webhooks_rejected.clone())).unwrap();

        Self {
            registry,
            invoices_generated,
            payments_initiated,
            payments_succeeded,
            webhooks_rejected,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// GET /metrics
pub async fn render_metrics(State(state): State<AppState>) -> String {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
