use std::sync::Arc;

use agora_billing::{InvoiceGenerator, PaymentProcessor};
use agora_campaign::CampaignStore;
use agora_pledge::PledgeStore;
use agora_store::EventProducer;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub campaigns: Arc<dyn CampaignStore>,
    pub pledges: Arc<dyn PledgeStore>,
    pub generator: Arc<InvoiceGenerator>,
    pub processor: Arc<PaymentProcessor>,
    pub kafka: Arc<EventProducer>,
    pub metrics: Arc<Metrics>,
}
