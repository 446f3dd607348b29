use chrono::Utc;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use agora_billing::PaymentProcessor;
use agora_shared::models::events::OverdueSweepEvent;
use agora_store::events::{topics, EventProducer};

/// Periodic sweep turning past-due SENT invoices OVERDUE.
///
/// Runs on a timer outside the request threads; the sweep itself is
/// idempotent, so an extra tick after a deploy overlap is harmless.
pub async fn start_overdue_worker(
    processor: Arc<PaymentProcessor>,
    kafka: Arc<EventProducer>,
    every: Duration,
) {
    let mut ticker = interval(every);
    info!("Overdue sweep worker started ({}s interval)", every.as_secs());

    loop {
        ticker.tick().await;
        let today = Utc::now().date_naive();

        match processor.mark_overdue_invoices(today).await {
            Ok(0) => {}
            Ok(count) => {
                let event = OverdueSweepEvent {
                    count,
                    swept_on: today.to_string(),
                    timestamp: Utc::now().timestamp(),
                };
                if let Err(e) = kafka
                    .publish_event(topics::INVOICE_OVERDUE, &today.to_string(), &event)
                    .await
                {
                    error!("Overdue sweep event not published: {}", e);
                }
            }
            Err(e) => error!("Overdue sweep failed: {}", e),
        }
    }
}
