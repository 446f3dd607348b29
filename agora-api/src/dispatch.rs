use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use agora_core::collab::{
    Notification, NotificationDispatcher, OrderMaterializer, OrderRef, PaidPledgeContext,
};
use agora_core::CoreError;
use agora_shared::models::events::PaymentSucceededEvent;
use agora_store::events::{topics, EventProducer};

/// Publishes `billing.payment.succeeded`; the fulfillment service consumes
/// the topic and builds the order, which keeps billing free of a dependency
/// on order internals.
pub struct KafkaOrderMaterializer {
    producer: Arc<EventProducer>,
}

impl KafkaOrderMaterializer {
    pub fn new(producer: Arc<EventProducer>) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl OrderMaterializer for KafkaOrderMaterializer {
    async fn create_order_from_payment(&self, context: &PaidPledgeContext) -> Result<OrderRef, CoreError> {
        let order_id = Uuid::new_v4();
        let event = PaymentSucceededEvent {
            payment_id: context.payment_id,
            invoice_id: context.invoice_id,
            pledge_id: context.pledge_id,
            campaign_id: context.campaign_id,
            buyer_org_id: context.buyer_org_id,
            amount: context.amount.to_string(),
            timestamp: Utc::now().timestamp(),
        };
        self.producer
            .publish_event(topics::PAYMENT_SUCCEEDED, &context.payment_id.to_string(), &event)
            .await
            .map_err(|e| CoreError::DispatchError(e.to_string()))?;
        Ok(OrderRef { order_id })
    }
}

/// Hands notifications to the notification service via Kafka
pub struct KafkaNotifier {
    producer: Arc<EventProducer>,
}

impl KafkaNotifier {
    pub fn new(producer: Arc<EventProducer>) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl NotificationDispatcher for KafkaNotifier {
    async fn send(&self, notification: Notification) -> Result<(), CoreError> {
        let payload = serde_json::json!({
            "kind": format!("{:?}", notification.kind),
            "recipient_org_id": notification.recipient_org_id,
            "recipient_email": notification.recipient_email.map(|m| m.into_inner()),
            "subject": notification.subject,
            "body": notification.body,
        });
        self.producer
            .publish(
                topics::NOTIFY_REQUESTED,
                &notification.recipient_org_id.to_string(),
                &payload.to_string(),
            )
            .await
            .map_err(|e| CoreError::DispatchError(e.to_string()))
    }
}
