use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

pub mod topics {
    pub const CAMPAIGN_LOCKED: &str = "campaign.locked";
    pub const INVOICE_ISSUED: &str = "billing.invoice.issued";
    pub const INVOICE_OVERDUE: &str = "billing.invoice.overdue";
    pub const PAYMENT_SUCCEEDED: &str = "billing.payment.succeeded";
    pub const NOTIFY_REQUESTED: &str = "notify.requested";
}

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                let partition = delivery.partition;
                let offset = delivery.offset;
                info!("Sent message to {}/{}: partition {} offset {}", topic, key, partition, offset);
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }

    /// Serialize and publish a domain event
    pub async fn publish_event<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        event: &T,
    ) -> Result<(), rdkafka::error::KafkaError> {
        match serde_json::to_string(event) {
            Ok(payload) => self.publish(topic, key, &payload).await,
            Err(e) => {
                error!("Failed to serialize event for {}: {}", topic, e);
                Ok(())
            }
        }
    }
}
