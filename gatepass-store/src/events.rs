use serde::Serialize;
use tracing::info;

#[cfg(feature = "kafka")]
use rdkafka::config::ClientConfig;
#[cfg(feature = "kafka")]
use rdkafka::producer::{FutureProducer, FutureRecord};
#[cfg(feature = "kafka")]
use rdkafka::util::Timeout;
#[cfg(feature = "kafka")]
use std::time::Duration;
#[cfg(feature = "kafka")]
use tracing::error;

pub const TOPIC_TICKET_RESERVED: &str = "tickets.reserved";
pub const TOPIC_TICKET_CHECKED_IN: &str = "tickets.checked_in";
pub const TOPIC_NOTICE_PUBLISHED: &str = "broadcasts.published";

#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Outbound domain event stream.
///
/// Without the `kafka` feature (or without brokers) events are only logged.
#[derive(Clone)]
pub enum EventProducer {
    Log,
    #[cfg(feature = "kafka")]
    Kafka(FutureProducer),
}

impl EventProducer {
    pub fn logging() -> Self {
        EventProducer::Log
    }

    #[cfg(feature = "kafka")]
    pub fn kafka(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(EventProducer::Kafka(producer))
    }

    pub async fn publish_json<T: Serialize>(&self, topic: &str, key: &str, event: &T) -> Result<(), ProducerError> {
        let payload = serde_json::to_string(event)?;
        self.publish(topic, key, &payload).await
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), ProducerError> {
        match self {
            EventProducer::Log => {
                info!(topic, key, payload, "Domain event");
                Ok(())
            }
            #[cfg(feature = "kafka")]
            EventProducer::Kafka(producer) => {
                let record = FutureRecord::to(topic).key(key).payload(payload);

                match producer.send(record, Timeout::After(Duration::from_secs(0))).await {
                    Ok(delivery) => {
                        info!(
                            "Sent message to {}/{}: partition {} offset {}",
                            topic, key, delivery.partition, delivery.offset
                        );
                        Ok(())
                    }
                    Err((e, _msg)) => {
                        error!("Failed to send message to {}: {}", topic, e);
                        Err(ProducerError::Delivery(e.to_string()))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logging_producer_accepts_events() {
        let producer = EventProducer::logging();
        let result = producer
            .publish_json(TOPIC_TICKET_RESERVED, "t-1", &serde_json::json!({ "ticket_id": "t-1" }))
            .await;
        assert!(result.is_ok());
    }
}
