// NATS JetStream broker connection

use crate::config::NatsConfig;
use crate::delivery::NatsDeliveryStream;
use crate::error::broker_error;
use crate::mapping::{consumer_config, publish_subject, storage_for, stream_config, stream_name};
use async_nats::jetstream;
use async_nats::HeaderMap;
use async_trait::async_trait;
use smartsearch_core::domain::{Envelope, QueueSpec};
use smartsearch_core::error::{AppError, Result};
use smartsearch_core::port::{BrokerConnection, BrokerConnector, DeliveryStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_DELIVERY_MODE: &str = "Delivery-Mode";
pub const HEADER_CORRELATION_ID: &str = "Correlation-Id";

/// AMQP-style delivery modes carried in the Delivery-Mode header
pub const DELIVERY_MODE_TRANSIENT: &str = "1";
pub const DELIVERY_MODE_PERSISTENT: &str = "2";

/// Opens one NATS client per `connect` call
#[derive(Debug, Clone)]
pub struct NatsConnector {
    config: NatsConfig,
}

impl NatsConnector {
    pub fn new(config: NatsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NatsConfig {
        &self.config
    }
}

#[async_trait]
impl BrokerConnector for NatsConnector {
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>> {
        let client = async_nats::ConnectOptions::new()
            .name(&self.config.connection_name)
            .ping_interval(self.config.ping_interval)
            .request_timeout(Some(self.config.request_timeout))
            .connect(self.config.url.as_str())
            .await
            .map_err(broker_error("connect"))?;

        info!(url = %self.config.url, "Connected to NATS");
        Ok(Box::new(NatsConnection::new(client, self.config.ack_wait)))
    }
}

/// One NATS client plus its JetStream context
pub struct NatsConnection {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    ack_wait: Duration,
    closed: AtomicBool,
}

impl NatsConnection {
    pub fn new(client: async_nats::Client, ack_wait: Duration) -> Self {
        let jetstream = jetstream::new(client.clone());
        Self {
            client,
            jetstream,
            ack_wait,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::Broker("connection is closed".to_string()));
        }
        Ok(())
    }
}

pub(crate) fn envelope_headers(envelope: &Envelope) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(HEADER_CONTENT_TYPE, envelope.content_type.as_str());
    headers.insert(
        HEADER_DELIVERY_MODE,
        if envelope.persistent {
            DELIVERY_MODE_PERSISTENT
        } else {
            DELIVERY_MODE_TRANSIENT
        },
    );
    if let Some(correlation_id) = &envelope.correlation_id {
        headers.insert(HEADER_CORRELATION_ID, correlation_id.as_str());
    }
    headers
}

#[async_trait]
impl BrokerConnection for NatsConnection {
    async fn declare_queue(&self, queue: &QueueSpec) -> Result<()> {
        self.ensure_open()?;
        let desired = stream_config(queue);

        let stream = self
            .jetstream
            .get_or_create_stream(desired.clone())
            .await
            .map_err(broker_error("declare stream"))?;

        let existing = &stream.cached_info().config;
        if existing.storage != storage_for(queue) {
            return Err(AppError::TopologyConflict(format!(
                "queue '{}' exists with durable={}, requested durable={}",
                queue.name,
                !queue.durable,
                queue.durable
            )));
        }

        // A binding added after the stream was first created
        let missing: Vec<&String> = desired
            .subjects
            .iter()
            .filter(|s| !existing.subjects.contains(s))
            .collect();
        if !missing.is_empty() {
            let mut updated = existing.clone();
            updated.subjects.extend(missing.into_iter().cloned());
            self.jetstream
                .update_stream(&updated)
                .await
                .map_err(broker_error("bind stream"))?;
        }

        debug!(queue = %queue.name, stream = %desired.name, "Queue declared");
        Ok(())
    }

    async fn publish(&self, queue: &str, envelope: &Envelope) -> Result<()> {
        self.ensure_open()?;
        let subject = publish_subject(queue);

        let ack = self
            .jetstream
            .publish_with_headers(
                subject.clone(),
                envelope_headers(envelope),
                envelope.payload.clone().into(),
            )
            .await
            .map_err(broker_error("publish"))?;

        // Stored by the stream, not just sent
        ack.await.map_err(broker_error("publish ack"))?;

        debug!(queue, subject = %subject, "Published to JetStream");
        Ok(())
    }

    async fn consume(
        &self,
        queue: &QueueSpec,
        consumer: &str,
        prefetch: u16,
    ) -> Result<Box<dyn DeliveryStream>> {
        self.ensure_open()?;
        let stream = self
            .jetstream
            .get_stream(stream_name(&queue.name))
            .await
            .map_err(broker_error("get stream"))?;

        let pull_consumer = stream
            .get_or_create_consumer(consumer, consumer_config(consumer, prefetch, self.ack_wait))
            .await
            .map_err(broker_error("create consumer"))?;

        // An existing durable consumer keeps the ack wait it was created with
        let existing_wait = pull_consumer.cached_info().config.ack_wait;
        if existing_wait != self.ack_wait {
            warn!(
                queue = %queue.name,
                consumer,
                existing_secs = existing_wait.as_secs(),
                requested_secs = self.ack_wait.as_secs(),
                "Durable consumer has a different ack wait; delete it to apply the new value"
            );
        }

        let messages = pull_consumer
            .messages()
            .await
            .map_err(broker_error("open consumer"))?;

        info!(
            queue = %queue.name,
            consumer,
            prefetch,
            ack_wait_secs = self.ack_wait.as_secs(),
            "Consumer attached"
        );
        Ok(Box::new(NatsDeliveryStream::new(queue.name.clone(), messages)))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // Unacked messages are redelivered by the server once ack_wait expires
        self.client.flush().await.map_err(broker_error("flush"))?;
        debug!("NATS connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_carry_envelope_metadata() {
        let envelope = Envelope::json(b"{}".to_vec(), Some("42".to_string()));
        let headers = envelope_headers(&envelope);
        assert_eq!(
            headers.get(HEADER_CONTENT_TYPE).map(|v| v.as_str()),
            Some("application/json")
        );
        assert_eq!(
            headers.get(HEADER_DELIVERY_MODE).map(|v| v.as_str()),
            Some(DELIVERY_MODE_PERSISTENT)
        );
        assert_eq!(
            headers.get(HEADER_CORRELATION_ID).map(|v| v.as_str()),
            Some("42")
        );
    }

    #[test]
    fn test_headers_without_correlation() {
        let mut envelope = Envelope::json(b"{}".to_vec(), None);
        envelope.persistent = false;
        let headers = envelope_headers(&envelope);
        assert!(headers.get(HEADER_CORRELATION_ID).is_none());
        assert_eq!(
            headers.get(HEADER_DELIVERY_MODE).map(|v| v.as_str()),
            Some(DELIVERY_MODE_TRANSIENT)
        );
    }
}
