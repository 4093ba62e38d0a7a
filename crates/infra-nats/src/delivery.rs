// JetStream delivery stream and acker

use crate::connection::{
    DELIVERY_MODE_TRANSIENT, HEADER_CONTENT_TYPE, HEADER_CORRELATION_ID, HEADER_DELIVERY_MODE,
};
use crate::error::broker_error;
use async_nats::jetstream::{self, consumer::pull};
use async_nats::HeaderMap;
use async_trait::async_trait;
use futures::StreamExt;
use smartsearch_core::domain::{DeliveryTag, Envelope, JSON_CONTENT_TYPE};
use smartsearch_core::error::Result;
use smartsearch_core::port::{Delivery, DeliveryAcker, DeliveryStream};
use std::pin::Pin;
use tracing::{debug, warn};

/// Pull-consumer messages turned into core deliveries
pub struct NatsDeliveryStream {
    queue: String,
    messages: Pin<Box<pull::Stream>>,
}

impl NatsDeliveryStream {
    pub fn new(queue: String, messages: pull::Stream) -> Self {
        Self {
            queue,
            messages: Box::pin(messages),
        }
    }
}

#[async_trait]
impl DeliveryStream for NatsDeliveryStream {
    async fn next(&mut self) -> Result<Option<Delivery>> {
        let Some(message) = self.messages.next().await else {
            warn!(queue = %self.queue, "Consumer stream ended");
            return Ok(None);
        };
        let message = message.map_err(broker_error("receive"))?;

        let (tag, redelivered) = {
            let info = message.info().map_err(broker_error("message info"))?;
            (DeliveryTag(info.stream_sequence), info.delivered > 1)
        };
        let envelope = envelope_from(message.payload.to_vec(), message.headers.as_ref());

        debug!(queue = %self.queue, delivery_tag = %tag, redelivered, "Message received");
        Ok(Some(Delivery::new(
            tag,
            envelope,
            redelivered,
            Box::new(NatsAcker { message }),
        )))
    }
}

/// Rebuild the envelope metadata from message headers
pub(crate) fn envelope_from(payload: Vec<u8>, headers: Option<&HeaderMap>) -> Envelope {
    let header = |name: &str| {
        headers
            .and_then(|h| h.get(name))
            .map(|v| v.as_str().to_string())
    };

    Envelope {
        payload,
        content_type: header(HEADER_CONTENT_TYPE).unwrap_or_else(|| JSON_CONTENT_TYPE.to_string()),
        persistent: header(HEADER_DELIVERY_MODE).as_deref() != Some(DELIVERY_MODE_TRANSIENT),
        correlation_id: header(HEADER_CORRELATION_ID),
    }
}

struct NatsAcker {
    message: jetstream::Message,
}

#[async_trait]
impl DeliveryAcker for NatsAcker {
    async fn ack(self: Box<Self>) -> Result<()> {
        self.message.ack().await.map_err(broker_error("ack"))
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<()> {
        // Term removes the message for good; Nak schedules a redelivery
        let kind = if requeue {
            jetstream::AckKind::Nak(None)
        } else {
            jetstream::AckKind::Term
        };
        self.message
            .ack_with(kind)
            .await
            .map_err(broker_error("nack"))
    }

    async fn in_progress(&self) -> Result<()> {
        self.message
            .ack_with(jetstream::AckKind::Progress)
            .await
            .map_err(broker_error("progress"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_CONTENT_TYPE, "application/json");
        headers.insert(HEADER_DELIVERY_MODE, "2");
        headers.insert(HEADER_CORRELATION_ID, "9");

        let envelope = envelope_from(b"{\"user_id\":9}".to_vec(), Some(&headers));
        assert_eq!(envelope.correlation_id.as_deref(), Some("9"));
        assert!(envelope.persistent);
        assert_eq!(envelope.payload, b"{\"user_id\":9}");
    }

    #[test]
    fn test_envelope_without_headers_defaults_to_persistent_json() {
        let envelope = envelope_from(b"{}".to_vec(), None);
        assert_eq!(envelope.content_type, JSON_CONTENT_TYPE);
        assert!(envelope.persistent);
        assert!(envelope.correlation_id.is_none());

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_DELIVERY_MODE, DELIVERY_MODE_TRANSIENT);
        assert!(!envelope_from(Vec::new(), Some(&headers)).persistent);
    }
}
