// Stage Producer
use crate::application::connection::{connect_with_retry, ConnectPolicy};
use crate::domain::{Envelope, QueueSpec};
use crate::error::Result;
use crate::port::BrokerConnector;
use std::sync::Arc;
use tracing::{debug, warn};

/// Publishes envelopes over short-lived connections
///
/// The stage's consuming connection is never reused for outbound messages.
#[derive(Clone)]
pub struct StageProducer {
    connector: Arc<dyn BrokerConnector>,
    policy: ConnectPolicy,
}

impl StageProducer {
    pub fn new(connector: Arc<dyn BrokerConnector>, policy: ConnectPolicy) -> Self {
        Self { connector, policy }
    }

    /// Declare `queue` (idempotent) and publish the envelope to it
    ///
    /// Failures are returned to the caller, never swallowed.
    pub async fn publish(&self, queue: &QueueSpec, envelope: &Envelope) -> Result<()> {
        let conn = connect_with_retry(self.connector.as_ref(), self.policy).await?;

        let result = async {
            conn.declare_queue(queue).await?;
            conn.publish(&queue.name, envelope).await
        }
        .await;

        if let Err(e) = conn.close().await {
            warn!(queue = %queue.name, error = %e, "Closing producer connection failed");
        }

        if result.is_ok() {
            debug!(
                queue = %queue.name,
                correlation_id = envelope.correlation_id.as_deref().unwrap_or("-"),
                bytes = envelope.payload.len(),
                "Envelope published"
            );
        }
        result
    }
}
