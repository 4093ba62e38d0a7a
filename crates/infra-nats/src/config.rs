/// NATS connection settings
use smartsearch_core::application::worker::constants::{
    BROKER_BLOCKED_TIMEOUT, BROKER_HEARTBEAT, DELIVERY_ACK_WAIT,
};
use std::time::Duration;

pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";

#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub url: String,
    /// Client name shown in server monitoring
    pub connection_name: String,
    /// Liveness ping interval (broker heartbeat)
    pub ping_interval: Duration,
    /// Upper bound for any request/ack round trip before the connection is considered blocked
    pub request_timeout: Duration,
    /// Redelivery timeout for unresolved deliveries on stage consumers
    pub ack_wait: Duration,
}

impl NatsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_connection_name(mut self, name: impl Into<String>) -> Self {
        self.connection_name = name.into();
        self
    }

    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_NATS_URL.to_string(),
            connection_name: "smartsearch".to_string(),
            ping_interval: BROKER_HEARTBEAT,
            request_timeout: BROKER_BLOCKED_TIMEOUT,
            ack_wait: DELIVERY_ACK_WAIT,
        }
    }
}
