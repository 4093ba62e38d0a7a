// Message Envelope Domain Model

use super::queue::QueueSpec;

/// Content type of every pipeline payload
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Serialized message body exchanged over the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub payload: Vec<u8>,
    pub content_type: String,
    /// Survive broker restarts
    pub persistent: bool,
    /// User id when known
    pub correlation_id: Option<String>,
}

impl Envelope {
    /// Persistent JSON envelope
    pub fn json(payload: Vec<u8>, correlation_id: Option<String>) -> Self {
        Self {
            payload,
            content_type: JSON_CONTENT_TYPE.to_string(),
            persistent: true,
            correlation_id,
        }
    }

    /// Payload prefix for log lines (lossy UTF-8, bounded by chars)
    pub fn excerpt(&self, max_chars: usize) -> String {
        let text = String::from_utf8_lossy(&self.payload);
        let mut excerpt: String = text.chars().take(max_chars).collect();
        if text.chars().count() > max_chars {
            excerpt.push_str("...");
        }
        excerpt
    }
}

/// Broker handle for one delivered message, valid only within its connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryTag(pub u64);

impl std::fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Envelope addressed to a queue, produced by a stage handler
#[derive(Debug, Clone)]
pub struct Outbound {
    pub queue: QueueSpec,
    pub envelope: Envelope,
    /// Published after the ack; a failure is logged and never requeues the input
    pub best_effort: bool,
}

impl Outbound {
    /// Handoff the input message cannot be acked without
    pub fn new(queue: QueueSpec, envelope: Envelope) -> Self {
        Self {
            queue,
            envelope,
            best_effort: false,
        }
    }

    /// Informational message, sent once the handoffs are secured
    pub fn notice(queue: QueueSpec, envelope: Envelope) -> Self {
        Self {
            queue,
            envelope,
            best_effort: true,
        }
    }
}
