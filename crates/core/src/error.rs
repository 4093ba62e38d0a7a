// Central Error Type for the Pipeline

use thiserror::Error;

/// Application-level error type
///
/// Every adapter maps its native errors into one of these variants so the
/// failure classifier can decide ack/nack without knowing the adapter.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    /// Payload bytes are not a JSON object (inbound message or collaborator output)
    #[error("Decode error: {0}")]
    Decode(String),

    /// Payload decoded but violates the schema of the current stage
    #[error("Validation error: {0}")]
    Validation(String),

    /// Connection refused, timeout, reset while talking to a collaborator
    #[error("Network error: {0}")]
    Network(String),

    /// Collaborator answered with a non-success HTTP status
    #[error("Upstream returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    /// AI collaborator answered without any content
    #[error("Empty completion: {0}")]
    EmptyCompletion(String),

    /// Missing credential or configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    /// Connection, channel or publish failure on the broker
    #[error("Broker error: {0}")]
    Broker(String),

    /// A queue already exists with a conflicting declaration
    #[error("Queue topology conflict: {0}")]
    TopologyConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx / async-nats / reqwest conversions live in the adapter crates
// (orphan rule), each mapping into the variants above.
