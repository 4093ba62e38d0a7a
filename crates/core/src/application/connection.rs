// Broker Connection Manager
use crate::application::worker::constants::{DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_BACKOFF};
use crate::error::{AppError, Result};
use crate::port::{BrokerConnection, BrokerConnector};
use std::time::Duration;
use tracing::{info, warn};

/// Connect retry policy: fixed attempts with a fixed sleep between them
#[derive(Debug, Clone, Copy)]
pub struct ConnectPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_CONNECT_ATTEMPTS,
            backoff: DEFAULT_CONNECT_BACKOFF,
        }
    }
}

/// Open a connection, retrying up to `policy.max_attempts` times
///
/// # Errors
/// - AppError::Broker with the last failure once attempts are exhausted
pub async fn connect_with_retry(
    connector: &dyn BrokerConnector,
    policy: ConnectPolicy,
) -> Result<Box<dyn BrokerConnection>> {
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match connector.connect().await {
            Ok(conn) => {
                if attempt > 1 {
                    info!(attempt, "Broker connection established after retry");
                }
                return Ok(conn);
            }
            Err(e) => {
                warn!(attempt, max_attempts = attempts, error = %e, "Broker connection failed");
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }

    Err(AppError::Broker(format!(
        "could not connect after {} attempts: {}",
        attempts,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}
