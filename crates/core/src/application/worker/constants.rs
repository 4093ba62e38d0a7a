// Stage pipeline constants (no magic values)
use std::time::Duration;

/// Broker connect attempts before giving up on one loop iteration
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;

/// Fixed sleep between connect attempts (5s)
pub const DEFAULT_CONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Sleep after a connection-level failure before reconnecting (10s)
pub const DEFAULT_RECONNECT_COOLDOWN: Duration = Duration::from_secs(10);

/// Broker heartbeat interval (600s)
pub const BROKER_HEARTBEAT: Duration = Duration::from_secs(600);

/// Broker blocked-connection timeout (300s)
pub const BROKER_BLOCKED_TIMEOUT: Duration = Duration::from_secs(300);

/// Time the broker waits for an ack before redelivering (300s)
pub const DELIVERY_ACK_WAIT: Duration = Duration::from_secs(300);

/// Progress signal cadence while a message is in Handling; well under the ack wait
pub const DELIVERY_PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// Products collected per search term unless the request overrides it
pub const DEFAULT_MAX_PRODUCTS_PER_SEARCH: usize = 3;

/// Fetch attempts per result page
pub const PAGE_FETCH_ATTEMPTS: u32 = 3;

/// Upper bound on pages walked per search term
pub const MAX_PAGES_PER_SEARCH: u32 = 20;

/// Search terms the AI prompt asks for
pub const MIN_SEARCH_TERMS: usize = 10;
pub const MAX_SEARCH_TERMS: usize = 12;

/// Characters of payload included in drop logs
pub const PAYLOAD_EXCERPT_CHARS: usize = 200;

/// Graceful process shutdown timeout (5 seconds)
pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
