// Message Broker Port
// Abstraction over the durable broker: connections, queue declaration,
// publishing and single-consumer delivery streams

use crate::domain::{DeliveryTag, Envelope, QueueSpec};
use crate::error::Result;
use async_trait::async_trait;

/// Opens broker connections
///
/// Stage consumers open one connection per consume-loop iteration; the
/// producer opens a short-lived one per outbound publish.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>>;
}

/// One open broker connection (never shared across stages)
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Declare a queue; no-op if it already exists with a matching declaration
    ///
    /// # Errors
    /// - AppError::TopologyConflict if the existing queue has a different durability
    async fn declare_queue(&self, queue: &QueueSpec) -> Result<()>;

    /// Publish an envelope to a declared queue
    async fn publish(&self, queue: &str, envelope: &Envelope) -> Result<()>;

    /// Start consuming a queue with at most `prefetch` unresolved deliveries
    async fn consume(
        &self,
        queue: &QueueSpec,
        consumer: &str,
        prefetch: u16,
    ) -> Result<Box<dyn DeliveryStream>>;

    /// Close the connection; unresolved deliveries go back to the broker
    async fn close(&self) -> Result<()>;
}

/// Blocking source of deliveries for one consumer
#[async_trait]
pub trait DeliveryStream: Send {
    /// Wait for the next delivery
    ///
    /// Returns Ok(None) when the broker cancelled the consumer and
    /// Err on connection-level failures.
    async fn next(&mut self) -> Result<Option<Delivery>>;
}

/// Resolves a delivery tag on the broker
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    async fn ack(self: Box<Self>) -> Result<()>;
    async fn nack(self: Box<Self>, requeue: bool) -> Result<()>;

    /// Tell the broker the delivery is still being handled (resets its redelivery timer)
    async fn in_progress(&self) -> Result<()>;
}

/// One delivered message
///
/// `ack` and `nack` consume the delivery, so a tag is resolved exactly once.
pub struct Delivery {
    pub tag: DeliveryTag,
    pub envelope: Envelope,
    pub redelivered: bool,
    acker: Box<dyn DeliveryAcker>,
}

impl Delivery {
    pub fn new(
        tag: DeliveryTag,
        envelope: Envelope,
        redelivered: bool,
        acker: Box<dyn DeliveryAcker>,
    ) -> Self {
        Self {
            tag,
            envelope,
            redelivered,
            acker,
        }
    }

    pub async fn ack(self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn nack(self, requeue: bool) -> Result<()> {
        self.acker.nack(requeue).await
    }

    pub async fn in_progress(&self) -> Result<()> {
        self.acker.in_progress().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("tag", &self.tag)
            .field("envelope", &self.envelope)
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

// ============================================================================
// In-Memory Broker for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::watch;

    /// Everything observable that happened on the broker, in order
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum JournalEntry {
        Published {
            queue: String,
            correlation_id: Option<String>,
        },
        Delivered {
            queue: String,
            tag: DeliveryTag,
            redelivered: bool,
        },
        Acked {
            queue: String,
            tag: DeliveryTag,
        },
        InProgress {
            queue: String,
            tag: DeliveryTag,
        },
        Nacked {
            queue: String,
            tag: DeliveryTag,
            requeue: bool,
        },
        /// Free-form marker written by tests or test handlers
        Note(String),
    }

    #[derive(Clone)]
    struct StoredMessage {
        envelope: Envelope,
        redelivered: bool,
    }

    struct QueueState {
        durable: bool,
        ready: VecDeque<StoredMessage>,
    }

    struct InFlight {
        queue: String,
        connection: u64,
        consumer: u64,
        message: StoredMessage,
    }

    #[derive(Default)]
    struct BrokerState {
        queues: HashMap<String, QueueState>,
        in_flight: HashMap<DeliveryTag, InFlight>,
        next_tag: u64,
        next_id: u64,
        journal: Vec<JournalEntry>,
        connects: usize,
        connect_failures: usize,
        failing_publishes: HashSet<String>,
        closed_connections: HashSet<u64>,
        /// Connections opened before this epoch are severed
        severed_before: u64,
    }

    impl BrokerState {
        fn ensure_live(&self, connection: u64) -> Result<()> {
            if connection < self.severed_before {
                return Err(AppError::Broker("connection lost (stream severed)".to_string()));
            }
            if self.closed_connections.contains(&connection) {
                return Err(AppError::Broker("connection already closed".to_string()));
            }
            Ok(())
        }

        fn requeue_front(&mut self, queue: &str, mut message: StoredMessage) {
            message.redelivered = true;
            if let Some(state) = self.queues.get_mut(queue) {
                state.ready.push_front(message);
            }
        }

        fn requeue_connection(&mut self, connection: u64) -> usize {
            let tags: Vec<DeliveryTag> = self
                .in_flight
                .iter()
                .filter(|(_, f)| f.connection == connection)
                .map(|(tag, _)| *tag)
                .collect();
            // Highest tag first so the oldest delivery ends up at the front
            let mut sorted = tags;
            sorted.sort_by(|a, b| b.cmp(a));
            for tag in &sorted {
                if let Some(flight) = self.in_flight.remove(tag) {
                    let queue = flight.queue.clone();
                    self.requeue_front(&queue, flight.message);
                }
            }
            sorted.len()
        }
    }

    /// In-memory broker double with AMQP-like semantics
    ///
    /// - durable queue declaration with conflict detection
    /// - per-consumer prefetch enforcement
    /// - nack(requeue=true) puts the message back at the head, marked redelivered
    /// - closing a connection requeues its unresolved deliveries
    #[derive(Clone)]
    pub struct InMemoryBroker {
        state: Arc<Mutex<BrokerState>>,
        version: Arc<watch::Sender<u64>>,
    }

    impl Default for InMemoryBroker {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InMemoryBroker {
        pub fn new() -> Self {
            let (tx, _rx) = watch::channel(0);
            Self {
                state: Arc::new(Mutex::new(BrokerState {
                    next_tag: 1,
                    next_id: 1,
                    ..Default::default()
                })),
                version: Arc::new(tx),
            }
        }

        fn bump(&self) {
            self.version.send_modify(|v| *v += 1);
        }

        fn with_state<T>(&self, f: impl FnOnce(&mut BrokerState) -> T) -> T {
            let mut state = self.state.lock().unwrap();
            f(&mut state)
        }

        /// Make the next `n` connection attempts fail
        pub fn fail_next_connects(&self, n: usize) {
            self.with_state(|s| s.connect_failures = n);
        }

        /// Refuse every publish to `queue`
        pub fn fail_publishes_to(&self, queue: &str) {
            self.with_state(|s| s.failing_publishes.insert(queue.to_string()));
        }

        pub fn restore_publishes_to(&self, queue: &str) {
            self.with_state(|s| s.failing_publishes.remove(queue));
        }

        /// Drop every open connection as if the TCP stream was lost
        ///
        /// Unresolved deliveries return to their queues.
        pub fn sever_connections(&self) {
            self.with_state(|s| {
                s.severed_before = s.next_id;
                let live: Vec<u64> = s
                    .in_flight
                    .values()
                    .map(|f| f.connection)
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .collect();
                for connection in live {
                    s.requeue_connection(connection);
                }
            });
            self.bump();
        }

        /// Declare a queue out of band (e.g. by another process)
        pub fn predeclare(&self, queue: &QueueSpec) {
            self.with_state(|s| {
                s.queues.entry(queue.name.clone()).or_insert(QueueState {
                    durable: queue.durable,
                    ready: VecDeque::new(),
                });
            });
        }

        /// Enqueue a message without a connection, declaring the queue durable if needed
        pub fn seed(&self, queue: &str, envelope: Envelope) {
            self.with_state(|s| {
                let correlation_id = envelope.correlation_id.clone();
                s.queues
                    .entry(queue.to_string())
                    .or_insert(QueueState {
                        durable: true,
                        ready: VecDeque::new(),
                    })
                    .ready
                    .push_back(StoredMessage {
                        envelope,
                        redelivered: false,
                    });
                s.journal.push(JournalEntry::Published {
                    queue: queue.to_string(),
                    correlation_id,
                });
            });
            self.bump();
        }

        /// Messages waiting in `queue` (not delivered)
        pub fn messages(&self, queue: &str) -> Vec<Envelope> {
            self.with_state(|s| {
                s.queues
                    .get(queue)
                    .map(|q| q.ready.iter().map(|m| m.envelope.clone()).collect())
                    .unwrap_or_default()
            })
        }

        pub fn ready_count(&self, queue: &str) -> usize {
            self.with_state(|s| s.queues.get(queue).map(|q| q.ready.len()).unwrap_or(0))
        }

        pub fn in_flight_count(&self) -> usize {
            self.with_state(|s| s.in_flight.len())
        }

        pub fn is_declared(&self, queue: &str) -> bool {
            self.with_state(|s| s.queues.contains_key(queue))
        }

        pub fn is_durable(&self, queue: &str) -> Option<bool> {
            self.with_state(|s| s.queues.get(queue).map(|q| q.durable))
        }

        pub fn connect_count(&self) -> usize {
            self.with_state(|s| s.connects)
        }

        pub fn journal(&self) -> Vec<JournalEntry> {
            self.with_state(|s| s.journal.clone())
        }

        /// Append a marker to the journal
        pub fn note(&self, text: impl Into<String>) {
            self.with_state(|s| s.journal.push(JournalEntry::Note(text.into())));
        }

        /// Poll `condition` until it holds or `timeout` elapses
        pub async fn wait_until<F>(&self, timeout: Duration, condition: F) -> bool
        where
            F: Fn(&InMemoryBroker) -> bool,
        {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                if condition(self) {
                    return true;
                }
                if tokio::time::Instant::now() >= deadline {
                    return false;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    #[async_trait]
    impl BrokerConnector for InMemoryBroker {
        async fn connect(&self) -> Result<Box<dyn BrokerConnection>> {
            let id = self.with_state(|s| {
                s.connects += 1;
                if s.connect_failures > 0 {
                    s.connect_failures -= 1;
                    return Err(AppError::Broker("connection refused".to_string()));
                }
                let id = s.next_id;
                s.next_id += 1;
                Ok(id)
            })?;

            Ok(Box::new(InMemoryConnection {
                broker: self.clone(),
                id,
            }))
        }
    }

    struct InMemoryConnection {
        broker: InMemoryBroker,
        id: u64,
    }

    #[async_trait]
    impl BrokerConnection for InMemoryConnection {
        async fn declare_queue(&self, queue: &QueueSpec) -> Result<()> {
            self.broker.with_state(|s| {
                s.ensure_live(self.id)?;
                match s.queues.get(&queue.name) {
                    Some(existing) if existing.durable != queue.durable => {
                        Err(AppError::TopologyConflict(format!(
                            "queue '{}' exists with durable={}, requested durable={}",
                            queue.name, existing.durable, queue.durable
                        )))
                    }
                    Some(_) => Ok(()),
                    None => {
                        s.queues.insert(
                            queue.name.clone(),
                            QueueState {
                                durable: queue.durable,
                                ready: VecDeque::new(),
                            },
                        );
                        Ok(())
                    }
                }
            })
        }

        async fn publish(&self, queue: &str, envelope: &Envelope) -> Result<()> {
            self.broker.with_state(|s| {
                s.ensure_live(self.id)?;
                if s.failing_publishes.contains(queue) {
                    return Err(AppError::Broker(format!("publish to '{}' refused", queue)));
                }
                let state = s
                    .queues
                    .get_mut(queue)
                    .ok_or_else(|| AppError::Broker(format!("queue '{}' not declared", queue)))?;
                state.ready.push_back(StoredMessage {
                    envelope: envelope.clone(),
                    redelivered: false,
                });
                s.journal.push(JournalEntry::Published {
                    queue: queue.to_string(),
                    correlation_id: envelope.correlation_id.clone(),
                });
                Ok(())
            })?;
            self.broker.bump();
            Ok(())
        }

        async fn consume(
            &self,
            queue: &QueueSpec,
            _consumer: &str,
            prefetch: u16,
        ) -> Result<Box<dyn DeliveryStream>> {
            let consumer = self.broker.with_state(|s| {
                s.ensure_live(self.id)?;
                if !s.queues.contains_key(&queue.name) {
                    return Err(AppError::Broker(format!(
                        "queue '{}' not declared",
                        queue.name
                    )));
                }
                let id = s.next_id;
                s.next_id += 1;
                Ok(id)
            })?;

            Ok(Box::new(InMemoryDeliveryStream {
                broker: self.broker.clone(),
                connection: self.id,
                consumer,
                queue: queue.name.clone(),
                prefetch: usize::from(prefetch.max(1)),
                version: self.broker.version.subscribe(),
            }))
        }

        async fn close(&self) -> Result<()> {
            self.broker.with_state(|s| {
                s.requeue_connection(self.id);
                s.closed_connections.insert(self.id);
            });
            self.broker.bump();
            Ok(())
        }
    }

    struct InMemoryDeliveryStream {
        broker: InMemoryBroker,
        connection: u64,
        consumer: u64,
        queue: String,
        prefetch: usize,
        version: watch::Receiver<u64>,
    }

    #[async_trait]
    impl DeliveryStream for InMemoryDeliveryStream {
        async fn next(&mut self) -> Result<Option<Delivery>> {
            loop {
                self.version.borrow_and_update();

                let delivered = self.broker.with_state(|s| {
                    s.ensure_live(self.connection)?;
                    let unresolved = s
                        .in_flight
                        .values()
                        .filter(|f| f.consumer == self.consumer)
                        .count();
                    if unresolved >= self.prefetch {
                        return Ok(None);
                    }
                    let message = match s.queues.get_mut(&self.queue).and_then(|q| q.ready.pop_front()) {
                        Some(m) => m,
                        None => return Ok(None),
                    };
                    let tag = DeliveryTag(s.next_tag);
                    s.next_tag += 1;
                    s.journal.push(JournalEntry::Delivered {
                        queue: self.queue.clone(),
                        tag,
                        redelivered: message.redelivered,
                    });
                    s.in_flight.insert(
                        tag,
                        InFlight {
                            queue: self.queue.clone(),
                            connection: self.connection,
                            consumer: self.consumer,
                            message: message.clone(),
                        },
                    );
                    Ok::<_, AppError>(Some((tag, message)))
                })?;

                if let Some((tag, message)) = delivered {
                    let acker = InMemoryAcker {
                        broker: self.broker.clone(),
                        tag,
                    };
                    return Ok(Some(Delivery::new(
                        tag,
                        message.envelope,
                        message.redelivered,
                        Box::new(acker),
                    )));
                }

                if self.version.changed().await.is_err() {
                    return Ok(None);
                }
            }
        }
    }

    struct InMemoryAcker {
        broker: InMemoryBroker,
        tag: DeliveryTag,
    }

    impl InMemoryAcker {
        fn resolve(&self, outcome: Option<bool>) -> Result<()> {
            self.broker.with_state(|s| {
                let flight = s.in_flight.remove(&self.tag).ok_or_else(|| {
                    AppError::Broker(format!("unknown delivery tag {}", self.tag))
                })?;
                match outcome {
                    None => s.journal.push(JournalEntry::Acked {
                        queue: flight.queue,
                        tag: self.tag,
                    }),
                    Some(requeue) => {
                        s.journal.push(JournalEntry::Nacked {
                            queue: flight.queue.clone(),
                            tag: self.tag,
                            requeue,
                        });
                        if requeue {
                            s.requeue_front(&flight.queue, flight.message);
                        }
                    }
                }
                Ok::<(), AppError>(())
            })?;
            self.broker.bump();
            Ok(())
        }
    }

    #[async_trait]
    impl DeliveryAcker for InMemoryAcker {
        async fn ack(self: Box<Self>) -> Result<()> {
            self.resolve(None)
        }

        async fn nack(self: Box<Self>, requeue: bool) -> Result<()> {
            self.resolve(Some(requeue))
        }

        async fn in_progress(&self) -> Result<()> {
            self.broker.with_state(|s| {
                let flight = s.in_flight.get(&self.tag).ok_or_else(|| {
                    AppError::Broker(format!("unknown delivery tag {}", self.tag))
                })?;
                let queue = flight.queue.clone();
                s.journal.push(JournalEntry::InProgress {
                    queue,
                    tag: self.tag,
                });
                Ok::<(), AppError>(())
            })
        }
    }
}
