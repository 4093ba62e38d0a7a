// Stage Consumer - single-message-in-flight consume loop

pub mod constants;
mod panic_guard;
mod shutdown;

use constants::*;
pub use panic_guard::{execute_guarded, PanicGuardResult};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::codec;
use crate::application::connection::{connect_with_retry, ConnectPolicy};
use crate::application::failure::{classify, FailureClass};
use crate::application::producer::StageProducer;
use crate::application::stage::StageHandler;
use crate::domain::{ConsumerState, StagePayload};
use crate::error::{AppError, Result};
use crate::port::{BrokerConnection, BrokerConnector, Delivery};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// How a consume session ended without a connection-level error
enum SessionEnd {
    Shutdown,
    Cancelled,
}

/// Runs one stage: connect, declare, consume one message at a time
///
/// Any connection-level failure closes the connection, sleeps the cooldown
/// and starts over. A message in Handling always runs to ack/nack, even
/// when shutdown is requested.
pub struct StageConsumer<H: StageHandler> {
    handler: Arc<H>,
    connector: Arc<dyn BrokerConnector>,
    producer: StageProducer,
    policy: ConnectPolicy,
    cooldown: Duration,
    progress_interval: Duration,
    state: watch::Sender<ConsumerState>,
}

impl<H: StageHandler> StageConsumer<H> {
    pub fn new(handler: H, connector: Arc<dyn BrokerConnector>, policy: ConnectPolicy) -> Self {
        let producer = StageProducer::new(Arc::clone(&connector), policy);
        let (state, _) = watch::channel(ConsumerState::Disconnected);
        Self {
            handler: Arc::new(handler),
            connector,
            producer,
            policy,
            cooldown: DEFAULT_RECONNECT_COOLDOWN,
            progress_interval: DELIVERY_PROGRESS_INTERVAL,
            state,
        }
    }

    /// Sleep after a connection-level failure
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// How often a message in Handling is reported as still in progress
    ///
    /// Must stay below the broker's ack wait or the message is redelivered
    /// while it is still being handled.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Observe lifecycle transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    fn transition(&self, next: ConsumerState) -> Result<()> {
        let current = self.state();
        let next = current.transition(next)?;
        self.state.send_replace(next);
        debug!(stage = %self.handler.spec().kind, from = %current, to = %next, "Consumer state");
        Ok(())
    }

    /// Run until shutdown
    ///
    /// # Errors
    /// - ConfigFatal failures while declaring (queue topology conflict)
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        let spec = self.handler.spec();
        spec.validate()?;
        info!(stage = %spec.kind, queue = %spec.input.name, "Stage consumer started");

        loop {
            if shutdown.is_shutdown() {
                break;
            }

            self.transition(ConsumerState::Connecting)?;
            let conn = match connect_with_retry(self.connector.as_ref(), self.policy).await {
                Ok(conn) => conn,
                Err(e) => {
                    error!(stage = %spec.kind, error = %e, "Broker unreachable, cooling down");
                    self.transition(ConsumerState::Disconnected)?;
                    if !shutdown.sleep(self.cooldown).await {
                        break;
                    }
                    continue;
                }
            };

            self.transition(ConsumerState::Declaring)?;
            let outcome = self.consume_session(conn.as_ref(), &mut shutdown).await;

            self.transition(ConsumerState::Closing)?;
            if let Err(e) = conn.close().await {
                debug!(stage = %spec.kind, error = %e, "Closing consumer connection failed");
            }
            self.transition(ConsumerState::Disconnected)?;

            match outcome {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Cancelled) => {
                    warn!(stage = %spec.kind, "Consumer cancelled by broker, reconnecting");
                }
                Err(e) if classify(&e) == FailureClass::ConfigFatal => {
                    error!(
                        stage = %spec.kind,
                        queue = %spec.input.name,
                        severity = "critical",
                        error = %e,
                        "Fatal topology error, stage stopped"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        stage = %spec.kind,
                        error = %e,
                        cooldown_secs = self.cooldown.as_secs(),
                        "Connection-level failure, reconnecting after cooldown"
                    );
                }
            }

            if !shutdown.sleep(self.cooldown).await {
                break;
            }
        }

        info!(stage = %spec.kind, "Stage consumer stopped");
        Ok(())
    }

    async fn consume_session(
        &self,
        conn: &dyn BrokerConnection,
        shutdown: &mut ShutdownToken,
    ) -> Result<SessionEnd> {
        let spec = self.handler.spec();
        conn.declare_queue(&spec.input).await?;
        let mut stream = conn.consume(&spec.input, &spec.name, spec.prefetch).await?;
        self.transition(ConsumerState::Consuming)?;
        info!(stage = %spec.kind, queue = %spec.input.name, prefetch = spec.prefetch, "Consuming");

        loop {
            // Shutdown only interrupts the wait, never a message in Handling
            let next = tokio::select! {
                biased;
                _ = shutdown.wait() => return Ok(SessionEnd::Shutdown),
                next = stream.next() => next?,
            };

            let Some(delivery) = next else {
                return Ok(SessionEnd::Cancelled);
            };

            self.transition(ConsumerState::Handling)?;
            self.process(delivery).await?;
            self.transition(ConsumerState::Consuming)?;
        }
    }

    /// Per-message contract; Err only for connection-level failures
    async fn process(&self, delivery: Delivery) -> Result<()> {
        let spec = self.handler.spec();
        let tag = delivery.tag;

        let input = match codec::decode_payload::<H::Input>(&delivery.envelope.payload) {
            Ok(input) => input,
            Err(e) => {
                error!(
                    stage = %spec.kind,
                    queue = %spec.input.name,
                    delivery_tag = %tag,
                    user_id = delivery.envelope.correlation_id.as_deref().unwrap_or("-"),
                    class = %FailureClass::Permanent,
                    payload_excerpt = %delivery.envelope.excerpt(PAYLOAD_EXCERPT_CHARS),
                    error = %e,
                    "Dropping message that failed decode"
                );
                self.notify_rejection(&e).await;
                return delivery.nack(false).await;
            }
        };

        let user_id = input
            .correlation_id()
            .or_else(|| delivery.envelope.correlation_id.clone())
            .unwrap_or_else(|| "-".to_string());
        debug!(
            stage = %spec.kind,
            delivery_tag = %tag,
            user_id = %user_id,
            redelivered = delivery.redelivered,
            "Handling message"
        );

        let handler = Arc::clone(&self.handler);
        let guarded = execute_guarded(async move { handler.handle(input).await });
        let outcome = match self.keep_alive(&delivery, guarded).await {
            PanicGuardResult::Completed(result) => result,
            PanicGuardResult::Panicked(msg) => {
                Err(AppError::Internal(format!("stage handler panicked: {}", msg)))
            }
        };

        match outcome {
            Ok(outbound) => {
                let (handoffs, notices): (Vec<_>, Vec<_>) =
                    outbound.into_iter().partition(|m| !m.best_effort);
                for message in &handoffs {
                    if let Err(e) = self.producer.publish(&message.queue, &message.envelope).await {
                        error!(
                            stage = %spec.kind,
                            delivery_tag = %tag,
                            user_id = %user_id,
                            target = %message.queue.name,
                            error = %e,
                            "Downstream publish failed, requeueing original message"
                        );
                        return delivery.nack(true).await;
                    }
                }
                delivery.ack().await?;

                let mut published = handoffs.len();
                for notice in &notices {
                    match self.producer.publish(&notice.queue, &notice.envelope).await {
                        Ok(()) => published += 1,
                        Err(e) => warn!(
                            stage = %spec.kind,
                            delivery_tag = %tag,
                            user_id = %user_id,
                            target = %notice.queue.name,
                            error = %e,
                            "Notice not delivered"
                        ),
                    }
                }
                info!(
                    stage = %spec.kind,
                    delivery_tag = %tag,
                    user_id = %user_id,
                    published,
                    "Message handled"
                );
                Ok(())
            }
            Err(e) => {
                let class = classify(&e);
                let excerpt = delivery.envelope.excerpt(PAYLOAD_EXCERPT_CHARS);
                match class {
                    FailureClass::ConfigFatal => error!(
                        stage = %spec.kind,
                        queue = %spec.input.name,
                        delivery_tag = %tag,
                        user_id = %user_id,
                        class = %class,
                        severity = "critical",
                        error = %e,
                        "Configuration failure, message dropped until an operator intervenes"
                    ),
                    FailureClass::Permanent => error!(
                        stage = %spec.kind,
                        queue = %spec.input.name,
                        delivery_tag = %tag,
                        user_id = %user_id,
                        class = %class,
                        payload_excerpt = %excerpt,
                        error = %e,
                        "Permanent failure, message dropped"
                    ),
                    FailureClass::Transient => warn!(
                        stage = %spec.kind,
                        queue = %spec.input.name,
                        delivery_tag = %tag,
                        user_id = %user_id,
                        class = %class,
                        error = %e,
                        "Transient failure, message requeued"
                    ),
                }

                if !class.requeue() {
                    self.notify_rejection(&e).await;
                }
                delivery.nack(class.requeue()).await
            }
        }
    }

    /// Drive `work` to completion, signalling progress on the delivery meanwhile
    async fn keep_alive<F: Future>(&self, delivery: &Delivery, work: F) -> F::Output {
        tokio::pin!(work);
        let mut ticker = tokio::time::interval(self.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                output = &mut work => return output,
                _ = ticker.tick() => {
                    if let Err(e) = delivery.in_progress().await {
                        debug!(
                            stage = %self.handler.spec().kind,
                            delivery_tag = %delivery.tag,
                            error = %e,
                            "Progress signal failed"
                        );
                    }
                }
            }
        }
    }

    async fn notify_rejection(&self, error: &AppError) {
        let Some(notice) = self.handler.rejection_notice(error) else {
            return;
        };
        if let Err(e) = self.producer.publish(&notice.queue, &notice.envelope).await {
            warn!(
                stage = %self.handler.spec().kind,
                target = %notice.queue.name,
                error = %e,
                "Rejection notice not delivered"
            );
        }
    }
}
