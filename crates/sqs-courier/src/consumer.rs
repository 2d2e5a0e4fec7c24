//! Consumer polling engine.
//!
//! A consumer repeatedly fetches a batch of messages, converts each one into
//! a typed [`Context`] and hands it to a [`MessageHandler`]. Every handler
//! call runs on its own task and is raced against a per-message deadline.
//! Messages of one batch are processed one after another, in the order the
//! transport returned them.
//!
//! ## Cycle
//!
//! 1. Stop if the shutdown signal fired.
//! 2. Fetch up to `max_messages_per_fetch` messages.
//! 3. On a fetch failure count it; three consecutive failures end the loop
//!    with [`SqsError::FetchAttemptsExhausted`].
//! 4. Dispatch every fetched message and, when enabled, delete the ones
//!    whose handler succeeded. Deletes run in the background.
//! 5. Pause for `fetch_retry_delay` before the next cycle, whatever the
//!    outcome of this one.
//!
//! Messages whose body cannot be converted, whose handler fails or whose
//! handler runs past the deadline are left on the queue and will be
//! redelivered once their visibility timeout expires.

use crate::attributes::{MessageAttributes, WireAttributes};
use crate::error::SqsError;
use crate::logging::{verbose, verbose_error};
use crate::message::{RawMessage, ReceivedMessage};
use crate::options::ConsumerOptions;
use crate::shutdown::ShutdownSignal;
use crate::transport::Transport;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;

/// Consecutive failed fetches that end a consumer loop
pub const MAX_FAILED_FETCHES: u32 = 3;

/// Upper bound for a background delete of a processed message
pub const DELETE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Handler Context
// ============================================================================

/// Everything a handler gets for one delivered message
#[derive(Debug)]
pub struct Context<B, A = WireAttributes> {
    pub queue_url: String,
    pub message: ReceivedMessage<B, A>,
    deadline: Instant,
}

impl<B, A> Context<B, A> {
    pub fn new(queue_url: impl Into<String>, message: ReceivedMessage<B, A>, deadline: Instant) -> Self {
        Self {
            queue_url: queue_url.into(),
            message,
            deadline,
        }
    }

    /// Instant after which the engine stops waiting for the handler
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Processes delivered messages.
///
/// Implemented for any `Fn(Context<B, A>) -> impl Future<Output = anyhow::Result<()>>`.
#[async_trait]
pub trait MessageHandler<B, A>: Send + Sync + 'static
where
    B: Send + 'static,
    A: Send + 'static,
{
    /// Handle one message; an error leaves the message on the queue
    async fn handle(&self, context: Context<B, A>) -> anyhow::Result<()>;
}

#[async_trait]
impl<B, A, F, Fut> MessageHandler<B, A> for F
where
    B: Send + 'static,
    A: Send + 'static,
    F: Fn(Context<B, A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, context: Context<B, A>) -> anyhow::Result<()> {
        (self)(context).await
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Runs polling loops against a transport
#[derive(Clone)]
pub struct Consumer {
    transport: Arc<dyn Transport>,
    shutdown: ShutdownSignal,
}

impl Consumer {
    /// Create a consumer whose loops run until they fail
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            shutdown: ShutdownSignal::never(),
        }
    }

    /// Stop every loop of this consumer once `signal` fires
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = signal;
        self
    }

    /// Run the polling loop until shutdown or a fatal error.
    ///
    /// # Errors
    ///
    /// - [`SqsError::FetchAttemptsExhausted`] after three consecutive failed
    ///   fetches
    /// - [`SqsError::ClientInitialization`] when the transport has no client
    pub async fn receive<B, A, H>(
        &self,
        queue_url: &str,
        handler: H,
        options: &[ConsumerOptions],
    ) -> Result<(), SqsError>
    where
        B: DeserializeOwned + Send + 'static,
        A: MessageAttributes,
        H: MessageHandler<B, A>,
    {
        self.engine(queue_url.to_string(), handler, options).run().await
    }

    /// Run the polling loop on a background task.
    ///
    /// The loop stops through the shutdown signal only; the handle reports
    /// how it ended.
    pub fn receive_async<B, A, H>(
        &self,
        queue_url: impl Into<String>,
        handler: H,
        options: &[ConsumerOptions],
    ) -> JoinHandle<Result<(), SqsError>>
    where
        B: DeserializeOwned + Send + 'static,
        A: MessageAttributes,
        H: MessageHandler<B, A>,
    {
        let engine = self.engine(queue_url.into(), handler, options);
        tokio::spawn(engine.run())
    }

    /// [`Consumer::receive`] with attributes kept in wire form
    pub async fn receive_simple<B, H>(
        &self,
        queue_url: &str,
        handler: H,
        options: &[ConsumerOptions],
    ) -> Result<(), SqsError>
    where
        B: DeserializeOwned + Send + 'static,
        H: MessageHandler<B, WireAttributes>,
    {
        self.receive::<B, WireAttributes, H>(queue_url, handler, options)
            .await
    }

    /// [`Consumer::receive_async`] with attributes kept in wire form
    pub fn receive_simple_async<B, H>(
        &self,
        queue_url: impl Into<String>,
        handler: H,
        options: &[ConsumerOptions],
    ) -> JoinHandle<Result<(), SqsError>>
    where
        B: DeserializeOwned + Send + 'static,
        H: MessageHandler<B, WireAttributes>,
    {
        self.receive_async::<B, WireAttributes, H>(queue_url, handler, options)
    }

    fn engine<B, A, H>(
        &self,
        queue_url: String,
        handler: H,
        options: &[ConsumerOptions],
    ) -> PollingEngine<B, A, H>
    where
        B: DeserializeOwned + Send + 'static,
        A: MessageAttributes,
        H: MessageHandler<B, A>,
    {
        PollingEngine {
            transport: Arc::clone(&self.transport),
            queue_url,
            handler: Arc::new(handler),
            options: ConsumerOptions::merge(options),
            shutdown: self.shutdown.clone(),
            deletes: JoinSet::new(),
            _message: PhantomData,
        }
    }
}

// ============================================================================
// Polling Engine
// ============================================================================

/// Outcome of dispatching one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    Succeeded,
    Failed,
    TimedOut,
}

struct PollingEngine<B, A, H> {
    transport: Arc<dyn Transport>,
    queue_url: String,
    handler: Arc<H>,
    options: ConsumerOptions,
    shutdown: ShutdownSignal,
    deletes: JoinSet<()>,
    _message: PhantomData<fn() -> (B, A)>,
}

impl<B, A, H> PollingEngine<B, A, H>
where
    B: DeserializeOwned + Send + 'static,
    A: MessageAttributes,
    H: MessageHandler<B, A>,
{
    async fn run(mut self) -> Result<(), SqsError> {
        let debug = self.options.debug;
        let request = self.options.receive_request();
        let mut failed_fetches = 0_u32;

        verbose!(
            debug,
            queue_url = %self.queue_url,
            max_messages = request.max_messages,
            "Consumer started"
        );

        let result = loop {
            if self.shutdown.is_triggered() {
                break Ok(());
            }

            match self.transport.receive_messages(&self.queue_url, &request).await {
                Ok(messages) => {
                    failed_fetches = 0;
                    if !messages.is_empty() {
                        self.process_batch(messages).await;
                    }
                }
                Err(error) if error.is_client_initialization() => {
                    tracing::error!(
                        queue_url = %self.queue_url,
                        error = %error,
                        "Stopping consumer: queue client unavailable"
                    );
                    break Err(error.into());
                }
                Err(error) => {
                    failed_fetches += 1;
                    verbose_error!(
                        debug,
                        queue_url = %self.queue_url,
                        attempt = failed_fetches,
                        error = %error,
                        "Failed to fetch messages"
                    );
                    if failed_fetches >= MAX_FAILED_FETCHES {
                        tracing::error!(
                            queue_url = %self.queue_url,
                            attempts = failed_fetches,
                            error = %error,
                            "Stopping consumer: fetch attempts exhausted"
                        );
                        break Err(SqsError::FetchAttemptsExhausted {
                            attempts: failed_fetches,
                            last_error: error,
                        });
                    }
                }
            }

            self.reap_deletes();

            if !self.pause().await {
                break Ok(());
            }
        };

        self.drain_deletes().await;
        verbose!(debug, queue_url = %self.queue_url, "Consumer stopped");
        result
    }

    /// Sleep between cycles; returns `false` when shutdown fired meanwhile
    async fn pause(&mut self) -> bool {
        let delay = self.options.fetch_retry_delay;
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.shutdown.triggered() => false,
        }
    }

    async fn process_batch(&mut self, messages: Vec<RawMessage>) {
        let debug = self.options.debug;
        let processed = messages.len();
        let mut succeeded = Vec::with_capacity(processed);
        let mut failed = Vec::new();

        for raw in messages {
            let message_id = raw.message_id.clone();
            let receipt_handle = raw.receipt_handle.clone();

            let message = match ReceivedMessage::<B, A>::from_raw(raw) {
                Ok(message) => message,
                Err(error) => {
                    verbose_error!(
                        debug,
                        queue_url = %self.queue_url,
                        message_id = %message_id,
                        error = %error,
                        "Skipping message with unparseable body"
                    );
                    failed.push(message_id);
                    continue;
                }
            };

            match self.dispatch(message).await {
                Dispatch::Succeeded => {
                    if self.options.auto_delete_on_success {
                        self.spawn_delete(message_id.clone(), receipt_handle);
                    }
                    succeeded.push(message_id);
                }
                Dispatch::Failed | Dispatch::TimedOut => failed.push(message_id),
            }
        }

        verbose!(
            debug,
            queue_url = %self.queue_url,
            processed,
            succeeded = ?succeeded,
            failed = ?failed,
            "Processed message batch"
        );
    }

    /// Run the handler on its own task and race it against the deadline
    async fn dispatch(&mut self, message: ReceivedMessage<B, A>) -> Dispatch {
        let debug = self.options.debug;
        let message_id = message.id.clone();
        let deadline = Instant::now() + self.options.handler_timeout;
        let context = Context::new(self.queue_url.clone(), message, deadline);

        let handler = Arc::clone(&self.handler);
        let mut task = tokio::spawn(async move { handler.handle(context).await });

        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(Ok(()))) => Dispatch::Succeeded,
            Ok(Ok(Err(error))) => {
                verbose_error!(
                    debug,
                    queue_url = %self.queue_url,
                    message_id = %message_id,
                    error = %format!("{error:#}"),
                    "Handler failed"
                );
                Dispatch::Failed
            }
            Ok(Err(join_error)) => {
                verbose_error!(
                    debug,
                    queue_url = %self.queue_url,
                    message_id = %message_id,
                    error = %join_error,
                    "Handler task panicked"
                );
                Dispatch::Failed
            }
            Err(_) => {
                task.abort();
                verbose_error!(
                    debug,
                    queue_url = %self.queue_url,
                    message_id = %message_id,
                    timeout_ms = self.options.handler_timeout.as_millis() as u64,
                    "Handler timed out"
                );
                Dispatch::TimedOut
            }
        }
    }

    fn spawn_delete(&mut self, message_id: String, receipt_handle: String) {
        let transport = Arc::clone(&self.transport);
        let queue_url = self.queue_url.clone();
        let debug = self.options.debug;

        self.deletes.spawn(async move {
            let outcome = tokio::time::timeout(
                DELETE_TIMEOUT,
                transport.delete_message(&queue_url, &receipt_handle),
            )
            .await;
            match outcome {
                Ok(Ok(())) => {
                    verbose!(debug, queue_url = %queue_url, message_id = %message_id, "Deleted message");
                }
                Ok(Err(error)) => {
                    verbose_error!(
                        debug,
                        queue_url = %queue_url,
                        message_id = %message_id,
                        error = %error,
                        "Failed to delete message"
                    );
                }
                Err(_) => {
                    verbose_error!(
                        debug,
                        queue_url = %queue_url,
                        message_id = %message_id,
                        "Timed out deleting message"
                    );
                }
            }
        });
    }

    /// Collect finished delete tasks without waiting
    fn reap_deletes(&mut self) {
        while let Some(result) = self.deletes.try_join_next() {
            if let Err(error) = result {
                tracing::debug!(error = %error, "Delete task ended abnormally");
            }
        }
    }

    async fn drain_deletes(&mut self) {
        while let Some(result) = self.deletes.join_next().await {
            if let Err(error) = result {
                tracing::debug!(error = %error, "Delete task ended abnormally");
            }
        }
    }
}
