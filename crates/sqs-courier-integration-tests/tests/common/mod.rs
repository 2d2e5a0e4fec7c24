//! Common test utilities for sqs-courier integration tests
//!
//! This module provides:
//! - A queue hosted by the in-memory transport
//! - A collecting consumer that stops after a number of messages
//! - Shared message and attribute fixtures

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqs_courier::message::ReceivedMessage;
use sqs_courier::options::CreateQueueOptions;
use sqs_courier::providers::{queue_arn_for, InMemoryTransport};
use sqs_courier::shutdown::shutdown_channel;
use sqs_courier::{
    Consumer, ConsumerOptions, Context, MessageAttributes, Producer, QueueAdmin, SqsError,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound on simulated time for a consumer run
pub const RUN_LIMIT: Duration = Duration::from_secs(600);

// ============================================================================
// Fixtures
// ============================================================================

#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub name: String,
    pub count: u32,
}

#[allow(dead_code)]
impl Order {
    pub fn new(name: &str, count: u32) -> Self {
        Self {
            name: name.to_string(),
            count,
        }
    }
}

/// Attributes carried by tracked orders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tracking {
    pub tenant: String,
    pub priority: i64,
    pub urgent: bool,
}

impl MessageAttributes for Tracking {}

// ============================================================================
// Test Queue
// ============================================================================

/// A queue on a fresh in-memory transport
#[allow(dead_code)]
pub struct TestQueue {
    pub transport: Arc<InMemoryTransport>,
    pub admin: QueueAdmin,
    pub name: String,
    pub url: String,
}

#[allow(dead_code)]
impl TestQueue {
    pub async fn create(name: &str, attributes: &[(&str, &str)]) -> Self {
        Self::create_on(Arc::new(InMemoryTransport::new()), name, attributes).await
    }

    /// Create another queue on an existing transport
    pub async fn create_on(
        transport: Arc<InMemoryTransport>,
        name: &str,
        attributes: &[(&str, &str)],
    ) -> Self {
        let admin = QueueAdmin::new(transport.clone());
        let options = attributes
            .iter()
            .fold(CreateQueueOptions::new(), |o, (k, v)| o.with_attribute(*k, *v));
        let url = admin
            .create_queue(name, &[options])
            .await
            .expect("queue creation should succeed");

        Self {
            transport,
            admin,
            name: name.to_string(),
            url,
        }
    }

    pub fn arn(&self) -> String {
        queue_arn_for(&self.name)
    }

    pub fn producer(&self) -> Producer {
        Producer::new(self.transport.clone())
    }

    pub fn message_count(&self) -> usize {
        self.transport.message_count(&self.url)
    }

    /// Consume until `expected` messages were handled successfully
    pub async fn collect<B, A>(
        &self,
        expected: usize,
        options: &[ConsumerOptions],
    ) -> Result<Vec<Handled<B, A>>, SqsError>
    where
        B: serde::de::DeserializeOwned + Send + 'static,
        A: MessageAttributes,
    {
        self.collect_with(expected, options, |_| true).await
    }

    /// Consume until `expected` messages were accepted by `accept`.
    ///
    /// Rejected messages make the handler fail and are left for redelivery.
    pub async fn collect_with<B, A, F>(
        &self,
        expected: usize,
        options: &[ConsumerOptions],
        accept: F,
    ) -> Result<Vec<Handled<B, A>>, SqsError>
    where
        B: serde::de::DeserializeOwned + Send + 'static,
        A: MessageAttributes,
        F: Fn(&ReceivedMessage<B, A>) -> bool + Send + Sync + 'static,
    {
        let (trigger, signal) = shutdown_channel();
        let handled = Arc::new(Mutex::new(Vec::new()));
        let accept = Arc::new(accept);

        let handler = {
            let handled = Arc::clone(&handled);
            move |ctx: Context<B, A>| {
                let handled = Arc::clone(&handled);
                let accept = Arc::clone(&accept);
                let trigger = trigger.clone();
                async move {
                    if !(*accept)(&ctx.message) {
                        anyhow::bail!("message {} rejected", ctx.message.id);
                    }
                    let mut handled = handled.lock().unwrap();
                    handled.push(Handled {
                        at: Instant::now(),
                        message: ctx.message,
                    });
                    if handled.len() >= expected {
                        trigger.trigger();
                    }
                    Ok(())
                }
            }
        };

        let consumer = Consumer::new(self.transport.clone()).with_shutdown(signal);
        tokio::time::timeout(RUN_LIMIT, consumer.receive(&self.url, handler, options))
            .await
            .expect("consumer should stop before the run limit")?;

        let collected = std::mem::take(&mut *handled.lock().unwrap());
        Ok(collected)
    }
}

/// A successfully handled message and when it was handled
#[derive(Debug)]
pub struct Handled<B, A = sqs_courier::WireAttributes> {
    pub at: Instant,
    pub message: ReceivedMessage<B, A>,
}

/// Consumer options with short pauses for simulated time
#[allow(dead_code)]
pub fn fast_options() -> ConsumerOptions {
    ConsumerOptions::new()
        .with_fetch_retry_delay(Duration::from_millis(100))
        .with_handler_timeout(Duration::from_secs(1))
}

/// Bodies of handled messages in handling order
#[allow(dead_code)]
pub fn bodies<A>(handled: &[Handled<Value, A>]) -> Vec<Value> {
    handled.iter().map(|h| h.message.body.clone()).collect()
}
