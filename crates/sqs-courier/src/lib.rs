//! # SQS Courier
//!
//! Typed message production and consumption over AWS SQS.
//!
//! This library provides:
//! - Producers that send any serializable body with map or record attributes
//! - A consumer polling engine with per-message deadlines and auto-delete
//! - Conversion between application types and SQS message attributes
//! - Queue administration (queues, tags, attributes, batches, move tasks)
//! - An AWS SDK transport and an in-memory transport for tests
//!
//! ## Module Organization
//!
//! - [`convert`] - Value conversion to and from wire text and bytes
//! - [`attributes`] - Message attribute encoding and decoding
//! - [`message`] - Received message types
//! - [`producer`] - Sending messages
//! - [`consumer`] - The polling engine and handler contract
//! - [`admin`] - Queue management
//! - [`transport`] - Transport traits implemented by [`providers`]
//! - [`config`] - File and environment configuration
//!
//! ## Example
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use sqs_courier::{Consumer, ConsumerOptions, Context, Producer};
//! use sqs_courier::providers::InMemoryTransport;
//! use std::sync::Arc;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Order {
//!     name: String,
//!     count: u32,
//! }
//!
//! # async fn example(queue_url: &str) -> Result<(), sqs_courier::SqsError> {
//! let transport = Arc::new(InMemoryTransport::new());
//!
//! Producer::new(transport.clone())
//!     .send(queue_url, &Order { name: "a".into(), count: 3 }, &[])
//!     .await?;
//!
//! Consumer::new(transport)
//!     .receive_simple(
//!         queue_url,
//!         |ctx: Context<Order>| async move {
//!             println!("{} x{}", ctx.message.body.name, ctx.message.body.count);
//!             Ok(())
//!         },
//!         &[ConsumerOptions::new().with_auto_delete_on_success(true)],
//!     )
//!     .await
//! # }
//! ```

mod logging;

pub mod admin;
pub mod attributes;
pub mod config;
pub mod consumer;
pub mod convert;
pub mod error;
pub mod message;
pub mod options;
pub mod producer;
pub mod providers;
pub mod shutdown;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use admin::QueueAdmin;
pub use attributes::{
    record_or_map_to_wire_attributes, wire_attributes_to_record_or_map, AttributeValue, DataType,
    MessageAttributes, WireAttributes,
};
pub use config::{AwsSettings, CourierConfig};
pub use consumer::{Consumer, Context, MessageHandler};
pub use error::{ConfigurationError, SqsError, TransportError, ValidationError};
pub use message::{RawMessage, ReceivedMessage, SystemAttributes};
pub use options::{
    AdminOptions, ConsumerOptions, CreateQueueOptions, ListMessageMoveTasksOptions,
    ListQueuesOptions, ProducerOptions,
};
pub use producer::Producer;
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
pub use transport::{AdminTransport, SendReceipt, Transport, TransportHandle};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
