//! Transport implementations.
//!
//! [`AwsSqsTransport`] talks to AWS SQS through the official SDK.
//! [`InMemoryTransport`] keeps queues in process memory for tests and local
//! development.

pub mod aws;
pub mod memory;

pub use aws::AwsSqsTransport;
pub use memory::{queue_arn_for, queue_url_for, CallCounts, InMemoryTransport};
