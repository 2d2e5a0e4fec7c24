//! Transport traits between the typed API and a queue service.
//!
//! [`Transport`] covers the calls made by producers and consumers.
//! [`AdminTransport`] extends it with the queue management surface. Both
//! speak in plain request/response records so that implementations do not
//! depend on any particular SDK.

use crate::attributes::WireAttributes;
use crate::error::TransportError;
use crate::message::RawMessage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::OnceCell;

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

/// System attribute carrying the tracing header of a message
pub const TRACE_HEADER_ATTRIBUTE: &str = "AWSTraceHeader";

// ============================================================================
// Client Handle
// ============================================================================

/// Holder for a lazily built client.
///
/// The client is created by the first caller and shared afterwards. A
/// failed initialisation leaves the handle empty so a later call may try
/// again.
#[derive(Debug)]
pub struct TransportHandle<C> {
    cell: OnceCell<C>,
}

impl<C> TransportHandle<C> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Handle around an already built client
    pub fn with_client(client: C) -> Self {
        Self {
            cell: OnceCell::new_with(Some(client)),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// Get the client, building it with `init` on first use.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sqs_courier::transport::TransportHandle;
    ///
    /// # tokio_test::block_on(async {
    /// let handle: TransportHandle<String> = TransportHandle::new();
    ///
    /// let client = handle
    ///     .get_or_init(|| async { Ok("client".to_string()) })
    ///     .await
    ///     .unwrap();
    /// assert_eq!(client, "client");
    /// assert!(handle.is_initialized());
    /// # });
    /// ```
    pub async fn get_or_init<F, Fut>(&self, init: F) -> Result<&C, TransportError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<C, TransportError>>,
    {
        self.cell.get_or_try_init(init).await
    }
}

impl<C> Default for TransportHandle<C> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Messaging Records
// ============================================================================

/// Parameters of a single fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub max_messages: i32,
    /// Seconds fetched messages stay hidden; `None` uses the queue default
    pub visibility_timeout: Option<i32>,
    /// Long-poll wait in seconds
    pub wait_time: i32,
    pub receive_request_attempt_id: Option<String>,
}

/// A fully prepared outgoing message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendRequest {
    pub body: String,
    pub delay_seconds: i32,
    pub attributes: Option<WireAttributes>,
    pub system_attributes: Option<WireAttributes>,
    pub deduplication_id: Option<String>,
    pub group_id: Option<String>,
}

/// Broker acknowledgement of a sent message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: String,
    pub md5_of_body: Option<String>,
    /// Present for FIFO queues only
    pub sequence_number: Option<String>,
}

/// Messaging calls used by producers and consumers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch up to `request.max_messages` messages
    async fn receive_messages(
        &self,
        queue_url: &str,
        request: &ReceiveRequest,
    ) -> Result<Vec<RawMessage>, TransportError>;

    /// Acknowledge a delivery
    async fn delete_message(&self, queue_url: &str, receipt_handle: &str)
        -> Result<(), TransportError>;

    async fn send_message(
        &self,
        queue_url: &str,
        request: SendRequest,
    ) -> Result<SendReceipt, TransportError>;
}

// ============================================================================
// Admin Records
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateQueueRequest {
    pub queue_name: String,
    pub attributes: HashMap<String, String>,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQueuesRequest {
    pub queue_name_prefix: Option<String>,
    pub max_results: Option<i32>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQueuesOutput {
    pub queue_urls: Vec<String>,
    /// Token for the next page, when more results exist
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetQueueUrlRequest {
    pub queue_name: String,
    pub queue_owner_account_id: Option<String>,
}

/// Entry of a batched visibility change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityChangeEntry {
    pub id: String,
    pub receipt_handle: String,
    pub visibility_timeout: i32,
}

/// Entry of a batched delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteMessageEntry {
    pub id: String,
    pub receipt_handle: String,
}

/// Per-entry outcome of a batch operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub successful: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchFailure {
    pub id: String,
    pub code: String,
    pub message: Option<String>,
    pub sender_fault: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartMoveTaskRequest {
    pub source_arn: String,
    /// Destination queue; `None` returns messages to their original queues
    pub destination_arn: Option<String>,
    pub max_messages_per_second: Option<i32>,
}

/// State of a message move task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveTask {
    pub task_handle: Option<String>,
    pub status: String,
    pub source_arn: String,
    pub destination_arn: Option<String>,
    pub max_messages_per_second: Option<i32>,
    pub approximate_messages_moved: i64,
    pub approximate_messages_to_move: Option<i64>,
    pub failure_reason: Option<String>,
    /// Milliseconds since the epoch
    pub started_timestamp: i64,
}

/// Queue management calls
#[async_trait]
pub trait AdminTransport: Transport {
    /// Create a queue and return its URL
    async fn create_queue(&self, request: CreateQueueRequest) -> Result<String, TransportError>;

    async fn delete_queue(&self, queue_url: &str) -> Result<(), TransportError>;

    async fn purge_queue(&self, queue_url: &str) -> Result<(), TransportError>;

    async fn tag_queue(
        &self,
        queue_url: &str,
        tags: HashMap<String, String>,
    ) -> Result<(), TransportError>;

    async fn untag_queue(&self, queue_url: &str, tag_keys: Vec<String>)
        -> Result<(), TransportError>;

    async fn set_queue_attributes(
        &self,
        queue_url: &str,
        attributes: HashMap<String, String>,
    ) -> Result<(), TransportError>;

    async fn list_queues(&self, request: ListQueuesRequest)
        -> Result<ListQueuesOutput, TransportError>;

    async fn list_queue_tags(&self, queue_url: &str)
        -> Result<HashMap<String, String>, TransportError>;

    async fn get_queue_url(&self, request: GetQueueUrlRequest) -> Result<String, TransportError>;

    /// Fetch queue attributes; the name `All` selects every attribute
    async fn get_queue_attributes(
        &self,
        queue_url: &str,
        attribute_names: Vec<String>,
    ) -> Result<HashMap<String, String>, TransportError>;

    async fn change_message_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        visibility_timeout: i32,
    ) -> Result<(), TransportError>;

    async fn change_message_visibility_batch(
        &self,
        queue_url: &str,
        entries: Vec<VisibilityChangeEntry>,
    ) -> Result<BatchOutcome, TransportError>;

    async fn delete_message_batch(
        &self,
        queue_url: &str,
        entries: Vec<DeleteMessageEntry>,
    ) -> Result<BatchOutcome, TransportError>;

    /// Start moving messages out of a dead-letter queue; returns the task handle
    async fn start_message_move_task(
        &self,
        request: StartMoveTaskRequest,
    ) -> Result<String, TransportError>;

    /// Cancel a running move task; returns the number of messages moved so far
    async fn cancel_message_move_task(&self, task_handle: &str) -> Result<i64, TransportError>;

    async fn list_message_move_tasks(
        &self,
        source_arn: &str,
        max_results: i32,
    ) -> Result<Vec<MoveTask>, TransportError>;
}
