//! Queue administration.
//!
//! Every operation checks its required inputs, forwards the call to the
//! transport and returns the transport's answer unchanged. Validation
//! failures never reach the transport.

use crate::error::{SqsError, TransportError, ValidationError};
use crate::logging::{verbose, verbose_error};
use crate::options::{
    AdminOptions, CreateQueueOptions, ListMessageMoveTasksOptions, ListQueuesOptions,
};
use crate::transport::{
    AdminTransport, BatchOutcome, CreateQueueRequest, DeleteMessageEntry, GetQueueUrlRequest,
    ListQueuesOutput, ListQueuesRequest, MoveTask, StartMoveTaskRequest, VisibilityChangeEntry,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
#[path = "admin_tests.rs"]
mod tests;

/// Longest visibility timeout accepted by SQS
pub const MAX_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);

// ============================================================================
// Inputs
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagQueueInput {
    pub queue_url: String,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UntagQueueInput {
    pub queue_url: String,
    pub tag_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetQueueAttributesInput {
    pub queue_url: String,
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetQueueUrlInput {
    pub queue_name: String,
    /// Account owning the queue when it is not the caller's
    pub queue_owner_account_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetQueueAttributesInput {
    pub queue_url: String,
    /// Attribute names to fetch; empty fetches all of them
    pub attribute_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeMessageVisibilityInput {
    pub queue_url: String,
    pub receipt_handle: String,
    pub visibility_timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeMessageVisibilityBatchInput {
    pub queue_url: String,
    pub entries: Vec<VisibilityChangeEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteMessageBatchInput {
    pub queue_url: String,
    pub entries: Vec<DeleteMessageEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartMessageMoveTaskInput {
    /// ARN of the dead-letter queue to drain
    pub source_arn: String,
    pub destination_arn: Option<String>,
    pub max_messages_per_second: Option<i32>,
}

// ============================================================================
// Validation
// ============================================================================

fn require(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::required(field))
    } else {
        Ok(())
    }
}

fn require_any<T>(field: &str, values: &[T]) -> Result<(), ValidationError> {
    if values.is_empty() {
        Err(ValidationError::required(field))
    } else {
        Ok(())
    }
}

fn visibility_seconds(timeout: Duration) -> Result<i32, ValidationError> {
    if timeout > MAX_VISIBILITY_TIMEOUT {
        return Err(ValidationError::OutOfRange {
            field: "visibility_timeout".to_string(),
            message: format!(
                "{}s exceeds the maximum of {}s",
                timeout.as_secs(),
                MAX_VISIBILITY_TIMEOUT.as_secs()
            ),
        });
    }
    Ok(timeout.as_secs() as i32)
}

// ============================================================================
// QueueAdmin
// ============================================================================

/// Queue management on top of an [`AdminTransport`]
#[derive(Clone)]
pub struct QueueAdmin {
    transport: Arc<dyn AdminTransport>,
}

impl QueueAdmin {
    pub fn new(transport: Arc<dyn AdminTransport>) -> Self {
        Self { transport }
    }

    /// Create a queue and return its URL
    pub async fn create_queue(
        &self,
        queue_name: &str,
        options: &[CreateQueueOptions],
    ) -> Result<String, SqsError> {
        require("queue_name", queue_name)?;
        let options = CreateQueueOptions::merge(options);
        let request = CreateQueueRequest {
            queue_name: queue_name.to_string(),
            attributes: options.attributes,
            tags: options.tags,
        };
        forward(options.debug, "CreateQueue", self.transport.create_queue(request)).await
    }

    pub async fn delete_queue(&self, queue_url: &str, options: &[AdminOptions]) -> Result<(), SqsError> {
        require("queue_url", queue_url)?;
        let debug = AdminOptions::merge(options).debug;
        forward(debug, "DeleteQueue", self.transport.delete_queue(queue_url)).await
    }

    /// Remove every message from a queue
    pub async fn purge_queue(&self, queue_url: &str, options: &[AdminOptions]) -> Result<(), SqsError> {
        require("queue_url", queue_url)?;
        let debug = AdminOptions::merge(options).debug;
        forward(debug, "PurgeQueue", self.transport.purge_queue(queue_url)).await
    }

    pub async fn tag_queue(&self, input: TagQueueInput, options: &[AdminOptions]) -> Result<(), SqsError> {
        require("queue_url", &input.queue_url)?;
        if input.tags.is_empty() {
            return Err(ValidationError::required("tags").into());
        }
        let debug = AdminOptions::merge(options).debug;
        forward(
            debug,
            "TagQueue",
            self.transport.tag_queue(&input.queue_url, input.tags.clone()),
        )
        .await
    }

    pub async fn untag_queue(&self, input: UntagQueueInput, options: &[AdminOptions]) -> Result<(), SqsError> {
        require("queue_url", &input.queue_url)?;
        require_any("tag_keys", &input.tag_keys)?;
        let debug = AdminOptions::merge(options).debug;
        forward(
            debug,
            "UntagQueue",
            self.transport.untag_queue(&input.queue_url, input.tag_keys.clone()),
        )
        .await
    }

    pub async fn set_queue_attributes(
        &self,
        input: SetQueueAttributesInput,
        options: &[AdminOptions],
    ) -> Result<(), SqsError> {
        require("queue_url", &input.queue_url)?;
        if input.attributes.is_empty() {
            return Err(ValidationError::required("attributes").into());
        }
        let debug = AdminOptions::merge(options).debug;
        forward(
            debug,
            "SetQueueAttributes",
            self.transport
                .set_queue_attributes(&input.queue_url, input.attributes.clone()),
        )
        .await
    }

    /// List queue URLs, one page at a time
    pub async fn list_queues(&self, options: &[ListQueuesOptions]) -> Result<ListQueuesOutput, SqsError> {
        let options = ListQueuesOptions::merge(options);
        let request = ListQueuesRequest {
            queue_name_prefix: options.queue_name_prefix,
            max_results: (options.max_results > 0).then_some(options.max_results),
            next_token: options.next_token,
        };
        forward(options.debug, "ListQueues", self.transport.list_queues(request)).await
    }

    pub async fn list_queue_tags(
        &self,
        queue_url: &str,
        options: &[AdminOptions],
    ) -> Result<HashMap<String, String>, SqsError> {
        require("queue_url", queue_url)?;
        let debug = AdminOptions::merge(options).debug;
        forward(debug, "ListQueueTags", self.transport.list_queue_tags(queue_url)).await
    }

    pub async fn get_queue_url(&self, input: GetQueueUrlInput, options: &[AdminOptions]) -> Result<String, SqsError> {
        require("queue_name", &input.queue_name)?;
        let debug = AdminOptions::merge(options).debug;
        let request = GetQueueUrlRequest {
            queue_name: input.queue_name,
            queue_owner_account_id: input.queue_owner_account_id.filter(|id| !id.is_empty()),
        };
        forward(debug, "GetQueueUrl", self.transport.get_queue_url(request)).await
    }

    pub async fn get_queue_attributes(
        &self,
        input: GetQueueAttributesInput,
        options: &[AdminOptions],
    ) -> Result<HashMap<String, String>, SqsError> {
        require("queue_url", &input.queue_url)?;
        let debug = AdminOptions::merge(options).debug;
        let names = if input.attribute_names.is_empty() {
            vec!["All".to_string()]
        } else {
            input.attribute_names
        };
        forward(
            debug,
            "GetQueueAttributes",
            self.transport.get_queue_attributes(&input.queue_url, names),
        )
        .await
    }

    pub async fn change_message_visibility(
        &self,
        input: ChangeMessageVisibilityInput,
        options: &[AdminOptions],
    ) -> Result<(), SqsError> {
        require("queue_url", &input.queue_url)?;
        require("receipt_handle", &input.receipt_handle)?;
        let timeout = visibility_seconds(input.visibility_timeout)?;
        let debug = AdminOptions::merge(options).debug;
        forward(
            debug,
            "ChangeMessageVisibility",
            self.transport
                .change_message_visibility(&input.queue_url, &input.receipt_handle, timeout),
        )
        .await
    }

    /// Change the visibility of several deliveries at once.
    ///
    /// Entries without both an id and a receipt handle are dropped.
    pub async fn change_message_visibility_batch(
        &self,
        input: ChangeMessageVisibilityBatchInput,
        options: &[AdminOptions],
    ) -> Result<BatchOutcome, SqsError> {
        require("queue_url", &input.queue_url)?;
        let entries: Vec<VisibilityChangeEntry> = input
            .entries
            .into_iter()
            .filter(|entry| !(entry.id.is_empty() && entry.receipt_handle.is_empty()))
            .collect();
        require_any("entries", &entries)?;
        let debug = AdminOptions::merge(options).debug;
        forward(
            debug,
            "ChangeMessageVisibilityBatch",
            self.transport
                .change_message_visibility_batch(&input.queue_url, entries),
        )
        .await
    }

    /// Acknowledge a single delivery
    pub async fn delete_message(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        options: &[AdminOptions],
    ) -> Result<(), SqsError> {
        require("queue_url", queue_url)?;
        require("receipt_handle", receipt_handle)?;
        let debug = AdminOptions::merge(options).debug;
        forward(
            debug,
            "DeleteMessage",
            self.transport.delete_message(queue_url, receipt_handle),
        )
        .await
    }

    /// Delete several deliveries at once.
    ///
    /// Entries without both an id and a receipt handle are dropped.
    pub async fn delete_message_batch(
        &self,
        input: DeleteMessageBatchInput,
        options: &[AdminOptions],
    ) -> Result<BatchOutcome, SqsError> {
        require("queue_url", &input.queue_url)?;
        let entries: Vec<DeleteMessageEntry> = input
            .entries
            .into_iter()
            .filter(|entry| !(entry.id.is_empty() && entry.receipt_handle.is_empty()))
            .collect();
        require_any("entries", &entries)?;
        let debug = AdminOptions::merge(options).debug;
        forward(
            debug,
            "DeleteMessageBatch",
            self.transport.delete_message_batch(&input.queue_url, entries),
        )
        .await
    }

    /// Start moving messages out of a dead-letter queue; returns the task handle
    pub async fn start_message_move_task(
        &self,
        input: StartMessageMoveTaskInput,
        options: &[AdminOptions],
    ) -> Result<String, SqsError> {
        require("source_arn", &input.source_arn)?;
        let debug = AdminOptions::merge(options).debug;
        let request = StartMoveTaskRequest {
            source_arn: input.source_arn,
            destination_arn: input.destination_arn.filter(|arn| !arn.is_empty()),
            max_messages_per_second: input.max_messages_per_second.filter(|rate| *rate > 0),
        };
        forward(
            debug,
            "StartMessageMoveTask",
            self.transport.start_message_move_task(request),
        )
        .await
    }

    /// Cancel a running move task; returns the number of messages already moved
    pub async fn cancel_message_move_task(
        &self,
        task_handle: &str,
        options: &[AdminOptions],
    ) -> Result<i64, SqsError> {
        require("task_handle", task_handle)?;
        let debug = AdminOptions::merge(options).debug;
        forward(
            debug,
            "CancelMessageMoveTask",
            self.transport.cancel_message_move_task(task_handle),
        )
        .await
    }

    pub async fn list_message_move_tasks(
        &self,
        source_arn: &str,
        options: &[ListMessageMoveTasksOptions],
    ) -> Result<Vec<MoveTask>, SqsError> {
        require("source_arn", source_arn)?;
        let options = ListMessageMoveTasksOptions::merge(options);
        forward(
            options.debug,
            "ListMessageMoveTasks",
            self.transport
                .list_message_move_tasks(source_arn, options.max_results),
        )
        .await
    }
}

async fn forward<T, F>(debug: bool, operation: &'static str, call: F) -> Result<T, SqsError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match call.await {
        Ok(value) => {
            verbose!(debug, operation, "Queue operation succeeded");
            Ok(value)
        }
        Err(error) => {
            verbose_error!(debug, operation, error = %error, "Queue operation failed");
            Err(error.into())
        }
    }
}
