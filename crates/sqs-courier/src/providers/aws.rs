//! AWS SQS transport backed by the official SDK.
//!
//! The SDK client is built lazily on first use and then shared by every
//! operation issued through the same transport. Clone the surrounding
//! `Arc` to share one client between producers, consumers and admin.
//!
//! ## Configuration
//!
//! Region, profile and endpoint come from [`AwsSettings`]; anything left
//! unset falls back to the SDK's default provider chain (environment
//! variables, shared config files, instance metadata). A custom endpoint
//! allows running against local SQS emulators.
//!
//! ## Example
//!
//! ```no_run
//! use sqs_courier::config::AwsSettings;
//! use sqs_courier::providers::AwsSqsTransport;
//!
//! let transport = AwsSqsTransport::new(AwsSettings {
//!     region: Some("eu-west-1".to_string()),
//!     ..Default::default()
//! });
//! ```

use crate::attributes::{AttributeValue, DataType, WireAttributes};
use crate::config::AwsSettings;
use crate::error::TransportError;
use crate::message::RawMessage;
use crate::transport::{
    AdminTransport, BatchFailure, BatchOutcome, CreateQueueRequest, DeleteMessageEntry,
    GetQueueUrlRequest, ListQueuesOutput, ListQueuesRequest, MoveTask, ReceiveRequest,
    SendReceipt, SendRequest, StartMoveTaskRequest, Transport, TransportHandle,
    VisibilityChangeEntry,
};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::error::{BuildError, ProvideErrorMetadata, SdkError};
use aws_sdk_sqs::primitives::Blob;
use aws_sdk_sqs::types::{
    ChangeMessageVisibilityBatchRequestEntry, DeleteMessageBatchRequestEntry, Message,
    MessageAttributeValue, MessageSystemAttributeName, MessageSystemAttributeNameForSends,
    MessageSystemAttributeValue, QueueAttributeName,
};
use aws_sdk_sqs::Client;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;

#[cfg(test)]
#[path = "aws_tests.rs"]
mod tests;

/// Service error codes worth retrying
const TRANSIENT_CODES: &[&str] = &[
    "ServiceUnavailable",
    "InternalError",
    "InternalFailure",
    "RequestThrottled",
    "ThrottlingException",
    "KmsThrottled",
];

// ============================================================================
// Error Mapping
// ============================================================================

fn map_sdk_error<E>(operation: &str, error: SdkError<E>) -> TransportError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let code = match &error {
        SdkError::ServiceError(_) => error
            .as_service_error()
            .and_then(|e| e.code())
            .unwrap_or("Unknown")
            .to_string(),
        SdkError::TimeoutError(_) => "Timeout".to_string(),
        SdkError::DispatchFailure(_) => "DispatchFailure".to_string(),
        SdkError::ResponseError(_) => "ResponseError".to_string(),
        _ => "Unknown".to_string(),
    };
    let transient = matches!(
        error,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
    ) || TRANSIENT_CODES.contains(&code.as_str());

    let mut message = String::new();
    describe_error(&mut message, &error);

    let mapped = TransportError::new(operation, code, message);
    if transient {
        mapped.transient()
    } else {
        mapped
    }
}

/// Flatten an error and its sources into one line
fn describe_error(out: &mut String, error: &dyn std::error::Error) {
    let _ = write!(out, "{}", error);
    if let Some(source) = error.source() {
        out.push_str(": ");
        describe_error(out, source);
    }
}

fn build_error(operation: &str, error: BuildError) -> TransportError {
    TransportError::new(operation, "InvalidParameterValue", error.to_string())
}

// ============================================================================
// Type Conversion
// ============================================================================

fn to_sdk_attribute(operation: &str, value: &AttributeValue) -> Result<MessageAttributeValue, TransportError> {
    MessageAttributeValue::builder()
        .data_type(value.data_type.as_str())
        .set_string_value(value.string_value.clone())
        .set_binary_value(value.binary_value.as_ref().map(|b| Blob::new(b.to_vec())))
        .build()
        .map_err(|e| build_error(operation, e))
}

fn to_sdk_system_attribute(
    operation: &str,
    value: &AttributeValue,
) -> Result<MessageSystemAttributeValue, TransportError> {
    MessageSystemAttributeValue::builder()
        .data_type(value.data_type.as_str())
        .set_string_value(value.string_value.clone())
        .set_binary_value(value.binary_value.as_ref().map(|b| Blob::new(b.to_vec())))
        .build()
        .map_err(|e| build_error(operation, e))
}

fn from_sdk_attribute(value: &MessageAttributeValue) -> AttributeValue {
    AttributeValue {
        data_type: DataType::from_wire_name(value.data_type()),
        string_value: value.string_value().map(str::to_string),
        binary_value: value.binary_value().map(|b| Bytes::copy_from_slice(b.as_ref())),
    }
}

fn from_sdk_message(message: &Message) -> RawMessage {
    let system_attributes = message
        .attributes()
        .map(|attrs| {
            attrs
                .iter()
                .map(|(name, value)| (name.as_str().to_string(), value.clone()))
                .collect()
        })
        .unwrap_or_default();

    let message_attributes: WireAttributes = message
        .message_attributes()
        .map(|attrs| {
            attrs
                .iter()
                .map(|(name, value)| (name.clone(), from_sdk_attribute(value)))
                .collect()
        })
        .unwrap_or_default();

    RawMessage {
        message_id: message.message_id().unwrap_or_default().to_string(),
        receipt_handle: message.receipt_handle().unwrap_or_default().to_string(),
        body: message.body().unwrap_or_default().to_string(),
        md5_of_body: message.md5_of_body().map(str::to_string),
        md5_of_message_attributes: message.md5_of_message_attributes().map(str::to_string),
        system_attributes,
        message_attributes,
    }
}

fn to_queue_attributes(attributes: HashMap<String, String>) -> HashMap<QueueAttributeName, String> {
    attributes
        .into_iter()
        .map(|(name, value)| (QueueAttributeName::from(name.as_str()), value))
        .collect()
}

// ============================================================================
// AwsSqsTransport
// ============================================================================

/// Transport issuing calls to AWS SQS
pub struct AwsSqsTransport {
    settings: AwsSettings,
    client: TransportHandle<Client>,
}

impl AwsSqsTransport {
    /// Create a transport; the SDK client is built on first use
    pub fn new(settings: AwsSettings) -> Self {
        Self {
            settings,
            client: TransportHandle::new(),
        }
    }

    /// Create a transport around an existing SDK client
    pub fn from_client(client: Client) -> Self {
        Self {
            settings: AwsSettings::default(),
            client: TransportHandle::with_client(client),
        }
    }

    async fn client(&self, operation: &str) -> Result<&Client, TransportError> {
        self.client
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest());
                if let Some(region) = &self.settings.region {
                    loader = loader.region(Region::new(region.clone()));
                }
                if let Some(profile) = &self.settings.profile {
                    loader = loader.profile_name(profile);
                }
                if let Some(endpoint) = &self.settings.endpoint_url {
                    loader = loader.endpoint_url(endpoint);
                }

                let config = loader.load().await;
                let Some(region) = config.region() else {
                    return Err(TransportError::client_initialization(
                        operation,
                        "no AWS region configured; set AWS_REGION or configure a profile region",
                    ));
                };
                tracing::debug!(region = %region, "SQS client initialized");

                Ok(Client::new(&config))
            })
            .await
    }
}

impl fmt::Debug for AwsSqsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSqsTransport")
            .field("settings", &self.settings)
            .field("client_initialized", &self.client.is_initialized())
            .finish()
    }
}

#[async_trait]
impl Transport for AwsSqsTransport {
    async fn receive_messages(
        &self,
        queue_url: &str,
        request: &ReceiveRequest,
    ) -> Result<Vec<RawMessage>, TransportError> {
        const OP: &str = "ReceiveMessage";
        let output = self
            .client(OP)
            .await?
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(request.max_messages)
            .set_visibility_timeout(request.visibility_timeout)
            .wait_time_seconds(request.wait_time)
            .set_receive_request_attempt_id(request.receive_request_attempt_id.clone())
            .message_attribute_names("All")
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        Ok(output.messages().iter().map(from_sdk_message).collect())
    }

    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<(), TransportError> {
        const OP: &str = "DeleteMessage";
        self.client(OP)
            .await?
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;
        Ok(())
    }

    async fn send_message(
        &self,
        queue_url: &str,
        request: SendRequest,
    ) -> Result<SendReceipt, TransportError> {
        const OP: &str = "SendMessage";
        let mut builder = self
            .client(OP)
            .await?
            .send_message()
            .queue_url(queue_url)
            .message_body(request.body)
            .set_delay_seconds((request.delay_seconds > 0).then_some(request.delay_seconds))
            .set_message_group_id(request.group_id)
            .set_message_deduplication_id(request.deduplication_id);

        for (name, value) in request.attributes.iter().flatten() {
            builder = builder.message_attributes(name, to_sdk_attribute(OP, value)?);
        }
        for (name, value) in request.system_attributes.iter().flatten() {
            builder = builder.message_system_attributes(
                MessageSystemAttributeNameForSends::from(name.as_str()),
                to_sdk_system_attribute(OP, value)?,
            );
        }

        let output = builder.send().await.map_err(|e| map_sdk_error(OP, e))?;

        Ok(SendReceipt {
            message_id: output.message_id().unwrap_or_default().to_string(),
            md5_of_body: output.md5_of_message_body().map(str::to_string),
            sequence_number: output.sequence_number().map(str::to_string),
        })
    }
}

#[async_trait]
impl AdminTransport for AwsSqsTransport {
    async fn create_queue(&self, request: CreateQueueRequest) -> Result<String, TransportError> {
        const OP: &str = "CreateQueue";
        let output = self
            .client(OP)
            .await?
            .create_queue()
            .queue_name(request.queue_name)
            .set_attributes((!request.attributes.is_empty()).then(|| to_queue_attributes(request.attributes)))
            .set_tags((!request.tags.is_empty()).then_some(request.tags))
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        Ok(output.queue_url().unwrap_or_default().to_string())
    }

    async fn delete_queue(&self, queue_url: &str) -> Result<(), TransportError> {
        const OP: &str = "DeleteQueue";
        self.client(OP)
            .await?
            .delete_queue()
            .queue_url(queue_url)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;
        Ok(())
    }

    async fn purge_queue(&self, queue_url: &str) -> Result<(), TransportError> {
        const OP: &str = "PurgeQueue";
        self.client(OP)
            .await?
            .purge_queue()
            .queue_url(queue_url)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;
        Ok(())
    }

    async fn tag_queue(
        &self,
        queue_url: &str,
        tags: HashMap<String, String>,
    ) -> Result<(), TransportError> {
        const OP: &str = "TagQueue";
        self.client(OP)
            .await?
            .tag_queue()
            .queue_url(queue_url)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;
        Ok(())
    }

    async fn untag_queue(&self, queue_url: &str, tag_keys: Vec<String>) -> Result<(), TransportError> {
        const OP: &str = "UntagQueue";
        self.client(OP)
            .await?
            .untag_queue()
            .queue_url(queue_url)
            .set_tag_keys(Some(tag_keys))
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;
        Ok(())
    }

    async fn set_queue_attributes(
        &self,
        queue_url: &str,
        attributes: HashMap<String, String>,
    ) -> Result<(), TransportError> {
        const OP: &str = "SetQueueAttributes";
        self.client(OP)
            .await?
            .set_queue_attributes()
            .queue_url(queue_url)
            .set_attributes(Some(to_queue_attributes(attributes)))
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;
        Ok(())
    }

    async fn list_queues(&self, request: ListQueuesRequest) -> Result<ListQueuesOutput, TransportError> {
        const OP: &str = "ListQueues";
        let output = self
            .client(OP)
            .await?
            .list_queues()
            .set_queue_name_prefix(request.queue_name_prefix)
            .set_max_results(request.max_results)
            .set_next_token(request.next_token)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        Ok(ListQueuesOutput {
            queue_urls: output.queue_urls().to_vec(),
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn list_queue_tags(&self, queue_url: &str) -> Result<HashMap<String, String>, TransportError> {
        const OP: &str = "ListQueueTags";
        let output = self
            .client(OP)
            .await?
            .list_queue_tags()
            .queue_url(queue_url)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        Ok(output.tags().cloned().unwrap_or_default())
    }

    async fn get_queue_url(&self, request: GetQueueUrlRequest) -> Result<String, TransportError> {
        const OP: &str = "GetQueueUrl";
        let output = self
            .client(OP)
            .await?
            .get_queue_url()
            .queue_name(request.queue_name)
            .set_queue_owner_aws_account_id(request.queue_owner_account_id)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        Ok(output.queue_url().unwrap_or_default().to_string())
    }

    async fn get_queue_attributes(
        &self,
        queue_url: &str,
        attribute_names: Vec<String>,
    ) -> Result<HashMap<String, String>, TransportError> {
        const OP: &str = "GetQueueAttributes";
        let names = if attribute_names.is_empty() {
            vec![QueueAttributeName::All]
        } else {
            attribute_names
                .iter()
                .map(|name| QueueAttributeName::from(name.as_str()))
                .collect()
        };

        let output = self
            .client(OP)
            .await?
            .get_queue_attributes()
            .queue_url(queue_url)
            .set_attribute_names(Some(names))
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        Ok(output
            .attributes()
            .map(|attrs| {
                attrs
                    .iter()
                    .map(|(name, value)| (name.as_str().to_string(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn change_message_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        visibility_timeout: i32,
    ) -> Result<(), TransportError> {
        const OP: &str = "ChangeMessageVisibility";
        self.client(OP)
            .await?
            .change_message_visibility()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(visibility_timeout)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;
        Ok(())
    }

    async fn change_message_visibility_batch(
        &self,
        queue_url: &str,
        entries: Vec<VisibilityChangeEntry>,
    ) -> Result<BatchOutcome, TransportError> {
        const OP: &str = "ChangeMessageVisibilityBatch";
        let entries = entries
            .into_iter()
            .map(|entry| {
                ChangeMessageVisibilityBatchRequestEntry::builder()
                    .id(entry.id)
                    .receipt_handle(entry.receipt_handle)
                    .visibility_timeout(entry.visibility_timeout)
                    .build()
                    .map_err(|e| build_error(OP, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client(OP)
            .await?
            .change_message_visibility_batch()
            .queue_url(queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        Ok(BatchOutcome {
            successful: output.successful().iter().map(|s| s.id().to_string()).collect(),
            failed: output
                .failed()
                .iter()
                .map(|f| BatchFailure {
                    id: f.id().to_string(),
                    code: f.code().to_string(),
                    message: f.message().map(str::to_string),
                    sender_fault: f.sender_fault(),
                })
                .collect(),
        })
    }

    async fn delete_message_batch(
        &self,
        queue_url: &str,
        entries: Vec<DeleteMessageEntry>,
    ) -> Result<BatchOutcome, TransportError> {
        const OP: &str = "DeleteMessageBatch";
        let entries = entries
            .into_iter()
            .map(|entry| {
                DeleteMessageBatchRequestEntry::builder()
                    .id(entry.id)
                    .receipt_handle(entry.receipt_handle)
                    .build()
                    .map_err(|e| build_error(OP, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client(OP)
            .await?
            .delete_message_batch()
            .queue_url(queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        Ok(BatchOutcome {
            successful: output.successful().iter().map(|s| s.id().to_string()).collect(),
            failed: output
                .failed()
                .iter()
                .map(|f| BatchFailure {
                    id: f.id().to_string(),
                    code: f.code().to_string(),
                    message: f.message().map(str::to_string),
                    sender_fault: f.sender_fault(),
                })
                .collect(),
        })
    }

    async fn start_message_move_task(
        &self,
        request: StartMoveTaskRequest,
    ) -> Result<String, TransportError> {
        const OP: &str = "StartMessageMoveTask";
        let output = self
            .client(OP)
            .await?
            .start_message_move_task()
            .source_arn(request.source_arn)
            .set_destination_arn(request.destination_arn)
            .set_max_number_of_messages_per_second(request.max_messages_per_second)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        Ok(output.task_handle().unwrap_or_default().to_string())
    }

    async fn cancel_message_move_task(&self, task_handle: &str) -> Result<i64, TransportError> {
        const OP: &str = "CancelMessageMoveTask";
        let output = self
            .client(OP)
            .await?
            .cancel_message_move_task()
            .task_handle(task_handle)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        Ok(output.approximate_number_of_messages_moved())
    }

    async fn list_message_move_tasks(
        &self,
        source_arn: &str,
        max_results: i32,
    ) -> Result<Vec<MoveTask>, TransportError> {
        const OP: &str = "ListMessageMoveTasks";
        let output = self
            .client(OP)
            .await?
            .list_message_move_tasks()
            .source_arn(source_arn)
            .max_results(max_results)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        Ok(output
            .results()
            .iter()
            .map(|task| MoveTask {
                task_handle: task.task_handle().map(str::to_string),
                status: task.status().unwrap_or_default().to_string(),
                source_arn: task.source_arn().unwrap_or_default().to_string(),
                destination_arn: task.destination_arn().map(str::to_string),
                max_messages_per_second: task.max_number_of_messages_per_second(),
                approximate_messages_moved: task.approximate_number_of_messages_moved(),
                approximate_messages_to_move: task.approximate_number_of_messages_to_move(),
                failure_reason: task.failure_reason().map(str::to_string),
                started_timestamp: task.started_timestamp(),
            })
            .collect())
    }
}
