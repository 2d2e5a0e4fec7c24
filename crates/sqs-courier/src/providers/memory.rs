//! In-memory queue transport for testing and development.
//!
//! This module provides a queue service simulation that:
//! - Hides received messages for their visibility timeout and issues a new
//!   receipt handle per delivery
//! - Keeps FIFO queues ordered per message group with deduplication
//! - Applies redrive policies and message move tasks between queues
//! - Records call counts and injects failures for tests
//!
//! Visibility and delays are measured with the tokio clock, so tests running
//! with paused time control message availability.

use crate::attributes::WireAttributes;
use crate::error::TransportError;
use crate::message::RawMessage;
use crate::transport::{
    AdminTransport, BatchFailure, BatchOutcome, CreateQueueRequest, DeleteMessageEntry,
    GetQueueUrlRequest, ListQueuesOutput, ListQueuesRequest, MoveTask, ReceiveRequest,
    SendReceipt, SendRequest, StartMoveTaskRequest, Transport, VisibilityChangeEntry,
    TRACE_HEADER_ATTRIBUTE,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Account id used in queue URLs and ARNs
pub const ACCOUNT_ID: &str = "000000000000";

/// Region used in queue ARNs
pub const REGION: &str = "local";

const ENDPOINT: &str = "https://sqs.local.amazonaws.com";
const DEFAULT_VISIBILITY_TIMEOUT_SECS: u64 = 30;
const MAX_VISIBILITY_TIMEOUT_SECS: i32 = 43_200;
const MAX_DELAY_SECONDS: i32 = 900;
const MAX_MESSAGE_BYTES: usize = 262_144;
const MAX_MESSAGE_ATTRIBUTES: usize = 10;
const MAX_BATCH_ENTRIES: usize = 10;
const MAX_QUEUE_NAME_LEN: usize = 80;
const DEDUPLICATION_WINDOW: Duration = Duration::from_secs(300);

const TASK_RUNNING: &str = "RUNNING";
const TASK_COMPLETED: &str = "COMPLETED";
const TASK_CANCELLING: &str = "CANCELLING";

/// URL of a queue hosted by the in-memory transport
pub fn queue_url_for(name: &str) -> String {
    format!("{}/{}/{}", ENDPOINT, ACCOUNT_ID, name)
}

/// ARN of a queue hosted by the in-memory transport
pub fn queue_arn_for(name: &str) -> String {
    format!("arn:aws:sqs:{}:{}:{}", REGION, ACCOUNT_ID, name)
}

fn queue_missing(operation: &str) -> TransportError {
    TransportError::new(
        operation,
        "QueueDoesNotExist",
        "The specified queue does not exist.",
    )
}

fn invalid_parameter(operation: &str, message: impl Into<String>) -> TransportError {
    TransportError::new(operation, "InvalidParameterValue", message)
}

fn missing_parameter(operation: &str, message: impl Into<String>) -> TransportError {
    TransportError::new(operation, "MissingParameter", message)
}

fn resource_missing(operation: &str, message: impl Into<String>) -> TransportError {
    TransportError::new(operation, "ResourceNotFoundException", message)
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Calls received by the transport, for test assertions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub receive: usize,
    pub delete: usize,
    pub send: usize,
}

#[derive(Default)]
struct FaultPlan {
    failing_fetches: u32,
    fail_all_fetches: bool,
    fail_deletes: bool,
}

impl FaultPlan {
    fn next_fetch_failure(&mut self) -> Option<TransportError> {
        if !self.fail_all_fetches && self.failing_fetches == 0 {
            return None;
        }
        self.failing_fetches = self.failing_fetches.saturating_sub(1);
        Some(
            TransportError::new("ReceiveMessage", "ServiceUnavailable", "injected fetch failure")
                .transient(),
        )
    }
}

/// Storage for all queues and move tasks
#[derive(Default)]
struct QueueStorage {
    /// Queues keyed by URL
    queues: HashMap<String, InMemoryQueue>,
    move_tasks: Vec<MoveTask>,
    faults: FaultPlan,
    calls: CallCounts,
}

impl QueueStorage {
    fn queue(&self, queue_url: &str, operation: &str) -> Result<&InMemoryQueue, TransportError> {
        self.queues
            .get(queue_url)
            .ok_or_else(|| queue_missing(operation))
    }

    fn queue_mut(
        &mut self,
        queue_url: &str,
        operation: &str,
    ) -> Result<&mut InMemoryQueue, TransportError> {
        self.queues
            .get_mut(queue_url)
            .ok_or_else(|| queue_missing(operation))
    }

    fn url_for_arn(&self, arn: &str) -> Option<String> {
        self.queues
            .values()
            .find(|q| q.arn == arn)
            .map(|q| q.url.clone())
    }

    fn queue_by_arn_mut(&mut self, arn: &str) -> Option<&mut InMemoryQueue> {
        self.queues.values_mut().find(|q| q.arn == arn)
    }

    /// Move exhausted messages of a queue to its dead-letter queue
    fn apply_redrive(&mut self, queue_url: &str, now: Instant) {
        let Some(queue) = self.queues.get(queue_url) else {
            return;
        };
        let Some(policy) = queue.redrive_policy() else {
            return;
        };
        let source_arn = queue.arn.clone();
        if self.url_for_arn(&policy.target_arn).is_none() {
            return;
        }

        let exhausted = match self.queues.get_mut(queue_url) {
            Some(queue) => queue.take_exhausted(policy.max_receive_count, now),
            None => return,
        };
        if let Some(target) = self.queue_by_arn_mut(&policy.target_arn) {
            for message in exhausted {
                target.messages.push_back(message.moved(now, Some(source_arn.clone())));
            }
        }
    }
}

struct RedrivePolicy {
    target_arn: String,
    max_receive_count: u32,
}

/// Internal state of a single queue
struct InMemoryQueue {
    name: String,
    url: String,
    arn: String,
    attributes: HashMap<String, String>,
    tags: HashMap<String, String>,
    created_at: DateTime<Utc>,
    last_modified_at: DateTime<Utc>,
    messages: VecDeque<StoredMessage>,
    /// Deduplication id to the accepted message id and acceptance time
    deduplication: HashMap<String, (String, Instant)>,
    next_sequence: u64,
}

impl InMemoryQueue {
    fn new(name: &str, attributes: HashMap<String, String>, tags: HashMap<String, String>) -> Self {
        let mut all_attributes = HashMap::from([
            (
                "VisibilityTimeout".to_string(),
                DEFAULT_VISIBILITY_TIMEOUT_SECS.to_string(),
            ),
            ("DelaySeconds".to_string(), "0".to_string()),
            ("MaximumMessageSize".to_string(), MAX_MESSAGE_BYTES.to_string()),
            ("MessageRetentionPeriod".to_string(), "345600".to_string()),
            ("ReceiveMessageWaitTimeSeconds".to_string(), "0".to_string()),
        ]);
        all_attributes.extend(attributes);
        let now = Utc::now();

        Self {
            name: name.to_string(),
            url: queue_url_for(name),
            arn: queue_arn_for(name),
            attributes: all_attributes,
            tags,
            created_at: now,
            last_modified_at: now,
            messages: VecDeque::new(),
            deduplication: HashMap::new(),
            next_sequence: 1,
        }
    }

    fn is_fifo(&self) -> bool {
        self.name.ends_with(".fifo")
    }

    fn numeric_attribute(&self, name: &str) -> Option<u64> {
        self.attributes.get(name).and_then(|v| v.parse().ok())
    }

    fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(
            self.numeric_attribute("VisibilityTimeout")
                .unwrap_or(DEFAULT_VISIBILITY_TIMEOUT_SECS),
        )
    }

    fn content_based_deduplication(&self) -> bool {
        self.attributes
            .get("ContentBasedDeduplication")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    fn redrive_policy(&self) -> Option<RedrivePolicy> {
        let document: Value = serde_json::from_str(self.attributes.get("RedrivePolicy")?).ok()?;
        let target_arn = document.get("deadLetterTargetArn")?.as_str()?.to_string();
        let max_receive_count = document.get("maxReceiveCount").and_then(|v| {
            v.as_u64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        })?;

        Some(RedrivePolicy {
            target_arn,
            max_receive_count: u32::try_from(max_receive_count).ok()?,
        })
    }

    fn take_exhausted(&mut self, max_receive_count: u32, now: Instant) -> Vec<StoredMessage> {
        let (exhausted, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.messages)
            .into_iter()
            .partition(|m| m.is_visible(now) && m.receive_count >= max_receive_count);
        self.messages = kept.into();
        exhausted
    }

    /// Hand out up to `max` visible messages, respecting FIFO group order
    fn deliver(&mut self, max: usize, visibility: Duration, now: Instant) -> Vec<RawMessage> {
        let blocked_groups: HashSet<String> = if self.is_fifo() {
            self.messages
                .iter()
                .filter(|m| m.is_in_flight(now))
                .filter_map(|m| m.group_id.clone())
                .collect()
        } else {
            HashSet::new()
        };

        let received_at = Utc::now();
        let mut delivered = Vec::new();
        for message in self.messages.iter_mut() {
            if delivered.len() >= max {
                break;
            }
            if !message.is_visible(now) {
                continue;
            }
            if message
                .group_id
                .as_ref()
                .is_some_and(|g| blocked_groups.contains(g))
            {
                continue;
            }

            message.receive_count += 1;
            message.first_received_at.get_or_insert(received_at);
            message.receipt_handle = Some(Uuid::new_v4().to_string());
            message.available_at = now + visibility;
            delivered.push(message.to_raw());
        }
        delivered
    }

    fn find_by_handle(
        &mut self,
        receipt_handle: &str,
        operation: &str,
    ) -> Result<&mut StoredMessage, TransportError> {
        self.messages
            .iter_mut()
            .find(|m| m.receipt_handle.as_deref() == Some(receipt_handle))
            .ok_or_else(|| {
                TransportError::new(
                    operation,
                    "ReceiptHandleIsInvalid",
                    format!("The receipt handle \"{}\" is not valid.", receipt_handle),
                )
            })
    }

    fn delete_by_handle(&mut self, receipt_handle: &str, operation: &str) -> Result<(), TransportError> {
        let message_id = self.find_by_handle(receipt_handle, operation)?.message_id.clone();
        self.messages.retain(|m| m.message_id != message_id);
        Ok(())
    }

    fn change_visibility(
        &mut self,
        receipt_handle: &str,
        visibility_timeout: i32,
        now: Instant,
        operation: &str,
    ) -> Result<(), TransportError> {
        if !(0..=MAX_VISIBILITY_TIMEOUT_SECS).contains(&visibility_timeout) {
            return Err(invalid_parameter(
                operation,
                format!(
                    "Value {} for parameter VisibilityTimeout is invalid. Reason: Must be between 0 and {}.",
                    visibility_timeout, MAX_VISIBILITY_TIMEOUT_SECS
                ),
            ));
        }

        let message = self.find_by_handle(receipt_handle, operation)?;
        if !message.is_in_flight(now) {
            return Err(TransportError::new(
                operation,
                "AWS.SimpleQueueService.MessageNotInflight",
                "Message is not in flight.",
            ));
        }
        message.available_at = now + Duration::from_secs(visibility_timeout.unsigned_abs().into());
        Ok(())
    }

    /// Computed and configured attributes
    fn all_attributes(&self, now: Instant) -> HashMap<String, String> {
        let visible = self.messages.iter().filter(|m| m.is_visible(now)).count();
        let in_flight = self.messages.iter().filter(|m| m.is_in_flight(now)).count();
        let delayed = self.messages.iter().filter(|m| m.is_delayed(now)).count();

        let mut attributes = self.attributes.clone();
        attributes.insert("QueueArn".to_string(), self.arn.clone());
        attributes.insert(
            "CreatedTimestamp".to_string(),
            self.created_at.timestamp().to_string(),
        );
        attributes.insert(
            "LastModifiedTimestamp".to_string(),
            self.last_modified_at.timestamp().to_string(),
        );
        attributes.insert("ApproximateNumberOfMessages".to_string(), visible.to_string());
        attributes.insert(
            "ApproximateNumberOfMessagesNotVisible".to_string(),
            in_flight.to_string(),
        );
        attributes.insert(
            "ApproximateNumberOfMessagesDelayed".to_string(),
            delayed.to_string(),
        );
        attributes
    }
}

/// A message stored in a queue with its delivery state
#[derive(Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    attributes: WireAttributes,
    trace_header: Option<String>,
    group_id: Option<String>,
    deduplication_id: Option<String>,
    sequence_number: Option<String>,
    /// Queue the message was dead-lettered from
    origin_arn: Option<String>,
    sent_at: DateTime<Utc>,
    available_at: Instant,
    receive_count: u32,
    first_received_at: Option<DateTime<Utc>>,
    /// Handle of the latest delivery
    receipt_handle: Option<String>,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        self.available_at <= now
    }

    fn is_in_flight(&self, now: Instant) -> bool {
        self.receipt_handle.is_some() && self.available_at > now
    }

    fn is_delayed(&self, now: Instant) -> bool {
        self.receipt_handle.is_none() && self.available_at > now
    }

    /// Reset delivery state for a message arriving in another queue
    fn moved(mut self, now: Instant, origin_arn: Option<String>) -> Self {
        self.available_at = now;
        self.receive_count = 0;
        self.first_received_at = None;
        self.receipt_handle = None;
        self.origin_arn = origin_arn;
        self
    }

    fn to_raw(&self) -> RawMessage {
        let mut system_attributes = HashMap::from([
            (
                "ApproximateReceiveCount".to_string(),
                self.receive_count.to_string(),
            ),
            (
                "SentTimestamp".to_string(),
                self.sent_at.timestamp_millis().to_string(),
            ),
            ("SenderId".to_string(), ACCOUNT_ID.to_string()),
        ]);
        if let Some(first) = self.first_received_at {
            system_attributes.insert(
                "ApproximateFirstReceiveTimestamp".to_string(),
                first.timestamp_millis().to_string(),
            );
        }
        let optional = [
            (TRACE_HEADER_ATTRIBUTE, &self.trace_header),
            ("MessageGroupId", &self.group_id),
            ("MessageDeduplicationId", &self.deduplication_id),
            ("SequenceNumber", &self.sequence_number),
            ("DeadLetterQueueSourceArn", &self.origin_arn),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                system_attributes.insert(name.to_string(), value.clone());
            }
        }

        RawMessage {
            message_id: self.message_id.clone(),
            receipt_handle: self.receipt_handle.clone().unwrap_or_default(),
            body: self.body.clone(),
            md5_of_body: None,
            md5_of_message_attributes: None,
            system_attributes,
            message_attributes: self.attributes.clone(),
        }
    }
}

fn validate_queue_name(
    name: &str,
    attributes: &HashMap<String, String>,
    operation: &str,
) -> Result<(), TransportError> {
    let fifo_suffix = name.strip_suffix(".fifo");
    let stem = fifo_suffix.unwrap_or(name);
    let well_formed = !stem.is_empty()
        && name.len() <= MAX_QUEUE_NAME_LEN
        && stem
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !well_formed {
        return Err(invalid_parameter(
            operation,
            "Can only include alphanumeric characters, hyphens, or underscores. 1 to 80 in length",
        ));
    }

    let fifo_requested = attributes
        .get("FifoQueue")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    if fifo_suffix.is_some() != fifo_requested {
        return Err(invalid_parameter(
            operation,
            "The name of a FIFO queue must end with the .fifo suffix and set the FifoQueue attribute",
        ));
    }
    Ok(())
}

fn validate_batch<T>(
    entries: &[T],
    id: impl Fn(&T) -> &str,
    operation: &str,
) -> Result<(), TransportError> {
    if entries.is_empty() {
        return Err(TransportError::new(
            operation,
            "AWS.SimpleQueueService.EmptyBatchRequest",
            "There should be at least one entry in the request.",
        ));
    }
    if entries.len() > MAX_BATCH_ENTRIES {
        return Err(TransportError::new(
            operation,
            "AWS.SimpleQueueService.TooManyEntriesInBatchRequest",
            format!("Maximum number of entries per request are {}.", MAX_BATCH_ENTRIES),
        ));
    }
    let mut seen = HashSet::new();
    if !entries.iter().all(|e| seen.insert(id(e))) {
        return Err(TransportError::new(
            operation,
            "AWS.SimpleQueueService.BatchEntryIdsNotDistinct",
            "Two or more batch entries in the request have the same Id.",
        ));
    }
    Ok(())
}

fn record_entry(outcome: &mut BatchOutcome, id: &str, result: Result<(), TransportError>) {
    match result {
        Ok(()) => outcome.successful.push(id.to_string()),
        Err(e) => outcome.failed.push(BatchFailure {
            id: id.to_string(),
            code: e.code,
            message: Some(e.message),
            sender_fault: true,
        }),
    }
}

// ============================================================================
// InMemoryTransport
// ============================================================================

/// In-memory queue service implementing the full transport surface
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    storage: Arc<RwLock<QueueStorage>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` fetches fail with a transient error
    pub fn fail_next_fetches(&self, count: u32) {
        if let Ok(mut storage) = self.storage.write() {
            storage.faults.failing_fetches = count;
        }
    }

    /// Make every fetch fail until switched off
    pub fn fail_all_fetches(&self, enabled: bool) {
        if let Ok(mut storage) = self.storage.write() {
            storage.faults.fail_all_fetches = enabled;
        }
    }

    /// Make every delete fail until switched off
    pub fn fail_deletes(&self, enabled: bool) {
        if let Ok(mut storage) = self.storage.write() {
            storage.faults.fail_deletes = enabled;
        }
    }

    pub fn call_counts(&self) -> CallCounts {
        self.storage
            .read()
            .map(|storage| storage.calls)
            .unwrap_or_default()
    }

    /// Number of messages held by a queue, in flight or not
    pub fn message_count(&self, queue_url: &str) -> usize {
        self.storage
            .read()
            .ok()
            .and_then(|storage| storage.queues.get(queue_url).map(|q| q.messages.len()))
            .unwrap_or_default()
    }

    fn read(&self, operation: &str) -> Result<RwLockReadGuard<'_, QueueStorage>, TransportError> {
        self.storage.read().map_err(|_| {
            TransportError::new(operation, "InternalError", "in-memory storage lock poisoned")
        })
    }

    fn write(&self, operation: &str) -> Result<RwLockWriteGuard<'_, QueueStorage>, TransportError> {
        self.storage.write().map_err(|_| {
            TransportError::new(operation, "InternalError", "in-memory storage lock poisoned")
        })
    }

    fn validate_send(queue: &InMemoryQueue, request: &SendRequest) -> Result<(), TransportError> {
        const OP: &str = "SendMessage";

        if request.body.is_empty() {
            return Err(missing_parameter(OP, "The request must contain the parameter MessageBody."));
        }
        if request.body.len() > MAX_MESSAGE_BYTES {
            return Err(invalid_parameter(
                OP,
                format!("Message must be shorter than {} bytes.", MAX_MESSAGE_BYTES),
            ));
        }
        if !(0..=MAX_DELAY_SECONDS).contains(&request.delay_seconds) {
            return Err(invalid_parameter(
                OP,
                format!(
                    "Value {} for parameter DelaySeconds is invalid. Reason: Must be >= 0 and <= {}.",
                    request.delay_seconds, MAX_DELAY_SECONDS
                ),
            ));
        }

        if let Some(attributes) = &request.attributes {
            if attributes.len() > MAX_MESSAGE_ATTRIBUTES {
                return Err(invalid_parameter(
                    OP,
                    format!("Number of message attributes exceeds {}.", MAX_MESSAGE_ATTRIBUTES),
                ));
            }
            if let Some((name, _)) = attributes.iter().find(|(n, v)| n.is_empty() || !v.is_populated()) {
                return Err(invalid_parameter(
                    OP,
                    format!("Message attribute '{}' must contain a non-empty value.", name),
                ));
            }
        }

        if queue.is_fifo() {
            if request.group_id.as_deref().unwrap_or_default().is_empty() {
                return Err(missing_parameter(
                    OP,
                    "The request must contain the parameter MessageGroupId.",
                ));
            }
            if request.delay_seconds > 0 {
                return Err(invalid_parameter(
                    OP,
                    "DelaySeconds is not supported per message on FIFO queues.",
                ));
            }
            if request.deduplication_id.is_none() && !queue.content_based_deduplication() {
                return Err(invalid_parameter(
                    OP,
                    "The queue should either have ContentBasedDeduplication enabled or MessageDeduplicationId provided explicitly.",
                ));
            }
        } else if request.deduplication_id.is_some() {
            return Err(invalid_parameter(
                OP,
                "The request include parameter MessageDeduplicationId that is not valid for this queue type.",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn receive_messages(
        &self,
        queue_url: &str,
        request: &ReceiveRequest,
    ) -> Result<Vec<RawMessage>, TransportError> {
        const OP: &str = "ReceiveMessage";
        let mut storage = self.write(OP)?;
        storage.calls.receive += 1;

        if let Some(error) = storage.faults.next_fetch_failure() {
            return Err(error);
        }
        if !(1..=10).contains(&request.max_messages) {
            return Err(invalid_parameter(
                OP,
                format!(
                    "Value {} for parameter MaxNumberOfMessages is invalid. Reason: Must be between 1 and 10.",
                    request.max_messages
                ),
            ));
        }

        let now = Instant::now();
        storage.queue(queue_url, OP)?;
        storage.apply_redrive(queue_url, now);

        let queue = storage.queue_mut(queue_url, OP)?;
        let visibility = request
            .visibility_timeout
            .map(|secs| Duration::from_secs(secs.unsigned_abs().into()))
            .unwrap_or_else(|| queue.visibility_timeout());
        let max = usize::try_from(request.max_messages).unwrap_or(1);

        Ok(queue.deliver(max, visibility, now))
    }

    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<(), TransportError> {
        const OP: &str = "DeleteMessage";
        let mut storage = self.write(OP)?;
        storage.calls.delete += 1;

        if storage.faults.fail_deletes {
            return Err(
                TransportError::new(OP, "ServiceUnavailable", "injected delete failure").transient(),
            );
        }
        storage
            .queue_mut(queue_url, OP)?
            .delete_by_handle(receipt_handle, OP)
    }

    async fn send_message(
        &self,
        queue_url: &str,
        request: SendRequest,
    ) -> Result<SendReceipt, TransportError> {
        const OP: &str = "SendMessage";
        let mut storage = self.write(OP)?;
        storage.calls.send += 1;

        let queue = storage.queue_mut(queue_url, OP)?;
        Self::validate_send(queue, &request)?;

        let now = Instant::now();
        let message_id = Uuid::new_v4().to_string();

        let (deduplication_id, sequence_number) = if queue.is_fifo() {
            let key = request
                .deduplication_id
                .clone()
                .unwrap_or_else(|| request.body.clone());
            queue
                .deduplication
                .retain(|_, (_, accepted)| now.duration_since(*accepted) < DEDUPLICATION_WINDOW);
            if let Some((existing_id, _)) = queue.deduplication.get(&key) {
                return Ok(SendReceipt {
                    message_id: existing_id.clone(),
                    md5_of_body: None,
                    sequence_number: None,
                });
            }
            queue.deduplication.insert(key, (message_id.clone(), now));

            let sequence = format!("{:020}", queue.next_sequence);
            queue.next_sequence += 1;
            (request.deduplication_id.clone(), Some(sequence))
        } else {
            (None, None)
        };

        let delay_seconds = if request.delay_seconds > 0 {
            u64::from(request.delay_seconds.unsigned_abs())
        } else {
            queue.numeric_attribute("DelaySeconds").unwrap_or_default()
        };

        let trace_header = request
            .system_attributes
            .as_ref()
            .and_then(|attrs| attrs.get(TRACE_HEADER_ATTRIBUTE))
            .and_then(|value| value.string_value.clone());

        queue.messages.push_back(StoredMessage {
            message_id: message_id.clone(),
            body: request.body,
            attributes: request.attributes.unwrap_or_default(),
            trace_header,
            group_id: request.group_id,
            deduplication_id,
            sequence_number: sequence_number.clone(),
            origin_arn: None,
            sent_at: Utc::now(),
            available_at: now + Duration::from_secs(delay_seconds),
            receive_count: 0,
            first_received_at: None,
            receipt_handle: None,
        });

        Ok(SendReceipt {
            message_id,
            md5_of_body: None,
            sequence_number,
        })
    }
}

#[async_trait]
impl AdminTransport for InMemoryTransport {
    async fn create_queue(&self, request: CreateQueueRequest) -> Result<String, TransportError> {
        const OP: &str = "CreateQueue";
        validate_queue_name(&request.queue_name, &request.attributes, OP)?;

        let mut storage = self.write(OP)?;
        let url = queue_url_for(&request.queue_name);
        if let Some(existing) = storage.queues.get(&url) {
            let conflicting = request
                .attributes
                .iter()
                .any(|(k, v)| existing.attributes.get(k) != Some(v));
            if conflicting {
                return Err(TransportError::new(
                    OP,
                    "QueueNameExists",
                    "A queue already exists with the same name and a different value for attribute(s)",
                ));
            }
            return Ok(url);
        }

        storage.queues.insert(
            url.clone(),
            InMemoryQueue::new(&request.queue_name, request.attributes, request.tags),
        );
        Ok(url)
    }

    async fn delete_queue(&self, queue_url: &str) -> Result<(), TransportError> {
        const OP: &str = "DeleteQueue";
        self.write(OP)?
            .queues
            .remove(queue_url)
            .map(|_| ())
            .ok_or_else(|| queue_missing(OP))
    }

    async fn purge_queue(&self, queue_url: &str) -> Result<(), TransportError> {
        const OP: &str = "PurgeQueue";
        let mut storage = self.write(OP)?;
        storage.queue_mut(queue_url, OP)?.messages.clear();
        Ok(())
    }

    async fn tag_queue(
        &self,
        queue_url: &str,
        tags: HashMap<String, String>,
    ) -> Result<(), TransportError> {
        const OP: &str = "TagQueue";
        let mut storage = self.write(OP)?;
        storage.queue_mut(queue_url, OP)?.tags.extend(tags);
        Ok(())
    }

    async fn untag_queue(&self, queue_url: &str, tag_keys: Vec<String>) -> Result<(), TransportError> {
        const OP: &str = "UntagQueue";
        let mut storage = self.write(OP)?;
        let queue = storage.queue_mut(queue_url, OP)?;
        for key in tag_keys {
            queue.tags.remove(&key);
        }
        Ok(())
    }

    async fn set_queue_attributes(
        &self,
        queue_url: &str,
        attributes: HashMap<String, String>,
    ) -> Result<(), TransportError> {
        const OP: &str = "SetQueueAttributes";
        let mut storage = self.write(OP)?;
        let queue = storage.queue_mut(queue_url, OP)?;
        if attributes.contains_key("FifoQueue") {
            return Err(TransportError::new(
                OP,
                "InvalidAttributeName",
                "Unknown Attribute FifoQueue.",
            ));
        }
        queue.attributes.extend(attributes);
        queue.last_modified_at = Utc::now();
        Ok(())
    }

    async fn list_queues(&self, request: ListQueuesRequest) -> Result<ListQueuesOutput, TransportError> {
        const OP: &str = "ListQueues";
        let storage = self.read(OP)?;

        let prefix = request.queue_name_prefix.unwrap_or_default();
        let mut names: Vec<&str> = storage
            .queues
            .values()
            .map(|q| q.name.as_str())
            .filter(|name| name.starts_with(prefix.as_str()))
            .collect();
        names.sort_unstable();

        let Some(max_results) = request.max_results else {
            return Ok(ListQueuesOutput {
                queue_urls: names.into_iter().map(queue_url_for).collect(),
                next_token: None,
            });
        };
        if !(1..=1000).contains(&max_results) {
            return Err(invalid_parameter(
                OP,
                "Value for parameter MaxResults is invalid. Reason: Must be between 1 and 1000.",
            ));
        }

        let start = match request.next_token.as_deref() {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| invalid_parameter(OP, "Invalid NextToken value."))?,
            None => 0,
        };
        let page_size = usize::try_from(max_results).unwrap_or(1);
        let end = names.len().min(start.saturating_add(page_size));
        let queue_urls = names
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|name| queue_url_for(name))
            .collect();

        Ok(ListQueuesOutput {
            queue_urls,
            next_token: (end < names.len()).then(|| end.to_string()),
        })
    }

    async fn list_queue_tags(&self, queue_url: &str) -> Result<HashMap<String, String>, TransportError> {
        const OP: &str = "ListQueueTags";
        Ok(self.read(OP)?.queue(queue_url, OP)?.tags.clone())
    }

    async fn get_queue_url(&self, request: GetQueueUrlRequest) -> Result<String, TransportError> {
        const OP: &str = "GetQueueUrl";
        if request
            .queue_owner_account_id
            .as_deref()
            .is_some_and(|owner| owner != ACCOUNT_ID)
        {
            return Err(queue_missing(OP));
        }

        let url = queue_url_for(&request.queue_name);
        self.read(OP)?.queue(&url, OP)?;
        Ok(url)
    }

    async fn get_queue_attributes(
        &self,
        queue_url: &str,
        attribute_names: Vec<String>,
    ) -> Result<HashMap<String, String>, TransportError> {
        const OP: &str = "GetQueueAttributes";
        let storage = self.read(OP)?;
        let all = storage.queue(queue_url, OP)?.all_attributes(Instant::now());

        if attribute_names.is_empty() || attribute_names.iter().any(|n| n == "All") {
            return Ok(all);
        }
        Ok(all
            .into_iter()
            .filter(|(name, _)| attribute_names.contains(name))
            .collect())
    }

    async fn change_message_visibility(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        visibility_timeout: i32,
    ) -> Result<(), TransportError> {
        const OP: &str = "ChangeMessageVisibility";
        let mut storage = self.write(OP)?;
        storage.queue_mut(queue_url, OP)?.change_visibility(
            receipt_handle,
            visibility_timeout,
            Instant::now(),
            OP,
        )
    }

    async fn change_message_visibility_batch(
        &self,
        queue_url: &str,
        entries: Vec<VisibilityChangeEntry>,
    ) -> Result<BatchOutcome, TransportError> {
        const OP: &str = "ChangeMessageVisibilityBatch";
        validate_batch(&entries, |e| e.id.as_str(), OP)?;

        let mut storage = self.write(OP)?;
        let queue = storage.queue_mut(queue_url, OP)?;
        let now = Instant::now();
        let mut outcome = BatchOutcome::default();
        for entry in &entries {
            let result =
                queue.change_visibility(&entry.receipt_handle, entry.visibility_timeout, now, OP);
            record_entry(&mut outcome, &entry.id, result);
        }
        Ok(outcome)
    }

    async fn delete_message_batch(
        &self,
        queue_url: &str,
        entries: Vec<DeleteMessageEntry>,
    ) -> Result<BatchOutcome, TransportError> {
        const OP: &str = "DeleteMessageBatch";
        validate_batch(&entries, |e| e.id.as_str(), OP)?;

        let mut storage = self.write(OP)?;
        storage.calls.delete += entries.len();
        let queue = storage.queue_mut(queue_url, OP)?;
        let mut outcome = BatchOutcome::default();
        for entry in &entries {
            let result = queue.delete_by_handle(&entry.receipt_handle, OP);
            record_entry(&mut outcome, &entry.id, result);
        }
        Ok(outcome)
    }

    async fn start_message_move_task(
        &self,
        request: StartMoveTaskRequest,
    ) -> Result<String, TransportError> {
        const OP: &str = "StartMessageMoveTask";
        if request
            .max_messages_per_second
            .is_some_and(|rate| !(1..=500).contains(&rate))
        {
            return Err(invalid_parameter(
                OP,
                "MaxNumberOfMessagesPerSecond must be between 1 and 500.",
            ));
        }

        let mut storage = self.write(OP)?;
        let source_url = storage
            .url_for_arn(&request.source_arn)
            .ok_or_else(|| resource_missing(OP, "The resource that you specified for the SourceArn parameter doesn't exist."))?;
        if let Some(destination) = &request.destination_arn {
            if storage.url_for_arn(destination).is_none() {
                return Err(resource_missing(
                    OP,
                    "The resource that you specified for the DestinationArn parameter doesn't exist.",
                ));
            }
        }

        let now = Instant::now();
        let pending = std::mem::take(&mut storage.queue_mut(&source_url, OP)?.messages);
        let to_move = pending.len();
        let mut moved = 0i64;
        let mut remaining = VecDeque::new();
        for message in pending {
            let target_arn = request
                .destination_arn
                .clone()
                .or_else(|| message.origin_arn.clone());
            let target = match target_arn {
                Some(arn) => storage.queue_by_arn_mut(&arn),
                None => None,
            };
            match target {
                Some(target) => {
                    target.messages.push_back(message.moved(now, None));
                    moved += 1;
                }
                None => remaining.push_back(message),
            }
        }
        storage.queue_mut(&source_url, OP)?.messages = remaining;

        let task_handle = Uuid::new_v4().to_string();
        storage.move_tasks.push(MoveTask {
            task_handle: Some(task_handle.clone()),
            status: TASK_COMPLETED.to_string(),
            source_arn: request.source_arn,
            destination_arn: request.destination_arn,
            max_messages_per_second: request.max_messages_per_second,
            approximate_messages_moved: moved,
            approximate_messages_to_move: i64::try_from(to_move).ok(),
            failure_reason: None,
            started_timestamp: Utc::now().timestamp_millis(),
        });
        Ok(task_handle)
    }

    async fn cancel_message_move_task(&self, task_handle: &str) -> Result<i64, TransportError> {
        const OP: &str = "CancelMessageMoveTask";
        let mut storage = self.write(OP)?;
        let task = storage
            .move_tasks
            .iter_mut()
            .find(|t| t.task_handle.as_deref() == Some(task_handle))
            .ok_or_else(|| resource_missing(OP, "The specified task handle does not exist."))?;

        if task.status != TASK_RUNNING {
            return Err(TransportError::new(
                OP,
                "UnsupportedOperation",
                format!("Only active tasks can be cancelled, task is {}.", task.status),
            ));
        }
        task.status = TASK_CANCELLING.to_string();
        Ok(task.approximate_messages_moved)
    }

    async fn list_message_move_tasks(
        &self,
        source_arn: &str,
        max_results: i32,
    ) -> Result<Vec<MoveTask>, TransportError> {
        const OP: &str = "ListMessageMoveTasks";
        if !(1..=10).contains(&max_results) {
            return Err(invalid_parameter(OP, "MaxResults must be between 1 and 10."));
        }

        let storage = self.read(OP)?;
        if storage.url_for_arn(source_arn).is_none() {
            return Err(resource_missing(
                OP,
                "The resource that you specified for the SourceArn parameter doesn't exist.",
            ));
        }

        let take = usize::try_from(max_results).unwrap_or(1);
        Ok(storage
            .move_tasks
            .iter()
            .rev()
            .filter(|t| t.source_arn == source_arn)
            .take(take)
            .cloned()
            .collect())
    }
}
