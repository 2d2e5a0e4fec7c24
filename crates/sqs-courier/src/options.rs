//! Option records for producers, consumers and queue administration.
//!
//! Every operation accepts a slice of option records. The slice is folded
//! into a single effective record where, field by field, the last non-zero
//! value wins. Fields left at zero keep their defaults.

use crate::attributes::{record_or_map_to_wire_attributes, WireAttributes};
use crate::error::SqsError;
use crate::transport::ReceiveRequest;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

#[cfg(test)]
#[path = "options_tests.rs"]
mod tests;

/// Largest batch a single fetch may request
pub const MAX_MESSAGES_PER_FETCH: i32 = 10;

pub const DEFAULT_FETCH_RETRY_DELAY: Duration = Duration::from_secs(5);

pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of move tasks returned when listing
pub const DEFAULT_MOVE_TASK_RESULTS: i32 = 1;

fn last_non_empty(current: &mut Option<String>, next: &Option<String>) {
    if let Some(value) = next.as_ref().filter(|v| !v.is_empty()) {
        *current = Some(value.clone());
    }
}

fn last_non_zero(current: &mut Duration, next: Duration) {
    if !next.is_zero() {
        *current = next;
    }
}

// ============================================================================
// Consumer Options
// ============================================================================

/// Settings for a consumer polling loop.
///
/// `Default` leaves every field unset; defaults are applied by [`merge`](Self::merge).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOptions {
    /// Batch size per fetch, between 1 and 10
    pub max_messages_per_fetch: i32,
    /// How long fetched messages stay hidden; zero uses the queue default
    pub visibility_timeout: Duration,
    /// Long-poll wait per fetch; zero returns immediately
    pub wait_time: Duration,
    /// Pause between polling cycles
    pub fetch_retry_delay: Duration,
    /// Maximum time a handler may run for a single message
    pub handler_timeout: Duration,
    pub auto_delete_on_success: bool,
    /// Receive request attempt id for FIFO queues
    pub dedup_attempt_id: Option<String>,
    pub debug: bool,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumerOptions {
    /// Create an option record with every field unset
    pub fn new() -> Self {
        Self {
            max_messages_per_fetch: 0,
            visibility_timeout: Duration::ZERO,
            wait_time: Duration::ZERO,
            fetch_retry_delay: Duration::ZERO,
            handler_timeout: Duration::ZERO,
            auto_delete_on_success: false,
            dedup_attempt_id: None,
            debug: false,
        }
    }

    pub fn with_max_messages_per_fetch(mut self, max: i32) -> Self {
        self.max_messages_per_fetch = max;
        self
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn with_wait_time(mut self, wait: Duration) -> Self {
        self.wait_time = wait;
        self
    }

    pub fn with_fetch_retry_delay(mut self, delay: Duration) -> Self {
        self.fetch_retry_delay = delay;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_auto_delete_on_success(mut self, enabled: bool) -> Self {
        self.auto_delete_on_success = enabled;
        self
    }

    pub fn with_dedup_attempt_id(mut self, id: impl Into<String>) -> Self {
        self.dedup_attempt_id = Some(id.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Fold option records, then fill the fields still unset with defaults.
    ///
    /// The batch size is clamped to `1..=10`; boolean flags stay set once
    /// any record sets them.
    pub fn merge(options: &[ConsumerOptions]) -> ConsumerOptions {
        let mut merged = ConsumerOptions::new();
        for option in options {
            if option.max_messages_per_fetch > 0 {
                merged.max_messages_per_fetch = option.max_messages_per_fetch;
            }
            last_non_zero(&mut merged.visibility_timeout, option.visibility_timeout);
            last_non_zero(&mut merged.wait_time, option.wait_time);
            last_non_zero(&mut merged.fetch_retry_delay, option.fetch_retry_delay);
            last_non_zero(&mut merged.handler_timeout, option.handler_timeout);
            merged.auto_delete_on_success |= option.auto_delete_on_success;
            last_non_empty(&mut merged.dedup_attempt_id, &option.dedup_attempt_id);
            merged.debug |= option.debug;
        }
        if merged.max_messages_per_fetch == 0 {
            merged.max_messages_per_fetch = MAX_MESSAGES_PER_FETCH;
        }
        if merged.fetch_retry_delay.is_zero() {
            merged.fetch_retry_delay = DEFAULT_FETCH_RETRY_DELAY;
        }
        if merged.handler_timeout.is_zero() {
            merged.handler_timeout = DEFAULT_HANDLER_TIMEOUT;
        }
        merged.max_messages_per_fetch = merged.max_messages_per_fetch.clamp(1, MAX_MESSAGES_PER_FETCH);
        merged
    }

    /// Fetch request described by these options
    pub(crate) fn receive_request(&self) -> ReceiveRequest {
        ReceiveRequest {
            max_messages: self.max_messages_per_fetch,
            visibility_timeout: (!self.visibility_timeout.is_zero())
                .then(|| whole_seconds(self.visibility_timeout)),
            wait_time: whole_seconds(self.wait_time),
            receive_request_attempt_id: self.dedup_attempt_id.clone(),
        }
    }
}

fn whole_seconds(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

// ============================================================================
// Producer Options
// ============================================================================

/// Attributes captured when building producer options
#[derive(Debug, Clone, PartialEq, Eq)]
enum CapturedAttributes {
    Encoded(WireAttributes),
    Rejected { kind: &'static str },
}

/// Settings for a single send
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerOptions {
    /// Delivery delay; whole seconds are sent
    pub delay: Duration,
    attributes: Option<CapturedAttributes>,
    /// Value for the `AWSTraceHeader` system attribute
    pub trace_header: Option<String>,
    pub deduplication_id: Option<String>,
    pub group_id: Option<String>,
    pub debug: bool,
}

impl ProducerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Attach message attributes from any map or record.
    ///
    /// The value is encoded immediately. A value that is not a map or record
    /// makes the send fail with [`SqsError::InvalidAttributeContainer`].
    pub fn with_attributes<A>(mut self, attributes: &A) -> Self
    where
        A: Serialize + ?Sized,
    {
        self.attributes = match record_or_map_to_wire_attributes(attributes) {
            Ok(Some(wire)) => Some(CapturedAttributes::Encoded(wire)),
            Ok(None) => None,
            Err(SqsError::InvalidAttributeContainer { kind }) => {
                Some(CapturedAttributes::Rejected { kind })
            }
            Err(_) => Some(CapturedAttributes::Rejected {
                kind: "unserializable value",
            }),
        };
        self
    }

    /// Attach already encoded wire attributes
    pub fn with_wire_attributes(mut self, attributes: WireAttributes) -> Self {
        self.attributes = (!attributes.is_empty()).then_some(CapturedAttributes::Encoded(attributes));
        self
    }

    pub fn with_trace_header(mut self, header: impl Into<String>) -> Self {
        self.trace_header = Some(header.into());
        self
    }

    pub fn with_deduplication_id(mut self, id: impl Into<String>) -> Self {
        self.deduplication_id = Some(id.into());
        self
    }

    pub fn with_group_id(mut self, id: impl Into<String>) -> Self {
        self.group_id = Some(id.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Encoded attributes, if any were attached.
    ///
    /// # Errors
    ///
    /// Returns [`SqsError::InvalidAttributeContainer`] when the attached value
    /// was not a map or record.
    pub fn attributes(&self) -> Result<Option<&WireAttributes>, SqsError> {
        match &self.attributes {
            None => Ok(None),
            Some(CapturedAttributes::Encoded(wire)) => Ok(Some(wire)),
            Some(CapturedAttributes::Rejected { kind }) => {
                Err(SqsError::InvalidAttributeContainer { kind })
            }
        }
    }

    /// Delay in whole seconds as sent on the wire
    pub fn delay_seconds(&self) -> i32 {
        whole_seconds(self.delay)
    }

    /// Fold option records, last non-zero value wins
    pub fn merge(options: &[ProducerOptions]) -> ProducerOptions {
        let mut merged = ProducerOptions::default();
        for option in options {
            last_non_zero(&mut merged.delay, option.delay);
            if option.attributes.is_some() {
                merged.attributes = option.attributes.clone();
            }
            last_non_empty(&mut merged.trace_header, &option.trace_header);
            last_non_empty(&mut merged.deduplication_id, &option.deduplication_id);
            last_non_empty(&mut merged.group_id, &option.group_id);
            merged.debug |= option.debug;
        }
        merged
    }
}

// ============================================================================
// Admin Options
// ============================================================================

/// Settings shared by queue admin operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdminOptions {
    pub debug: bool,
}

impl AdminOptions {
    pub fn debug() -> Self {
        Self { debug: true }
    }

    pub fn merge(options: &[AdminOptions]) -> AdminOptions {
        AdminOptions {
            debug: options.iter().any(|o| o.debug),
        }
    }
}

/// Settings for queue creation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateQueueOptions {
    /// Queue attributes such as `VisibilityTimeout` or `FifoQueue`
    pub attributes: HashMap<String, String>,
    pub tags: HashMap<String, String>,
    pub debug: bool,
}

impl CreateQueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Fold option records; the last non-empty attribute and tag maps win
    pub fn merge(options: &[CreateQueueOptions]) -> CreateQueueOptions {
        let mut merged = CreateQueueOptions::default();
        for option in options {
            if !option.attributes.is_empty() {
                merged.attributes = option.attributes.clone();
            }
            if !option.tags.is_empty() {
                merged.tags = option.tags.clone();
            }
            merged.debug |= option.debug;
        }
        merged
    }
}

/// Settings for listing queues
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQueuesOptions {
    pub queue_name_prefix: Option<String>,
    /// Page size; zero leaves paging off
    pub max_results: i32,
    pub next_token: Option<String>,
    pub debug: bool,
}

impl ListQueuesOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.queue_name_prefix = Some(prefix.into());
        self
    }

    pub fn with_max_results(mut self, max: i32) -> Self {
        self.max_results = max;
        self
    }

    pub fn with_next_token(mut self, token: impl Into<String>) -> Self {
        self.next_token = Some(token.into());
        self
    }

    pub fn merge(options: &[ListQueuesOptions]) -> ListQueuesOptions {
        let mut merged = ListQueuesOptions::default();
        for option in options {
            last_non_empty(&mut merged.queue_name_prefix, &option.queue_name_prefix);
            if option.max_results > 0 {
                merged.max_results = option.max_results;
            }
            last_non_empty(&mut merged.next_token, &option.next_token);
            merged.debug |= option.debug;
        }
        merged
    }
}

/// Settings for listing message move tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMessageMoveTasksOptions {
    pub max_results: i32,
    pub debug: bool,
}

impl Default for ListMessageMoveTasksOptions {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MOVE_TASK_RESULTS,
            debug: false,
        }
    }
}

impl ListMessageMoveTasksOptions {
    pub fn with_max_results(mut self, max: i32) -> Self {
        self.max_results = max;
        self
    }

    pub fn merge(options: &[ListMessageMoveTasksOptions]) -> ListMessageMoveTasksOptions {
        let mut merged = ListMessageMoveTasksOptions::default();
        for option in options {
            if option.max_results > 0 {
                merged.max_results = option.max_results;
            }
            merged.debug |= option.debug;
        }
        merged
    }
}
