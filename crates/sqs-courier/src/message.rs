//! Received message types.

use crate::attributes::{decode_fields, MessageAttributes, WireAttributes};
use crate::convert::parse_string_to_typed;
use crate::error::SqsError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

/// Message as returned by a transport, before any typed conversion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    pub md5_of_body: Option<String>,
    pub md5_of_message_attributes: Option<String>,
    /// Broker-maintained attributes keyed by their wire names
    pub system_attributes: HashMap<String, String>,
    pub message_attributes: WireAttributes,
}

/// Broker-maintained metadata of a received message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SystemAttributes {
    pub approximate_receive_count: Option<u32>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub approximate_first_receive_timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "MessageDeduplicationId")]
    pub deduplication_id: Option<String>,
    #[serde(rename = "MessageGroupId")]
    pub group_id: Option<String>,
    pub sender_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub sent_timestamp: Option<DateTime<Utc>>,
    pub sequence_number: Option<String>,
    #[serde(rename = "AWSTraceHeader")]
    pub trace_header: Option<String>,
}

impl SystemAttributes {
    /// Decode from wire names; unknown or unconvertible entries are ignored
    pub fn from_wire(attributes: &HashMap<String, String>) -> Self {
        decode_fields(
            attributes
                .iter()
                .map(|(name, value)| (name.as_str(), Cow::Borrowed(value.as_str()))),
        )
    }
}

/// A delivered message with its body and attributes in application types
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage<B, A = WireAttributes> {
    pub id: String,
    /// Token acknowledging this particular delivery
    pub receipt_handle: String,
    pub body: B,
    pub attributes: A,
    pub system_attributes: SystemAttributes,
    pub md5_of_body: Option<String>,
    pub md5_of_message_attributes: Option<String>,
}

impl<B, A> ReceivedMessage<B, A>
where
    B: DeserializeOwned,
    A: MessageAttributes,
{
    /// Convert a raw delivery into application types.
    ///
    /// # Errors
    ///
    /// Returns [`SqsError::BodyParseFailed`] when the body has no
    /// representation consistent with `B`.
    pub fn from_raw(raw: RawMessage) -> Result<Self, SqsError> {
        let body = parse_string_to_typed::<B>(&raw.body).ok_or_else(|| SqsError::BodyParseFailed {
            message_id: raw.message_id.clone(),
        })?;

        let attributes = if raw.message_attributes.is_empty() {
            A::default()
        } else {
            A::from_wire(&raw.message_attributes)
        };

        Ok(Self {
            system_attributes: SystemAttributes::from_wire(&raw.system_attributes),
            id: raw.message_id,
            receipt_handle: raw.receipt_handle,
            body,
            attributes,
            md5_of_body: raw.md5_of_body,
            md5_of_message_attributes: raw.md5_of_message_attributes,
        })
    }
}
