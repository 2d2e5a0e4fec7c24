//! Tests for received message conversion.

use super::*;
use crate::attributes::AttributeValue;
use chrono::TimeZone;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Order {
    id: u32,
    item: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct Meta {
    tenant: String,
}

impl MessageAttributes for Meta {}

fn raw(body: &str) -> RawMessage {
    RawMessage {
        message_id: "msg-1".to_string(),
        receipt_handle: "rh-1".to_string(),
        body: body.to_string(),
        ..Default::default()
    }
}

/// Verify JSON bodies decode into record types
#[test]
fn test_record_body() {
    let message: ReceivedMessage<Order> =
        ReceivedMessage::from_raw(raw(r#"{"id":4,"item":"lamp"}"#)).unwrap();

    assert_eq!(message.id, "msg-1");
    assert_eq!(message.receipt_handle, "rh-1");
    assert_eq!(
        message.body,
        Order {
            id: 4,
            item: "lamp".to_string()
        }
    );
    assert!(message.attributes.is_empty());
}

/// Verify text bodies pass through for string targets
#[test]
fn test_text_body() {
    let message: ReceivedMessage<String> = ReceivedMessage::from_raw(raw("123")).unwrap();
    assert_eq!(message.body, "123");
}

/// Verify unparseable bodies are reported with the message id
#[test]
fn test_body_parse_failure() {
    let result = ReceivedMessage::<Order>::from_raw(raw("not an order"));

    match result {
        Err(SqsError::BodyParseFailed { message_id }) => assert_eq!(message_id, "msg-1"),
        other => panic!("Expected BodyParseFailed, got {:?}", other),
    }
}

/// Verify message attributes decode into the requested type
#[test]
fn test_typed_attributes() {
    let mut message = raw("hello");
    message
        .message_attributes
        .insert("tenant".to_string(), AttributeValue::string("acme"));

    let received: ReceivedMessage<String, Meta> = ReceivedMessage::from_raw(message).unwrap();

    assert_eq!(received.attributes.tenant, "acme");
}

/// Verify broker attributes decode from their wire names
#[test]
fn test_system_attributes() {
    let wire = HashMap::from([
        ("ApproximateReceiveCount".to_string(), "3".to_string()),
        ("SentTimestamp".to_string(), "1714566600000".to_string()),
        ("MessageGroupId".to_string(), "group-a".to_string()),
        ("SequenceNumber".to_string(), "18849496460467696128".to_string()),
        ("SenderId".to_string(), "AIDAEXAMPLE".to_string()),
        ("DeadLetterQueueSourceArn".to_string(), "ignored".to_string()),
    ]);

    let system = SystemAttributes::from_wire(&wire);

    assert_eq!(system.approximate_receive_count, Some(3));
    assert_eq!(
        system.sent_timestamp,
        Some(Utc.timestamp_millis_opt(1_714_566_600_000).unwrap())
    );
    assert_eq!(system.group_id.as_deref(), Some("group-a"));
    assert_eq!(system.sequence_number.as_deref(), Some("18849496460467696128"));
    assert_eq!(system.sender_id.as_deref(), Some("AIDAEXAMPLE"));
    assert_eq!(system.approximate_first_receive_timestamp, None);
}
