use super::*;
use crate::attributes::DataType;
use crate::error::TransportError;
use crate::transport::MockTransport;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

const QUEUE_URL: &str = "https://sqs.local.amazonaws.com/000000000000/orders";
const TRACE_HEADER: &str = "Root=1-5759e988-bd862e3fe1be46a994272793;Parent=53995c3f42cd8ad8;Sampled=1";

#[derive(Serialize)]
struct Order {
    name: String,
    count: u32,
}

fn receipt(id: &str) -> SendReceipt {
    SendReceipt {
        message_id: id.to_string(),
        md5_of_body: None,
        sequence_number: None,
    }
}

fn order() -> Order {
    Order {
        name: "a".to_string(),
        count: 3,
    }
}

// ============================================================================
// Send Tests
// ============================================================================

mod send {
    use super::*;

    /// Verify a record body is sent as JSON with no attributes
    #[tokio::test]
    async fn test_record_body_is_sent_as_json() {
        let mut transport = MockTransport::new();
        transport
            .expect_send_message()
            .withf(|url, request| {
                url == QUEUE_URL
                    && request.body == r#"{"name":"a","count":3}"#
                    && request.attributes.is_none()
                    && request.system_attributes.is_none()
                    && request.delay_seconds == 0
            })
            .times(1)
            .returning(|_, _| Ok(receipt("m-1")));
        let producer = Producer::new(Arc::new(transport));

        let sent = producer.send(QUEUE_URL, &order(), &[]).await.unwrap();

        assert_eq!(sent.message_id, "m-1");
    }

    /// Verify text bodies pass through unchanged
    #[tokio::test]
    async fn test_text_body_passes_through() {
        let mut transport = MockTransport::new();
        transport
            .expect_send_message()
            .withf(|_, request| request.body == "hello")
            .times(1)
            .returning(|_, _| Ok(receipt("m-2")));
        let producer = Producer::new(Arc::new(transport));

        producer.send(QUEUE_URL, "hello", &[]).await.unwrap();
    }

    /// Verify an empty body fails without a transport call
    #[tokio::test]
    async fn test_empty_body_is_rejected() {
        let mut transport = MockTransport::new();
        transport.expect_send_message().times(0);
        let producer = Producer::new(Arc::new(transport));

        let err = producer.send(QUEUE_URL, "", &[]).await.unwrap_err();

        assert!(matches!(err, SqsError::EmptyMessageBody));
        assert_eq!(err.to_string(), "sqs: no message body passed");
    }

    /// Verify attributes that are not a map or record fail without a transport call
    #[tokio::test]
    async fn test_invalid_attribute_container_is_rejected() {
        let mut transport = MockTransport::new();
        transport.expect_send_message().times(0);
        let producer = Producer::new(Arc::new(transport));
        let options = ProducerOptions::new().with_attributes(&vec!["not", "a", "map"]);

        let err = producer.send(QUEUE_URL, "body", &[options]).await.unwrap_err();

        assert!(matches!(err, SqsError::InvalidAttributeContainer { .. }));
    }

    /// Verify options are merged and forwarded verbatim
    #[tokio::test]
    async fn test_options_are_forwarded() {
        let mut transport = MockTransport::new();
        transport
            .expect_send_message()
            .withf(|_, request| {
                let tenant = request
                    .attributes
                    .as_ref()
                    .and_then(|attrs| attrs.get("tenant"))
                    .and_then(|value| value.string_value.as_deref());
                request.delay_seconds == 30
                    && tenant == Some("acme")
                    && request.group_id.as_deref() == Some("group-1")
                    && request.deduplication_id.as_deref() == Some("dedup-2")
            })
            .times(1)
            .returning(|_, _| Ok(receipt("m-3")));
        let producer = Producer::new(Arc::new(transport));
        let attributes = HashMap::from([("tenant", "acme")]);

        producer
            .send(
                QUEUE_URL,
                "body",
                &[
                    ProducerOptions::new()
                        .with_delay(Duration::from_secs(30))
                        .with_deduplication_id("dedup-1"),
                    ProducerOptions::new()
                        .with_attributes(&attributes)
                        .with_group_id("group-1")
                        .with_deduplication_id("dedup-2"),
                ],
            )
            .await
            .unwrap();
    }

    /// Verify the trace header is sent as a String system attribute
    #[tokio::test]
    async fn test_trace_header_is_sent() {
        let mut transport = MockTransport::new();
        transport
            .expect_send_message()
            .withf(|_, request| {
                let header = request
                    .system_attributes
                    .as_ref()
                    .and_then(|attrs| attrs.get(TRACE_HEADER_ATTRIBUTE));
                header.map(|h| h.data_type) == Some(DataType::String)
                    && header.and_then(|h| h.string_value.as_deref()) == Some(TRACE_HEADER)
            })
            .times(1)
            .returning(|_, _| Ok(receipt("m-4")));
        let producer = Producer::new(Arc::new(transport));

        producer
            .send(
                QUEUE_URL,
                "body",
                &[ProducerOptions::new().with_trace_header(TRACE_HEADER)],
            )
            .await
            .unwrap();
    }

    /// Verify a malformed trace header fails without a transport call
    #[tokio::test]
    async fn test_malformed_trace_header_is_rejected() {
        let mut transport = MockTransport::new();
        transport.expect_send_message().times(0);
        let producer = Producer::new(Arc::new(transport));

        let err = producer
            .send(
                QUEUE_URL,
                "body",
                &[ProducerOptions::new().with_trace_header("Root=not-a-trace")],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SqsError::InvalidTraceHeader { .. }));
    }

    /// Verify transport failures are passed through unchanged
    #[tokio::test]
    async fn test_transport_error_passes_through() {
        let mut transport = MockTransport::new();
        transport.expect_send_message().times(1).returning(|_, _| {
            Err(TransportError::new("SendMessage", "QueueDoesNotExist", "no such queue"))
        });
        let producer = Producer::new(Arc::new(transport));

        let err = producer.send(QUEUE_URL, "body", &[]).await.unwrap_err();

        match err {
            SqsError::Transport(inner) => assert_eq!(inner.code, "QueueDoesNotExist"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

// ============================================================================
// Background Send Tests
// ============================================================================

mod send_async {
    use super::*;

    /// Verify a background send reaches the transport before the handle completes
    #[tokio::test]
    async fn test_background_send_completes() {
        let mut transport = MockTransport::new();
        transport
            .expect_send_message()
            .withf(|_, request| request.body == "later")
            .times(1)
            .returning(|_, _| Ok(receipt("m-5")));
        let producer = Producer::new(Arc::new(transport));

        producer.send_async(QUEUE_URL, "later", &[]).await.unwrap();
    }

    /// Verify background failures are swallowed and never reach the transport
    #[tokio::test]
    async fn test_background_send_logs_encoding_failure() {
        let mut transport = MockTransport::new();
        transport.expect_send_message().times(0);
        let producer = Producer::new(Arc::new(transport));

        producer.send_async(QUEUE_URL, "", &[]).await.unwrap();
    }

    /// Verify background transport failures do not panic the task
    #[tokio::test]
    async fn test_background_send_logs_transport_failure() {
        let mut transport = MockTransport::new();
        transport
            .expect_send_message()
            .times(1)
            .returning(|_, _| Err(TransportError::new("SendMessage", "InternalError", "boom").transient()));
        let producer = Producer::new(Arc::new(transport));

        producer.send_async(QUEUE_URL, "body", &[]).await.unwrap();
    }
}

// ============================================================================
// Trace Header Tests
// ============================================================================

mod trace_header {
    use super::*;

    #[test]
    fn test_valid_headers() {
        for header in [
            TRACE_HEADER,
            "Root=1-5759e988-bd862e3fe1be46a994272793",
            "Root=1-5759e988-bd862e3fe1be46a994272793;Sampled=?",
            "Root=1-5759e988-bd862e3fe1be46a994272793; Lineage=a87bd80c:1|68fd508a:5;",
        ] {
            assert!(validate_trace_header(header).is_ok(), "{header}");
        }
    }

    #[test]
    fn test_invalid_headers() {
        for header in [
            "",
            "Parent=53995c3f42cd8ad8",
            "Root=2-5759e988-bd862e3fe1be46a994272793",
            "Root=1-5759e988-bd862e3fe1be46a99427279",
            "Root=1-5759e988-bd862e3fe1be46a994272793;Parent=xyz",
            "Root=1-5759e988-bd862e3fe1be46a994272793;Sampled=yes",
            "Root=1-5759e988-bd862e3fe1be46a994272793;garbage",
        ] {
            assert!(validate_trace_header(header).is_err(), "{header}");
        }
    }
}
