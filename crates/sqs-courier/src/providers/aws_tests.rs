use super::*;
use aws_sdk_sqs::types::MessageSystemAttributeName;

// ============================================================================
// Message Conversion Tests
// ============================================================================

mod conversion {
    use super::*;

    /// Verify SDK messages keep ids, bodies and both attribute kinds
    #[test]
    fn test_sdk_message_to_raw() {
        let tenant = MessageAttributeValue::builder()
            .data_type("String")
            .string_value("acme")
            .build()
            .unwrap();
        let blob = MessageAttributeValue::builder()
            .data_type("Binary.gzip")
            .binary_value(Blob::new(vec![1, 2, 3]))
            .build()
            .unwrap();
        let message = Message::builder()
            .message_id("m-1")
            .receipt_handle("rh-1")
            .body("{\"name\":\"a\"}")
            .md5_of_body("abc")
            .attributes(MessageSystemAttributeName::ApproximateReceiveCount, "2")
            .message_attributes("tenant", tenant)
            .message_attributes("payload", blob)
            .build();

        let raw = from_sdk_message(&message);

        assert_eq!(raw.message_id, "m-1");
        assert_eq!(raw.receipt_handle, "rh-1");
        assert_eq!(raw.body, "{\"name\":\"a\"}");
        assert_eq!(raw.md5_of_body.as_deref(), Some("abc"));
        assert_eq!(raw.md5_of_message_attributes, None);
        assert_eq!(
            raw.system_attributes.get("ApproximateReceiveCount").map(String::as_str),
            Some("2")
        );
        assert_eq!(raw.message_attributes["tenant"], AttributeValue::string("acme"));
        assert_eq!(raw.message_attributes["payload"].data_type, DataType::Binary);
        assert_eq!(
            raw.message_attributes["payload"].binary_value.as_deref(),
            Some(&[1_u8, 2, 3][..])
        );
    }

    /// Verify a message without optional fields converts to empty values
    #[test]
    fn test_sparse_sdk_message() {
        let raw = from_sdk_message(&Message::builder().build());

        assert!(raw.message_id.is_empty());
        assert!(raw.body.is_empty());
        assert!(raw.system_attributes.is_empty());
        assert!(raw.message_attributes.is_empty());
    }

    /// Verify wire attributes convert into SDK attribute values
    #[test]
    fn test_wire_attribute_to_sdk() {
        let number = to_sdk_attribute("SendMessage", &AttributeValue::number("42")).unwrap();
        assert_eq!(number.data_type(), "Number");
        assert_eq!(number.string_value(), Some("42"));

        let binary = to_sdk_attribute("SendMessage", &AttributeValue::binary(vec![9_u8])).unwrap();
        assert_eq!(binary.data_type(), "Binary");
        assert_eq!(binary.binary_value().map(|b| b.as_ref().to_vec()), Some(vec![9_u8]));
    }

    /// Verify the trace header converts into a system attribute value
    #[test]
    fn test_trace_header_to_sdk() {
        let header = AttributeValue::string("Root=1-5759e988-bd862e3fe1be46a994272793");

        let value = to_sdk_system_attribute("SendMessage", &header).unwrap();

        assert_eq!(value.data_type(), "String");
        assert_eq!(value.string_value(), header.string_value.as_deref());
    }

    /// Verify queue attribute names map onto the SDK enumeration
    #[test]
    fn test_queue_attribute_names() {
        let converted = to_queue_attributes(HashMap::from([
            ("VisibilityTimeout".to_string(), "30".to_string()),
            ("FifoQueue".to_string(), "true".to_string()),
        ]));

        assert_eq!(
            converted.get(&QueueAttributeName::VisibilityTimeout).map(String::as_str),
            Some("30")
        );
        assert_eq!(
            converted.get(&QueueAttributeName::FifoQueue).map(String::as_str),
            Some("true")
        );
    }
}

// ============================================================================
// Error Mapping Tests
// ============================================================================

mod errors {
    use super::*;

    #[derive(Debug)]
    struct Outer(Inner);

    #[derive(Debug)]
    struct Inner;

    impl std::fmt::Display for Outer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "request failed")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    impl std::fmt::Display for Inner {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "connection reset")
        }
    }

    impl std::error::Error for Inner {}

    /// Verify nested error sources are flattened into one message
    #[test]
    fn test_describe_error_flattens_sources() {
        let mut message = String::new();

        describe_error(&mut message, &Outer(Inner));

        assert_eq!(message, "request failed: connection reset");
    }

    /// Verify builder failures surface as parameter errors
    #[test]
    fn test_missing_data_type_is_rejected() {
        let err = MessageAttributeValue::builder()
            .string_value("x")
            .build()
            .map_err(|e| build_error("SendMessage", e))
            .unwrap_err();

        assert_eq!(err.operation, "SendMessage");
        assert_eq!(err.code, "InvalidParameterValue");
        assert!(!err.transient);
    }
}
