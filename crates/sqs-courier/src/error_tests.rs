//! Tests for error types.

use super::*;

#[test]
fn test_error_transience() {
    let transient = SqsError::Transport(
        TransportError::new("ReceiveMessage", "ServiceUnavailable", "try later").transient(),
    );
    assert!(transient.is_transient());

    let permanent = SqsError::Transport(TransportError::new(
        "ReceiveMessage",
        "AWS.SimpleQueueService.NonExistentQueue",
        "queue does not exist",
    ));
    assert!(!permanent.is_transient());

    assert!(!SqsError::EmptyMessageBody.is_transient());
    assert!(!SqsError::InvalidAttributeContainer { kind: "string" }.is_transient());
}

#[test]
fn test_fatal_errors() {
    let exhausted = SqsError::FetchAttemptsExhausted {
        attempts: 3,
        last_error: TransportError::new("ReceiveMessage", "Throttled", "slow down"),
    };
    assert!(exhausted.is_fatal());

    let init = SqsError::ClientInitialization {
        message: "no region".to_string(),
    };
    assert!(init.is_fatal());

    assert!(!SqsError::EmptyMessageBody.is_fatal());
}

#[test]
fn test_error_messages_name_the_failure() {
    assert_eq!(
        SqsError::EmptyMessageBody.to_string(),
        "sqs: no message body passed"
    );

    let err = SqsError::InvalidAttributeContainer { kind: "sequence" };
    assert!(err.to_string().contains("sequence"));

    let err: SqsError = ValidationError::required("queue_url").into();
    assert_eq!(
        err.to_string(),
        "Validation error: Required field missing: queue_url"
    );
}

#[test]
fn test_client_initialization_failures_are_lifted() {
    let err: SqsError = TransportError::client_initialization("ReceiveMessage", "no region").into();
    assert!(matches!(err, SqsError::ClientInitialization { ref message } if message == "no region"));
    assert!(err.is_fatal());

    let err: SqsError = TransportError::new("ReceiveMessage", "Throttled", "slow down").into();
    assert!(matches!(err, SqsError::Transport(_)));
}
