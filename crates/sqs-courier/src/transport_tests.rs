use super::*;
use std::sync::atomic::{AtomicU32, Ordering};

#[tokio::test]
async fn test_handle_builds_client_once() {
    let handle = TransportHandle::<String>::new();
    let builds = AtomicU32::new(0);

    for _ in 0..3 {
        let client = handle
            .get_or_init(|| async {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok("client".to_string())
            })
            .await
            .unwrap();
        assert_eq!(client, "client");
    }

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(handle.is_initialized());
}

#[tokio::test]
async fn test_failed_initialization_can_be_retried() {
    let handle = TransportHandle::<String>::new();

    let err = handle
        .get_or_init(|| async {
            Err(TransportError::client_initialization("ReceiveMessage", "no region"))
        })
        .await
        .unwrap_err();
    assert!(err.is_client_initialization());
    assert!(!handle.is_initialized());

    let client = handle
        .get_or_init(|| async { Ok("second".to_string()) })
        .await
        .unwrap();
    assert_eq!(client, "second");
}

#[tokio::test]
async fn test_prebuilt_client_skips_initialization() {
    let handle = TransportHandle::with_client(7_u32);

    let client = handle
        .get_or_init(|| async { Err(TransportError::new("Test", "Unreachable", "initializer ran")) })
        .await
        .unwrap();

    assert_eq!(*client, 7);
}
