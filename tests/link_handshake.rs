//! Opening-exchange failures: a fatal `Alert` from the peer, and a
//! `protocol_version` set disjoint from ours. Both are driven by scripting
//! the peer's half of the duplex directly (bypassing a second [`Link`]),
//! so these exercise exactly the bytes a misbehaving or incompatible peer
//! would send.

mod support;

use std::time::Duration;

use meshlink::link::LinkBuilder;
use meshlink::message::{AlertLevel, Message};
use support::connect_to_fake_peer;
use tracing_test::traced_test;

#[traced_test]
#[tokio::test]
async fn fatal_alert_during_handshake_fails_the_connection() {
    let client = LinkBuilder::new().build();
    let (handle, mut peer_reader, peer_writer) = connect_to_fake_peer(client).await;

    // Drain the client's opening Topology, then answer with a fatal Alert.
    let _opening = peer_reader.read_message(None).await.unwrap();
    peer_writer
        .write_message(
            &Message::alert_message(AlertLevel::FatalError, "Test Alert"),
            None,
        )
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("handle_connection did not return within 1s")
        .expect("task panicked");

    let err = result.expect_err("a fatal alert must fail the connection");
    let text = err.to_string();
    assert!(text.contains("FatalError"), "error text was: {text}");
    assert!(text.contains("Test Alert"), "error text was: {text}");
    assert!(tracing_test::internal::logs_with_scope_contain(
        "meshlink",
        "peer sent a fatal alert"
    ));
}

#[tokio::test]
async fn disjoint_protocol_versions_fail_the_connection() {
    let client = LinkBuilder::new().build();
    let (handle, mut peer_reader, peer_writer) = connect_to_fake_peer(client).await;

    let _opening = peer_reader.read_message(None).await.unwrap();
    let mut incompatible = Message::heartbeat_message(0);
    incompatible.protocol_version = vec![0];
    peer_writer.write_message(&incompatible, None).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("handle_connection did not return within 1s")
        .expect("task panicked");

    let err = result.expect_err("a disjoint version set must fail the connection");
    assert!(matches!(err, meshlink::Error::UnsupportedVersion(_)), "got: {err}");
}

#[tokio::test]
async fn non_fatal_alert_during_handshake_is_dispatched_and_connection_continues() {
    use std::sync::{Arc, Mutex};

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_for_cb = seen.clone();
    let client = LinkBuilder::new()
        .alert_fn(move |_id, alert| seen_for_cb.lock().unwrap().push(alert.message))
        .build();
    let (handle, mut peer_reader, peer_writer) = connect_to_fake_peer(client.clone()).await;

    let _opening = peer_reader.read_message(None).await.unwrap();
    peer_writer
        .write_message(&Message::alert_message(AlertLevel::Warning, "heads up"), None)
        .await
        .unwrap();

    // The connection is still alive after a non-fatal alert: finish both
    // ends so the sender state machine has something to resolve on, the
    // same way a real owner would wind the connection down.
    peer_writer
        .write_message(&Message::finished_message(), None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.finish().expect("client finish succeeds");

    let result = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("handle_connection did not return within 1s")
        .expect("task panicked");

    assert!(result.is_ok(), "connection should survive a non-fatal alert");
    assert_eq!(seen.lock().unwrap().as_slice(), ["heads up".to_string()]);
}
