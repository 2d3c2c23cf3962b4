//! Connection Tests (jstp-client)
//!
//! Tests for the connection state machine including:
//! - Handshake sending and acknowledgement
//! - Outbound queue and FIFO flush
//! - Restoration across transport churn
//! - Close semantics
//! - Receive path framing and error reporting
//! - Concurrent senders racing lifecycle events
//! - End-to-end over the channel transport

use std::collections::HashSet;
use std::sync::Arc;

use jstp_client::{
    ClientError, Connection, ConnectionBuilder, ConnectionState, DropRestorationPolicy,
    SessionRestorationPolicy,
};
use jstp_core::{Object, Value};
use jstp_test_utils::{
    handshake_error, handshake_ok, init_tracing, packet_bytes, simulate_connect,
    simulate_disconnect, wait_until, ListenerEvent, MockTransport, RecordingListener,
    TransportCall, DEFAULT_TIMEOUT,
};
use jstp_transport::{
    pump_events, ChannelTransport, Transport, TransportConfig, TransportError, TransportListener,
};
use tokio::time::timeout;

fn setup() -> (Arc<MockTransport>, Arc<Connection>, Arc<RecordingListener>) {
    init_tracing();
    let transport = MockTransport::new();
    let listener = RecordingListener::new();
    let conn = ConnectionBuilder::new(transport.clone())
        .app_name("test")
        .listener(listener.clone())
        .build();
    (transport, conn, listener)
}

fn setup_resuming() -> (Arc<MockTransport>, Arc<Connection>, Arc<RecordingListener>) {
    init_tracing();
    let transport = MockTransport::new();
    let listener = RecordingListener::new();
    let conn = ConnectionBuilder::new(transport.clone())
        .app_name("test")
        .restoration_policy(SessionRestorationPolicy::new())
        .listener(listener.clone())
        .build();
    (transport, conn, listener)
}

/// Handshake, bring the transport up and acknowledge
fn establish(conn: &Connection, transport: &MockTransport, session: &str) {
    conn.handshake("test", None).expect("handshake failed");
    simulate_connect(conn, transport);
    conn.on_message_received(&handshake_ok(session));
    assert_eq!(conn.state(), ConnectionState::Connected);
}

fn msg(n: i64) -> Object {
    Object::new().with("n", n)
}

// ============================================================================
// Handshake
// ============================================================================

#[test]
fn test_handshake_opens_transport() {
    let (transport, conn, _listener) = setup();

    conn.handshake("app", None).expect("handshake failed");

    assert_eq!(transport.opened(), vec!["{handshake:['app']}"]);
    assert!(transport.sent().is_empty());
    assert_eq!(conn.state(), ConnectionState::Connecting);
    assert_eq!(conn.app_name().as_deref(), Some("app"));
}

#[test]
fn test_handshake_uses_live_transport() {
    let (transport, conn, _listener) = setup();
    transport.set_connected(true);

    conn.handshake("app", Some("s9")).expect("handshake failed");

    assert!(transport.opened().is_empty());
    assert_eq!(transport.sent(), vec!["{handshake:['app'],session:'s9'}"]);
}

#[test]
fn test_single_handshake_in_flight() {
    let (transport, conn, _listener) = setup();

    conn.handshake("test", None).expect("handshake failed");
    conn.handshake("test", None).expect("second handshake failed");
    simulate_connect(&conn, &transport);
    simulate_connect(&conn, &transport);

    assert_eq!(transport.handshakes().len(), 1);
    assert_eq!(conn.state(), ConnectionState::Connecting);
}

#[test]
fn test_handshake_ack_connects_and_flushes_fifo() {
    let (transport, conn, listener) = setup();
    conn.handshake("test", None).expect("handshake failed");

    for n in 1..=3 {
        conn.send(msg(n)).expect("send failed");
    }
    assert_eq!(conn.queue_len(), 3);
    assert!(transport.sent().is_empty());

    conn.on_message_received(&handshake_ok("s1"));

    assert!(conn.is_connected());
    assert_eq!(conn.session_id().as_deref(), Some("s1"));
    assert_eq!(conn.queue_len(), 0);
    assert_eq!(transport.sent(), vec!["{n:1}", "{n:2}", "{n:3}"]);
    assert_eq!(listener.events(), vec![ListenerEvent::Connected(false)]);
}

#[test]
fn test_handshake_rejected() {
    let (_transport, conn, listener) = setup();
    conn.handshake("test", None).expect("handshake failed");

    conn.on_message_received(&handshake_error("unknown application"));

    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert_eq!(
        listener.errors(),
        vec![ClientError::HandshakeRejected("unknown application".to_string())]
    );
}

#[test]
fn test_handshake_on_closed_transport_fails_cleanly() {
    let transport = MockTransport::new();
    let conn = Connection::new(transport.clone());
    transport.close();

    let result = conn.handshake("test", None);

    assert!(matches!(result, Err(ClientError::Transport(TransportError::Closed))));
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[test]
fn test_transport_up_before_any_handshake_is_ignored() {
    let transport = MockTransport::new();
    let conn = Connection::new(transport.clone());

    simulate_connect(&conn, &transport);

    assert!(transport.calls().is_empty());
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

// ============================================================================
// Sending
// ============================================================================

#[test]
fn test_send_when_connected_goes_out_immediately() {
    let (transport, conn, _listener) = setup();
    establish(&conn, &transport, "s1");
    transport.clear();

    conn.send(msg(7)).expect("send failed");

    assert_eq!(transport.sent(), vec!["{n:7}"]);
    assert_eq!(conn.session().sent, 1);
}

#[test]
fn test_failed_send_is_requeued() {
    let (transport, conn, _listener) = setup();
    establish(&conn, &transport, "s1");
    transport.clear();

    transport.fail_sends(true);
    let result = conn.send(msg(1));
    assert!(matches!(result, Err(ClientError::Transport(TransportError::SendFailed(_)))));
    assert_eq!(conn.queue_len(), 1);

    transport.fail_sends(false);
    conn.send(msg(2)).expect("send failed");

    assert_eq!(transport.sent(), vec!["{n:1}", "{n:2}"]);
    assert_eq!(conn.queue_len(), 0);
}

#[test]
fn test_pause_resume_forwarded() {
    let (transport, conn, _listener) = setup();

    conn.pause(true);
    conn.resume(false);

    assert_eq!(
        transport.calls(),
        vec![TransportCall::Pause(true), TransportCall::Resume(false)]
    );
}

// ============================================================================
// Restoration
// ============================================================================

#[test]
fn test_drop_policy_clears_queue_and_rehandshakes_once() {
    let (transport, conn, listener) = setup();
    establish(&conn, &transport, "s1");
    simulate_disconnect(&conn, &transport);
    conn.send(msg(1)).expect("send failed");
    conn.send(msg(2)).expect("send failed");
    assert_eq!(conn.queue_len(), 2);

    // packets queued while down go with the next close event
    conn.on_transport_closed(None);
    assert_eq!(conn.queue_len(), 0);

    transport.clear();
    simulate_connect(&conn, &transport);
    simulate_connect(&conn, &transport);

    let handshakes = transport.handshakes();
    assert_eq!(handshakes.len(), 1);
    assert!(!handshakes[0].contains_key("session"));

    conn.on_message_received(&handshake_ok("s2"));
    assert_eq!(transport.sent().len(), 1);
    assert_eq!(
        listener.events().last(),
        Some(&ListenerEvent::Connected(false))
    );
}

#[test]
fn test_drop_policy_queue_empty_after_close_event() {
    let (transport, conn, _listener) = setup();
    conn.handshake("test", None).expect("handshake failed");
    conn.send(msg(1)).expect("send failed");

    simulate_disconnect(&conn, &transport);

    assert_eq!(conn.queue_len(), 0);
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[test]
fn test_drop_policy_without_reconnect_stays_down() {
    init_tracing();
    let transport = MockTransport::new();
    let conn = ConnectionBuilder::new(transport.clone())
        .app_name("test")
        .restoration_policy(DropRestorationPolicy::new().reconnect_when_transport_ready(false))
        .build();
    establish(&conn, &transport, "s1");
    simulate_disconnect(&conn, &transport);
    transport.clear();

    simulate_connect(&conn, &transport);

    assert!(transport.handshakes().is_empty());
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[test]
fn test_session_policy_resends_in_order() {
    let (transport, conn, listener) = setup_resuming();
    establish(&conn, &transport, "s1");
    simulate_disconnect(&conn, &transport);

    for n in 1..=3 {
        conn.send(msg(n)).expect("send failed");
    }
    assert_eq!(conn.queue_len(), 3);

    transport.clear();
    simulate_connect(&conn, &transport);
    assert_eq!(transport.sent(), vec!["{handshake:['test'],session:'s1'}"]);

    conn.on_message_received(&handshake_ok("s1"));

    assert_eq!(
        transport.sent(),
        vec![
            "{handshake:['test'],session:'s1'}",
            "{n:1}",
            "{n:2}",
            "{n:3}"
        ]
    );
    assert_eq!(
        listener.events().last(),
        Some(&ListenerEvent::Connected(true))
    );
}

#[test]
fn test_session_policy_keeps_counters_on_resume() {
    let (transport, conn, _listener) = setup_resuming();
    establish(&conn, &transport, "s1");
    conn.send(msg(1)).expect("send failed");
    conn.on_message_received(&packet_bytes(&msg(10)));

    simulate_disconnect(&conn, &transport);
    simulate_connect(&conn, &transport);
    conn.on_message_received(&handshake_ok("s1"));

    let session = conn.session();
    assert_eq!(session.session_id.as_deref(), Some("s1"));
    assert_eq!((session.sent, session.received), (1, 1));
}

#[test]
fn test_server_may_refuse_resume() {
    let (transport, conn, listener) = setup_resuming();
    establish(&conn, &transport, "s1");
    simulate_disconnect(&conn, &transport);
    simulate_connect(&conn, &transport);

    conn.on_message_received(&handshake_ok("s2"));

    assert_eq!(conn.session_id().as_deref(), Some("s2"));
    assert_eq!(
        listener.events().last(),
        Some(&ListenerEvent::Connected(false))
    );
}

#[test]
fn test_close_reason_reaches_listener() {
    let (transport, conn, listener) = setup();
    establish(&conn, &transport, "s1");

    conn.on_transport_closed(Some(&TransportError::ConnectionLost("reset".to_string())));

    assert_eq!(
        listener.events().last(),
        Some(&ListenerEvent::Closed(Some("connection lost: reset".to_string())))
    );
}

#[test]
fn test_set_transport_detaches_old() {
    let (old, conn, _listener) = setup();
    establish(&conn, &old, "s1");

    let new = MockTransport::new();
    conn.set_transport(new.clone()).expect("set_transport failed");
    assert_eq!(conn.state(), ConnectionState::Disconnected);

    simulate_connect(&conn, &new);
    conn.send(msg(1)).expect("send failed");

    assert_eq!(new.handshakes().len(), 1);
    assert_eq!(old.close_count(), 0);
    assert_eq!(conn.queue_len(), 1);
}

// ============================================================================
// Close
// ============================================================================

#[test]
fn test_close_is_idempotent() {
    let (transport, conn, listener) = setup();
    establish(&conn, &transport, "s1");

    conn.close();
    conn.close();

    assert_eq!(transport.close_count(), 1);
    assert_eq!(conn.state(), ConnectionState::Closed);
    let closes = listener
        .events()
        .into_iter()
        .filter(|e| matches!(e, ListenerEvent::Closed(_)))
        .count();
    assert_eq!(closes, 1);
}

#[test]
fn test_close_discards_queue_and_rejects_sends() {
    let (_transport, conn, _listener) = setup();
    conn.handshake("test", None).expect("handshake failed");
    conn.send(msg(1)).expect("send failed");

    conn.close();

    assert_eq!(conn.queue_len(), 0);
    assert_eq!(conn.send(msg(2)), Err(ClientError::Closed));
    assert_eq!(conn.handshake("test", None), Err(ClientError::Closed));
    assert_eq!(conn.set_transport(MockTransport::new()), Err(ClientError::Closed));
}

#[test]
fn test_lifecycle_events_ignored_after_close() {
    let (transport, conn, listener) = setup();
    conn.handshake("test", None).expect("handshake failed");
    conn.close();
    listener.clear();
    transport.clear();

    simulate_connect(&conn, &transport);
    conn.on_message_received(&handshake_ok("s1"));
    simulate_disconnect(&conn, &transport);

    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(transport.calls().is_empty());
    assert!(listener.events().is_empty());
}

// ============================================================================
// Receiving
// ============================================================================

#[test]
fn test_packets_split_across_reads() {
    let (transport, conn, listener) = setup();
    establish(&conn, &transport, "s1");

    conn.on_message_received(b"{event:'ti");
    assert!(listener.packets().is_empty());
    conn.on_message_received(b"ck',n:1}\0{event:'tock'}\0");

    let packets = listener.packets();
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].get("event"), Some(&Value::from("tick")));
    assert_eq!(packets[1].get("event"), Some(&Value::from("tock")));
    assert_eq!(conn.session().received, 2);
}

#[test]
fn test_framing_error_reported_and_buffer_reset() {
    let (transport, conn, listener) = setup();
    establish(&conn, &transport, "s1");

    conn.on_message_received(b"{a:1}\0{oops\0{b:");

    let errors = listener.errors();
    assert_eq!(errors.len(), 1);
    assert!(
        matches!(&errors[0], ClientError::Protocol(e) if e.is_framing_error()),
        "{:?}",
        errors[0]
    );
    assert!(listener.packets().is_empty());

    conn.on_message_received(b"{c:3}\0");
    assert_eq!(listener.packets(), vec![Object::new().with("c", 3)]);
}

#[test]
fn test_packets_during_handshake_reach_listener() {
    let (_transport, conn, listener) = setup();
    conn.handshake("test", None).expect("handshake failed");

    conn.on_message_received(&packet_bytes(&msg(5)));

    assert_eq!(conn.state(), ConnectionState::Connecting);
    assert_eq!(listener.packets(), vec![msg(5)]);
}

#[test]
fn test_transport_listener_impl_routes_events() {
    let (transport, conn, listener) = setup();
    conn.handshake("test", None).expect("handshake failed");
    transport.set_connected(true);

    let as_listener: &dyn TransportListener = &*conn;
    as_listener.on_connect();
    as_listener.on_message_received(&handshake_ok("s1"));
    as_listener.on_connection_closed(None);

    assert_eq!(
        listener.events(),
        vec![ListenerEvent::Connected(false), ListenerEvent::Closed(None)]
    );
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_sends_survive_transport_churn() {
    const SENDERS: i64 = 4;
    const PER_SENDER: i64 = 200;

    let (transport, conn, _listener) = setup_resuming();
    establish(&conn, &transport, "s1");

    std::thread::scope(|scope| {
        for sender in 0..SENDERS {
            let conn = &conn;
            scope.spawn(move || {
                for i in 0..PER_SENDER {
                    conn.send(msg(sender * PER_SENDER + i)).expect("send failed");
                }
            });
        }

        for _ in 0..50 {
            simulate_disconnect(&conn, &transport);
            simulate_connect(&conn, &transport);
            conn.on_message_received(&handshake_ok("s1"));
        }
    });

    assert!(conn.is_connected());
    assert_eq!(conn.queue_len(), 0);

    let delivered: Vec<String> = transport
        .sent()
        .into_iter()
        .filter(|s| !s.starts_with("{handshake"))
        .collect();
    let unique: HashSet<_> = delivered.iter().collect();
    assert_eq!(delivered.len(), (SENDERS * PER_SENDER) as usize);
    assert_eq!(unique.len(), delivered.len());
}

// ============================================================================
// Builder
// ============================================================================

#[test]
fn test_builder_connect_requires_app_name() {
    let result = ConnectionBuilder::new(MockTransport::new()).connect();
    assert!(matches!(result, Err(ClientError::MissingAppName)));
}

#[test]
fn test_builder_connect_resumes_session() {
    let transport = MockTransport::new();
    let listener = RecordingListener::new();
    let conn = ConnectionBuilder::new(transport.clone())
        .app_name("test")
        .session_id("s7")
        .listener(listener.clone())
        .connect()
        .expect("connect failed");

    assert_eq!(transport.opened(), vec!["{handshake:['test'],session:'s7'}"]);

    conn.on_message_received(&handshake_ok("s7"));
    assert_eq!(listener.events(), vec![ListenerEvent::Connected(true)]);
}

// ============================================================================
// End to end over the channel transport
// ============================================================================

#[tokio::test]
async fn test_channel_transport_end_to_end() {
    init_tracing();
    let (transport, mut peer, events) =
        ChannelTransport::pair(TransportConfig::new("localhost", 4000));
    let listener = RecordingListener::new();

    let conn = ConnectionBuilder::new(Arc::new(transport))
        .app_name("e2e")
        .restoration_policy(SessionRestorationPolicy::new())
        .listener(listener.clone())
        .connect()
        .expect("connect failed");
    let pump = tokio::spawn(pump_events(events, conn.clone()));

    let handshake = timeout(DEFAULT_TIMEOUT, peer.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    assert_eq!(&handshake[..], b"{handshake:['e2e']}\0");

    conn.send(Object::new().with("call", 1)).expect("send failed");
    peer.deliver(handshake_ok("s1"));

    let call = timeout(DEFAULT_TIMEOUT, peer.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    assert_eq!(&call[..], b"{call:1}\0");

    peer.deliver(packet_bytes(&Object::new().with("event", "ready")));
    assert!(listener.wait_for_count(2, DEFAULT_TIMEOUT).await);

    // transport drops and comes back; the session resumes
    peer.disconnect(Some("bye"));
    assert!(
        wait_until(|| conn.state() == ConnectionState::Disconnected, DEFAULT_TIMEOUT).await
    );
    conn.send(Object::new().with("call", 2)).expect("send failed");
    peer.connect();

    let resume = timeout(DEFAULT_TIMEOUT, peer.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    assert_eq!(&resume[..], b"{handshake:['e2e'],session:'s1'}\0");

    peer.deliver(handshake_ok("s1"));
    let replay = timeout(DEFAULT_TIMEOUT, peer.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    assert_eq!(&replay[..], b"{call:2}\0");

    conn.close();
    drop(peer);
    timeout(DEFAULT_TIMEOUT, pump)
        .await
        .expect("pump did not stop")
        .expect("pump panicked");

    let events = listener.events();
    assert_eq!(events[0], ListenerEvent::Connected(false));
    assert!(events.contains(&ListenerEvent::Connected(true)));
}
