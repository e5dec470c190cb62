//! Tests for LoopbackTransport
//!
//! These tests verify:
//! - Connect/accept/reject event flow and token propagation
//! - Data delivery and send completions
//! - Disconnect notifications
//! - Connect timeouts

use std::thread;
use std::time::Duration;

use bytes::Bytes;
use rcmd::session::{ConnAttribute, SessionToken};
use rcmd::transport::{
    ConnectionId, LoopbackHub, LoopbackTransport, SendFlags, SendOutcome, SendStatus, Transport,
    TransportEvent,
};

// =============================================================================
// Helper Functions
// =============================================================================

const CLIENT_TOKEN: SessionToken = SessionToken::new(100);
const SERVER_TOKEN: SessionToken = SessionToken::new(200);

fn setup_pair() -> (LoopbackTransport, LoopbackTransport) {
    let hub = LoopbackHub::new();
    let mut server = hub.endpoint("server");
    let client = hub.endpoint("client");
    assert_eq!(server.listen().unwrap(), "loop://server");
    (server, client)
}

/// Connect and accept, returning (client connection, server connection)
fn establish(
    server: &mut LoopbackTransport,
    client: &mut LoopbackTransport,
) -> (ConnectionId, ConnectionId) {
    client
        .connect(
            "loop://server",
            ConnAttribute::ReliableOrdered,
            b"Hello World!",
            CLIENT_TOKEN,
            Duration::from_secs(5),
        )
        .unwrap();

    let request = match server.poll().unwrap() {
        Some(TransportEvent::ConnectRequest { request, .. }) => request,
        other => panic!("Expected ConnectRequest, got {:?}", other),
    };
    server.accept(request, SERVER_TOKEN).unwrap();

    let server_conn = match server.poll().unwrap() {
        Some(TransportEvent::AcceptCompleted { connection, token }) => {
            assert_eq!(token, SERVER_TOKEN);
            connection
        }
        other => panic!("Expected AcceptCompleted, got {:?}", other),
    };
    let client_conn = match client.poll().unwrap() {
        Some(TransportEvent::ConnectAccepted { connection, token }) => {
            assert_eq!(token, CLIENT_TOKEN);
            connection
        }
        other => panic!("Expected ConnectAccepted, got {:?}", other),
    };

    (client_conn, server_conn)
}

// =============================================================================
// Connect Tests
// =============================================================================

#[test]
fn test_connect_request_carries_payload() {
    let (mut server, mut client) = setup_pair();

    client
        .connect(
            "server",
            ConnAttribute::UnreliableUnordered,
            b"greeting",
            CLIENT_TOKEN,
            Duration::from_secs(1),
        )
        .unwrap();

    match server.poll().unwrap() {
        Some(TransportEvent::ConnectRequest {
            attribute, payload, ..
        }) => {
            assert_eq!(attribute, ConnAttribute::UnreliableUnordered);
            assert_eq!(&payload[..], b"greeting");
        }
        other => panic!("Expected ConnectRequest, got {:?}", other),
    }
}

#[test]
fn test_connect_and_accept() {
    let (mut server, mut client) = setup_pair();
    let (client_conn, server_conn) = establish(&mut server, &mut client);

    assert_ne!(client_conn, server_conn);
    assert_eq!(server.pending_events(), 0);
    assert_eq!(client.pending_events(), 0);
}

#[test]
fn test_connect_without_listener_rejected() {
    let hub = LoopbackHub::new();
    let mut client = hub.endpoint("client");

    client
        .connect(
            "loop://nobody",
            ConnAttribute::ReliableOrdered,
            b"",
            CLIENT_TOKEN,
            Duration::from_secs(1),
        )
        .unwrap();

    match client.poll().unwrap() {
        Some(TransportEvent::ConnectRejected { token, reason }) => {
            assert_eq!(token, CLIENT_TOKEN);
            assert!(reason.contains("no listener"));
        }
        other => panic!("Expected ConnectRejected, got {:?}", other),
    }
}

#[test]
fn test_reject() {
    let (mut server, mut client) = setup_pair();
    client
        .connect(
            "loop://server",
            ConnAttribute::ReliableOrdered,
            b"",
            CLIENT_TOKEN,
            Duration::from_secs(1),
        )
        .unwrap();

    let request = match server.poll().unwrap() {
        Some(TransportEvent::ConnectRequest { request, .. }) => request,
        other => panic!("Expected ConnectRequest, got {:?}", other),
    };
    server.reject(request).unwrap();

    match client.poll().unwrap() {
        Some(TransportEvent::ConnectRejected { reason, .. }) => {
            assert!(reason.contains("rejected"))
        }
        other => panic!("Expected ConnectRejected, got {:?}", other),
    }

    // The request is gone
    assert!(server.accept(request, SERVER_TOKEN).is_err());
}

#[test]
fn test_connect_timeout() {
    let (_server, mut client) = setup_pair();
    client
        .connect(
            "loop://server",
            ConnAttribute::ReliableOrdered,
            b"",
            CLIENT_TOKEN,
            Duration::from_millis(10),
        )
        .unwrap();

    // Nobody accepts
    assert!(client.poll().unwrap().is_none());
    thread::sleep(Duration::from_millis(30));

    match client.poll().unwrap() {
        Some(TransportEvent::ConnectRejected { token, reason }) => {
            assert_eq!(token, CLIENT_TOKEN);
            assert!(reason.contains("timed out"));
        }
        other => panic!("Expected ConnectRejected, got {:?}", other),
    }
}

// =============================================================================
// Data Tests
// =============================================================================

#[test]
fn test_send_delivers_and_completes() {
    let (mut server, mut client) = setup_pair();
    let (client_conn, server_conn) = establish(&mut server, &mut client);

    let outcome = client
        .send(client_conn, Bytes::from_static(b"ping"), 7, SendFlags::default())
        .unwrap();
    assert_eq!(outcome, SendOutcome::Pending);

    match client.poll().unwrap() {
        Some(TransportEvent::SendCompleted {
            connection,
            token,
            context,
            status,
        }) => {
            assert_eq!(connection, client_conn);
            assert_eq!(token, CLIENT_TOKEN);
            assert_eq!(context, 7);
            assert_eq!(status, SendStatus::Ok);
        }
        other => panic!("Expected SendCompleted, got {:?}", other),
    }

    match server.poll().unwrap() {
        Some(TransportEvent::DataReceived {
            connection,
            token,
            data,
        }) => {
            assert_eq!(connection, server_conn);
            assert_eq!(token, SERVER_TOKEN);
            assert_eq!(&data[..], b"ping");
        }
        other => panic!("Expected DataReceived, got {:?}", other),
    }
}

#[test]
fn test_blocking_send_has_no_completion_event() {
    let (mut server, mut client) = setup_pair();
    let (client_conn, _) = establish(&mut server, &mut client);

    let outcome = client
        .send(client_conn, Bytes::from_static(b"x"), 1, SendFlags::blocking(true))
        .unwrap();

    assert_eq!(outcome, SendOutcome::Completed);
    assert!(client.poll().unwrap().is_none());
    assert_eq!(server.pending_events(), 1);
}

#[test]
fn test_delivery_order_preserved() {
    let (mut server, mut client) = setup_pair();
    let (client_conn, _) = establish(&mut server, &mut client);

    for i in 0..5u8 {
        client
            .send(client_conn, Bytes::from(vec![i]), i as u64, SendFlags::default())
            .unwrap();
    }

    for i in 0..5u8 {
        match server.poll().unwrap() {
            Some(TransportEvent::DataReceived { data, .. }) => assert_eq!(&data[..], &[i]),
            other => panic!("Expected DataReceived, got {:?}", other),
        }
    }
}

#[test]
fn test_send_on_unknown_connection_fails() {
    let (_server, mut client) = setup_pair();
    assert!(client
        .send(ConnectionId(999), Bytes::new(), 0, SendFlags::default())
        .is_err());
}

// =============================================================================
// Disconnect Tests
// =============================================================================

#[test]
fn test_disconnect_notifies_peer_only() {
    let (mut server, mut client) = setup_pair();
    let (client_conn, server_conn) = establish(&mut server, &mut client);

    client.disconnect(client_conn).unwrap();

    match server.poll().unwrap() {
        Some(TransportEvent::Closed {
            connection,
            token,
            reason,
        }) => {
            assert_eq!(connection, server_conn);
            assert_eq!(token, SERVER_TOKEN);
            assert!(reason.is_none());
        }
        other => panic!("Expected Closed, got {:?}", other),
    }
    assert!(client.poll().unwrap().is_none());

    // Both halves are gone
    assert!(server
        .send(server_conn, Bytes::new(), 0, SendFlags::default())
        .is_err());
    assert!(client.disconnect(client_conn).is_ok());
}

#[test]
fn test_inject() {
    let (_server, mut client) = setup_pair();
    client.inject(TransportEvent::Unrecognized { code: 42 });

    assert_eq!(
        client.poll().unwrap(),
        Some(TransportEvent::Unrecognized { code: 42 })
    );
}

#[test]
fn test_wait_returns_none_when_idle() {
    let (_server, mut client) = setup_pair();
    assert!(client.wait(Duration::from_millis(1)).unwrap().is_none());
}
