//! Integration tests for the TCP chat server.
//!
//! These tests drive a real `ChatServer` over loopback sockets and check
//! relay, ban/unban, logout and shutdown behavior end to end.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.
//! We test the panic-free behavior of production code through assertions.

mod common;

use chat_protocol::{ClientId, Message, MessageType};
use chatd::registry::{RegistryEvent, RemovalReason};
use chatd::server::ServerError;
use common::{TestClient, TestServer};

// ============================================================================
// Relay Tests
// ============================================================================

#[tokio::test]
async fn test_three_client_scenario() {
    let server = TestServer::spawn().await;

    let (mut alice, a_id) = server.join("alice").await;
    let (mut bob, b_id) = server.join("bob").await;
    let (mut carol, c_id) = server.join("carol").await;
    assert_eq!(
        (a_id, b_id, c_id),
        (ClientId::new(1), ClientId::new(2), ClientId::new(3))
    );

    // Relay reaches everyone, sender included
    alice.say("hi").await;
    alice.expect_ordinary(a_id, "hi").await;
    bob.expect_ordinary(a_id, "hi").await;
    carol.expect_ordinary(a_id, "hi").await;

    // Ban closes bob's connection
    assert!(server.server.remove(b_id).await.unwrap());
    bob.expect_closed().await;
    server.wait_for_count(2).await;

    // Name is reusable; the new session gets a fresh identity
    let (mut bob_again, b2_id) = server.join("bob").await;
    assert_eq!(b2_id, ClientId::new(4));
    assert!(server.server.is_banned(b_id).await);
    assert!(!server.server.is_banned(b2_id).await);

    carol.say("welcome back").await;
    for client in [&mut alice, &mut carol, &mut bob_again] {
        client.expect_ordinary(c_id, "welcome back").await;
    }

    // Exactly one SHUTDOWN, then close
    server.server.shutdown().await;
    for client in [&mut alice, &mut carol, &mut bob_again] {
        let msg = client.recv().await.expect("shutdown notice");
        assert_eq!(msg.kind(), MessageType::Shutdown);
        client.expect_closed().await;
    }
}

#[tokio::test]
async fn test_sender_id_is_restamped() {
    let server = TestServer::spawn().await;
    let (mut alice, a_id) = server.join("alice").await;
    let (mut bob, _) = server.join("bob").await;

    // Alice pretends to be the server
    alice.send(&Message::ordinary(ClientId::SERVER, "i am root")).await;

    bob.expect_ordinary(a_id, "i am root").await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_per_sender_ordering() {
    let server = TestServer::spawn().await;
    let (mut alice, a_id) = server.join("alice").await;
    let (mut bob, b_id) = server.join("bob").await;

    for i in 0..50 {
        alice.say(&format!("a{i}")).await;
    }
    bob.say("from bob").await;

    // Bob sees alice's messages in order, with his own interleaved somewhere
    let mut next_from_alice = 0;
    let mut saw_bob = false;
    while next_from_alice < 50 || !saw_bob {
        let msg = bob.recv().await.expect("message");
        if msg.id() == a_id {
            assert_eq!(msg.body(), format!("a{next_from_alice}"));
            next_from_alice += 1;
        } else {
            assert_eq!(msg.id(), b_id);
            saw_bob = true;
        }
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_server_console_broadcast_uses_server_id() {
    let server = TestServer::spawn().await;
    let (mut alice, _) = server.join("alice").await;

    let delivery = server
        .server
        .broadcast(&Message::ordinary(ClientId::SERVER, "maintenance at noon"))
        .await
        .unwrap();
    assert_eq!(delivery.delivered, 1);

    alice.expect_ordinary(ClientId::SERVER, "maintenance at noon").await;
    server.shutdown().await;
}

// ============================================================================
// Admission Tests
// ============================================================================

#[tokio::test]
async fn test_duplicate_name_refused() {
    let server = TestServer::spawn().await;
    let (_alice, _) = server.join("alice").await;

    let mut imposter = server.connect_raw("alice").await;
    imposter.expect_closed().await;

    assert_eq!(server.server.clients().await.len(), 1);
    server.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_joins_same_name_admit_one() {
    let server = TestServer::spawn().await;
    let addr = server.addr();

    let mut tasks = Vec::new();
    for _ in 0..10 {
        tasks.push(tokio::spawn(async move {
            let mut client = TestClient::open(addr).await;
            client.send(&Message::hello("dup")).await;
            client
        }));
    }

    let mut clients = Vec::new();
    for task in tasks {
        clients.push(task.await.unwrap());
    }

    server.wait_for_count(1).await;
    server
        .server
        .broadcast(&Message::ordinary(ClientId::SERVER, "ping"))
        .await
        .unwrap();

    // The admitted client gets the ping; every other connection is closed
    let mut admitted = 0;
    for client in &mut clients {
        if let Some(msg) = client.recv().await {
            assert_eq!(msg.body(), "ping");
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_unban_readmits_on_reconnect() {
    let server = TestServer::spawn().await;
    let (mut bob, b_id) = server.join("bob").await;

    server.server.remove(b_id).await.unwrap();
    bob.expect_closed().await;

    assert!(server.server.unban(b_id).await.unwrap());
    assert!(server.server.banned().await.is_empty());

    let (_bob_again, b2_id) = server.join("bob").await;
    assert_ne!(b2_id, b_id);
    server.shutdown().await;
}

// ============================================================================
// Logout Tests
// ============================================================================

#[tokio::test]
async fn test_logout_removes_client_and_frees_name() {
    let server = TestServer::spawn().await;
    let mut events = server.server.subscribe();

    let (mut alice, a_id) = server.join("alice").await;
    let (mut bob, b_id) = server.join("bob").await;

    bob.send(&Message::logout(b_id)).await;
    bob.expect_closed().await;
    server.wait_for_count(1).await;

    // A Left event with the logout reason was published
    let mut saw_logout = false;
    while let Ok(event) = events.try_recv() {
        if let RegistryEvent::Left { identity, reason, .. } = event {
            if identity == b_id {
                assert_eq!(reason, RemovalReason::Logout);
                saw_logout = true;
            }
        }
    }
    assert!(saw_logout);

    alice.say("still here").await;
    alice.expect_ordinary(a_id, "still here").await;

    let (_bob_again, _) = server.join("bob").await;
    server.shutdown().await;
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_shutdown_completeness() {
    let server = TestServer::spawn().await;
    let addr = server.addr();
    let (mut alice, _) = server.join("alice").await;

    let controller = server.server.clone();
    controller.shutdown().await;

    let msg = alice.recv().await.expect("shutdown notice");
    assert_eq!(msg.kind(), MessageType::Shutdown);
    alice.expect_closed().await;

    assert!(controller.clients().await.is_empty());
    assert!(controller.is_shutting_down());

    // Listener is gone
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());

    let result = controller
        .broadcast(&Message::ordinary(ClientId::SERVER, "late"))
        .await;
    assert!(matches!(result, Err(ServerError::ShutdownInProgress)));
}

#[tokio::test]
async fn test_concurrent_shutdown_calls() {
    let server = TestServer::spawn().await;
    let (mut alice, _) = server.join("alice").await;

    let first = server.server.clone();
    let second = server.server.clone();
    let (_, _) = tokio::join!(first.shutdown(), second.shutdown());

    let msg = alice.recv().await.expect("shutdown notice");
    assert_eq!(msg.kind(), MessageType::Shutdown);
    alice.expect_closed().await;
}

#[tokio::test]
async fn test_wait_for_shutdown_resolves() {
    let server = TestServer::spawn().await;
    let waiter = server.server.clone();
    let wait = tokio::spawn(async move { waiter.wait_for_shutdown().await });

    server.shutdown().await;
    tokio::time::timeout(common::RECV_TIMEOUT, wait)
        .await
        .expect("wait_for_shutdown resolved")
        .unwrap();
}
