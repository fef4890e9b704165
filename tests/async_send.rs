#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Queue semantics of the asynchronous send decorator. These tests run on
//! the current-thread runtime: nothing between two `send_async` calls
//! yields, so the sender task cannot dequeue until the test awaits it.

use async_trait::async_trait;
use framelink::prelude::*;
use framelink::transport::BoxedTransport;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Records sent packet ids; optionally parks forever to keep a sender task
/// mid-send.
struct RecordingConnection {
    sent: Mutex<Vec<u16>>,
    send_result: AtomicBool,
    park: Option<Arc<Notify>>,
}

impl RecordingConnection {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            send_result: AtomicBool::new(true),
            park: None,
        })
    }

    fn parked(park: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            send_result: AtomicBool::new(true),
            park: Some(park),
        })
    }

    fn sent(&self) -> Vec<u16> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    fn set_listener(&self, _listener: Option<Arc<dyn ConnectionListener>>) {}

    async fn assign_transport(&self, _transport: BoxedTransport) -> Result<()> {
        Ok(())
    }

    async fn connect(&self, _host: &str, _port: u16) -> Result<bool> {
        Ok(true)
    }

    async fn send(&self, packet: Packet) -> bool {
        if let Some(park) = &self.park {
            park.notified().await;
        }
        self.sent.lock().unwrap().push(packet.id);
        self.send_result.load(Ordering::SeqCst)
    }

    async fn close(&self) {}

    fn is_connected(&self) -> bool {
        true
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

#[tokio::test]
async fn top_priority_jumps_queued_items() {
    let inner = RecordingConnection::new();
    let conn = AsyncConnection::new(inner.clone());

    // A, B default; C top priority — all queued before the sender task has
    // had a chance to dequeue anything.
    conn.send_async(Packet::request(1, vec![]), None, false).await;
    conn.send_async(Packet::request(2, vec![]), None, false).await;
    conn.send_async(Packet::request(3, vec![]), None, true).await;

    conn.wait_for_async_completion().await;
    assert_eq!(inner.sent(), vec![3, 1, 2]);
}

#[tokio::test]
async fn default_priority_preserves_fifo_order() {
    let inner = RecordingConnection::new();
    let conn = AsyncConnection::new(inner.clone());

    for id in 0..20u16 {
        conn.send_async(Packet::request(id, vec![]), None, false)
            .await;
    }

    conn.wait_for_async_completion().await;
    assert_eq!(inner.sent(), (0..20).collect::<Vec<_>>());
}

#[tokio::test]
async fn completion_callback_reports_send_result() {
    let inner = RecordingConnection::new();
    inner.send_result.store(false, Ordering::SeqCst);
    let conn = AsyncConnection::new(inner.clone());

    let reported = Arc::new(Mutex::new(None));
    let sink = reported.clone();
    conn.send_async(
        Packet::request(1, vec![]),
        Some(Box::new(move |ok| {
            *sink.lock().unwrap() = Some(ok);
        })),
        false,
    )
    .await;

    conn.wait_for_async_completion().await;
    assert_eq!(*reported.lock().unwrap(), Some(false));
}

#[tokio::test]
async fn wait_returns_immediately_without_a_sender() {
    let conn = AsyncConnection::new(RecordingConnection::new());
    conn.wait_for_async_completion().await;
}

#[tokio::test]
async fn close_abandons_queued_items_without_callbacks() {
    let park = Arc::new(Notify::new());
    let inner = RecordingConnection::parked(park);
    let conn = AsyncConnection::new(inner.clone());

    let first_done = Arc::new(AtomicBool::new(false));
    let second_done = Arc::new(AtomicBool::new(false));

    let flag = first_done.clone();
    conn.send_async(
        Packet::request(1, vec![]),
        Some(Box::new(move |_| flag.store(true, Ordering::SeqCst))),
        false,
    )
    .await;
    let flag = second_done.clone();
    conn.send_async(
        Packet::request(2, vec![]),
        Some(Box::new(move |_| flag.store(true, Ordering::SeqCst))),
        false,
    )
    .await;

    // The sender is parked inside the first send; cancel it.
    conn.close().await;

    assert_eq!(conn.queued(), 0);
    assert!(!first_done.load(Ordering::SeqCst));
    assert!(!second_done.load(Ordering::SeqCst));
    assert!(inner.sent().is_empty());
}

#[tokio::test]
async fn sender_restarts_after_draining() {
    let inner = RecordingConnection::new();
    let conn = AsyncConnection::new(inner.clone());

    conn.send_async(Packet::request(1, vec![]), None, false).await;
    conn.wait_for_async_completion().await;

    conn.send_async(Packet::request(2, vec![]), None, false).await;
    conn.wait_for_async_completion().await;

    assert_eq!(inner.sent(), vec![1, 2]);
}
