//! Queued-send decorator.

use crate::connection::{Connection, ForwardingListener, ListenerSlot};
use crate::core::packet::Packet;
use crate::error::Result;
use crate::event::ConnectionListener;
use crate::transport::BoxedTransport;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Completion callback for a queued operation; receives the boolean result
/// the wrapped call produced.
pub type CompletionCallback = Box<dyn FnOnce(bool) + Send + 'static>;

struct QueuedPacket {
    packet: Packet,
    completion: Option<CompletionCallback>,
}

/// Adds an unbounded asynchronous send queue to a connection.
///
/// Queued packets are sent in FIFO order by a single sender task that exists
/// only while the queue is non-empty; a top-priority item jumps the queue
/// (but never interrupts a send already in flight). Closing cancels the
/// sender and abandons queued items without invoking their callbacks.
pub struct AsyncConnection {
    inner: Arc<dyn Connection>,
    listener: ListenerSlot,
    queue: Arc<StdMutex<VecDeque<QueuedPacket>>>,
    /// Also serializes queue scheduling against completion waits.
    sender_task: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncConnection {
    /// Wraps the given connection. The decorator takes over the inner
    /// listener registration; register listeners on the decorator instead.
    pub fn new(inner: Arc<dyn Connection>) -> Arc<Self> {
        let slot: ListenerSlot = Arc::default();
        Arc::new_cyclic(|weak| {
            inner.set_listener(Some(Arc::new(ForwardingListener::new(
                weak.clone(),
                slot.clone(),
            ))));
            Self {
                inner,
                listener: slot,
                queue: Arc::new(StdMutex::new(VecDeque::new())),
                sender_task: Mutex::new(None),
            }
        })
    }

    /// Queues a packet for sending. With `top_priority` the packet is placed
    /// at the head of the queue, ahead of every item still queued.
    ///
    /// The completion callback, if any, receives the boolean result of the
    /// wrapped send.
    pub async fn send_async(
        &self,
        packet: Packet,
        completion: Option<CompletionCallback>,
        top_priority: bool,
    ) {
        let mut task = self.sender_task.lock().await;

        debug!(top_priority, "scheduling async packet");
        {
            let mut queue = self.queue.lock().unwrap();
            let item = QueuedPacket { packet, completion };
            if top_priority {
                queue.push_front(item);
            } else {
                queue.push_back(item);
            }
        }

        let running = task.as_ref().map(|t| !t.is_finished()).unwrap_or(false);
        if !running {
            debug!("starting async sender");
            let inner = self.inner.clone();
            let queue = self.queue.clone();
            *task = Some(tokio::spawn(sender_loop(inner, queue)));
        }
    }

    /// Connects in the background and reports the boolean result to the
    /// callback. Reports `false` immediately when already connected.
    pub fn connect_async(&self, host: &str, port: u16, completion: Option<CompletionCallback>) {
        if self.inner.is_connected() {
            if let Some(done) = completion {
                done(false);
            }
            return;
        }

        debug!("starting async connect");
        let inner = self.inner.clone();
        let host = host.to_string();
        tokio::spawn(async move {
            let result = inner.connect(&host, port).await.unwrap_or(false);
            if let Some(done) = completion {
                done(result);
            }
        });
    }

    /// Blocks until the currently running sender task finishes draining the
    /// queue. Returns immediately when no sender is running.
    pub async fn wait_for_async_completion(&self) {
        let mut task = self.sender_task.lock().await;
        if let Some(handle) = task.as_mut() {
            let _ = handle.await;
            *task = None;
        }
    }

    /// Queued packets not yet handed to the sender task.
    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

/// Drains the queue head-first and terminates once it is empty; a later
/// `send_async` starts a fresh task.
async fn sender_loop(inner: Arc<dyn Connection>, queue: Arc<StdMutex<VecDeque<QueuedPacket>>>) {
    debug!("async sender started");
    loop {
        let item = queue.lock().unwrap().pop_front();
        let Some(item) = item else { break };

        let ok = inner.send(item.packet).await;
        if let Some(done) = item.completion {
            done(ok);
        }
    }
    debug!("async sender stopped");
}

#[async_trait]
impl Connection for AsyncConnection {
    fn set_listener(&self, listener: Option<Arc<dyn ConnectionListener>>) {
        *self.listener.lock().unwrap() = listener;
    }

    async fn assign_transport(&self, transport: BoxedTransport) -> Result<()> {
        self.inner.assign_transport(transport).await
    }

    async fn connect(&self, host: &str, port: u16) -> Result<bool> {
        self.inner.connect(host, port).await
    }

    async fn send(&self, packet: Packet) -> bool {
        self.inner.send(packet).await
    }

    /// Closes the wrapped connection and cancels any running sender task,
    /// abandoning queued items without invoking their callbacks.
    async fn close(&self) {
        self.inner.close().await;

        let mut task = self.sender_task.lock().await;
        if let Some(handle) = task.take() {
            handle.abort();
        }
        self.queue.lock().unwrap().clear();
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.peer_addr()
    }
}
