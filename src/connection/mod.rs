//! # Connections
//!
//! A connection owns one transport, runs its receive loop, and exposes a
//! synchronous send. Decorators add queued sends ([`async_send`]), automatic
//! reconnects ([`reconnect`]) and TLS ([`tls`]) without changing the
//! [`Connection`] contract.
//!
//! ## Lifecycle
//! ```text
//! Unbound --assign_transport--> Connected --close--> Closed
//!    ^                                                  |
//!    +------------------ (re-bindable) -----------------+
//! ```
//!
//! ## Concurrency
//! One mutex guards transport assignment, send and close together, so a
//! send can never observe a transport mid-replacement. The receive loop is
//! the sole reader of the transport and runs on its own task for the life
//! of the binding; `close` unblocks it through a shutdown channel.

pub mod async_send;
pub mod reconnect;
pub mod tls;

use crate::core::codec::PacketCodec;
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::event::ConnectionListener;
use crate::transport::{BoxedTransport, TcpConnector, TransportConnector};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

/// Shared listener registration slot, also handed to decorator forwarding
/// listeners.
pub(crate) type ListenerSlot = Arc<StdMutex<Option<Arc<dyn ConnectionListener>>>>;

/// Capability contract shared by plain connections and every decorator.
///
/// Decorators hold and exclusively own an inner `Arc<dyn Connection>`,
/// forwarding the operations they do not augment.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Registers (or clears) the event listener.
    fn set_listener(&self, listener: Option<Arc<dyn ConnectionListener>>);

    /// Binds a transport: starts the receive loop, then fires `on_connect`.
    ///
    /// Fails with [`ProtocolError::InvalidState`] when already bound and not
    /// closed.
    async fn assign_transport(&self, transport: BoxedTransport) -> Result<()>;

    /// Obtains a transport from the connector and binds it.
    ///
    /// Ordinary connection failures return `Ok(false)`; connecting while
    /// already connected, or with an empty host or port 0, is an
    /// [`ProtocolError::InvalidState`].
    async fn connect(&self, host: &str, port: u16) -> Result<bool>;

    /// Encodes, writes and flushes one packet. Returns `false` without
    /// closing the connection on any I/O failure or when not connected.
    async fn send(&self, packet: Packet) -> bool;

    /// Closes the transport and fires `on_disconnect` exactly once.
    /// Idempotent; the connection is re-bindable afterwards.
    async fn close(&self);

    /// True iff bound, open and not closed.
    fn is_connected(&self) -> bool;

    /// Remote address of the bound transport, if any.
    fn peer_addr(&self) -> Option<SocketAddr>;
}

/// Write side and shutdown handle of a bound transport. Lives inside the
/// connection's single mutual-exclusion domain.
struct BoundTransport {
    writer: FramedWrite<WriteHalf<BoxedTransport>, PacketCodec>,
    shutdown: mpsc::Sender<()>,
    /// Identifies this binding; a stale receive loop must not tear down a
    /// successor transport.
    generation: u64,
}

struct ConnectionInner {
    connector: Arc<dyn TransportConnector>,
    /// Guards transport assignment, send and close together.
    io: Mutex<Option<BoundTransport>>,
    connected: AtomicBool,
    generation: AtomicU64,
    listener: ListenerSlot,
    peer: StdMutex<Option<SocketAddr>>,
}

/// A concrete connection over one plain or pre-encrypted transport.
///
/// Cloning is cheap and yields another handle to the same connection.
#[derive(Clone)]
pub struct TcpConnection {
    inner: Arc<ConnectionInner>,
}

impl Default for TcpConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpConnection {
    /// Creates an unbound connection using the plain TCP connector.
    pub fn new() -> Self {
        Self::with_connector(Arc::new(TcpConnector))
    }

    /// Creates an unbound connection using the given transport connector.
    pub fn with_connector(connector: Arc<dyn TransportConnector>) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                connector,
                io: Mutex::new(None),
                connected: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                listener: Arc::default(),
                peer: StdMutex::new(None),
            }),
        }
    }

    fn listener(&self) -> Option<Arc<dyn ConnectionListener>> {
        self.inner.listener.lock().unwrap().clone()
    }

    /// Close path shared by user closes (`generation: None`) and a receive
    /// loop closing its own binding (`generation: Some(..)`); the latter is
    /// a no-op when the binding has already been replaced.
    async fn close_binding(&self, generation: Option<u64>) {
        let bound = {
            let mut io = self.inner.io.lock().await;
            match io.take() {
                Some(bound) if generation.map_or(true, |g| g == bound.generation) => bound,
                Some(successor) => {
                    // A stale loop must leave the replacement binding alone.
                    *io = Some(successor);
                    return;
                }
                None => return,
            }
        };

        info!("closing connection");
        self.inner.connected.store(false, Ordering::SeqCst);
        // Unblock the receive loop, then release the write half.
        let _ = bound.shutdown.try_send(());
        drop(bound);

        if let Some(listener) = self.listener() {
            listener.on_disconnect(self).await;
        }
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn set_listener(&self, listener: Option<Arc<dyn ConnectionListener>>) {
        *self.inner.listener.lock().unwrap() = listener;
    }

    async fn assign_transport(&self, transport: BoxedTransport) -> Result<()> {
        {
            let mut io = self.inner.io.lock().await;
            if io.is_some() {
                return Err(ProtocolError::InvalidState("Connection not closed".into()));
            }

            let peer = transport.peer_addr();
            *self.inner.peer.lock().unwrap() = peer;

            let (read_half, write_half) = tokio::io::split(transport);
            let reader = FramedRead::new(read_half, PacketCodec);
            let writer = FramedWrite::new(write_half, PacketCodec);
            let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

            *io = Some(BoundTransport {
                writer,
                shutdown: shutdown_tx,
                generation,
            });
            self.inner.connected.store(true, Ordering::SeqCst);

            debug!("starting receive loop");
            tokio::spawn(receive_loop(self.clone(), generation, reader, shutdown_rx));
        }

        if let Some(listener) = self.listener() {
            listener.on_connect(self).await;
        }
        Ok(())
    }

    async fn connect(&self, host: &str, port: u16) -> Result<bool> {
        if self.is_connected() {
            return Err(ProtocolError::InvalidState("Connection not closed".into()));
        }
        if host.is_empty() || port == 0 {
            return Err(ProtocolError::InvalidState(
                "Host and port are not set".into(),
            ));
        }

        info!(host, port, "connecting");
        match self.inner.connector.connect(host, port).await {
            Ok(transport) => {
                self.assign_transport(transport).await?;
                debug!("connected");
                Ok(true)
            }
            Err(e) => {
                error!(error = %e, "unable to connect");
                Ok(false)
            }
        }
    }

    async fn send(&self, packet: Packet) -> bool {
        let mut io = self.inner.io.lock().await;
        match io.as_mut() {
            Some(bound) => {
                debug!(packet = %packet, "sending packet");
                match bound.writer.send(packet).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!(error = %e, "error while sending packet");
                        false
                    }
                }
            }
            None => false,
        }
    }

    async fn close(&self) {
        self.close_binding(None).await;
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        *self.inner.peer.lock().unwrap()
    }
}

/// Sole reader of a bound transport. Decodes packets and dispatches them to
/// the listener until the transport fails, ends, or the connection closes.
async fn receive_loop(
    conn: TcpConnection,
    generation: u64,
    mut reader: FramedRead<ReadHalf<BoxedTransport>, PacketCodec>,
    mut shutdown: mpsc::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            frame = reader.next() => match frame {
                Some(Ok(packet)) => {
                    debug!(packet = %packet, "received packet");
                    if let Some(listener) = conn.listener() {
                        if let Err(e) = listener.on_receive(packet, &conn).await {
                            warn!(error = %e, "unable to handle packet");
                        }
                    }
                }
                Some(Err(e)) => {
                    match &e {
                        // Socket closed under us; nothing to report.
                        ProtocolError::Io(_) => debug!(error = %e, "transport error"),
                        other => error!(error = %other, "framing error"),
                    }
                    conn.close_binding(Some(generation)).await;
                    break;
                }
                None => {
                    // Clean EOF from the peer.
                    conn.close_binding(Some(generation)).await;
                    break;
                }
            }
        }
    }
    debug!("receive loop stopped");
}

/// Listener a decorator installs on its wrapped connection: re-dispatches
/// every event to the decorator's own listener, presenting the decorator as
/// the event source. Holds the outer decorator weakly; the decorator owns
/// the inner connection, not the reverse.
pub(crate) struct ForwardingListener<C> {
    outer: Weak<C>,
    slot: ListenerSlot,
}

impl<C> ForwardingListener<C> {
    pub(crate) fn new(outer: Weak<C>, slot: ListenerSlot) -> Self {
        Self { outer, slot }
    }

    fn target(&self) -> Option<(Arc<C>, Arc<dyn ConnectionListener>)> {
        let outer = self.outer.upgrade()?;
        let listener = self.slot.lock().unwrap().clone()?;
        Some((outer, listener))
    }
}

#[async_trait]
impl<C: Connection + 'static> ConnectionListener for ForwardingListener<C> {
    async fn on_connect(&self, _inner: &dyn Connection) {
        if let Some((outer, listener)) = self.target() {
            listener.on_connect(outer.as_ref()).await;
        }
    }

    async fn on_disconnect(&self, _inner: &dyn Connection) {
        if let Some((outer, listener)) = self.target() {
            listener.on_disconnect(outer.as_ref()).await;
        }
    }

    async fn on_receive(&self, packet: Packet, _inner: &dyn Connection) -> Result<()> {
        match self.target() {
            Some((outer, listener)) => listener.on_receive(packet, outer.as_ref()).await,
            None => Ok(()),
        }
    }
}
