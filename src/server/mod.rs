//! # Server
//!
//! Accepts inbound transports and binds a connection to each.
//!
//! The acceptor loop runs on its own task and mints connections through a
//! [`ConnectionFactory`] shared by the plain and TLS servers. Every accepted
//! connection gets an internal listener that maintains the live-connection
//! set and forwards events to the server's registered listener. One lock
//! guards set additions, removals and the shutdown sweep.

pub mod tls;

use crate::connection::Connection;
use crate::core::packet::Packet;
use crate::error::Result;
use crate::event::ConnectionListener;
use crate::transport::{
    ConnectionFactory, ListenerFactory, TcpConnectionFactory, TcpListenerFactory,
    TransportListener,
};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// Contract shared by the plain server and its decorators.
#[async_trait]
pub trait Server: Send + Sync {
    /// Registers (or clears) the listener observing every accepted
    /// connection.
    fn set_listener(&self, listener: Option<Arc<dyn ConnectionListener>>);

    /// Opens the listening handle and starts the acceptor task. Bind
    /// failures return `false`.
    async fn start(&self, port: u16) -> bool;

    /// Detaches and closes every live connection, then closes the listening
    /// handle. Idempotent.
    async fn stop(&self);
}

struct ServerInner {
    binder: Arc<dyn ListenerFactory>,
    factory: Arc<dyn ConnectionFactory>,
    /// Guards additions, removals and the shutdown sweep together.
    connections: Mutex<Vec<Arc<dyn Connection>>>,
    listener: StdMutex<Option<Arc<dyn ConnectionListener>>>,
    acceptor: Mutex<Option<mpsc::Sender<()>>>,
    local_addr: StdMutex<Option<SocketAddr>>,
}

impl ServerInner {
    fn listener(&self) -> Option<Arc<dyn ConnectionListener>> {
        self.listener.lock().unwrap().clone()
    }

    /// Detach-then-close sweep over the live set, then shut the acceptor
    /// down. Detaching first keeps the forwarded disconnect from re-entering
    /// the set we are sweeping.
    async fn stop_all(&self) {
        {
            let mut connections = self.connections.lock().await;
            if !connections.is_empty() {
                info!(connections = connections.len(), "stopping server");
            }
            for conn in connections.iter() {
                conn.set_listener(None);
                conn.close().await;
            }
            connections.clear();
        }

        if let Some(shutdown) = self.acceptor.lock().await.take() {
            let _ = shutdown.try_send(());
            debug!("listening handle closed");
        }
        *self.local_addr.lock().unwrap() = None;
    }
}

/// A server accepting plain transports. Cloning yields another handle to the
/// same server.
#[derive(Clone)]
pub struct TcpServer {
    inner: Arc<ServerInner>,
}

impl Default for TcpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpServer {
    /// Server over plain TCP with the default connection factory.
    pub fn new() -> Self {
        Self::with_factories(Arc::new(TcpListenerFactory), Arc::new(TcpConnectionFactory))
    }

    /// Server over the given listener and connection factories.
    pub fn with_factories(
        binder: Arc<dyn ListenerFactory>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                binder,
                factory,
                connections: Mutex::new(Vec::new()),
                listener: StdMutex::new(None),
                acceptor: Mutex::new(None),
                local_addr: StdMutex::new(None),
            }),
        }
    }

    /// Bound address while running; useful with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock().unwrap()
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.connections.lock().await.len()
    }
}

#[async_trait]
impl Server for TcpServer {
    fn set_listener(&self, listener: Option<Arc<dyn ConnectionListener>>) {
        *self.inner.listener.lock().unwrap() = listener;
    }

    async fn start(&self, port: u16) -> bool {
        let mut acceptor = self.inner.acceptor.lock().await;
        if acceptor.is_some() {
            warn!("server already started");
            return false;
        }

        debug!(port, "starting server");
        let listener = match self.inner.binder.bind(port).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, "unable to start server");
                return false;
            }
        };

        *self.inner.local_addr.lock().unwrap() = listener.local_addr().ok();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        *acceptor = Some(shutdown_tx);

        tokio::spawn(acceptor_loop(self.inner.clone(), listener, shutdown_rx));
        true
    }

    async fn stop(&self) {
        self.inner.stop_all().await;
    }
}

/// Accepts transports until the listening handle is closed or accept fails.
async fn acceptor_loop(
    inner: Arc<ServerInner>,
    listener: Box<dyn TransportListener>,
    mut shutdown: mpsc::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok(transport) => {
                    let conn = inner.factory.connection();
                    conn.set_listener(Some(Arc::new(AcceptedListener {
                        server: Arc::downgrade(&inner),
                        conn: Arc::downgrade(&conn),
                    })));
                    if let Err(e) = conn.assign_transport(transport).await {
                        error!(error = %e, "unable to bind accepted transport");
                    }
                }
                Err(e) => {
                    // Accept failures are terminal; sweep and bail out.
                    error!(error = %e, "error while accepting");
                    inner.stop_all().await;
                    break;
                }
            }
        }
    }
    debug!("acceptor stopped");
}

/// Internal listener installed on every accepted connection: maintains the
/// live set and forwards events to the server's registered listener.
struct AcceptedListener {
    server: Weak<ServerInner>,
    conn: Weak<dyn Connection>,
}

#[async_trait]
impl ConnectionListener for AcceptedListener {
    async fn on_connect(&self, conn: &dyn Connection) {
        let (Some(server), Some(owned)) = (self.server.upgrade(), self.conn.upgrade()) else {
            return;
        };

        {
            let mut connections = server.connections.lock().await;
            debug!(peer = ?conn.peer_addr(), "client connected");
            connections.push(owned);
        }
        if let Some(listener) = server.listener() {
            listener.on_connect(conn).await;
        }
    }

    async fn on_disconnect(&self, conn: &dyn Connection) {
        let Some(server) = self.server.upgrade() else {
            return;
        };

        if let Some(owned) = self.conn.upgrade() {
            let mut connections = server.connections.lock().await;
            debug!(peer = ?conn.peer_addr(), "client disconnected");
            connections.retain(|c| !Arc::ptr_eq(c, &owned));
        }
        if let Some(listener) = server.listener() {
            listener.on_disconnect(conn).await;
        }
    }

    async fn on_receive(&self, packet: Packet, conn: &dyn Connection) -> Result<()> {
        let Some(server) = self.server.upgrade() else {
            return Ok(());
        };

        match server.listener() {
            Some(listener) => listener.on_receive(packet, conn).await,
            None => Ok(()),
        }
    }
}
