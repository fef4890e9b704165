//! TLS server decorator.

use crate::config::TlsPolicy;
use crate::error::Result;
use crate::event::ConnectionListener;
use crate::server::{Server, TcpServer};
use crate::transport::tls::{Identity, TlsListenerFactory};
use crate::transport::TcpConnectionFactory;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;

/// A server whose accepted transports are TLS channels negotiated under a
/// [`TlsPolicy`].
///
/// The acceptor completes each handshake before binding the transport, so
/// the minted connections are ordinary plain connections over an already
/// encrypted stream. Policy and identity problems surface from the
/// constructor.
pub struct TlsServer {
    inner: TcpServer,
}

impl TlsServer {
    pub fn new(policy: TlsPolicy, identity: Identity) -> Result<Self> {
        let binder = TlsListenerFactory::new(policy, identity)?;
        Ok(Self {
            inner: TcpServer::with_factories(Arc::new(binder), Arc::new(TcpConnectionFactory)),
        })
    }

    /// Bound address while running; useful with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr()
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.connection_count().await
    }
}

#[async_trait]
impl Server for TlsServer {
    fn set_listener(&self, listener: Option<Arc<dyn ConnectionListener>>) {
        self.inner.set_listener(listener);
    }

    async fn start(&self, port: u16) -> bool {
        self.inner.start(port).await
    }

    async fn stop(&self) {
        self.inner.stop().await;
    }
}
