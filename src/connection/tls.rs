//! TLS client decorator.

use crate::config::TlsPolicy;
use crate::connection::{Connection, ForwardingListener, ListenerSlot, TcpConnection};
use crate::core::packet::Packet;
use crate::error::Result;
use crate::event::ConnectionListener;
use crate::transport::tls::TlsTransportConnector;
use crate::transport::BoxedTransport;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;

/// A connection whose transports are TLS channels negotiated under a
/// [`TlsPolicy`].
///
/// Policy and credential problems surface from the constructor; handshake
/// and connection failures surface as `false` from `connect`, like any other
/// transport failure.
pub struct TlsConnection {
    inner: Arc<TcpConnection>,
    listener: ListenerSlot,
}

impl TlsConnection {
    /// Secure connection verifying peers against the platform trust store.
    pub fn new(policy: TlsPolicy) -> Result<Arc<Self>> {
        Self::build(policy, None)
    }

    /// Secure connection verifying peers against the supplied CA bundle
    /// (PEM) instead of the platform trust store.
    pub fn with_trust_anchors(policy: TlsPolicy, ca_pem: impl Into<Vec<u8>>) -> Result<Arc<Self>> {
        Self::build(policy, Some(ca_pem.into()))
    }

    fn build(policy: TlsPolicy, trust_anchors: Option<Vec<u8>>) -> Result<Arc<Self>> {
        let connector = TlsTransportConnector::new(policy, trust_anchors)?;
        let inner = Arc::new(TcpConnection::with_connector(Arc::new(connector)));

        let slot: ListenerSlot = Arc::default();
        Ok(Arc::new_cyclic(|weak| {
            inner.set_listener(Some(Arc::new(ForwardingListener::new(
                weak.clone(),
                slot.clone(),
            ))));
            Self {
                inner,
                listener: slot,
            }
        }))
    }
}

#[async_trait]
impl Connection for TlsConnection {
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

    async fn close(&self) {
        self.inner.close().await;
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.peer_addr()
    }
}
