//! # Transport Layer
//!
//! Byte-stream transports and the factory seams that mint them.
//!
//! Connections and servers never open sockets themselves: a
//! [`TransportConnector`] produces outbound transports, a
//! [`ListenerFactory`] produces listening handles, and a
//! [`ConnectionFactory`] mints the connection objects a server binds to
//! accepted transports. Plain TCP implementations live here; the TLS
//! counterparts are in [`tls`].

pub mod tls;

use crate::connection::{Connection, TcpConnection};
use crate::error::Result;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// One bidirectional byte stream, plain or TLS.
///
/// The read half of a bound transport is owned exclusively by its
/// connection's receive-loop task; the write half by the connection's send
/// path.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {
    /// Remote address, when the transport has one.
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

pub type BoxedTransport = Box<dyn Transport>;

impl Transport for TcpStream {
    fn peer_addr(&self) -> Option<SocketAddr> {
        TcpStream::peer_addr(self).ok()
    }
}

impl Transport for tokio_rustls::client::TlsStream<TcpStream> {
    fn peer_addr(&self) -> Option<SocketAddr> {
        self.get_ref().0.peer_addr().ok()
    }
}

impl Transport for tokio_rustls::server::TlsStream<TcpStream> {
    fn peer_addr(&self) -> Option<SocketAddr> {
        self.get_ref().0.peer_addr().ok()
    }
}

/// In-memory stream, used by tests.
impl Transport for tokio::io::DuplexStream {}

/// Produces outbound transports for `(host, port)` endpoints.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<BoxedTransport>;
}

/// Plain TCP connector.
pub struct TcpConnector;

#[async_trait]
impl TransportConnector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<BoxedTransport> {
        let stream = TcpStream::connect((host, port)).await?;
        disable_keepalive(&stream)?;
        Ok(Box::new(stream))
    }
}

/// Bound listening handle accepting inbound transports.
#[async_trait]
pub trait TransportListener: Send + Sync {
    /// Blocks until the next inbound transport is ready.
    async fn accept(&self) -> Result<BoxedTransport>;

    fn local_addr(&self) -> Result<SocketAddr>;
}

/// Produces listening handles for a port.
#[async_trait]
pub trait ListenerFactory: Send + Sync {
    async fn bind(&self, port: u16) -> Result<Box<dyn TransportListener>>;
}

/// Plain TCP listener factory.
pub struct TcpListenerFactory;

#[async_trait]
impl ListenerFactory for TcpListenerFactory {
    async fn bind(&self, port: u16) -> Result<Box<dyn TransportListener>> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let addr = listener.local_addr()?;
        debug!(%addr, "listening");
        Ok(Box::new(TcpTransportListener { listener }))
    }
}

struct TcpTransportListener {
    listener: TcpListener,
}

#[async_trait]
impl TransportListener for TcpTransportListener {
    async fn accept(&self) -> Result<BoxedTransport> {
        let (stream, _) = self.listener.accept().await?;
        disable_keepalive(&stream)?;
        Ok(Box::new(stream))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Mints the connection objects a server binds to accepted transports.
/// Shared by the plain and TLS servers: a TLS acceptor hands over transports
/// that are already encrypted, so the connection itself stays plain.
pub trait ConnectionFactory: Send + Sync {
    fn connection(&self) -> Arc<dyn Connection>;
}

/// Default factory producing unbound [`TcpConnection`]s.
pub struct TcpConnectionFactory;

impl ConnectionFactory for TcpConnectionFactory {
    fn connection(&self) -> Arc<dyn Connection> {
        Arc::new(TcpConnection::new())
    }
}

/// Clears SO_KEEPALIVE on a freshly minted socket; the protocol relies on
/// its own traffic, not probes, to notice dead peers.
pub(crate) fn disable_keepalive(stream: &TcpStream) -> io::Result<()> {
    let sock = socket2::SockRef::from(stream);
    sock.set_keepalive(false)
}
