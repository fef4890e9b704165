//! Auto-reconnect decorator.

use crate::connection::{Connection, ForwardingListener, ListenerSlot};
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::event::ConnectionListener;
use crate::transport::BoxedTransport;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use tracing::debug;

/// Hook invoked right after a successful (re)connect, before the triggering
/// call returns.
pub type ReconnectHook = Box<dyn Fn() + Send + Sync + 'static>;

/// Reconnects to a remembered endpoint before sending.
///
/// `send` makes exactly one reconnect attempt when the wrapped connection is
/// down and aborts with `false` if it fails; there is no retry loop and no
/// backoff.
pub struct ReconnectConnection {
    inner: Arc<dyn Connection>,
    listener: ListenerSlot,
    host: String,
    port: u16,
    on_reconnect: StdMutex<Option<ReconnectHook>>,
}

impl ReconnectConnection {
    /// Wraps the given connection with the endpoint to reconnect to.
    ///
    /// An empty host or port 0 is rejected here, so a later `send` can never
    /// run with an unset endpoint.
    pub fn new(inner: Arc<dyn Connection>, host: impl Into<String>, port: u16) -> Result<Arc<Self>> {
        let host = host.into();
        if host.is_empty() || port == 0 {
            return Err(ProtocolError::InvalidState(
                "Host and port are not set".into(),
            ));
        }

        let slot: ListenerSlot = Arc::default();
        Ok(Arc::new_cyclic(|weak| {
            inner.set_listener(Some(Arc::new(ForwardingListener::new(
                weak.clone(),
                slot.clone(),
            ))));
            Self {
                inner,
                listener: slot,
                host,
                port,
                on_reconnect: StdMutex::new(None),
            }
        }))
    }

    /// Sets the hook run directly after reconnecting. The hook must not
    /// re-register itself from inside the call.
    pub fn set_on_reconnect(&self, hook: Option<ReconnectHook>) {
        *self.on_reconnect.lock().unwrap() = hook;
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[async_trait]
impl Connection for ReconnectConnection {
    fn set_listener(&self, listener: Option<Arc<dyn ConnectionListener>>) {
        *self.listener.lock().unwrap() = listener;
    }

    async fn assign_transport(&self, transport: BoxedTransport) -> Result<()> {
        self.inner.assign_transport(transport).await
    }

    async fn connect(&self, host: &str, port: u16) -> Result<bool> {
        let connected = self.inner.connect(host, port).await?;
        if connected {
            if let Some(hook) = &*self.on_reconnect.lock().unwrap() {
                hook();
            }
        }
        Ok(connected)
    }

    async fn send(&self, packet: Packet) -> bool {
        if !self.inner.is_connected() {
            debug!("auto connecting");
            match self.connect(&self.host, self.port).await {
                Ok(true) => {}
                _ => return false,
            }
        }

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
