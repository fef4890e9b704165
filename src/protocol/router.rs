//! Packet dispatch by id.

use crate::connection::Connection;
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::event::{ConnectionListener, PacketHandler};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Default)]
struct RouterState {
    handlers: HashMap<u16, Arc<dyn PacketHandler>>,
    default_handler: Option<Arc<dyn PacketHandler>>,
    upstream: Option<Arc<PacketRouter>>,
}

/// Routes packets to the handler registered for their id.
///
/// Resolution order: the upstream router first (if set), then the
/// id-specific handler, then the default handler; a packet matching none is
/// dropped silently. One lock guards the registry across registration,
/// lookup and clearing; handlers run outside it.
#[derive(Default)]
pub struct PacketRouter {
    state: Mutex<RouterState>,
}

impl PacketRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a packet id.
    ///
    /// Fails with [`ProtocolError::DuplicateHandler`] when the id is already
    /// bound; the original handler stays in place.
    pub fn register(&self, id: u16, handler: Arc<dyn PacketHandler>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.handlers.contains_key(&id) {
            return Err(ProtocolError::DuplicateHandler(id));
        }
        state.handlers.insert(id, handler);
        Ok(())
    }

    /// Handler bound to the given id, if any.
    pub fn handler(&self, id: u16) -> Option<Arc<dyn PacketHandler>> {
        self.state.lock().unwrap().handlers.get(&id).cloned()
    }

    /// Removes every id-bound handler; the default handler stays. Clear the
    /// default with `set_default_handler(None)`.
    pub fn unregister_all(&self) {
        self.state.lock().unwrap().handlers.clear();
    }

    /// Sets the handler for ids without a registration of their own.
    pub fn set_default_handler(&self, handler: Option<Arc<dyn PacketHandler>>) {
        self.state.lock().unwrap().default_handler = handler;
    }

    /// Sets the router consulted before local resolution, for cross-cutting
    /// dispatch layered over this one.
    pub fn set_upstream(&self, upstream: Option<Arc<PacketRouter>>) {
        self.state.lock().unwrap().upstream = upstream;
    }

    /// Dispatches one packet. An error from the upstream router aborts the
    /// dispatch before local handlers run.
    pub fn route<'a>(
        &'a self,
        packet: &'a Packet,
        conn: &'a dyn Connection,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let (upstream, handler, default_handler) = {
                let state = self.state.lock().unwrap();
                (
                    state.upstream.clone(),
                    state.handlers.get(&packet.id).cloned(),
                    state.default_handler.clone(),
                )
            };

            if let Some(upstream) = upstream {
                upstream.route(packet, conn).await?;
            }

            match handler.or(default_handler) {
                Some(handler) => handler.handle(packet, conn).await,
                None => {
                    debug!(id = packet.id, "no handler for packet, dropping");
                    Ok(())
                }
            }
        })
    }
}

/// Adapts a router into a [`ConnectionListener`], so it can consume receive
/// events of a connection or server directly.
pub fn router_listener(router: Arc<PacketRouter>) -> Arc<dyn ConnectionListener> {
    Arc::new(RouterListener { router })
}

struct RouterListener {
    router: Arc<PacketRouter>,
}

#[async_trait]
impl ConnectionListener for RouterListener {
    async fn on_connect(&self, _conn: &dyn Connection) {}

    async fn on_disconnect(&self, _conn: &dyn Connection) {}

    async fn on_receive(&self, packet: Packet, conn: &dyn Connection) -> Result<()> {
        self.router.route(&packet, conn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::BoxedTransport;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Does nothing; routing targets in these tests only count calls.
    struct NullConnection;

    #[async_trait]
    impl Connection for NullConnection {
        fn set_listener(&self, _listener: Option<Arc<dyn ConnectionListener>>) {}
        async fn assign_transport(&self, _transport: BoxedTransport) -> Result<()> {
            Ok(())
        }
        async fn connect(&self, _host: &str, _port: u16) -> Result<bool> {
            Ok(false)
        }
        async fn send(&self, _packet: Packet) -> bool {
            true
        }
        async fn close(&self) {}
        fn is_connected(&self) -> bool {
            false
        }
        fn peer_addr(&self) -> Option<SocketAddr> {
            None
        }
    }

    struct CountingHandler {
        calls: AtomicUsize,
    }

    impl CountingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PacketHandler for CountingHandler {
        async fn handle(&self, _packet: &Packet, _conn: &dyn Connection) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn routes_to_registered_handler() {
        let router = PacketRouter::new();
        let handler = CountingHandler::new();
        router.register(1, handler.clone()).unwrap();

        router
            .route(&Packet::request(1, vec![]), &NullConnection)
            .await
            .unwrap();
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn duplicate_registration_fails_and_keeps_original() {
        let router = PacketRouter::new();
        let original = CountingHandler::new();
        let usurper = CountingHandler::new();

        router.register(7, original.clone()).unwrap();
        assert!(matches!(
            router.register(7, usurper.clone()),
            Err(ProtocolError::DuplicateHandler(7))
        ));

        router
            .route(&Packet::request(7, vec![]), &NullConnection)
            .await
            .unwrap();
        assert_eq!(original.calls(), 1);
        assert_eq!(usurper.calls(), 0);
    }

    #[tokio::test]
    async fn upstream_and_specific_run_default_does_not() {
        let router = Arc::new(PacketRouter::new());
        let upstream = Arc::new(PacketRouter::new());

        let upstream_handler = CountingHandler::new();
        upstream.set_default_handler(Some(upstream_handler.clone()));

        let specific = CountingHandler::new();
        let default = CountingHandler::new();
        router.register(3, specific.clone()).unwrap();
        router.set_default_handler(Some(default.clone()));
        router.set_upstream(Some(upstream));

        router
            .route(&Packet::request(3, vec![]), &NullConnection)
            .await
            .unwrap();
        assert_eq!(upstream_handler.calls(), 1);
        assert_eq!(specific.calls(), 1);
        assert_eq!(default.calls(), 0);
    }

    #[tokio::test]
    async fn default_handler_catches_unregistered_ids() {
        let router = PacketRouter::new();
        let default = CountingHandler::new();
        router.set_default_handler(Some(default.clone()));

        router
            .route(&Packet::request(9, vec![]), &NullConnection)
            .await
            .unwrap();
        assert_eq!(default.calls(), 1);
    }

    #[tokio::test]
    async fn unmatched_packet_is_dropped_silently() {
        let router = PacketRouter::new();
        let result = router
            .route(&Packet::request(9, vec![]), &NullConnection)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn unregister_all_keeps_default() {
        let router = PacketRouter::new();
        let specific = CountingHandler::new();
        let default = CountingHandler::new();
        router.register(4, specific.clone()).unwrap();
        router.set_default_handler(Some(default.clone()));

        router.unregister_all();
        assert!(router.handler(4).is_none());

        router
            .route(&Packet::request(4, vec![]), &NullConnection)
            .await
            .unwrap();
        assert_eq!(specific.calls(), 0);
        assert_eq!(default.calls(), 1);

        // The id is registrable again.
        router.register(4, CountingHandler::new()).unwrap();
    }
}
