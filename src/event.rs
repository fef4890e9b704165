//! # Event Traits
//!
//! Callback seams between connections, servers and application code.
//!
//! A [`ConnectionListener`] observes the lifecycle of a single connection
//! (or of every connection accepted by a server); a [`PacketHandler`] is the
//! unit of dispatch registered with a
//! [`PacketRouter`](crate::protocol::router::PacketRouter) for one packet id.
//!
//! Callbacks are invoked from the owning receive-loop task, one at a time
//! per connection. A handler may reply through the connection it is handed;
//! an `Err` returned from `on_receive` is logged by the receive loop and
//! never terminates it.

use crate::connection::Connection;
use crate::core::packet::Packet;
use crate::error::Result;
use async_trait::async_trait;

/// Observer for connection lifecycle and traffic events.
#[async_trait]
pub trait ConnectionListener: Send + Sync {
    /// A transport was bound to the connection.
    async fn on_connect(&self, conn: &dyn Connection);

    /// The connection closed; fired exactly once per bound transport.
    async fn on_disconnect(&self, conn: &dyn Connection);

    /// A packet arrived. Errors are logged by the caller and do not end the
    /// receive loop.
    async fn on_receive(&self, packet: Packet, conn: &dyn Connection) -> Result<()>;
}

/// Handles packets for one registered id.
#[async_trait]
pub trait PacketHandler: Send + Sync {
    async fn handle(&self, packet: &Packet, conn: &dyn Connection) -> Result<()>;
}
