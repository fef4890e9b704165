//! # framelink
//!
//! Binary packet messaging over TCP/TLS for client/server applications.
//!
//! A [`Packet`](crate::core::packet::Packet) is one self-describing message: a
//! Request/Reply tag, a 16-bit id, and an opaque payload. Connections own
//! one transport each, run a receive loop on a dedicated task, and dispatch
//! decoded packets to a registered listener — directly, or through a
//! [`PacketRouter`](protocol::router::PacketRouter) keyed by packet id.
//! Servers accept transports and bind a connection to each. Decorators add
//! queued sends, automatic reconnects and TLS without changing the
//! connection contract.
//!
//! ## Quick Start
//! ```no_run
//! use framelink::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> framelink::error::Result<()> {
//! let router = Arc::new(PacketRouter::new());
//! // router.register(1, handler)?;
//!
//! let server = TcpServer::new();
//! server.set_listener(Some(router_listener(router)));
//! server.start(4000).await;
//!
//! let client = TcpConnection::new();
//! if client.connect("127.0.0.1", 4000).await? {
//!     client.send(Packet::request(1, b"ping".to_vec())).await;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Wire Format
//! ```text
//! [Type(1)] [Id(2)] [Length(4)] [Payload(N)]   (big-endian)
//! ```

pub mod config;
pub mod connection;
pub mod core;
pub mod error;
pub mod event;
pub mod protocol;
pub mod server;
pub mod transport;
pub mod utils;

/// Common imports for applications built on the crate.
pub mod prelude {
    pub use crate::config::TlsPolicy;
    pub use crate::connection::async_send::AsyncConnection;
    pub use crate::connection::reconnect::ReconnectConnection;
    pub use crate::connection::tls::TlsConnection;
    pub use crate::connection::{Connection, TcpConnection};
    pub use crate::core::builder::PacketBuilder;
    pub use crate::core::packet::{Packet, PacketType};
    pub use crate::core::reader::PacketReader;
    pub use crate::error::{ProtocolError, Result};
    pub use crate::event::{ConnectionListener, PacketHandler};
    pub use crate::protocol::router::{router_listener, PacketRouter};
    pub use crate::server::tls::TlsServer;
    pub use crate::server::{Server, TcpServer};
}
