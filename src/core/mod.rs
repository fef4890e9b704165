//! # Core Protocol Components
//!
//! Low-level packet handling, codecs, and payload packing.
//!
//! This module provides the foundation for the protocol: the packet value
//! type, its wire framing, and the typed payload builder/reader pair.
//!
//! ## Components
//! - **Packet**: immutable message value with a type tag, id and payload
//! - **Codec**: tokio codec for framing packets over byte streams
//! - **Builder / Reader**: big-endian typed field packing inside a payload
//!
//! ## Wire Format
//! ```text
//! [Type(1)] [Id(2)] [Length(4)] [Payload(N)]
//! ```
//!
//! All multi-byte fields are big-endian. There is no magic number, version
//! byte or checksum; correctness relies on a matched reader/writer pair over
//! a reliable transport. The codec enforces no maximum payload size.

pub mod builder;
pub mod codec;
pub mod packet;
pub mod reader;
