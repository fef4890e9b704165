//! # Error Types
//!
//! Error handling for the packet messaging layer.
//!
//! This module defines all error variants that can occur during protocol
//! operations, from low-level framing failures to TLS channel construction.
//!
//! ## Error Categories
//! - **Framing errors**: truncated frames, unrecognized type tags
//! - **State errors**: operations invoked in the wrong lifecycle state
//! - **Dispatch errors**: duplicate handler registrations, handler failures
//! - **Security errors**: credential or negotiation policy failures
//!
//! Transport failures on `connect`/`send` are deliberately *not* errors:
//! they are reported as a boolean result, matching the connection contract.
//! All variants implement `std::error::Error` for interoperability.

use std::io;
use thiserror::Error;

/// Primary error type for all protocol operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Stream ended inside a frame, or the frame header is malformed.
    #[error("Invalid or truncated frame")]
    InvalidFrame,

    /// The 1-byte type tag was neither Request (0) nor Reply (1).
    #[error("Unrecognized packet type tag: {0}")]
    InvalidPacketType(u8),

    /// Operation invoked in the wrong lifecycle state, e.g. connecting a
    /// connection that is already bound.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A handler is already registered for this packet id.
    #[error("Handler for packet id {0} already registered")]
    DuplicateHandler(u16),

    /// A typed payload could not be decoded: short read or malformed field.
    #[error("Payload error: {0}")]
    Payload(String),

    /// A receive handler reported a failure; logged, never fatal to the
    /// connection.
    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Compression failed")]
    CompressionFailure,

    #[error("Decompression failed")]
    DecompressionFailure,

    /// Credential material could not be used, or the negotiation policy
    /// left no mutually supported protocol/cipher.
    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProtocolError {
    /// True for errors raised by the wire codec: a receive loop observing
    /// one of these closes its connection.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidFrame | ProtocolError::InvalidPacketType(_) | ProtocolError::Io(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
