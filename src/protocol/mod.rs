//! # Protocol Dispatch
//!
//! Maps incoming packets to application handlers by packet id.

pub mod router;
