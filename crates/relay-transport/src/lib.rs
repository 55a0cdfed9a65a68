//! Relay transport layer.
//!
//! WebSocket transport for the relay broker. The transport handles:
//! - Connection lifecycle (accept, message stream, close)
//! - Framing (text/binary WebSocket frames in, text frames out)
//! - Outbound hand-off (each connection owns a queue drained by its own
//!   write loop, so a stalled peer never blocks another connection's task)
//!
//! The transport is decoupled from the relay logic via the
//! [`ConnectionHandler`] trait.

pub mod connection;
pub mod server;

pub use connection::Connection;
pub use server::{ConnectionHandler, TransportConfig, TransportError, TransportServer};
