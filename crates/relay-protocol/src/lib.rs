//! Relay protocol types.
//!
//! JSON message schema for the relay broker. This crate is the single
//! source of truth for inbound and outbound message shapes and the
//! canonical response texts.

pub mod message;

pub use message::{ClientMessage, ServerMessage};
