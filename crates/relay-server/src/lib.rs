//! Relay broker core.
//!
//! Two components: the [`ClientRegistry`] mapping identities to live
//! connections, and the [`RelayRouter`] interpreting inbound messages and
//! producing registration, relay, and error responses.

pub mod registry;
pub mod router;

pub use registry::ClientRegistry;
pub use router::RelayRouter;
