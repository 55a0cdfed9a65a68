//! ClientRegistry — the live mapping from client identity to connection.

use std::collections::HashMap;

use parking_lot::RwLock;
use relay_transport::Connection;
use tracing::{debug, info};

/// Maps client identities to the send capability of the connection that
/// most recently registered them.
///
/// This is the only state shared across connection tasks. Every operation
/// is total and holds the lock only for the single map access — sends to a
/// looked-up connection happen outside the registry entirely.
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, Connection>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Bind `client_id` to `conn`, overwriting any existing binding.
    ///
    /// Last writer wins: a connection re-registering an identity held by
    /// another live connection silently displaces it, with no notification
    /// to the displaced peer.
    pub fn register(&self, client_id: &str, conn: &Connection) {
        let displaced = self
            .clients
            .write()
            .insert(client_id.to_string(), conn.clone());
        match displaced {
            Some(old) if !old.same_session(conn) => {
                info!(
                    "Client registered: {client_id} (displaced connection {})",
                    old.id()
                );
            }
            _ => info!("Client registered: {client_id}"),
        }
    }

    /// The connection currently bound to `client_id`, if any.
    pub fn lookup(&self, client_id: &str) -> Option<Connection> {
        self.clients.read().get(client_id).cloned()
    }

    /// Remove the binding for `client_id` only if it still points at
    /// `conn`. A stale disconnect racing a newer registration under the
    /// same identity must not delete the newer binding.
    pub fn unregister(&self, client_id: &str, conn: &Connection) {
        let mut clients = self.clients.write();
        let is_current = clients
            .get(client_id)
            .is_some_and(|bound| bound.same_session(conn));
        if is_current {
            clients.remove(client_id);
            info!("Client unregistered: {client_id}");
        } else if clients.contains_key(client_id) {
            debug!("Skipping stale unregister for {client_id}");
        }
    }

    /// Number of currently bound identities.
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
