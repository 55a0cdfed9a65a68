//! RelayRouter — interprets inbound messages and produces relay actions.

use std::sync::Arc;

use dashmap::DashMap;
use relay_protocol::{ClientMessage, ServerMessage};
use relay_transport::{Connection, ConnectionHandler};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Stateless routing logic plus the per-connection identity table.
///
/// Each inbound message yields exactly one of: a registration ack/nack to
/// the sender, a relayed payload to the target, or an error to the sender.
/// All sends are best-effort enqueues; a vanished peer is ignored.
pub struct RelayRouter {
    registry: Arc<crate::ClientRegistry>,
    /// connection id → identity the connection last registered.
    identities: DashMap<String, String>,
}

impl RelayRouter {
    pub fn new(registry: Arc<crate::ClientRegistry>) -> Self {
        Self {
            registry,
            identities: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<crate::ClientRegistry> {
        &self.registry
    }

    fn send(conn: &Connection, msg: &ServerMessage) {
        if let Ok(json) = serde_json::to_string(msg) {
            if !conn.send(json) {
                debug!("Dropped response to finished connection {}", conn.id());
            }
        }
    }

    fn handle_register(
        &self,
        conn: &Connection,
        client_id: Option<String>,
        client_type: Option<String>,
    ) {
        // Empty strings count as missing, matching the wire contract.
        let client_id = client_id.filter(|s| !s.is_empty());
        let client_type = client_type.filter(|s| !s.is_empty());

        match (client_id, client_type) {
            (Some(client_id), Some(client_type)) => {
                self.registry.register(&client_id, conn);
                self.identities.insert(conn.id().to_string(), client_id.clone());
                debug!("Registration: id={client_id}, type={client_type}");
                Self::send(conn, &ServerMessage::registration_ack());
            }
            _ => {
                warn!("Registration failed: client_id or client_type missing");
                Self::send(conn, &ServerMessage::registration_nack());
            }
        }
    }

    fn handle_relay(
        &self,
        conn: &Connection,
        target_client_id: Option<String>,
        payload: Option<Value>,
    ) {
        let (target_client_id, payload) = match (target_client_id, payload) {
            (Some(t), Some(p)) if !t.is_empty() => (t, p),
            _ => {
                warn!("Message relay failed: target_client_id or payload missing");
                Self::send(conn, &ServerMessage::relay_missing_info());
                return;
            }
        };

        match self.registry.lookup(&target_client_id) {
            Some(target) => {
                let from = self.identities.get(conn.id()).map(|id| id.value().clone());
                debug!(
                    "Relaying message from {} to {target_client_id}",
                    from.as_deref().unwrap_or("<unregistered>")
                );
                Self::send(&target, &ServerMessage::relayed(from, payload));
                // No ack to the sender on success.
            }
            None => {
                info!("Target client {target_client_id} not found");
                Self::send(conn, &ServerMessage::target_not_found(&target_client_id));
            }
        }
    }
}

impl ConnectionHandler for RelayRouter {
    async fn handle_message(&self, conn: &Connection, raw: &[u8]) {
        let msg = match serde_json::from_slice::<ClientMessage>(raw) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Undecodable message from {}: {e}", conn.id());
                Self::send(conn, &ServerMessage::invalid_message());
                return;
            }
        };

        match msg {
            ClientMessage::Register {
                client_id,
                client_type,
            } => self.handle_register(conn, client_id, client_type),
            ClientMessage::Message {
                target_client_id,
                payload,
            } => self.handle_relay(conn, target_client_id, payload),
            ClientMessage::Unknown => {
                warn!("Unknown message type from {}", conn.id());
                Self::send(conn, &ServerMessage::unknown_type());
            }
        }
    }

    async fn handle_disconnect(&self, conn: &Connection) {
        if let Some((_, client_id)) = self.identities.remove(conn.id()) {
            self.registry.unregister(&client_id, conn);
            info!("Client disconnected: {client_id}");
        }
    }
}
