//! Inbound and outbound message types for the relay wire protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded inbound message from a client.
///
/// Fields are optional at the schema level — presence validation happens in
/// the router so a missing field produces a structured nack/error response
/// rather than a decode failure. Any `type` tag other than the known ones
/// decodes to [`ClientMessage::Unknown`]; payloads that are not JSON objects
/// with a string `type` fail to decode entirely.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to an identity.
    Register {
        client_id: Option<String>,
        client_type: Option<String>,
    },
    /// Relay a payload to the connection bound to `target_client_id`.
    Message {
        target_client_id: Option<String>,
        payload: Option<Value>,
    },
    /// Any well-formed message with an unrecognized `type`.
    #[serde(other)]
    Unknown,
}

/// An outbound message from the broker to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RegistrationAck {
        message: String,
    },
    RegistrationNack {
        message: String,
    },
    /// A payload forwarded from another client. `from_client_id` is omitted
    /// when the sending connection never registered an identity.
    RelayedMessage {
        #[serde(skip_serializing_if = "Option::is_none")]
        from_client_id: Option<String>,
        payload: Value,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn registration_ack() -> Self {
        Self::RegistrationAck {
            message: "Registration successful".into(),
        }
    }

    pub fn registration_nack() -> Self {
        Self::RegistrationNack {
            message: "Registration failed: missing info".into(),
        }
    }

    pub fn relayed(from_client_id: Option<String>, payload: Value) -> Self {
        Self::RelayedMessage {
            from_client_id,
            payload,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn invalid_message() -> Self {
        Self::error("Invalid JSON message")
    }

    pub fn relay_missing_info() -> Self {
        Self::error("Message relay failed: missing info")
    }

    pub fn target_not_found(target_client_id: &str) -> Self {
        Self::error(format!("Target client {target_client_id} not found."))
    }

    pub fn unknown_type() -> Self {
        Self::error("Unknown message type")
    }
}
