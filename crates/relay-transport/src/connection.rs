//! Per-connection send capability.

use tokio::sync::mpsc;

/// A handle to one live WebSocket session: its unique id and a sender
/// feeding the session's outbound queue.
///
/// Clones are cheap and non-owning — the registry may hold one long after
/// the underlying socket is gone, in which case [`Connection::send`] becomes
/// a no-op. The socket itself stays owned by the transport's connection
/// task.
#[derive(Debug, Clone)]
pub struct Connection {
    id: String,
    outbound: mpsc::UnboundedSender<String>,
}

impl Connection {
    pub fn new(id: impl Into<String>, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: id.into(),
            outbound,
        }
    }

    /// Unique id assigned by the transport when the session was accepted.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Enqueue one outbound text frame. Returns `false` if the session has
    /// already terminated; delivery is best-effort either way.
    pub fn send(&self, text: String) -> bool {
        self.outbound.send(text).is_ok()
    }

    /// Whether two handles refer to the same underlying session.
    pub fn same_session(&self, other: &Connection) -> bool {
        self.id == other.id
    }
}
