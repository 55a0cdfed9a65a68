//! RelayRouter tests — message handling semantics driven directly through
//! the `ConnectionHandler` trait with channel-backed connections.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use relay_server::{ClientRegistry, RelayRouter};
    use relay_transport::{Connection, ConnectionHandler};
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    fn router() -> RelayRouter {
        RelayRouter::new(Arc::new(ClientRegistry::new()))
    }

    fn connection(id: &str) -> (Connection, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(id, tx), rx)
    }

    fn recv_json(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
        let text = rx.try_recv().expect("expected an outbound message");
        serde_json::from_str(&text).expect("outbound message should be JSON")
    }

    fn assert_silent(rx: &mut mpsc::UnboundedReceiver<String>) {
        assert!(rx.try_recv().is_err(), "expected no outbound message");
    }

    async fn register(router: &RelayRouter, conn: &Connection, id: &str) {
        let msg = json!({"type": "register", "client_id": id, "client_type": "device"});
        router
            .handle_message(conn, msg.to_string().as_bytes())
            .await;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn register_acks_and_binds_identity() {
        let router = router();
        let (x, mut x_rx) = connection("conn-x");

        register(&router, &x, "A").await;

        let resp = recv_json(&mut x_rx);
        assert_eq!(resp["type"], "registration_ack");
        assert!(router.registry().lookup("A").unwrap().same_session(&x));
    }

    #[tokio::test]
    async fn register_missing_client_type_nacks_without_mutation() {
        let router = router();
        let (x, mut x_rx) = connection("conn-x");

        let msg = json!({"type": "register", "client_id": "A"});
        router.handle_message(&x, msg.to_string().as_bytes()).await;

        let resp = recv_json(&mut x_rx);
        assert_eq!(resp["type"], "registration_nack");
        assert!(router.registry().lookup("A").is_none());
    }

    #[tokio::test]
    async fn register_empty_client_id_counts_as_missing() {
        let router = router();
        let (x, mut x_rx) = connection("conn-x");

        let msg = json!({"type": "register", "client_id": "", "client_type": "device"});
        router.handle_message(&x, msg.to_string().as_bytes()).await;

        let resp = recv_json(&mut x_rx);
        assert_eq!(resp["type"], "registration_nack");
        assert!(router.registry().is_empty());
    }

    #[tokio::test]
    async fn reregistration_overwrites_silently() {
        let router = router();
        let (x, mut x_rx) = connection("conn-x");
        let (y, mut y_rx) = connection("conn-y");

        register(&router, &x, "A").await;
        let _ = recv_json(&mut x_rx); // ack

        register(&router, &y, "A").await;
        let resp = recv_json(&mut y_rx);
        assert_eq!(resp["type"], "registration_ack");

        // The displaced connection is not notified.
        assert_silent(&mut x_rx);
        assert!(router.registry().lookup("A").unwrap().same_session(&y));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Relay
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn relay_delivers_payload_to_target_only() {
        let router = router();
        let (x, mut x_rx) = connection("conn-x");
        let (y, mut y_rx) = connection("conn-y");

        register(&router, &x, "A").await;
        register(&router, &y, "B").await;
        let _ = recv_json(&mut x_rx);
        let _ = recv_json(&mut y_rx);

        let msg = json!({"type": "message", "target_client_id": "B", "payload": {"v": 1}});
        router.handle_message(&x, msg.to_string().as_bytes()).await;

        let delivered = recv_json(&mut y_rx);
        assert_eq!(delivered["type"], "relayed_message");
        assert_eq!(delivered["from_client_id"], "A");
        assert_eq!(delivered["payload"], json!({"v": 1}));

        // No ack to the sender on success.
        assert_silent(&mut x_rx);
    }

    #[tokio::test]
    async fn relay_from_unregistered_sender_omits_from_client_id() {
        let router = router();
        let (x, mut x_rx) = connection("conn-x");
        let (y, mut y_rx) = connection("conn-y");

        register(&router, &y, "B").await;
        let _ = recv_json(&mut y_rx);

        let msg = json!({"type": "message", "target_client_id": "B", "payload": [1, 2]});
        router.handle_message(&x, msg.to_string().as_bytes()).await;

        let delivered = recv_json(&mut y_rx);
        assert_eq!(delivered["type"], "relayed_message");
        assert!(delivered.get("from_client_id").is_none());
        assert_eq!(delivered["payload"], json!([1, 2]));
        assert_silent(&mut x_rx);
    }

    #[tokio::test]
    async fn relay_uses_most_recently_registered_identity() {
        let router = router();
        let (x, mut x_rx) = connection("conn-x");
        let (y, mut y_rx) = connection("conn-y");

        register(&router, &x, "A").await;
        register(&router, &x, "A2").await;
        register(&router, &y, "B").await;
        let _ = recv_json(&mut x_rx);
        let _ = recv_json(&mut x_rx);
        let _ = recv_json(&mut y_rx);

        let msg = json!({"type": "message", "target_client_id": "B", "payload": {}});
        router.handle_message(&x, msg.to_string().as_bytes()).await;

        let delivered = recv_json(&mut y_rx);
        assert_eq!(delivered["from_client_id"], "A2");
    }

    #[tokio::test]
    async fn relay_to_absent_target_errors_to_sender_only() {
        let router = router();
        let (x, mut x_rx) = connection("conn-x");
        let (y, mut y_rx) = connection("conn-y");
        register(&router, &y, "B").await;
        let _ = recv_json(&mut y_rx);

        let msg = json!({"type": "message", "target_client_id": "Z", "payload": {}});
        router.handle_message(&x, msg.to_string().as_bytes()).await;

        let resp = recv_json(&mut x_rx);
        assert_eq!(resp["type"], "error");
        assert_eq!(resp["message"], "Target client Z not found.");
        assert_silent(&mut y_rx);
    }

    #[tokio::test]
    async fn relay_with_missing_fields_errors_without_delivery() {
        let router = router();
        let (x, mut x_rx) = connection("conn-x");
        let (y, mut y_rx) = connection("conn-y");
        register(&router, &y, "B").await;
        let _ = recv_json(&mut y_rx);

        let msg = json!({"type": "message", "target_client_id": "B"});
        router.handle_message(&x, msg.to_string().as_bytes()).await;

        let resp = recv_json(&mut x_rx);
        assert_eq!(resp["type"], "error");
        assert_eq!(resp["message"], "Message relay failed: missing info");
        assert_silent(&mut y_rx);
    }

    #[tokio::test]
    async fn relay_to_displaced_identity_reaches_new_holder() {
        let router = router();
        let (sender, _sender_rx) = connection("conn-s");
        let (old, mut old_rx) = connection("conn-old");
        let (new, mut new_rx) = connection("conn-new");

        register(&router, &old, "B").await;
        register(&router, &new, "B").await;
        let _ = recv_json(&mut old_rx);
        let _ = recv_json(&mut new_rx);

        let msg = json!({"type": "message", "target_client_id": "B", "payload": "hi"});
        router
            .handle_message(&sender, msg.to_string().as_bytes())
            .await;

        let delivered = recv_json(&mut new_rx);
        assert_eq!(delivered["type"], "relayed_message");
        assert_silent(&mut old_rx);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Malformed input and unknown types
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn undecodable_payload_errors_and_connection_stays_usable() {
        let router = router();
        let (x, mut x_rx) = connection("conn-x");

        router.handle_message(&x, b"not valid json {{{").await;
        let resp = recv_json(&mut x_rx);
        assert_eq!(resp["type"], "error");
        assert_eq!(resp["message"], "Invalid JSON message");

        // The loop continues: the next message is processed normally.
        register(&router, &x, "A").await;
        let resp = recv_json(&mut x_rx);
        assert_eq!(resp["type"], "registration_ack");
    }

    #[tokio::test]
    async fn non_utf8_binary_frame_is_a_decode_failure() {
        let router = router();
        let (x, mut x_rx) = connection("conn-x");

        router.handle_message(&x, &[0xff, 0xfe, 0x00]).await;
        let resp = recv_json(&mut x_rx);
        assert_eq!(resp["message"], "Invalid JSON message");
    }

    #[tokio::test]
    async fn unknown_message_type_errors() {
        let router = router();
        let (x, mut x_rx) = connection("conn-x");

        let msg = json!({"type": "subscribe", "topic": "news"});
        router.handle_message(&x, msg.to_string().as_bytes()).await;

        let resp = recv_json(&mut x_rx);
        assert_eq!(resp["type"], "error");
        assert_eq!(resp["message"], "Unknown message type");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Disconnect cleanup
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn disconnect_removes_registry_binding() {
        let router = router();
        let (x, mut x_rx) = connection("conn-x");
        register(&router, &x, "A").await;
        let _ = recv_json(&mut x_rx);

        router.handle_disconnect(&x).await;

        assert!(router.registry().lookup("A").is_none());
    }

    #[tokio::test]
    async fn disconnect_of_unregistered_connection_is_a_noop() {
        let router = router();
        let (x, _x_rx) = connection("conn-x");

        router.handle_disconnect(&x).await;
        assert!(router.registry().is_empty());
    }

    #[tokio::test]
    async fn late_relay_after_disconnect_errors() {
        let router = router();
        let (x, mut x_rx) = connection("conn-x");
        let (y, mut y_rx) = connection("conn-y");

        register(&router, &y, "B").await;
        let _ = recv_json(&mut y_rx);
        router.handle_disconnect(&y).await;

        let msg = json!({"type": "message", "target_client_id": "B", "payload": {}});
        router.handle_message(&x, msg.to_string().as_bytes()).await;

        let resp = recv_json(&mut x_rx);
        assert_eq!(resp["type"], "error");
        assert_eq!(resp["message"], "Target client B not found.");
    }

    #[tokio::test]
    async fn stale_disconnect_does_not_unbind_new_holder() {
        let router = router();
        let (old, mut old_rx) = connection("conn-old");
        let (new, mut new_rx) = connection("conn-new");

        register(&router, &old, "B").await;
        register(&router, &new, "B").await;
        let _ = recv_json(&mut old_rx);
        let _ = recv_json(&mut new_rx);

        // The displaced connection disconnects after the identity was reused.
        router.handle_disconnect(&old).await;

        assert!(router.registry().lookup("B").unwrap().same_session(&new));
    }
}
