use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use circle_types::events::{GatewayEvent, Notification};

/// Routes events to connected clients, keyed by authenticated email.
///
/// Delivery is best-effort: an event for someone who is not connected is
/// dropped. There is no queue and nothing is replayed on reconnect.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// email -> (conn_id, sender). A newer connection replaces an older one.
    connections: RwLock<HashMap<String, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `email`. Returns its conn_id.
    pub async fn register(&self, email: &str, tx: mpsc::UnboundedSender<GatewayEvent>) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.inner
            .connections
            .write()
            .await
            .insert(normalize(email), (conn_id, tx));
        conn_id
    }

    /// Unregister, but only if `conn_id` still owns the slot.
    pub async fn unregister(&self, email: &str, conn_id: Uuid) {
        let key = normalize(email);
        let mut connections = self.inner.connections.write().await;
        if let Some((stored, _)) = connections.get(&key) {
            if *stored == conn_id {
                connections.remove(&key);
            }
        }
    }

    /// Send a targeted event. Returns false when the target is not connected.
    pub async fn send_to_email(&self, email: &str, event: GatewayEvent) -> bool {
        let connections = self.inner.connections.read().await;
        match connections.get(&normalize(email)) {
            Some((_, tx)) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Push a notification to a single user.
    pub async fn notify(&self, email: &str, notification: Notification) -> bool {
        let title = notification.title.clone();
        let delivered = self
            .send_to_email(email, GatewayEvent::NotificationNew { notification })
            .await;
        if delivered {
            info!("Notification '{}' sent to {}", title, email);
        } else {
            debug!("{} not connected, dropping notification '{}'", email, title);
        }
        delivered
    }

    #[cfg(test)]
    async fn is_connected(&self, email: &str) -> bool {
        self.inner
            .connections
            .read()
            .await
            .contains_key(&normalize(email))
    }

    /// Distinct users with at least one live connection.
    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_only_to_connected_target() {
        let dispatcher = Dispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.register("Ana@Circle.test", tx).await;

        assert!(dispatcher.notify("ana@circle.test", Notification::new("Hi", "there", "info")).await);
        assert!(!dispatcher.notify("ben@circle.test", Notification::new("Hi", "there", "info")).await);

        match rx.recv().await {
            Some(GatewayEvent::NotificationNew { notification }) => assert_eq!(notification.title, "Hi"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn stale_connection_cannot_unregister_newer_one() {
        let dispatcher = Dispatcher::new();
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let (new_tx, _new_rx) = mpsc::unbounded_channel();

        let old = dispatcher.register("ana@circle.test", old_tx).await;
        let new = dispatcher.register("ana@circle.test", new_tx).await;

        dispatcher.unregister("ana@circle.test", old).await;
        assert!(dispatcher.is_connected("ana@circle.test").await);

        dispatcher.unregister("ana@circle.test", new).await;
        assert!(!dispatcher.is_connected("ana@circle.test").await);
        assert_eq!(dispatcher.connection_count().await, 0);
    }

    #[tokio::test]
    async fn closed_receiver_counts_as_undelivered() {
        let dispatcher = Dispatcher::new();
        let (tx, rx) = mpsc::unbounded_channel();
        dispatcher.register("ana@circle.test", tx).await;
        drop(rx);

        assert!(!dispatcher.send_to_email("ana@circle.test", GatewayEvent::Pong).await);
    }
}
