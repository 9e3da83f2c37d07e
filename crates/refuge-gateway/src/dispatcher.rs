use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use refuge_types::events::GatewayEvent;

/// Routes gateway events to connected clients.
///
/// Announcements go out on a broadcast channel every connection listens to.
/// Everything else is targeted: each live connection registers its own
/// channel under its user id, so a user with two tabs open gets both.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// user_id -> (conn_id -> sender)
    user_channels: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to events meant for everyone.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Send an event to every connected client.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a targeted channel for one connection. Returns (conn_id, receiver).
    pub async fn register_user_channel(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Drop one connection's channel. Other connections of the user stay.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some(conns) = channels.get_mut(&user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    /// Send to every connection of a user. Returns how many received it.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> usize {
        let channels = self.inner.user_channels.read().await;
        let Some(conns) = channels.get(&user_id) else {
            return 0;
        };
        conns
            .values()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    pub async fn send_to_users(&self, user_ids: &[Uuid], event: GatewayEvent) {
        for user_id in user_ids {
            self.send_to_user(*user_id, event.clone()).await;
        }
    }

    /// Send to a single connection (acknowledgements).
    pub async fn send_to_connection(&self, user_id: Uuid, conn_id: Uuid, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some(tx) = channels.get(&user_id).and_then(|conns| conns.get(&conn_id)) {
            let _ = tx.send(event);
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.user_channels.read().await.contains_key(&user_id)
    }

    pub async fn online_count(&self) -> usize {
        self.inner.user_channels.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_event(reader: Uuid) -> GatewayEvent {
        GatewayEvent::MessagesRead {
            conversation_id: Uuid::nil(),
            reader_id: reader,
        }
    }

    #[tokio::test]
    async fn test_targeted_send_reaches_every_connection() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (_a, mut rx_a) = dispatcher.register_user_channel(user).await;
        let (_b, mut rx_b) = dispatcher.register_user_channel(user).await;

        assert_eq!(dispatcher.send_to_user(user, read_event(user)).await, 2);
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.recv().await.is_some());

        assert_eq!(dispatcher.send_to_user(Uuid::new_v4(), read_event(user)).await, 0);
    }

    #[tokio::test]
    async fn test_unregister_keeps_other_connections() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (a, _rx_a) = dispatcher.register_user_channel(user).await;
        let (b, mut rx_b) = dispatcher.register_user_channel(user).await;

        dispatcher.unregister_user_channel(user, a).await;
        assert!(dispatcher.is_online(user).await);

        dispatcher.send_to_connection(user, b, read_event(user)).await;
        assert!(rx_b.recv().await.is_some());

        dispatcher.unregister_user_channel(user, b).await;
        assert!(!dispatcher.is_online(user).await);
        assert_eq!(dispatcher.online_count().await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        dispatcher.broadcast(read_event(Uuid::nil()));
        assert!(matches!(rx.recv().await, Ok(GatewayEvent::MessagesRead { .. })));
    }
}
