//! WebSocket Client Registry: an unordered set of live client handles.
//!
//! Adapted from the teacher's per-user `ConnectionManager`
//! (`websocket/connection_manager.rs`) to the spec's anonymous-registry
//! model: clients have no identity, just a locally generated connection id,
//! and fanout goes to every live member instead of a target subset.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<Uuid, mpsc::UnboundedSender<Message>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, id: Uuid, tx: mpsc::UnboundedSender<Message>) {
        self.connections.write().await.insert(id, tx);
    }

    pub async fn remove(&self, id: Uuid) {
        self.connections.write().await.remove(&id);
    }

    pub async fn is_connected(&self, id: Uuid) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send `message` as a text frame to every currently registered
    /// connection. A connection whose channel is already closed is removed
    /// immediately, before this call returns — not left for the ping loop to
    /// notice on its own schedule.
    pub async fn broadcast(&self, message: &str) {
        let dead: Vec<Uuid> = {
            let conns = self.connections.read().await;
            conns
                .iter()
                .filter_map(|(id, tx)| {
                    if tx.send(Message::Text(message.to_string())).is_err() {
                        Some(*id)
                    } else {
                        None
                    }
                })
                .collect()
        };

        if dead.is_empty() {
            return;
        }
        let mut conns = self.connections.write().await;
        for id in dead {
            conns.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_and_is_connected() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(!registry.is_connected(id).await);
        registry.add(id, tx).await;
        assert!(registry.is_connected(id).await);
    }

    #[tokio::test]
    async fn remove_clears_connection() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();

        registry.add(id, tx).await;
        registry.remove(id).await;
        assert!(!registry.is_connected(id).await);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_live_client_exactly_once() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.add(Uuid::new_v4(), tx1).await;
        registry.add(Uuid::new_v4(), tx2).await;

        registry.broadcast("hello").await;

        assert!(matches!(rx1.try_recv().unwrap(), Message::Text(s) if s == "hello"));
        assert!(matches!(rx2.try_recv().unwrap(), Message::Text(s) if s == "hello"));
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_removes_dead_connections_before_returning() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.add(id, tx).await;
        drop(rx); // simulate a closed connection

        registry.broadcast("hello").await;

        assert!(!registry.is_connected(id).await);
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let registry = ConnectionRegistry::new();
        let clone = registry.clone();
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();

        registry.add(id, tx).await;
        assert!(clone.is_connected(id).await);
    }
}
