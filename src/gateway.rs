//! Broadcast gateway: fans live events out to long-lived SSE subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

/// One serialized push message: the SSE event name plus its JSON data.
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub event: String,
    pub data: String,
}

/// Registry of connected push clients. Delivery is fire-and-forget per
/// client: a slow or dead subscriber never blocks the others — its channel
/// send fails and it is deregistered on the spot.
pub struct BroadcastGateway {
    clients: DashMap<u64, mpsc::UnboundedSender<PushMessage>>,
    next_id: AtomicU64,
}

impl BroadcastGateway {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber; returns its id and the receiving end the HTTP
    /// layer turns into an SSE stream.
    pub fn add_client(&self) -> (u64, mpsc::UnboundedReceiver<PushMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.clients.insert(id, tx);
        tracing::debug!(client = id, "push client connected");
        (id, rx)
    }

    /// Idempotent.
    pub fn remove_client(&self, id: u64) {
        if self.clients.remove(&id).is_some() {
            tracing::debug!(client = id, "push client disconnected");
        }
    }

    /// Serialize once, write to every registered client.
    pub fn broadcast<T: Serialize>(&self, event_name: &str, payload: &T) {
        let data = match serde_json::to_string(payload) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("failed to serialize broadcast payload: {e}");
                return;
            }
        };

        let mut dead = Vec::new();
        for entry in self.clients.iter() {
            let message = PushMessage {
                event: event_name.to_string(),
                data: data.clone(),
            };
            if entry.value().send(message).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.remove_client(id);
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

impl Default for BroadcastGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Deregisters the client when the SSE response stream is dropped,
/// i.e. when the underlying connection closes.
pub struct ClientGuard {
    gateway: Arc<BroadcastGateway>,
    id: u64,
}

impl ClientGuard {
    pub fn new(gateway: Arc<BroadcastGateway>, id: u64) -> Self {
        Self { gateway, id }
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.gateway.remove_client(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn broadcast_reaches_every_client() {
        let gateway = BroadcastGateway::new();
        let (_, mut rx1) = gateway.add_client();
        let (_, mut rx2) = gateway.add_client();
        assert_eq!(gateway.client_count(), 2);

        gateway.broadcast("activity", &json!({ "action": "login" }));

        let m1 = rx1.recv().await.unwrap();
        let m2 = rx2.recv().await.unwrap();
        assert_eq!(m1.event, "activity");
        assert_eq!(m1.data, m2.data);
        assert!(m1.data.contains("login"));
    }

    #[tokio::test]
    async fn dead_clients_are_dropped_without_blocking_the_rest() {
        let gateway = BroadcastGateway::new();
        let (_, rx1) = gateway.add_client();
        let (_, mut rx2) = gateway.add_client();

        drop(rx1);
        gateway.broadcast("activity", &json!({ "n": 1 }));

        assert_eq!(gateway.client_count(), 1);
        assert_eq!(rx2.recv().await.unwrap().data, "{\"n\":1}");
    }

    #[tokio::test]
    async fn remove_client_is_idempotent() {
        let gateway = BroadcastGateway::new();
        let (id, _rx) = gateway.add_client();
        gateway.remove_client(id);
        gateway.remove_client(id);
        assert_eq!(gateway.client_count(), 0);
    }
}
