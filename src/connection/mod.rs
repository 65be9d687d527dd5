//! Live connection tracking.
//!
//! Maps a principal to at most one live connection handle. Registering a new
//! connection for a principal evicts the previous handle (last-writer-wins);
//! the evicted side receives a `connection-replaced` notice, best effort, and
//! is then detached.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::Role;
use crate::websocket::ServerMessage;

/// Handle for a single live connection
pub struct ConnectionHandle {
    pub id: Uuid,
    pub principal: String,
    pub role: Role,
    pub sender: mpsc::Sender<ServerMessage>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(principal: String, role: Role, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal,
            role,
            sender,
            connected_at: Utc::now(),
        }
    }

    pub async fn send(
        &self,
        message: ServerMessage,
    ) -> Result<(), mpsc::error::SendError<ServerMessage>> {
        self.sender.send(message).await
    }
}

/// Manages all live connections, one per principal
pub struct ConnectionRegistry {
    /// principal id -> live handle
    connections: DashMap<String, Arc<ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection for a principal, evicting any prior handle.
    pub fn register(
        &self,
        principal: String,
        role: Role,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(principal.clone(), role, sender));

        if let Some(evicted) = self.connections.insert(principal, handle.clone()) {
            // Best effort notice; the old socket loop closes on its own
            let _ = evicted.sender.try_send(ServerMessage::ConnectionReplaced);
            tracing::info!(
                principal = %evicted.principal,
                old_connection = %evicted.id,
                new_connection = %handle.id,
                "Evicted previous connection for principal"
            );
        }

        tracing::info!(
            connection_id = %handle.id,
            principal = %handle.principal,
            role = %handle.role,
            "Connection registered"
        );

        handle
    }

    /// Remove the mapping only if `handle` is still the live connection for
    /// its principal. A replaced handle must not evict its replacement.
    pub fn unregister(&self, handle: &ConnectionHandle) -> bool {
        let removed = self
            .connections
            .remove_if(&handle.principal, |_, stored| stored.id == handle.id)
            .is_some();

        if removed {
            tracing::info!(
                connection_id = %handle.id,
                principal = %handle.principal,
                "Connection unregistered"
            );
        } else {
            tracing::debug!(
                connection_id = %handle.id,
                principal = %handle.principal,
                "Skipped unregister for superseded connection"
            );
        }

        removed
    }

    pub fn lookup(&self, principal: &str) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(principal).map(|h| h.clone())
    }

    /// Whether `handle` is still the live connection for its principal
    pub fn is_current(&self, handle: &ConnectionHandle) -> bool {
        self.connections
            .get(&handle.principal)
            .map(|stored| stored.id == handle.id)
            .unwrap_or(false)
    }

    /// Best-effort broadcast to every connection with the given role.
    /// Returns the number of connections the message was handed to.
    pub async fn broadcast_to_role(&self, role: Role, message: ServerMessage) -> usize {
        let targets: Vec<Arc<ConnectionHandle>> = self
            .connections
            .iter()
            .filter(|entry| entry.value().role == role)
            .map(|entry| entry.value().clone())
            .collect();

        let mut sent = 0;
        for handle in targets {
            if handle.send(message.clone()).await.is_ok() {
                sent += 1;
            }
        }
        sent
    }

    pub fn connected_count(&self) -> usize {
        self.connections.len()
    }

    pub fn stats(&self) -> ConnectionStats {
        let mut by_role = std::collections::HashMap::new();
        for entry in self.connections.iter() {
            *by_role.entry(entry.value().role.to_string()).or_insert(0usize) += 1;
        }
        ConnectionStats {
            total_connections: self.connections.len(),
            by_role,
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub by_role: std::collections::HashMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (
        mpsc::Sender<ServerMessage>,
        mpsc::Receiver<ServerMessage>,
    ) {
        mpsc::channel(8)
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();

        let handle = registry.register("u1".into(), Role::Patient, tx);
        assert_eq!(registry.connected_count(), 1);

        let found = registry.lookup("u1").unwrap();
        assert_eq!(found.id, handle.id);
        assert!(registry.lookup("u2").is_none());
    }

    #[tokio::test]
    async fn test_reregister_evicts_old_handle() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = channel();
        let (tx2, _rx2) = channel();

        let first = registry.register("u1".into(), Role::Patient, tx1);
        let second = registry.register("u1".into(), Role::Patient, tx2);

        // Exactly one live handle, and it is the second one
        assert_eq!(registry.connected_count(), 1);
        assert_eq!(registry.lookup("u1").unwrap().id, second.id);
        assert!(!registry.is_current(&first));
        assert!(registry.is_current(&second));

        // Evicted side got the replacement notice
        let msg = rx1.recv().await.unwrap();
        assert!(matches!(msg, ServerMessage::ConnectionReplaced));
    }

    #[tokio::test]
    async fn test_superseded_unregister_keeps_replacement() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        let first = registry.register("u1".into(), Role::Patient, tx1);
        let second = registry.register("u1".into(), Role::Patient, tx2);

        // The old socket closing must not remove the new connection
        assert!(!registry.unregister(&first));
        assert_eq!(registry.connected_count(), 1);

        assert!(registry.unregister(&second));
        assert_eq!(registry.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_to_role() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        let (tx3, mut rx3) = channel();

        registry.register("p1".into(), Role::Patient, tx1);
        registry.register("p2".into(), Role::Patient, tx2);
        registry.register("ph1".into(), Role::Pharmacist, tx3);

        let sent = registry
            .broadcast_to_role(Role::Patient, ServerMessage::ConnectionReplaced)
            .await;
        assert_eq!(sent, 2);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }
}
