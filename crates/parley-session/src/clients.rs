//! The client registry: every connected client, keyed by client id.
//!
//! A client id maps to at most one handle. When a client reconnects
//! before its old connection has reported the close, the new handle
//! displaces the old one, and the old connection's late close is told
//! apart by its [`ConnectionId`](parley_transport::ConnectionId).

use std::collections::HashMap;

use parley_protocol::ClientId;
use parley_transport::ConnectionId;

use crate::{ClientHandle, ConnectionKey};

/// All connected clients.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, ClientHandle>,
}

impl ClientRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks the id for a new connection: the one the client asked for,
    /// or a fresh UUID-v4.
    pub fn assign_id(requested: Option<&str>) -> ClientId {
        match requested.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => ClientId::from(id),
            None => ClientId::from(uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Registers a handle, returning the one it displaced (same client id,
    /// older connection), if any.
    pub fn register(&mut self, handle: ClientHandle) -> Option<ClientHandle> {
        tracing::debug!(
            client_id = %handle.id(),
            conn_id = %handle.conn_id(),
            "client registered"
        );
        self.clients.insert(handle.id().clone(), handle)
    }

    /// Removes the handle for `id`, but only if it belongs to `conn_id`.
    ///
    /// A close notification from a connection that has already been
    /// replaced finds nothing to remove.
    pub fn remove(&mut self, id: &ClientId, conn_id: ConnectionId) -> Option<ClientHandle> {
        if self.clients.get(id)?.conn_id() != conn_id {
            return None;
        }
        self.clients.remove(id)
    }

    pub fn get(&self, id: &ClientId) -> Option<&ClientHandle> {
        self.clients.get(id)
    }

    pub fn get_mut(&mut self, id: &ClientId) -> Option<&mut ClientHandle> {
        self.clients.get_mut(id)
    }

    /// Resolves a session slot key to the handle it refers to, if that
    /// exact connection is still registered.
    pub fn resolve(&self, key: &ConnectionKey) -> Option<&ClientHandle> {
        self.clients
            .get(&key.client_id)
            .filter(|h| h.conn_id() == key.conn_id)
    }

    pub fn resolve_mut(&mut self, key: &ConnectionKey) -> Option<&mut ClientHandle> {
        self.clients
            .get_mut(&key.client_id)
            .filter(|h| h.conn_id() == key.conn_id)
    }

    /// `true` while that exact connection is registered.
    ///
    /// A connection that stops answering probes stays present until the
    /// sweep terminates and unregisters it.
    pub fn is_present(&self, key: &ConnectionKey) -> bool {
        self.resolve(key).is_some()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClientHandle> {
        self.clients.values_mut()
    }

    /// Returns the number of connected clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns `true` if nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn handle(client: &str, conn: u64) -> ClientHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        ClientHandle::new(ClientId::from(client), ConnectionId::new(conn), None, tx)
    }

    #[test]
    fn test_assign_id_reuses_requested_id() {
        assert_eq!(
            ClientRegistry::assign_id(Some("returning")),
            ClientId::from("returning")
        );
    }

    #[test]
    fn test_assign_id_generates_uuid_when_missing_or_blank() {
        let a = ClientRegistry::assign_id(None);
        let b = ClientRegistry::assign_id(Some("   "));

        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
        assert!(uuid::Uuid::parse_str(b.as_str()).is_ok());
        assert_ne!(a, b);
    }

    #[test]
    fn test_register_returns_displaced_handle() {
        let mut registry = ClientRegistry::new();
        assert!(registry.register(handle("alice", 1)).is_none());

        let displaced = registry.register(handle("alice", 2)).expect("old handle");

        assert_eq!(displaced.conn_id(), ConnectionId::new(1));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&ClientId::from("alice")).unwrap().conn_id(),
            ConnectionId::new(2)
        );
    }

    #[test]
    fn test_remove_ignores_stale_connection() {
        let mut registry = ClientRegistry::new();
        registry.register(handle("alice", 1));
        registry.register(handle("alice", 2));

        assert!(registry.remove(&ClientId::from("alice"), ConnectionId::new(1)).is_none());
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(&ClientId::from("alice"), ConnectionId::new(2)).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_resolve_requires_matching_connection() {
        let mut registry = ClientRegistry::new();
        registry.register(handle("alice", 2));

        let current = ConnectionKey {
            client_id: ClientId::from("alice"),
            conn_id: ConnectionId::new(2),
        };
        let stale = ConnectionKey {
            conn_id: ConnectionId::new(1),
            ..current.clone()
        };

        assert!(registry.is_present(&current));
        assert!(!registry.is_present(&stale));
    }

    #[test]
    fn test_resolve_mut_reaches_registered_handle() {
        let mut registry = ClientRegistry::new();
        let h = handle("alice", 1);
        let key = h.key();
        registry.register(h);

        registry.resolve_mut(&key).unwrap().mark_dead();

        assert!(!registry.get(&ClientId::from("alice")).unwrap().is_alive());
        // Still present: only the sweep unregisters unresponsive clients.
        assert!(registry.is_present(&key));
    }
}
