use crate::core::connection::{Connection, ConnectionId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Live connections of a server, keyed by id
///
/// Mutated only when a connection opens or closes; readers take a
/// snapshot and iterate without holding the lock.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the id was already present
    pub fn insert(&self, connection: Connection) -> bool {
        self.connections
            .write()
            .insert(connection.id(), connection)
            .is_none()
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.write().remove(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    /// Connections open at this instant, oldest first
    pub fn snapshot(&self) -> Vec<Connection> {
        let mut connections: Vec<Connection> = self.connections.read().values().cloned().collect();
        connections.sort_by_key(|c| c.id());
        connections
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::ConnectionParts;
    use tokio::runtime::Handle;

    fn connection() -> Connection {
        Connection::new(ConnectionParts::new(Handle::current())).0
    }

    #[tokio::test]
    async fn test_insert_remove() {
        let registry = ConnectionRegistry::new();
        let a = connection();
        assert!(registry.insert(a.clone()));
        assert!(!registry.insert(a.clone()));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(a.id()));

        assert_eq!(registry.remove(a.id()), Some(a.clone()));
        assert!(registry.remove(a.id()).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_is_detached_from_later_changes() {
        let registry = ConnectionRegistry::new();
        let a = connection();
        let b = connection();
        registry.insert(b.clone());
        registry.insert(a.clone());

        let snapshot = registry.snapshot();
        registry.insert(connection());
        registry.remove(a.id());

        assert_eq!(snapshot, vec![a, b]);
        assert_eq!(registry.len(), 2);
    }
}
