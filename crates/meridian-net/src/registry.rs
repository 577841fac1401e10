//! The set of live connections owned by a service.
//!
//! All reads and writes go through one lock. Callers only ever see
//! [`Arc`] handles or snapshots; the map itself never leaves the lock scope.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use crate::connection::{Connection, ConnectionId};
use crate::framing::Packet;

/// Error returned when the registry is at capacity.
#[derive(Debug, thiserror::Error)]
#[error("connection limit of {limit} reached")]
pub struct ConnectionLimitReached {
    /// The configured limit.
    pub limit: usize,
}

/// Thread-safe map of live connections keyed by [`ConnectionId`].
pub struct ConnectionRegistry {
    inner: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    max_connections: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create a new registry with the given capacity limit.
    pub fn new(max_connections: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_connections: AtomicUsize::new(max_connections),
        }
    }

    /// The current capacity limit.
    pub fn max_connections(&self) -> usize {
        self.max_connections.load(Ordering::Relaxed)
    }

    pub(crate) fn set_max_connections(&self, max_connections: usize) {
        self.max_connections.store(max_connections, Ordering::Relaxed);
    }

    /// Insert a connection. Returns `Err` if the registry is at capacity.
    pub(crate) async fn insert(
        &self,
        connection: Arc<Connection>,
    ) -> Result<(), ConnectionLimitReached> {
        let limit = self.max_connections();
        let mut map = self.inner.write().await;
        if map.len() >= limit {
            return Err(ConnectionLimitReached { limit });
        }
        map.insert(connection.id(), connection);
        Ok(())
    }

    /// Remove a connection by ID, finishing its lifecycle.
    pub(crate) async fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let removed = self.inner.write().await.remove(&id);
        if let Some(connection) = &removed {
            connection.mark_closed();
        }
        removed
    }

    /// Remove and return every connection.
    pub(crate) async fn drain(&self) -> Vec<Arc<Connection>> {
        let drained: Vec<_> = self.inner.write().await.drain().map(|(_, c)| c).collect();
        for connection in &drained {
            connection.mark_closed();
        }
        drained
    }

    /// Look up a connection by ID.
    pub async fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.inner.read().await.get(&id).cloned()
    }

    /// Return handles to every registered connection, ordered by ID.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        let mut connections: Vec<_> = self.inner.read().await.values().cloned().collect();
        connections.sort_by_key(|c| c.id());
        connections
    }

    /// Return the number of registered connections.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Return whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Send `packet` to every live connection.
    ///
    /// Holds the lock for the whole iteration, so registrations and removals
    /// wait until every send has finished. Individual failures do not stop
    /// the loop; returns `true` only if every attempted send succeeded.
    pub async fn broadcast(&self, packet: &Packet) -> bool {
        let map = self.inner.read().await;
        let mut ids: Vec<_> = map.keys().copied().collect();
        ids.sort_unstable();

        let mut all_sent = true;
        for id in ids {
            let Some(connection) = map.get(&id) else {
                continue;
            };
            if !connection.is_connected() {
                continue;
            }
            if let Err(e) = connection.send(packet).await {
                tracing::debug!("Broadcast to {} failed: {e}", connection.id());
                all_sent = false;
            }
        }
        all_sent
    }
}
