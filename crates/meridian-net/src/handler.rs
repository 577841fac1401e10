//! Event callbacks a service injects into its [`ServiceManager`](crate::ServiceManager).

use std::future::Future;
use std::sync::Arc;

use crate::connection::Connection;
use crate::framing::Packet;
use crate::registry::ConnectionRegistry;

/// Connection lifecycle and packet callbacks.
///
/// Every callback runs on the handler task of the connection it concerns, so
/// a slow callback only stalls its own connection. For one connection,
/// `on_connected` runs first, `on_packet` runs once per packet in stream
/// order, and `on_disconnected` runs exactly once at the end.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// A connection was accepted and registered.
    fn on_connected(&self, _connection: &Arc<Connection>) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// A connection was closed and removed from the registry.
    fn on_disconnected(&self, _connection: &Arc<Connection>) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// A whole packet arrived.
    ///
    /// `peers` is the service's registry, for replies that fan out to every
    /// connection.
    fn on_packet(
        &self,
        peers: &ConnectionRegistry,
        connection: &Arc<Connection>,
        packet: Packet,
    ) -> impl Future<Output = ()> + Send;
}
