//! Service manager: listener, accept loop, per-connection handler tasks, and
//! deterministic shutdown.
//!
//! One accept task and one handler task per accepted connection. A handler
//! task owns the receive side of its connection, dispatches each packet to
//! the injected [`ConnectionHandler`], and on the first receive failure
//! closes the connection, removes it from the registry, and fires
//! `on_disconnected`. [`ServiceManager::stop`] waits for all of them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::connection::{Connection, Role};
use crate::framing::{FrameError, Packet};
use crate::handler::ConnectionHandler;
use crate::platform::{SocketConfig, any_address, configure_stream, create_listener};
use crate::registry::ConnectionRegistry;

/// Connection limit used until [`ServiceManager::initialize`] sets one.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1000;

/// Pause after a failed accept so a persistent error cannot spin the loop.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Errors surfaced by the service lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listening socket could not be created, bound, or put in listen mode.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The requested address.
        addr: SocketAddr,
        /// The underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The accept loop is already running.
    #[error("server is already running")]
    AlreadyRunning,

    /// `start` was called without a bound listener.
    #[error("server has not been initialized")]
    NotInitialized,

    /// An outbound connection could not be established.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        /// The `host:port` that was dialed.
        address: String,
        /// The underlying socket error.
        #[source]
        source: std::io::Error,
    },
}

/// Owns one listening socket, the connection registry, and the handler.
///
/// Dropping a running manager stops its accept loop; only [`stop`](Self::stop)
/// also closes every connection and waits for the handler tasks.
pub struct ServiceManager<H: ConnectionHandler> {
    handler: Arc<H>,
    registry: Arc<ConnectionRegistry>,
    socket_config: SocketConfig,
    listener: Mutex<Option<TcpListener>>,
    local_addr: Mutex<Option<SocketAddr>>,
    lifecycle: Mutex<()>,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    connection_tasks: Arc<Mutex<JoinSet<()>>>,
}

impl<H: ConnectionHandler> ServiceManager<H> {
    /// Create a manager with default socket options.
    pub fn new(handler: H) -> Self {
        Self::with_socket_config(handler, SocketConfig::default())
    }

    /// Create a manager with the given socket options.
    pub fn with_socket_config(handler: H, socket_config: SocketConfig) -> Self {
        let (shutdown_tx, _rx) = watch::channel(false);
        Self {
            handler: Arc::new(handler),
            registry: Arc::new(ConnectionRegistry::new(DEFAULT_MAX_CONNECTIONS)),
            socket_config,
            listener: Mutex::new(None),
            local_addr: Mutex::new(None),
            lifecycle: Mutex::new(()),
            running: AtomicBool::new(false),
            shutdown_tx,
            accept_task: Mutex::new(None),
            connection_tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// The injected event handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The live connection registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Bind the wildcard address on `port` and listen with a backlog of
    /// `max_connections`.
    pub async fn initialize(
        &self,
        port: u16,
        max_connections: usize,
    ) -> Result<SocketAddr, ServerError> {
        self.bind(any_address(port), max_connections).await
    }

    /// Bind `addr` and listen. Returns the actual bound address.
    ///
    /// Replaces any listener that was bound but not yet started. Bind
    /// failures are not retried.
    pub async fn bind(
        &self,
        addr: SocketAddr,
        max_connections: usize,
    ) -> Result<SocketAddr, ServerError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_running() {
            return Err(ServerError::AlreadyRunning);
        }

        let listener = create_listener(addr, max_connections, &self.socket_config)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        self.registry.set_max_connections(max_connections);
        *self.listener.lock().await = Some(listener);
        *self.local_addr.lock().await = Some(local);

        tracing::info!("Server initialized on {local} (max connections: {max_connections})");
        Ok(local)
    }

    /// Spawn the accept loop and return immediately.
    pub async fn start(&self) -> Result<(), ServerError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_running() {
            return Err(ServerError::AlreadyRunning);
        }
        let Some(listener) = self.listener.lock().await.take() else {
            return Err(ServerError::NotInitialized);
        };

        self.shutdown_tx.send_replace(false);
        self.running.store(true, Ordering::Release);

        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.handler),
            Arc::clone(&self.registry),
            Arc::clone(&self.connection_tasks),
            self.socket_config.clone(),
            self.shutdown_tx.subscribe(),
        ));
        *self.accept_task.lock().await = Some(task);

        if let Some(addr) = self.local_addr().await {
            tracing::info!("Server started on {addr}");
        }
        Ok(())
    }

    /// Stop accepting, close every connection, and wait for every task.
    ///
    /// When this returns the registry is empty and no handler task is
    /// running. Calling it again, or before `start`, is a no-op apart from
    /// releasing a bound but unstarted listener.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.running.swap(false, Ordering::AcqRel) {
            self.listener.lock().await.take();
            return;
        }

        tracing::info!("Stopping server");
        self.shutdown_tx.send_replace(true);

        let accept_task = self.accept_task.lock().await.take();
        if let Some(task) = accept_task
            && let Err(e) = task.await
        {
            tracing::warn!("Accept task failed: {e}");
        }

        for connection in self.registry.snapshot().await {
            connection.close().await;
        }

        let mut tasks = std::mem::take(&mut *self.connection_tasks.lock().await);
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::warn!("Connection task failed: {e}");
            }
        }

        // Only connections whose handler task panicked are still registered.
        for connection in self.registry.drain().await {
            tracing::warn!("Releasing orphaned connection {}", connection.id());
            connection.close().await;
        }

        *self.local_addr.lock().await = None;
        tracing::info!("Server stopped");
    }

    /// Whether the accept loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The bound listening address, if initialized.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Open an outbound connection.
    ///
    /// No handler task is spawned; the caller owns the receive loop.
    pub async fn connect_to_server(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Arc<Connection>, ServerError> {
        Connection::connect(host, port, &self.socket_config)
            .await
            .map(Arc::new)
            .map_err(|source| ServerError::Connect {
                address: format!("{host}:{port}"),
                source,
            })
    }

    /// Send to one connection. Returns `false` if it is not live or the
    /// write fails.
    pub async fn send_to_client(&self, connection: &Connection, packet: &Packet) -> bool {
        connection.is_connected() && connection.send(packet).await.is_ok()
    }

    /// Send to every registered connection; `true` only if all sends succeed.
    pub async fn send_to_all(&self, packet: &Packet) -> bool {
        self.registry.broadcast(packet).await
    }

    /// Request that a connection be closed.
    ///
    /// Its handler task notices, removes it, and fires `on_disconnected`.
    pub async fn disconnect_client(&self, connection: &Connection) {
        connection.close().await;
    }

    /// Snapshot of the registered connections.
    pub async fn connections(&self) -> Vec<Arc<Connection>> {
        self.registry.snapshot().await
    }

    /// Number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }
}

async fn accept_loop<H: ConnectionHandler>(
    listener: TcpListener,
    handler: Arc<H>,
    registry: Arc<ConnectionRegistry>,
    connection_tasks: Arc<Mutex<JoinSet<()>>>,
    socket_config: SocketConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!("Accept failed: {e}");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                        continue;
                    }
                };
                if let Err(e) = configure_stream(&stream, &socket_config) {
                    tracing::warn!("Failed to configure socket for {peer_addr}: {e}");
                }

                let connection = Arc::new(Connection::from_tcp(
                    stream,
                    peer_addr.to_string(),
                    Role::Server,
                ));
                if let Err(e) = registry.insert(Arc::clone(&connection)).await {
                    tracing::warn!("{e}, rejecting {peer_addr}");
                    connection.close().await;
                    connection.mark_closed();
                    continue;
                }
                connection.mark_open();
                tracing::info!("Accepted connection {} from {peer_addr}", connection.id());

                let mut tasks = connection_tasks.lock().await;
                while let Some(finished) = tasks.try_join_next() {
                    if let Err(e) = finished {
                        tracing::warn!("Connection task failed: {e}");
                    }
                }
                tasks.spawn(handle_connection(
                    connection,
                    Arc::clone(&registry),
                    Arc::clone(&handler),
                ));
            }
            // The watch guard must not live across the accept arm's awaits.
            _ = async { drop(shutdown_rx.wait_for(|stop| *stop).await) } => {
                tracing::info!("Accept loop shutting down");
                break;
            }
        }
    }
    // Dropping the listener closes the listening socket.
}

/// Per-connection handler loop.
async fn handle_connection<H: ConnectionHandler>(
    connection: Arc<Connection>,
    registry: Arc<ConnectionRegistry>,
    handler: Arc<H>,
) {
    handler.on_connected(&connection).await;

    loop {
        match connection.receive().await {
            Ok(packet) => {
                tracing::trace!(
                    "Connection {} received type {} ({} bytes)",
                    connection.id(),
                    packet.packet_type(),
                    packet.size()
                );
                handler.on_packet(&registry, &connection, packet).await;
            }
            Err(FrameError::ConnectionClosed) => break,
            Err(e) => {
                tracing::debug!("Connection {} frame error: {e}", connection.id());
                break;
            }
        }
    }

    connection.close().await;
    registry.remove(connection.id()).await;
    handler.on_disconnected(&connection).await;
    tracing::info!(
        "Connection {} from {} closed",
        connection.id(),
        connection.address()
    );
}
