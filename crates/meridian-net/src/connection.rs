//! A single live byte stream carrying framed packets.
//!
//! A [`Connection`] serializes writers behind a send lock and readers behind
//! a receive lock, so whole frames never interleave. Liveness is a one-way
//! flag; dropping it wakes any pending send or receive. [`Connection::close`]
//! releases the underlying stream exactly once no matter how many callers
//! race on it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};

use crate::framing::{FrameError, Packet, read_packet, write_packet};
use crate::platform::{SocketConfig, configure_stream};

/// Unique identifier for a connection within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Atomic generator for monotonically increasing [`ConnectionId`]s.
pub struct IdGenerator {
    next: AtomicU32,
}

impl IdGenerator {
    /// Create a new generator starting at 1.
    pub const fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Return the next unique [`ConnectionId`].
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

static CONNECTION_IDS: IdGenerator = IdGenerator::new();

/// Connection lifecycle state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Stream exists but the connection is not yet registered or handed out.
    Connecting,
    /// Ready for traffic.
    Open,
    /// Close requested; the stream is being released.
    Closing,
    /// Stream released and no longer tracked by any registry.
    Closed,
}

/// Observable connection state backed by a [`watch`] channel.
///
/// Multiple subscribers can observe state transitions without polling.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Create a new watch initialized to [`ConnectionState::Connecting`].
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Connecting);
        Self { tx }
    }

    /// Move to `next` if it is later than the current state.
    ///
    /// Returns `true` if the state changed.
    pub fn advance(&self, next: ConnectionState) -> bool {
        self.tx.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Return a new subscriber receiver.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Return the current state without blocking.
    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }
}

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepted by a listening service; tracked by its registry.
    Server,
    /// Opened by an outbound connect; owned by the caller.
    Client,
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One live connection.
pub struct Connection {
    id: ConnectionId,
    address: String,
    role: Role,
    live: watch::Sender<bool>,
    close_started: AtomicBool,
    state: ConnectionStateWatch,
    reader: Mutex<Option<BoxedReader>>,
    writer: Mutex<Option<BoxedWriter>>,
}

impl Connection {
    /// Wrap an established TCP stream.
    pub fn from_tcp(stream: TcpStream, address: impl Into<String>, role: Role) -> Self {
        let (reader, writer) = stream.into_split();
        Self::from_halves(Box::new(reader), Box::new(writer), address.into(), role)
    }

    /// Wrap any bidirectional byte stream.
    pub fn from_stream<S>(stream: S, address: impl Into<String>, role: Role) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_halves(Box::new(reader), Box::new(writer), address.into(), role)
    }

    fn from_halves(reader: BoxedReader, writer: BoxedWriter, address: String, role: Role) -> Self {
        let (live, _rx) = watch::channel(true);
        Self {
            id: CONNECTION_IDS.next_id(),
            address,
            role,
            live,
            close_started: AtomicBool::new(false),
            state: ConnectionStateWatch::new(),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
        }
    }

    /// Open an outbound connection to `host:port`.
    ///
    /// The returned connection is [`ConnectionState::Open`]; the caller owns
    /// its receive loop.
    pub async fn connect(host: &str, port: u16, config: &SocketConfig) -> std::io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        configure_stream(&stream, config)?;
        let connection = Self::from_tcp(stream, format!("{host}:{port}"), Role::Client);
        connection.mark_open();
        tracing::info!("Connected to {} ({})", connection.address, connection.id);
        Ok(connection)
    }

    /// The process-unique identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The peer address this connection was created with.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Which side opened the connection.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the liveness flag is still set.
    pub fn is_connected(&self) -> bool {
        *self.live.borrow()
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state.current()
    }

    /// Subscribe to lifecycle state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn mark_open(&self) {
        self.state.advance(ConnectionState::Open);
    }

    pub(crate) fn mark_closed(&self) {
        self.state.advance(ConnectionState::Closed);
    }

    /// Clear the liveness flag. Returns `true` only for the call that cleared it.
    fn mark_dead(&self) -> bool {
        let cleared = self.live.send_if_modified(|live| std::mem::replace(live, false));
        if cleared {
            tracing::debug!("Connection {} marked not live", self.id);
        }
        cleared
    }

    /// Send one packet as a single atomic write.
    ///
    /// Concurrent senders are serialized by the send lock, so their frames
    /// never interleave. Any failure clears the liveness flag.
    pub async fn send(&self, packet: &Packet) -> Result<(), FrameError> {
        let mut live = self.live.subscribe();
        if !*live.borrow() {
            return Err(FrameError::ConnectionClosed);
        }

        let mut writer = self.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Err(FrameError::ConnectionClosed);
        };

        let result = tokio::select! {
            result = write_packet(stream, packet) => result,
            _ = live.wait_for(|alive| !*alive) => Err(FrameError::ConnectionClosed),
        };
        drop(writer);

        match result {
            Ok(()) => {
                tracing::trace!(
                    "Connection {} sent type {} ({} bytes)",
                    self.id,
                    packet.packet_type(),
                    packet.size()
                );
                Ok(())
            }
            Err(e) => {
                self.mark_dead();
                Err(e)
            }
        }
    }

    /// Receive the next whole packet, waiting as long as it takes.
    ///
    /// Any failure (end of stream, truncated frame, I/O error, or the
    /// connection being closed from elsewhere) clears the liveness flag.
    pub async fn receive(&self) -> Result<Packet, FrameError> {
        let mut live = self.live.subscribe();
        if !*live.borrow() {
            return Err(FrameError::ConnectionClosed);
        }

        let mut reader = self.reader.lock().await;
        let Some(stream) = reader.as_mut() else {
            return Err(FrameError::ConnectionClosed);
        };

        let result = tokio::select! {
            result = read_packet(stream) => result,
            _ = live.wait_for(|alive| !*alive) => Err(FrameError::ConnectionClosed),
        };
        drop(reader);

        if result.is_err() {
            self.mark_dead();
        }
        result
    }

    /// Close the connection.
    ///
    /// Idempotent and safe to race: only the first caller shuts the stream
    /// down and releases it; later callers return immediately.
    pub async fn close(&self) {
        if self.close_started.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state.advance(ConnectionState::Closing);
        self.mark_dead();

        // Pending senders and receivers have been woken and will release
        // their locks.
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer
            && let Err(e) = writer.shutdown().await
        {
            tracing::debug!("Connection {} shutdown error: {e}", self.id);
        }
        let reader = self.reader.lock().await.take();
        drop(reader);

        // Client connections are never registered, so nothing else will
        // finish their lifecycle.
        if self.role == Role::Client {
            self.mark_closed();
        }
        tracing::debug!("Connection {} to {} released", self.id, self.address);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("role", &self.role)
            .field("state", &self.state())
            .field("live", &self.is_connected())
            .finish()
    }
}
