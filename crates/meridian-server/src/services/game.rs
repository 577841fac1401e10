//! Game simulation service.
//!
//! Tracks one [`PlayerSession`] per connection, applies movement, relays chat
//! to everyone, and runs a fixed-rate simulation tick in the background.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use meridian_config::{GameConfig, ServiceKind};
use meridian_net::{
    Connection, ConnectionHandler, ConnectionId, ConnectionRegistry, Packet, PacketType,
    get_string,
};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::reply;
use crate::service::Service;

/// Per-connection player state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSession {
    /// Peer address of the owning connection.
    pub address: String,
    pub x: i32,
    pub y: i32,
}

/// The game service.
#[derive(Debug)]
pub struct GameService {
    tick_rate: u32,
    sessions: Mutex<BTreeMap<ConnectionId, PlayerSession>>,
    ticks: Arc<AtomicU64>,
}

impl GameService {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            tick_rate: config.tick_rate,
            sessions: Mutex::new(BTreeMap::new()),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Simulation ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// The session of one connection, if it has one.
    pub async fn session(&self, id: ConnectionId) -> Option<PlayerSession> {
        self.sessions.lock().await.get(&id).cloned()
    }

    /// Number of active sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    async fn handle_move(&self, connection: &Connection) {
        let moved = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get_mut(&connection.id()) {
                Some(session) => {
                    session.x += 1;
                    session.y += 1;
                    true
                }
                None => false,
            }
        };
        if moved {
            reply(connection, PacketType::PlayerMove, "MOVE_SUCCESS").await;
            tracing::debug!("Player move from {}", connection.address());
        }
    }

    async fn handle_chat(&self, peers: &ConnectionRegistry, connection: &Connection, packet: &Packet) {
        let mut offset = 0;
        let text = match get_string(packet.payload(), &mut offset) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Malformed chat from {}: {e}", connection.address());
                return;
            }
        };
        let chat = match Packet::with_string(PacketType::PlayerChat, &text) {
            Ok(chat) => chat,
            Err(e) => {
                tracing::warn!("Chat from {} not relayed: {e}", connection.address());
                return;
            }
        };
        if !peers.broadcast(&chat).await {
            tracing::debug!("Chat broadcast did not reach every player");
        }
        tracing::info!("Chat message from {}: {text}", connection.address());
    }
}

impl ConnectionHandler for GameService {
    async fn on_connected(&self, connection: &Arc<Connection>) {
        tracing::info!("Player connected: {}", connection.address());
        self.sessions.lock().await.insert(
            connection.id(),
            PlayerSession {
                address: connection.address().to_string(),
                x: 0,
                y: 0,
            },
        );
    }

    async fn on_disconnected(&self, connection: &Arc<Connection>) {
        tracing::info!("Player disconnected: {}", connection.address());
        self.sessions.lock().await.remove(&connection.id());
    }

    async fn on_packet(
        &self,
        peers: &ConnectionRegistry,
        connection: &Arc<Connection>,
        packet: Packet,
    ) {
        match PacketType::try_from(packet.packet_type()) {
            Ok(PacketType::Echo) => {
                reply(connection, PacketType::Echo, "GAME_ECHO_RESPONSE").await;
                tracing::debug!("Echo request from {}", connection.address());
            }
            Ok(PacketType::PlayerMove) => self.handle_move(connection).await,
            Ok(PacketType::PlayerChat) => self.handle_chat(peers, connection, &packet).await,
            _ => tracing::warn!(
                "Unknown packet type {} from {}",
                packet.packet_type(),
                connection.address()
            ),
        }
    }
}

impl Service for GameService {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Game
    }

    async fn status(&self) -> Vec<String> {
        vec![
            format!("Active sessions: {}", self.session_count().await),
            format!("Tick rate: {} TPS", self.tick_rate),
            format!("Ticks: {}", self.ticks()),
        ]
    }

    async fn players(&self) -> Option<Vec<String>> {
        let sessions = self.sessions.lock().await;
        Some(
            sessions
                .iter()
                .map(|(id, s)| {
                    format!(
                        "Player ID: {}, Address: {}, Pos: ({}, {})",
                        id.0, s.address, s.x, s.y
                    )
                })
                .collect(),
        )
    }

    fn start_background(&self, mut shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        if self.tick_rate == 0 {
            tracing::warn!("Tick rate is 0, simulation loop disabled");
            return None;
        }
        let period = Duration::from_secs(1) / self.tick_rate;
        let ticks = Arc::clone(&self.ticks);

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        ticks.fetch_add(1, Ordering::Relaxed);
                    }
                    _ = shutdown.wait_for(|stop| *stop) => break,
                }
            }
            tracing::debug!("Simulation loop stopped");
        }))
    }
}
