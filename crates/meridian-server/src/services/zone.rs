//! Zone service: one rectangular map and the players standing on it.

use std::collections::BTreeMap;
use std::sync::Arc;

use meridian_config::{ServiceKind, ZoneConfig};
use meridian_net::{
    Connection, ConnectionHandler, ConnectionId, ConnectionRegistry, Packet, PacketType,
};
use tokio::sync::Mutex;

use super::reply;
use crate::service::Service;

/// Smallest map edge that still leaves one walkable tile inside the walls.
const MIN_MAP_EDGE: u32 = 3;

/// Edge length of the section printed by the `map` console command.
const MAP_PREVIEW_EDGE: u32 = 10;

/// One map cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    Wall,
    Floor,
}

impl Tile {
    fn glyph(self) -> char {
        match self {
            Tile::Wall => '#',
            Tile::Floor => '.',
        }
    }
}

/// A rectangular tile map with walls along the border and floor inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneMap {
    width: u32,
    height: u32,
    tiles: Vec<Tile>,
}

impl ZoneMap {
    /// Build a bordered map. Edges shorter than 3 are raised to 3.
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(MIN_MAP_EDGE);
        let height = height.max(MIN_MAP_EDGE);
        let tiles = (0..height)
            .flat_map(|y| {
                (0..width).map(move |x| {
                    if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                        Tile::Wall
                    } else {
                        Tile::Floor
                    }
                })
            })
            .collect();
        Self {
            width,
            height,
            tiles,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The tile at `(x, y)`, or `None` outside the map.
    pub fn tile(&self, x: i32, y: i32) -> Option<Tile> {
        let x = u32::try_from(x).ok().filter(|&x| x < self.width)?;
        let y = u32::try_from(y).ok().filter(|&y| y < self.height)?;
        self.tiles.get((y * self.width + x) as usize).copied()
    }

    /// Whether a player may stand at `(x, y)`.
    pub fn is_walkable(&self, x: i32, y: i32) -> bool {
        self.tile(x, y) == Some(Tile::Floor)
    }

    /// Clamp a position into the walkable interior.
    pub fn clamp_to_interior(&self, x: i32, y: i32) -> (i32, i32) {
        let max_x = self.width as i32 - 2;
        let max_y = self.height as i32 - 2;
        (x.clamp(1, max_x), y.clamp(1, max_y))
    }

    /// The spawn point: the interior tile nearest the center.
    pub fn spawn_point(&self) -> (i32, i32) {
        self.clamp_to_interior(self.width as i32 / 2, self.height as i32 / 2)
    }

    /// Render the top-left `edge`×`edge` section, one string per row.
    pub fn render_section(&self, edge: u32) -> Vec<String> {
        let rows = edge.min(self.height);
        let cols = edge.min(self.width) as usize;
        (0..rows)
            .map(|y| {
                let start = (y * self.width) as usize;
                self.tiles[start..start + cols]
                    .iter()
                    .map(|t| t.glyph())
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
struct ZonePlayer {
    address: String,
    x: i32,
    y: i32,
}

/// The zone service.
#[derive(Debug)]
pub struct ZoneService {
    zone_id: u32,
    map: ZoneMap,
    players: Mutex<BTreeMap<ConnectionId, ZonePlayer>>,
}

impl ZoneService {
    pub fn new(config: &ZoneConfig) -> Self {
        let map = ZoneMap::new(config.map_width, config.map_height);
        tracing::info!(
            "[ZONE-{}] Map initialized: {}x{}",
            config.zone_id,
            map.width(),
            map.height()
        );
        Self {
            zone_id: config.zone_id,
            map,
            players: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn zone_id(&self) -> u32 {
        self.zone_id
    }

    pub fn zone_map(&self) -> &ZoneMap {
        &self.map
    }

    /// Position of one connection's player, if it is in the zone.
    pub async fn position(&self, id: ConnectionId) -> Option<(i32, i32)> {
        self.players.lock().await.get(&id).map(|p| (p.x, p.y))
    }

    async fn handle_move(&self, peers: &ConnectionRegistry, connection: &Connection) {
        let moved = {
            let mut players = self.players.lock().await;
            match players.get_mut(&connection.id()) {
                Some(player) => {
                    (player.x, player.y) = self.map.clamp_to_interior(player.x + 1, player.y + 1);
                    true
                }
                None => false,
            }
        };
        if !moved {
            return;
        }

        reply(connection, PacketType::PlayerMove, "ZONE_MOVE_SUCCESS").await;
        match Packet::with_string(PacketType::GameData, "PLAYER_POSITION_SYNC") {
            Ok(sync) => {
                peers.broadcast(&sync).await;
            }
            Err(e) => tracing::warn!("Failed to build position sync: {e}"),
        }
        tracing::debug!(
            "[ZONE-{}] Player move in zone from {}",
            self.zone_id,
            connection.address()
        );
    }
}

impl ConnectionHandler for ZoneService {
    async fn on_connected(&self, connection: &Arc<Connection>) {
        tracing::info!(
            "[ZONE-{}] Player entered zone: {}",
            self.zone_id,
            connection.address()
        );
        let (x, y) = self.map.spawn_point();
        self.players.lock().await.insert(
            connection.id(),
            ZonePlayer {
                address: connection.address().to_string(),
                x,
                y,
            },
        );
    }

    async fn on_disconnected(&self, connection: &Arc<Connection>) {
        tracing::info!(
            "[ZONE-{}] Player left zone: {}",
            self.zone_id,
            connection.address()
        );
        self.players.lock().await.remove(&connection.id());
    }

    async fn on_packet(
        &self,
        peers: &ConnectionRegistry,
        connection: &Arc<Connection>,
        packet: Packet,
    ) {
        match PacketType::try_from(packet.packet_type()) {
            Ok(PacketType::Echo) => {
                let message = format!("ZONE_ECHO_RESPONSE_ZONE_{}", self.zone_id);
                reply(connection, PacketType::Echo, &message).await;
            }
            Ok(PacketType::ZoneChange) => {
                reply(connection, PacketType::ZoneChange, "ZONE_CHANGE_SUCCESS").await;
                tracing::info!(
                    "[ZONE-{}] Zone change request from {}",
                    self.zone_id,
                    connection.address()
                );
            }
            Ok(PacketType::ZoneData) => {
                let message = format!(
                    "ZONE_DATA_ZONE_{}_SIZE_{}x{}",
                    self.zone_id,
                    self.map.width(),
                    self.map.height()
                );
                reply(connection, PacketType::ZoneData, &message).await;
            }
            Ok(PacketType::PlayerMove) => self.handle_move(peers, connection).await,
            _ => tracing::warn!(
                "[ZONE-{}] Unknown packet type {} from {}",
                self.zone_id,
                packet.packet_type(),
                connection.address()
            ),
        }
    }
}

impl Service for ZoneService {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Zone
    }

    async fn status(&self) -> Vec<String> {
        vec![
            format!("Zone ID: {}", self.zone_id),
            format!("Players in zone: {}", self.players.lock().await.len()),
            format!("Map size: {}x{}", self.map.width(), self.map.height()),
        ]
    }

    async fn players(&self) -> Option<Vec<String>> {
        let players = self.players.lock().await;
        Some(
            players
                .iter()
                .map(|(id, p)| {
                    format!(
                        "Player ID: {}, Address: {}, Zone Pos: ({}, {})",
                        id.0, p.address, p.x, p.y
                    )
                })
                .collect(),
        )
    }

    fn map(&self) -> Option<Vec<String>> {
        let mut lines = vec!["Zone Map Layout:".to_string()];
        lines.extend(self.map.render_section(MAP_PREVIEW_EDGE));
        if self.map.width() > MAP_PREVIEW_EDGE || self.map.height() > MAP_PREVIEW_EDGE {
            lines.push(format!(
                "... (showing {MAP_PREVIEW_EDGE}x{MAP_PREVIEW_EDGE} section of {}x{} map)",
                self.map.width(),
                self.map.height()
            ));
        }
        Some(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{empty_registry, pipe, raw, read_reply};

    #[test]
    fn test_map_border_is_wall() {
        let map = ZoneMap::new(50, 50);
        assert_eq!(map.tile(0, 0), Some(Tile::Wall));
        assert_eq!(map.tile(49, 25), Some(Tile::Wall));
        assert_eq!(map.tile(25, 49), Some(Tile::Wall));
        assert_eq!(map.tile(1, 1), Some(Tile::Floor));
        assert_eq!(map.tile(48, 48), Some(Tile::Floor));
        assert_eq!(map.tile(50, 0), None);
        assert_eq!(map.tile(-1, 3), None);
    }

    #[test]
    fn test_tiny_map_keeps_one_floor_tile() {
        let map = ZoneMap::new(1, 0);
        assert_eq!((map.width(), map.height()), (3, 3));
        assert!(map.is_walkable(1, 1));
        assert_eq!(map.spawn_point(), (1, 1));
        assert_eq!(map.clamp_to_interior(10, -4), (1, 1));
    }

    #[test]
    fn test_clamp_to_interior() {
        let map = ZoneMap::new(50, 40);
        assert_eq!(map.clamp_to_interior(100, 100), (48, 38));
        assert_eq!(map.clamp_to_interior(0, 0), (1, 1));
        assert_eq!(map.clamp_to_interior(10, 20), (10, 20));
    }

    #[test]
    fn test_render_section() {
        let map = ZoneMap::new(50, 50);
        let rows = map.render_section(10);
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0], "##########");
        assert_eq!(rows[1], "#.........");

        let small = ZoneMap::new(4, 3);
        assert_eq!(small.render_section(10), vec!["####", "#..#", "####"]);
    }

    #[tokio::test]
    async fn test_zone_replies() {
        let service = ZoneService::new(&ZoneConfig {
            zone_id: 7,
            map_width: 30,
            map_height: 20,
            ..Default::default()
        });
        let (connection, mut remote) = pipe();
        let peers = empty_registry();

        service.on_packet(&peers, &connection, raw(1)).await;
        service.on_packet(&peers, &connection, raw(300)).await;
        service.on_packet(&peers, &connection, raw(301)).await;

        assert_eq!(
            read_reply(&mut remote).await,
            (1, "ZONE_ECHO_RESPONSE_ZONE_7".to_string())
        );
        assert_eq!(
            read_reply(&mut remote).await,
            (300, "ZONE_CHANGE_SUCCESS".to_string())
        );
        assert_eq!(
            read_reply(&mut remote).await,
            (301, "ZONE_DATA_ZONE_7_SIZE_30x20".to_string())
        );
    }

    #[tokio::test]
    async fn test_move_stays_inside_walls() {
        let service = ZoneService::new(&ZoneConfig {
            map_width: 6,
            map_height: 6,
            ..Default::default()
        });
        let (connection, mut remote) = pipe();
        let peers = empty_registry();
        service.on_connected(&connection).await;
        assert_eq!(service.position(connection.id()).await, Some((3, 3)));

        for _ in 0..5 {
            service.on_packet(&peers, &connection, raw(201)).await;
            assert_eq!(
                read_reply(&mut remote).await,
                (201, "ZONE_MOVE_SUCCESS".to_string())
            );
        }
        let (x, y) = service.position(connection.id()).await.unwrap();
        assert_eq!((x, y), (4, 4));
        assert!(service.zone_map().is_walkable(x, y));

        service.on_disconnected(&connection).await;
        assert!(service.position(connection.id()).await.is_none());
    }

    #[tokio::test]
    async fn test_status_and_map_output() {
        let service = ZoneService::new(&ZoneConfig::default());
        let status = service.status().await;
        assert_eq!(status[0], "Zone ID: 1");
        assert_eq!(status[2], "Map size: 50x50");

        let map = service.map().unwrap();
        assert_eq!(map.len(), 12);
        assert!(map[11].contains("10x10 section of 50x50"));
    }
}
