//! The four backend services.

mod auth;
mod game;
mod gateway;
mod zone;

pub use auth::AuthService;
pub use game::{GameService, PlayerSession};
pub use gateway::GatewayService;
pub use zone::{Tile, ZoneMap, ZoneService};

use meridian_net::{Connection, Packet, PacketType};

/// Reply to one connection with a string packet. Returns `false` on failure.
pub(crate) async fn reply(connection: &Connection, packet_type: PacketType, message: &str) -> bool {
    let packet = match Packet::with_string(packet_type, message) {
        Ok(packet) => packet,
        Err(e) => {
            tracing::warn!("Failed to build {packet_type:?} reply: {e}");
            return false;
        }
    };
    match connection.send(&packet).await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Reply to {} failed: {e}", connection.id());
            false
        }
    }
}
