//! Client-facing gateway service.

use std::sync::Arc;

use meridian_config::{GatewayConfig, ServiceKind};
use meridian_net::{Connection, ConnectionHandler, ConnectionRegistry, Packet, PacketType};

use super::reply;
use crate::service::Service;

/// Entry point for clients: answers echo and login requests.
#[derive(Debug)]
pub struct GatewayService {
    load_balance_method: String,
}

impl GatewayService {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            load_balance_method: config.load_balance_method.clone(),
        }
    }

    /// The configured upstream selection method.
    pub fn load_balance_method(&self) -> &str {
        &self.load_balance_method
    }
}

impl ConnectionHandler for GatewayService {
    async fn on_connected(&self, connection: &Arc<Connection>) {
        tracing::info!("Client connected: {}", connection.address());
    }

    async fn on_disconnected(&self, connection: &Arc<Connection>) {
        tracing::info!("Client disconnected: {}", connection.address());
    }

    async fn on_packet(
        &self,
        _peers: &ConnectionRegistry,
        connection: &Arc<Connection>,
        packet: Packet,
    ) {
        match PacketType::try_from(packet.packet_type()) {
            Ok(PacketType::Echo) => {
                reply(connection, PacketType::Echo, "GATEWAY_ECHO_RESPONSE").await;
                tracing::debug!("Echo request from {}", connection.address());
            }
            Ok(PacketType::LoginRequest) => {
                reply(connection, PacketType::LoginResponse, "LOGIN_SUCCESS").await;
                tracing::info!("Login request from {}", connection.address());
            }
            _ => tracing::warn!(
                "Unknown packet type {} from {}",
                packet.packet_type(),
                connection.address()
            ),
        }
    }
}

impl Service for GatewayService {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Gateway
    }

    async fn status(&self) -> Vec<String> {
        vec![format!("Load Balance Method: {}", self.load_balance_method)]
    }
}
