//! Authentication service.

use std::sync::Arc;

use meridian_config::ServiceKind;
use meridian_net::{Connection, ConnectionHandler, ConnectionRegistry, Packet, PacketType};

use super::reply;
use crate::service::Service;

/// Answers echo and authentication requests.
#[derive(Debug, Default)]
pub struct AuthService;

impl AuthService {
    pub fn new() -> Self {
        Self
    }
}

impl ConnectionHandler for AuthService {
    async fn on_connected(&self, connection: &Arc<Connection>) {
        tracing::info!(
            "Client connected: {} (ID: {})",
            connection.address(),
            connection.id()
        );
    }

    async fn on_disconnected(&self, connection: &Arc<Connection>) {
        tracing::info!(
            "Client disconnected: {} (ID: {})",
            connection.address(),
            connection.id()
        );
    }

    async fn on_packet(
        &self,
        _peers: &ConnectionRegistry,
        connection: &Arc<Connection>,
        packet: Packet,
    ) {
        tracing::debug!(
            "Received packet type {} from {}",
            packet.packet_type(),
            connection.address()
        );
        match PacketType::try_from(packet.packet_type()) {
            Ok(PacketType::Echo) => {
                reply(connection, PacketType::Echo, "AUTH_ECHO_RESPONSE").await;
            }
            Ok(PacketType::AuthRequest) => {
                reply(connection, PacketType::AuthResponse, "AUTH_SUCCESS").await;
                tracing::info!("Authentication processed for {}", connection.address());
            }
            _ => tracing::warn!(
                "Unknown packet type {} from {}",
                packet.packet_type(),
                connection.address()
            ),
        }
    }
}

impl Service for AuthService {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Auth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{empty_registry, pipe, raw, read_reply};

    #[tokio::test]
    async fn test_echo_reply() {
        let service = AuthService::new();
        let (connection, mut remote) = pipe();
        service
            .on_packet(&empty_registry(), &connection, raw(1))
            .await;
        assert_eq!(
            read_reply(&mut remote).await,
            (1, "AUTH_ECHO_RESPONSE".to_string())
        );
    }

    #[tokio::test]
    async fn test_auth_request_succeeds() {
        let service = AuthService::new();
        let (connection, mut remote) = pipe();
        let request = Packet::with_string(PacketType::AuthRequest, "alice:secret").unwrap();
        service.on_packet(&empty_registry(), &connection, request).await;
        assert_eq!(
            read_reply(&mut remote).await,
            (101, "AUTH_SUCCESS".to_string())
        );
    }

    #[tokio::test]
    async fn test_unknown_type_ignored() {
        let service = AuthService::new();
        let (connection, mut remote) = pipe();
        service.on_packet(&empty_registry(), &connection, raw(999)).await;
        service.on_packet(&empty_registry(), &connection, raw(1)).await;

        // The first packet on the wire is the echo reply; nothing was sent for 999.
        assert_eq!(read_reply(&mut remote).await.0, 1);
    }
}
