//! One outbound connection driven by [`ClientCommand`]s.

use std::sync::Arc;

use meridian_net::{
    Connection, ConnectionState, FrameError, Packet, PacketType, SocketConfig, get_string,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::command::ClientCommand;

/// Credentials sent by `auth`.
pub const AUTH_CREDENTIALS: &str = "test_user:test_password";
/// User name sent by `login`.
pub const LOGIN_USER: &str = "test_user";
/// Direction sent by `move`.
pub const MOVE_DIRECTION: &str = "move_right";
/// Body of the `zone` request.
pub const ZONE_REQUEST: &str = "request_zone_data";

/// Interactive client state.
///
/// Received packets are described on the `received` channel given to
/// [`Client::new`], from a background task that owns the receive loop.
pub struct Client {
    socket: SocketConfig,
    connection: Option<Arc<Connection>>,
    receiver: Option<JoinHandle<()>>,
    received: mpsc::UnboundedSender<String>,
}

impl Client {
    pub fn new(socket: SocketConfig, received: mpsc::UnboundedSender<String>) -> Self {
        Self {
            socket,
            connection: None,
            receiver: None,
            received,
        }
    }

    /// Whether an outbound connection is open.
    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|connection| connection.is_connected())
    }

    /// Run one command. Returns the output lines, or `None` for `quit`.
    pub async fn execute(&mut self, command: ClientCommand) -> Option<Vec<String>> {
        let output = match command {
            ClientCommand::Quit => {
                self.disconnect().await;
                return None;
            }
            ClientCommand::Empty => Vec::new(),
            ClientCommand::Help => help(),
            ClientCommand::Invalid(reason) => vec![reason],
            ClientCommand::Status => vec![format!(
                "Connection status: {}",
                if self.is_connected() { "Connected" } else { "Disconnected" }
            )],
            ClientCommand::Connect { host, port } => vec![self.connect(&host, port).await],
            ClientCommand::Disconnect => {
                if self.disconnect().await {
                    vec!["Disconnected".to_string()]
                } else {
                    vec!["Not connected.".to_string()]
                }
            }
            ClientCommand::Echo(text) => vec![self.send("echo", PacketType::Echo, &text).await],
            ClientCommand::Chat(text) => vec![self.send("chat", PacketType::PlayerChat, &text).await],
            ClientCommand::Auth => {
                vec![self.send("auth request", PacketType::AuthRequest, AUTH_CREDENTIALS).await]
            }
            ClientCommand::Login => {
                vec![self.send("login request", PacketType::LoginRequest, LOGIN_USER).await]
            }
            ClientCommand::Move => {
                vec![self.send("move", PacketType::PlayerMove, MOVE_DIRECTION).await]
            }
            ClientCommand::Zone => {
                vec![self.send("zone data request", PacketType::ZoneData, ZONE_REQUEST).await]
            }
        };
        Some(output)
    }

    async fn connect(&mut self, host: &str, port: u16) -> String {
        if self.is_connected() {
            return "Already connected. Disconnect first.".to_string();
        }
        // A connection the server dropped still holds a finished receive task.
        self.disconnect().await;

        match Connection::connect(host, port, &self.socket).await {
            Ok(connection) => {
                let connection = Arc::new(connection);
                self.receiver = Some(tokio::spawn(receive_loop(
                    Arc::clone(&connection),
                    self.received.clone(),
                )));
                self.connection = Some(connection);
                format!("Connected to {host}:{port}")
            }
            Err(e) => {
                tracing::warn!("Failed to connect to {host}:{port}: {e}");
                format!("Failed to connect to {host}:{port}")
            }
        }
    }

    /// Close the connection and wait for its receive loop. Returns `false`
    /// when there was nothing to close.
    pub async fn disconnect(&mut self) -> bool {
        let Some(connection) = self.connection.take() else {
            return false;
        };
        connection.close().await;
        if let Some(receiver) = self.receiver.take()
            && let Err(e) = receiver.await
        {
            tracing::warn!("Receive task failed: {e}");
        }
        true
    }

    async fn send(&self, what: &str, packet_type: PacketType, text: &str) -> String {
        let Some(connection) = self.connection.as_ref().filter(|c| c.is_connected()) else {
            return "Not connected".to_string();
        };
        let packet = match Packet::with_string(packet_type, text) {
            Ok(packet) => packet,
            Err(e) => return format!("Failed to send {what}: {e}"),
        };
        match connection.send(&packet).await {
            Ok(()) => format!("[SENT] {what}: {text}"),
            Err(e) => format!("Failed to send {what}: {e}"),
        }
    }
}

async fn receive_loop(connection: Arc<Connection>, received: mpsc::UnboundedSender<String>) {
    loop {
        match connection.receive().await {
            Ok(packet) => {
                if received.send(describe_packet(&packet)).is_err() {
                    break;
                }
            }
            Err(FrameError::ConnectionClosed) => break,
            Err(e) => {
                tracing::debug!("Receive from {} ended: {e}", connection.address());
                break;
            }
        }
    }
    // A local close moves the state off Open before the receive wakes up.
    if connection.state() == ConnectionState::Open {
        let _ = received.send(format!("Connection to {} lost", connection.address()));
        connection.close().await;
    }
}

/// One-line description of a received packet, payload decoded as a string.
pub fn describe_packet(packet: &Packet) -> String {
    let label = match PacketType::try_from(packet.packet_type()) {
        Ok(PacketType::Echo) => "Echo",
        Ok(PacketType::AuthResponse) => "Auth Response",
        Ok(PacketType::LoginResponse) => "Login Response",
        Ok(PacketType::PlayerMove) => "Move Response",
        Ok(PacketType::PlayerChat) => "Chat",
        Ok(PacketType::ZoneData) => "Zone Data",
        Ok(PacketType::ZoneChange) => "Zone Change",
        Ok(PacketType::GameData) => "Game Data",
        Ok(other) => return format!("[RECEIVED] Unexpected packet type {other:?}"),
        Err(code) => return format!("[RECEIVED] Unknown packet type {code}"),
    };
    let mut offset = 0;
    match get_string(packet.payload(), &mut offset) {
        Ok(text) => format!("[RECEIVED] {label}: {text}"),
        Err(_) => format!("[RECEIVED] {label}: <{} bytes>", packet.size()),
    }
}

fn help() -> Vec<String> {
    [
        "=== Commands ===",
        "connect <host> <port> - Connect to a service",
        "disconnect            - Close the connection",
        "echo [message]        - Send an echo request",
        "auth                  - Send an auth request",
        "login                 - Send a login request",
        "move                  - Send a player move",
        "chat [message]        - Send a chat line",
        "zone                  - Request zone data",
        "status                - Show connection status",
        "help                  - Show this help",
        "quit                  - Disconnect and exit",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_net::{ConnectionHandler, ConnectionRegistry, ServiceManager};

    /// Replies to every packet with the same type and a fixed body.
    struct Responder;

    impl ConnectionHandler for Responder {
        async fn on_packet(
            &self,
            _peers: &ConnectionRegistry,
            connection: &Arc<Connection>,
            packet: Packet,
        ) {
            let reply = Packet::with_string(packet.packet_type(), "OK").unwrap();
            connection.send(&reply).await.unwrap();
        }
    }

    async fn serve() -> (ServiceManager<Responder>, u16) {
        let manager = ServiceManager::new(Responder);
        manager
            .bind("127.0.0.1:0".parse().unwrap(), 10)
            .await
            .unwrap();
        manager.start().await.unwrap();
        let port = manager.local_addr().await.unwrap().port();
        (manager, port)
    }

    #[test]
    fn test_describe_packet() {
        let packet = Packet::with_string(PacketType::AuthResponse, "AUTH_SUCCESS").unwrap();
        assert_eq!(describe_packet(&packet), "[RECEIVED] Auth Response: AUTH_SUCCESS");

        let raw = Packet::new(999u16, vec![1u8]).unwrap();
        assert_eq!(describe_packet(&raw), "[RECEIVED] Unknown packet type 999");

        let garbled = Packet::new(PacketType::Echo, vec![9u8]).unwrap();
        assert_eq!(describe_packet(&garbled), "[RECEIVED] Echo: <1 bytes>");
    }

    #[tokio::test]
    async fn test_send_without_connection() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut client = Client::new(SocketConfig::default(), tx);
        assert_eq!(
            client.execute(ClientCommand::Auth).await.unwrap(),
            vec!["Not connected".to_string()]
        );
        assert_eq!(
            client.execute(ClientCommand::Disconnect).await.unwrap(),
            vec!["Not connected.".to_string()]
        );
        assert_eq!(
            client.execute(ClientCommand::Status).await.unwrap(),
            vec!["Connection status: Disconnected".to_string()]
        );
    }

    #[tokio::test]
    async fn test_round_trip_through_receive_task() {
        let (manager, port) = serve().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut client = Client::new(SocketConfig::default(), tx);

        let connect = ClientCommand::Connect {
            host: "127.0.0.1".to_string(),
            port,
        };
        assert_eq!(
            client.execute(connect.clone()).await.unwrap(),
            vec![format!("Connected to 127.0.0.1:{port}")]
        );
        assert_eq!(
            client.execute(connect).await.unwrap(),
            vec!["Already connected. Disconnect first.".to_string()]
        );

        let sent = client
            .execute(ClientCommand::Chat("hi".to_string()))
            .await
            .unwrap();
        assert_eq!(sent, vec!["[SENT] chat: hi".to_string()]);
        assert_eq!(rx.recv().await.unwrap(), "[RECEIVED] Chat: OK");

        assert!(client.execute(ClientCommand::Quit).await.is_none());
        assert!(!client.is_connected());
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_server_shutdown_is_reported() {
        let (manager, port) = serve().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut client = Client::new(SocketConfig::default(), tx);
        client
            .execute(ClientCommand::Connect {
                host: "127.0.0.1".to_string(),
                port,
            })
            .await
            .unwrap();

        manager.stop().await;
        assert_eq!(
            rx.recv().await.unwrap(),
            format!("Connection to 127.0.0.1:{port} lost")
        );
        assert!(!client.is_connected());
        assert_eq!(
            client.execute(ClientCommand::Move).await.unwrap(),
            vec!["Not connected".to_string()]
        );
    }
}
