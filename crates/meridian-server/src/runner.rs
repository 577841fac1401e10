//! Hosts one service: bind, start, console, drain.

use std::path::PathBuf;
use std::time::Duration;

use meridian_config::{CliArgs, Config, NetworkConfig};
use meridian_log::{LogError, LogHandle};
use meridian_net::{ServerError, ServiceManager, SocketConfig};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;

use crate::console::Console;
use crate::service::Service;

/// Errors that end a service run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Server(#[from] ServerError),

    /// Reading operator input failed.
    #[error("failed to read console input: {0}")]
    Console(#[from] std::io::Error),
}

/// Everything a run needs besides the service itself.
#[derive(Debug)]
pub struct RunContext {
    /// Effective configuration, CLI overrides applied.
    pub config: Config,
    /// Directory holding `config.ron`, for `reload`.
    pub config_dir: PathBuf,
    /// Filter control for `reload`; `None` leaves the level fixed.
    pub log: Option<LogHandle>,
    /// Command-line overrides, reapplied on `reload`.
    pub overrides: Option<CliArgs>,
}

/// Socket options for the shared `network` config section.
pub fn socket_config(network: &NetworkConfig) -> SocketConfig {
    SocketConfig {
        tcp_nodelay: network.tcp_nodelay,
        keepalive_enabled: network.keep_alive,
        keepalive_idle: Duration::from_secs(network.keepalive_idle_seconds),
        buffer_size: (network.buffer_size > 0).then_some(network.buffer_size),
        ..SocketConfig::default()
    }
}

/// Run `service` until the operator quits, Ctrl-C arrives, or `input` ends.
///
/// Bind failures are returned before anything starts. Once running, the
/// service is always drained before this returns.
pub async fn run_service<S, R>(service: S, context: RunContext, input: R) -> Result<(), RunError>
where
    S: Service,
    R: AsyncBufRead + Unpin,
{
    let kind = service.kind();
    let settings = context.config.listen_settings(kind);
    tracing::info!(
        "Initializing {kind} service (port: {}, max connections: {}, log level: {})",
        settings.port,
        settings.max_connections,
        settings.log_level
    );

    let manager =
        ServiceManager::with_socket_config(service, socket_config(&context.config.network));
    manager
        .initialize(settings.port, settings.max_connections)
        .await?;
    manager.start().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let background = manager.handler().start_background(shutdown_rx);
    tracing::info!("{kind} service is running. Type 'help' for commands");

    let result = drive_console(&manager, context, input).await;

    tracing::info!("Stopping {kind} service");
    shutdown_tx.send_replace(true);
    if let Some(task) = background
        && let Err(e) = task.await
    {
        tracing::warn!("Background task failed: {e}");
    }
    manager.stop().await;
    tracing::info!("{kind} service stopped");
    result
}

async fn drive_console<S, R>(
    manager: &ServiceManager<S>,
    context: RunContext,
    input: R,
) -> Result<(), RunError>
where
    S: Service,
    R: AsyncBufRead + Unpin,
{
    let mut console = Console::new(manager, context.config, context.config_dir, context.log);
    if let Some(args) = context.overrides {
        console = console.with_cli_overrides(args);
    }
    let mut lines = input.lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received");
                return Ok(());
            }
        };
        let Some(line) = line else {
            tracing::info!("Console input closed");
            return Ok(());
        };

        match console.execute(&line).await {
            Some(output) => {
                for text in output {
                    tracing::info!("{text}");
                }
            }
            None => {
                tracing::info!("Shutdown requested by operator");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{AuthService, GameService};
    use meridian_net::{Connection, Packet, PacketType, get_string};
    use tokio::io::{AsyncWriteExt, BufReader};

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn context(config: Config) -> RunContext {
        RunContext {
            config,
            config_dir: PathBuf::new(),
            log: None,
            overrides: None,
        }
    }

    #[test]
    fn test_socket_config_from_network() {
        let network = NetworkConfig {
            keep_alive: false,
            keepalive_idle_seconds: 5,
            buffer_size: 0,
            tcp_nodelay: false,
        };
        let socket = socket_config(&network);
        assert!(!socket.keepalive_enabled);
        assert!(!socket.tcp_nodelay);
        assert_eq!(socket.keepalive_idle, Duration::from_secs(5));
        assert_eq!(socket.buffer_size, None);

        let defaults = socket_config(&NetworkConfig::default());
        assert_eq!(defaults.buffer_size, Some(8192));
    }

    #[tokio::test]
    async fn test_quit_stops_service() {
        let mut config = Config::default();
        config.auth.port = free_port();
        let input = BufReader::new(&b"status\nhelp\nquit\nstatus\n"[..]);

        run_service(AuthService::new(), context(config), input)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_end_of_input_stops_service() {
        let mut config = Config::default();
        config.auth.port = free_port();
        let input = BufReader::new(&b""[..]);
        run_service(AuthService::new(), context(config), input)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let occupied = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let mut config = Config::default();
        config.auth.port = occupied.local_addr().unwrap().port();

        let input = BufReader::new(&b""[..]);
        let result = run_service(AuthService::new(), context(config), input).await;
        assert!(matches!(
            result,
            Err(RunError::Server(ServerError::Bind { .. }))
        ));
    }

    #[tokio::test]
    async fn test_game_chat_reaches_every_player() {
        let port = free_port();
        let mut config = Config::default();
        config.game.port = port;
        let game = GameService::new(&config.game);

        let (console_in, mut operator) = tokio::io::duplex(1024);
        let run = tokio::spawn(run_service(game, context(config), BufReader::new(console_in)));

        let socket = SocketConfig::default();
        let mut alice = None;
        for _ in 0..200 {
            if let Ok(connection) = Connection::connect("127.0.0.1", port, &socket).await {
                alice = Some(connection);
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let alice = alice.expect("service should be listening");
        let bob = Connection::connect("127.0.0.1", port, &socket).await.unwrap();

        // A move round trip proves both sessions are registered.
        for player in [&alice, &bob] {
            player.send(&Packet::empty(PacketType::PlayerMove)).await.unwrap();
            let reply = player.receive().await.unwrap();
            assert_eq!(reply.packet_type(), u16::from(PacketType::PlayerMove));
        }

        let chat = Packet::with_string(PacketType::PlayerChat, "hello zone").unwrap();
        alice.send(&chat).await.unwrap();
        for player in [&alice, &bob] {
            let packet = player.receive().await.unwrap();
            assert_eq!(packet.packet_type(), u16::from(PacketType::PlayerChat));
            let mut offset = 0;
            assert_eq!(get_string(packet.payload(), &mut offset).unwrap(), "hello zone");
        }

        operator.write_all(b"players\nquit\n").await.unwrap();
        run.await.unwrap().unwrap();
        assert!(alice.receive().await.is_err(), "drained service closes players");
    }
}
