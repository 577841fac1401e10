//! TCP socket setup for listeners and connected streams.
//!
//! [`SocketConfig`] carries the socket options every service applies:
//! TCP_NODELAY, keepalive, SO_REUSEADDR, and optional kernel buffer sizes.
//! Listeners are built with `socket2` so the backlog can follow the service's
//! connection limit.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use tokio::net::{TcpListener, TcpStream};

/// Socket options applied to listeners and to every connected stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketConfig {
    /// Disable Nagle's algorithm for lower latency. Default: true.
    pub tcp_nodelay: bool,
    /// Enable TCP keepalive. Default: true.
    pub keepalive_enabled: bool,
    /// Keepalive idle time before the first probe. Default: 30s.
    pub keepalive_idle: Duration,
    /// Keepalive probe interval. Default: 10s.
    pub keepalive_interval: Duration,
    /// Number of keepalive probes before declaring the peer dead. Default: 3.
    pub keepalive_retries: u32,
    /// Enable `SO_REUSEADDR` on server sockets. Default: true on Linux/macOS, false on Windows.
    pub reuse_addr: bool,
    /// `SO_SNDBUF` / `SO_RCVBUF` size in bytes; `None` keeps the OS default.
    pub buffer_size: Option<usize>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            tcp_nodelay: true,
            keepalive_enabled: true,
            keepalive_idle: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(10),
            keepalive_retries: 3,
            reuse_addr: !cfg!(target_os = "windows"),
            buffer_size: None,
        }
    }
}

/// Apply socket configuration to a connected [`TcpStream`].
pub fn configure_stream(stream: &TcpStream, config: &SocketConfig) -> std::io::Result<()> {
    stream.set_nodelay(config.tcp_nodelay)?;

    let sock_ref = SockRef::from(stream);
    if config.keepalive_enabled {
        let keepalive = TcpKeepalive::new()
            .with_time(config.keepalive_idle)
            .with_interval(config.keepalive_interval);

        // Retries are supported on Linux and Windows but not macOS.
        #[cfg(any(target_os = "linux", target_os = "windows"))]
        let keepalive = keepalive.with_retries(config.keepalive_retries);

        sock_ref.set_tcp_keepalive(&keepalive)?;
    }

    if let Some(size) = config.buffer_size {
        sock_ref.set_send_buffer_size(size)?;
        sock_ref.set_recv_buffer_size(size)?;
    }

    Ok(())
}

/// Create, bind, and listen on a server socket.
///
/// `backlog` is clamped to the range the OS call accepts.
pub async fn create_listener(
    addr: SocketAddr,
    backlog: usize,
    config: &SocketConfig,
) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    if config.reuse_addr {
        socket.set_reuse_address(true)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(backlog.max(1)).unwrap_or(i32::MAX))?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

/// The wildcard IPv4 address services listen on.
pub fn any_address(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
}
