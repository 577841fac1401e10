//! TCP packet service: frame codec, connection lifecycle, connection registry,
//! and the service manager that accepts, dispatches, and drains connections.

pub mod connection;
pub mod framing;
pub mod handler;
pub mod payload;
pub mod platform;
pub mod registry;
pub mod server;

pub use connection::{
    Connection, ConnectionId, ConnectionState, ConnectionStateWatch, IdGenerator, Role,
};
pub use framing::{FrameError, HEADER_SIZE, MAX_PAYLOAD_SIZE, Packet, read_packet, write_packet};
pub use handler::ConnectionHandler;
pub use payload::{PacketType, get_i32, get_string, put_i32, put_string};
pub use platform::{SocketConfig, any_address};
pub use registry::{ConnectionLimitReached, ConnectionRegistry};
pub use server::{DEFAULT_MAX_CONNECTIONS, ServerError, ServiceManager};
