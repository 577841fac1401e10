//! Full round trip through a real listener: accept, dispatch, reply, drain.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use meridian_net::{
    Connection, ConnectionHandler, ConnectionRegistry, ConnectionState, Packet, ServiceManager,
};

#[derive(Default)]
struct PingPong {
    packets: AtomicUsize,
}

impl ConnectionHandler for PingPong {
    async fn on_packet(
        &self,
        _peers: &ConnectionRegistry,
        connection: &Arc<Connection>,
        packet: Packet,
    ) {
        self.packets.fetch_add(1, Ordering::SeqCst);
        if packet.packet_type() == 1 && packet.payload() == b"ping" {
            let pong = Packet::new(1u16, b"pong".to_vec()).unwrap();
            connection.send(&pong).await.unwrap();
        }
    }
}

#[tokio::test]
async fn ping_pong_over_loopback() {
    let server = ServiceManager::new(PingPong::default());
    server.initialize(9001, 100).await.unwrap();
    server.start().await.unwrap();

    let client = server.connect_to_server("127.0.0.1", 9001).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Open);

    let ping = Packet::new(1u16, b"ping".to_vec()).unwrap();
    client.send(&ping).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(2), client.receive())
        .await
        .expect("reply should arrive")
        .unwrap();
    assert_eq!(reply.packet_type(), 1);
    assert_eq!(reply.payload(), b"pong");
    assert_eq!(server.handler().packets.load(Ordering::SeqCst), 1);

    client.close().await;
    server.stop().await;

    assert_eq!(server.connection_count().await, 0);
    assert_eq!(server.handler().packets.load(Ordering::SeqCst), 1);
}
