//! Game server.

use crate::config::Config;
use crate::error::ServerError;
use crate::events::{EventBroadcaster, ServerEvent, DEFAULT_EVENT_CAPACITY};
use crate::host::{Host, HostEvent, HostHandle};
use crate::peer::PeerRegistry;
use bytes::Bytes;
use growsock_protocol::Variant;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// How long one host service call waits before checking idle peers again.
const SERVICE_INTERVAL: Duration = Duration::from_millis(250);

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub peers_total: AtomicU64,
    pub peers_active: AtomicU64,
    pub packets_in: AtomicU64,
    pub packets_out: AtomicU64,
}

/// Datagram game server.
pub struct Server {
    config: Config,
    peers: PeerRegistry,
    events: EventBroadcaster,
    stats: ServerStats,
    next_net_id: AtomicU32,
    host: RwLock<Option<(HostHandle, SocketAddr)>>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: Config) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            next_net_id: AtomicU32::new(config.network.start_net_id),
            config,
            peers: PeerRegistry::new(),
            events: EventBroadcaster::new(DEFAULT_EVENT_CAPACITY),
            stats: ServerStats::default(),
            host: RwLock::new(None),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the host and dispatches events until shutdown.
    pub async fn listen(&self) -> Result<(), ServerError> {
        // Subscribe before the address is published so an early shutdown is not lost.
        let mut shutdown_rx = self.shutdown.subscribe();

        let network = &self.config.network;
        let mut host = Host::bind(network.bind_addr, network.max_peers, network.idle_timeout())
            .await?;
        let local_addr = host.local_addr()?;
        *self.host.write() = Some((host.handle(), local_addr));
        self.running.store(true, Ordering::SeqCst);

        if self.config.log {
            tracing::info!("Server listening on {}", local_addr);
            tracing::info!("Event dispatch ready ({} subscribers)", self.events.receiver_count());
        }

        let result = loop {
            tokio::select! {
                result = host.service(SERVICE_INTERVAL) => {
                    match result {
                        Ok(Some(event)) => self.dispatch(event),
                        Ok(None) => {}
                        Err(e) => {
                            // Datagram sockets report ICMP errors from earlier sends here.
                            tracing::debug!("Host service error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    if self.config.log {
                        tracing::info!("Server shutting down");
                    }
                    break Ok(());
                }
            }
        };

        self.running.store(false, Ordering::SeqCst);
        *self.host.write() = None;
        result
    }

    fn dispatch(&self, event: HostEvent) {
        match event {
            HostEvent::Connect { addr } => {
                let net_id = self.next_net_id.fetch_add(1, Ordering::SeqCst);
                self.peers.insert(net_id, addr);
                self.stats.peers_total.fetch_add(1, Ordering::Relaxed);
                self.stats.peers_active.fetch_add(1, Ordering::Relaxed);
                if self.config.log {
                    tracing::info!("Peer connected: {} (net id {})", addr, net_id);
                }
                self.events.emit(ServerEvent::Connect { net_id });
            }
            HostEvent::Receive { addr, data } => match self.peers.net_id_of(addr) {
                Some(net_id) => {
                    self.stats.packets_in.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("[{}] Received {} bytes", net_id, data.len());
                    self.events.emit(ServerEvent::Data { net_id, data });
                }
                None => {
                    tracing::debug!("[{}] Dropping datagram from unregistered peer", addr);
                }
            },
            HostEvent::Disconnect { addr } => {
                if let Some(peer) = self.peers.remove_addr(addr) {
                    self.stats.peers_active.fetch_sub(1, Ordering::Relaxed);
                    if self.config.log {
                        tracing::info!("Peer disconnected: {} (net id {})", addr, peer.net_id);
                    }
                    self.events.emit(ServerEvent::Disconnect {
                        net_id: peer.net_id,
                    });
                }
            }
        }
    }

    /// Sends each buffer as one datagram to a connected peer.
    pub async fn send(&self, net_id: u32, packets: &[Bytes]) -> Result<(), ServerError> {
        let addr = self.peers.addr_of(net_id).ok_or_else(|| {
            tracing::debug!("[{}] Send to unknown peer", net_id);
            ServerError::PeerNotFound(net_id)
        })?;
        let handle = self.handle()?;

        for packet in packets {
            handle.send(addr, packet).await?;
            self.stats.packets_out.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!("[{}] Sent {} packet(s)", net_id, packets.len());
        Ok(())
    }

    /// Encodes a variant as a call-function packet and sends it to a peer.
    pub async fn send_variant(&self, net_id: u32, variant: &Variant) -> Result<(), ServerError> {
        let packet = variant.to_packet().encode().freeze();
        self.send(net_id, &[packet]).await
    }

    /// Disconnects a peer. The `Disconnect` event follows from the server loop.
    pub fn disconnect(&self, net_id: u32) -> Result<(), ServerError> {
        let addr = self
            .peers
            .addr_of(net_id)
            .ok_or(ServerError::PeerNotFound(net_id))?;
        self.handle()?.disconnect(addr);
        Ok(())
    }

    /// Sets the net id handed to the next connecting peer.
    pub fn set_net_id(&self, net_id: u32) {
        self.next_net_id.store(net_id, Ordering::SeqCst);
    }

    /// Subscribes to server events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Subscribes to the shutdown signal.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns the bound address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.host.read().as_ref().map(|(_, addr)| *addr)
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    fn handle(&self) -> Result<HostHandle, ServerError> {
        self.host
            .read()
            .as_ref()
            .map(|(handle, _)| handle.clone())
            .ok_or(ServerError::NotListening)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::next_event;
    use growsock_protocol::{Decoder, GameMessage, TankPacketType};
    use std::sync::Arc;
    use tokio::net::UdpSocket;

    const WAIT: Duration = Duration::from_secs(2);

    fn test_config() -> Config {
        let mut config = Config::default();
        config.network.bind_addr = "127.0.0.1:0".parse().unwrap();
        config.log = false;
        config
    }

    async fn start(
        server: &Arc<Server>,
    ) -> (tokio::task::JoinHandle<Result<(), ServerError>>, SocketAddr) {
        let task = {
            let server = server.clone();
            tokio::spawn(async move { server.listen().await })
        };
        for _ in 0..100 {
            if let Some(addr) = server.local_addr() {
                return (task, addr);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("server did not start");
    }

    async fn expect_event(rx: &mut broadcast::Receiver<ServerEvent>) -> ServerEvent {
        tokio::time::timeout(WAIT, next_event(rx))
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_server_not_running_initially() {
        let server = Server::new(test_config());
        assert!(!server.is_running());
        assert!(server.local_addr().is_none());
        assert!(matches!(
            server.send(0, &[Bytes::new()]).await,
            Err(ServerError::PeerNotFound(0))
        ));
    }

    #[tokio::test]
    async fn test_connect_data_variant_disconnect() {
        let server = Arc::new(Server::new(test_config()));
        let mut events = server.subscribe();
        let (task, addr) = start(&server).await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let hello = GameMessage::Text("action|log".to_string()).encode();
        client.send_to(&hello, addr).await.unwrap();

        assert_eq!(expect_event(&mut events).await, ServerEvent::Connect { net_id: 0 });
        assert_eq!(
            expect_event(&mut events).await,
            ServerEvent::Data {
                net_id: 0,
                data: hello.freeze()
            }
        );

        let variant = Variant::builder()
            .arg("OnConsoleMessage")
            .arg("Welcome")
            .build()
            .unwrap();
        server.send_variant(0, &variant).await.unwrap();

        let mut buf = [0u8; 512];
        let (n, _) = tokio::time::timeout(WAIT, client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        match GameMessage::decode(&buf[..n]).unwrap() {
            GameMessage::Tank(packet) => {
                assert_eq!(packet.kind, TankPacketType::CallFunction as u8);
                assert_eq!(packet.net_id, -1);
                let decoded = Decoder::decode_variant(&packet.data()).unwrap();
                assert_eq!(decoded.function_name(), Some("OnConsoleMessage"));
            }
            other => panic!("Expected tank packet, got {:?}", other),
        }

        server.disconnect(0).unwrap();
        assert_eq!(
            expect_event(&mut events).await,
            ServerEvent::Disconnect { net_id: 0 }
        );
        assert!(server.peers().is_empty());
        assert_eq!(server.stats().packets_out.load(Ordering::Relaxed), 1);
        assert_eq!(server.stats().peers_total.load(Ordering::Relaxed), 1);

        server.shutdown();
        task.await.unwrap().unwrap();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_net_ids_are_sequential_from_start() {
        let mut config = test_config();
        config.network.start_net_id = 10;
        let server = Arc::new(Server::new(config));
        let mut events = server.subscribe();
        let (task, addr) = start(&server).await;

        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        a.send_to(b"\x02\x00\x00\x00", addr).await.unwrap();
        assert_eq!(expect_event(&mut events).await, ServerEvent::Connect { net_id: 10 });
        expect_event(&mut events).await;

        server.set_net_id(50);
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        b.send_to(b"\x02\x00\x00\x00", addr).await.unwrap();
        assert_eq!(expect_event(&mut events).await, ServerEvent::Connect { net_id: 50 });
        expect_event(&mut events).await;

        assert_eq!(server.peers().len(), 2);
        assert_eq!(server.peers().addr_of(50), Some(b.local_addr().unwrap()));

        server.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer() {
        let server = Arc::new(Server::new(test_config()));
        let (task, _) = start(&server).await;

        let result = server.send(99, &[Bytes::from_static(b"x")]).await;
        assert!(matches!(result, Err(ServerError::PeerNotFound(99))));
        assert!(matches!(
            server.disconnect(99),
            Err(ServerError::PeerNotFound(99))
        ));

        server.shutdown();
        task.await.unwrap().unwrap();
    }
}
