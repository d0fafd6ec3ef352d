//! UDP host.
//!
//! Tracks peers by source address. The first datagram from an unknown
//! address connects the peer; peers that stay silent longer than the idle
//! timeout are disconnected.

use crate::error::ServerError;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

/// Largest datagram the host will receive.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Event reported by [`Host::service`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Connect { addr: SocketAddr },
    Receive { addr: SocketAddr, data: Bytes },
    Disconnect { addr: SocketAddr },
}

#[derive(Debug, Default)]
struct PeerTable {
    last_seen: HashMap<SocketAddr, Instant>,
    pending: VecDeque<HostEvent>,
}

/// A bound UDP host.
pub struct Host {
    socket: Arc<UdpSocket>,
    peers: Arc<Mutex<PeerTable>>,
    max_peers: usize,
    idle_timeout: Duration,
    buf: Vec<u8>,
}

impl Host {
    /// Binds the host socket.
    pub async fn bind(
        addr: SocketAddr,
        max_peers: usize,
        idle_timeout: Duration,
    ) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            peers: Arc::new(Mutex::new(PeerTable::default())),
            max_peers,
            idle_timeout,
            buf: vec![0u8; MAX_DATAGRAM_SIZE],
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Returns a cloneable handle for sending and disconnecting.
    pub fn handle(&self) -> HostHandle {
        HostHandle {
            socket: self.socket.clone(),
            peers: self.peers.clone(),
        }
    }

    /// Returns the number of connected peers.
    pub fn peer_count(&self) -> usize {
        self.peers.lock().last_seen.len()
    }

    /// Waits up to `timeout` for the next event.
    ///
    /// Returns `Ok(None)` when nothing happened in time or a datagram was
    /// dropped. Cancelling the returned future loses no events.
    pub async fn service(&mut self, timeout: Duration) -> Result<Option<HostEvent>, ServerError> {
        if let Some(event) = self.next_pending() {
            return Ok(Some(event));
        }

        let recv = self.socket.recv_from(&mut self.buf);
        let (n, addr) = match tokio::time::timeout(timeout, recv).await {
            Ok(result) => result?,
            Err(_) => return Ok(None),
        };
        let data = Bytes::copy_from_slice(&self.buf[..n]);

        let mut peers = self.peers.lock();
        if let Some(last_seen) = peers.last_seen.get_mut(&addr) {
            *last_seen = Instant::now();
            return Ok(Some(HostEvent::Receive { addr, data }));
        }

        if peers.last_seen.len() >= self.max_peers {
            tracing::warn!("Peer limit reached, dropping datagram from {}", addr);
            return Ok(None);
        }

        peers.last_seen.insert(addr, Instant::now());
        peers.pending.push_back(HostEvent::Receive { addr, data });
        Ok(Some(HostEvent::Connect { addr }))
    }

    fn next_pending(&mut self) -> Option<HostEvent> {
        let mut peers = self.peers.lock();
        if let Some(event) = peers.pending.pop_front() {
            return Some(event);
        }

        let idle_timeout = self.idle_timeout;
        let expired: Vec<SocketAddr> = peers
            .last_seen
            .iter()
            .filter(|(_, seen)| seen.elapsed() > idle_timeout)
            .map(|(addr, _)| *addr)
            .collect();

        for addr in expired {
            tracing::debug!("[{}] Idle timeout", addr);
            peers.last_seen.remove(&addr);
            peers.pending.push_back(HostEvent::Disconnect { addr });
        }

        peers.pending.pop_front()
    }
}

/// Cloneable handle to a bound host.
#[derive(Clone)]
pub struct HostHandle {
    socket: Arc<UdpSocket>,
    peers: Arc<Mutex<PeerTable>>,
}

impl HostHandle {
    /// Sends one datagram to a peer.
    pub async fn send(&self, addr: SocketAddr, data: &[u8]) -> Result<(), ServerError> {
        self.socket.send_to(data, addr).await?;
        Ok(())
    }

    /// Disconnects a peer. The matching `Disconnect` event is reported by
    /// the next call to [`Host::service`].
    ///
    /// Returns false if the peer was not connected.
    pub fn disconnect(&self, addr: SocketAddr) -> bool {
        let mut peers = self.peers.lock();
        if peers.last_seen.remove(&addr).is_none() {
            return false;
        }
        peers.pending.push_back(HostEvent::Disconnect { addr });
        true
    }

    pub fn is_connected(&self, addr: SocketAddr) -> bool {
        self.peers.lock().last_seen.contains_key(&addr)
    }
}
