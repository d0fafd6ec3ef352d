//! Peer registry.
//!
//! Maps net ids to peer addresses and back.

use dashmap::DashMap;
use std::net::SocketAddr;
use std::time::Instant;

/// A connected peer.
#[derive(Debug, Clone, Copy)]
pub struct PeerInfo {
    pub net_id: u32,
    pub addr: SocketAddr,
    pub connected_at: Instant,
}

/// Registry of connected peers.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    by_net_id: DashMap<u32, PeerInfo>,
    by_addr: DashMap<SocketAddr, u32>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer, replacing any previous entry for the same net id or address.
    pub fn insert(&self, net_id: u32, addr: SocketAddr) {
        if let Some((_, old)) = self.by_net_id.remove(&net_id) {
            self.by_addr.remove(&old.addr);
        }
        if let Some((_, old_id)) = self.by_addr.remove(&addr) {
            self.by_net_id.remove(&old_id);
        }

        self.by_net_id.insert(
            net_id,
            PeerInfo {
                net_id,
                addr,
                connected_at: Instant::now(),
            },
        );
        self.by_addr.insert(addr, net_id);
    }

    /// Removes a peer by net id.
    pub fn remove(&self, net_id: u32) -> Option<PeerInfo> {
        let (_, info) = self.by_net_id.remove(&net_id)?;
        self.by_addr.remove(&info.addr);
        Some(info)
    }

    /// Removes a peer by address.
    pub fn remove_addr(&self, addr: SocketAddr) -> Option<PeerInfo> {
        let (_, net_id) = self.by_addr.remove(&addr)?;
        self.by_net_id.remove(&net_id).map(|(_, info)| info)
    }

    pub fn get(&self, net_id: u32) -> Option<PeerInfo> {
        self.by_net_id.get(&net_id).map(|r| *r)
    }

    pub fn addr_of(&self, net_id: u32) -> Option<SocketAddr> {
        self.by_net_id.get(&net_id).map(|r| r.addr)
    }

    pub fn net_id_of(&self, addr: SocketAddr) -> Option<u32> {
        self.by_addr.get(&addr).map(|r| *r)
    }

    /// Returns the net ids of all connected peers.
    pub fn net_ids(&self) -> Vec<u32> {
        self.by_net_id.iter().map(|r| *r.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_net_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_net_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_insert_and_lookup() {
        let registry = PeerRegistry::new();
        registry.insert(0, addr(1000));
        registry.insert(1, addr(1001));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.addr_of(1), Some(addr(1001)));
        assert_eq!(registry.net_id_of(addr(1000)), Some(0));
        assert_eq!(registry.get(0).unwrap().addr, addr(1000));

        let mut ids = registry.net_ids();
        ids.sort();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_remove() {
        let registry = PeerRegistry::new();
        registry.insert(5, addr(2000));

        let info = registry.remove(5).unwrap();
        assert_eq!(info.addr, addr(2000));
        assert!(registry.is_empty());
        assert_eq!(registry.net_id_of(addr(2000)), None);
        assert!(registry.remove(5).is_none());
    }

    #[test]
    fn test_remove_by_addr() {
        let registry = PeerRegistry::new();
        registry.insert(7, addr(3000));

        let info = registry.remove_addr(addr(3000)).unwrap();
        assert_eq!(info.net_id, 7);
        assert_eq!(registry.addr_of(7), None);
        assert!(registry.remove_addr(addr(3000)).is_none());
    }

    #[test]
    fn test_reinsert_same_addr_replaces_net_id() {
        let registry = PeerRegistry::new();
        registry.insert(1, addr(4000));
        registry.insert(2, addr(4000));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.addr_of(1), None);
        assert_eq!(registry.net_id_of(addr(4000)), Some(2));
    }
}
