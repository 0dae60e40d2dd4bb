//! Connected peers and their stable roster slots
//!
//! The roster is the host's view of who is playing:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - A stable slot per peer, which fixes its colour and station rotation
//! - Address lookup for routing incoming datagrams and scoped sends
//!
//! Slots are handed out lowest-free-first and never move while a peer stays
//! connected, so `station = (slot + round) mod 5` holds for the whole session.

use log::info;
use shared::{peer_color, CONNECTION_TIMEOUT_SECS};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected peer
#[derive(Debug)]
pub struct Peer {
    /// Unique connection identifier assigned by the host
    pub id: u32,
    /// Roster slot, 0-based, stable for the connection's lifetime
    pub slot: u8,
    /// Network address for sending replicated commands
    pub addr: SocketAddr,
    /// Last time we received any packet from this peer
    pub last_seen: Instant,
}

impl Peer {
    pub fn new(id: u32, slot: u8, addr: SocketAddr) -> Self {
        Self {
            id,
            slot,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Records traffic from this peer.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All peers taking part in the session
///
/// Enforces the station-count capacity and keeps slot assignment
/// deterministic. The orchestrator only ever sees the list of occupied
/// slots, never addresses.
pub struct Roster {
    /// Connected peers indexed by their connection ID
    peers: HashMap<u32, Peer>,
    next_peer_id: u32,
    max_peers: usize,
}

impl Roster {
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: HashMap::new(),
            next_peer_id: 1,
            max_peers,
        }
    }

    /// Admits a peer, returning its connection ID and slot.
    ///
    /// Returns None when every slot is taken. The new peer gets the lowest
    /// slot no connected peer holds, so a reconnecting player usually lands
    /// back on the slot they left.
    pub fn add_peer(&mut self, addr: SocketAddr) -> Option<(u32, u8)> {
        if self.peers.len() >= self.max_peers {
            return None;
        }

        let slot = (0..self.max_peers as u8).find(|slot| self.id_of_slot(*slot).is_none())?;

        let peer_id = self.next_peer_id;
        self.next_peer_id += 1;

        info!(
            "Peer {} connected from {} as slot {} ({})",
            peer_id,
            addr,
            slot,
            peer_color(slot)
        );
        self.peers.insert(peer_id, Peer::new(peer_id, slot, addr));

        Some((peer_id, slot))
    }

    /// Removes a peer. Returns false if it was already gone.
    pub fn remove_peer(&mut self, peer_id: &u32) -> bool {
        if let Some(peer) = self.peers.remove(peer_id) {
            info!("Peer {} (slot {}) disconnected", peer.id, peer.slot);
            true
        } else {
            false
        }
    }

    pub fn find_peer_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.peers
            .iter()
            .find(|(_, peer)| peer.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, peer_id: u32) -> Option<&Peer> {
        self.peers.get(&peer_id)
    }

    /// Marks a peer as recently heard from. Returns false for unknown IDs.
    pub fn touch(&mut self, peer_id: u32) -> bool {
        if let Some(peer) = self.peers.get_mut(&peer_id) {
            peer.touch();
            true
        } else {
            false
        }
    }

    fn id_of_slot(&self, slot: u8) -> Option<u32> {
        self.peers
            .values()
            .find(|peer| peer.slot == slot)
            .map(|peer| peer.id)
    }

    pub fn addr_of_slot(&self, slot: u8) -> Option<SocketAddr> {
        self.peers
            .values()
            .find(|peer| peer.slot == slot)
            .map(|peer| peer.addr)
    }

    /// Occupied slots in ascending order.
    pub fn slots(&self) -> Vec<u8> {
        let mut slots: Vec<u8> = self.peers.values().map(|peer| peer.slot).collect();
        slots.sort_unstable();
        slots
    }

    /// Every peer address, in slot order.
    pub fn addrs(&self) -> Vec<SocketAddr> {
        let mut peers: Vec<&Peer> = self.peers.values().collect();
        peers.sort_by_key(|peer| peer.slot);
        peers.into_iter().map(|peer| peer.addr).collect()
    }

    /// Drops peers silent for longer than the connection timeout and
    /// returns their IDs.
    pub fn check_timeouts(&mut self) -> Vec<u32> {
        let timeout = Duration::from_secs(CONNECTION_TIMEOUT_SECS);
        let timed_out: Vec<u32> = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for peer_id in &timed_out {
            self.remove_peer(peer_id);
        }

        timed_out
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
