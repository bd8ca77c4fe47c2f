//! Cluster memory link
//!
//! Each controller owns its local [`ClusterMemory`] and a read-only mirror
//! of the peer's. Changes are published as whole snapshots over a channel;
//! the peer applies them in order when it polls. No memory is shared
//! between the two sides.

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};

use serde::{Deserialize, Serialize};

use super::flags::ClusterFlags;

/// The clustered part of a raid group's metadata memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMemory {
    pub flags: ClusterFlags,
    pub capacity_expansion_blocks: u64,
}

/// Notification delivered to a controller by its link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerNotification {
    MemoryUpdated(ClusterMemory),
    ContactLost,
}

pub struct ClusterLink {
    local: ClusterMemory,
    peer: ClusterMemory,
    peer_present: bool,
    dirty: bool,
    outbound: Sender<PeerNotification>,
    inbound: Receiver<PeerNotification>,
}

/// Two links wired to each other.
pub fn link_pair() -> (ClusterLink, ClusterLink) {
    let (a_tx, a_rx) = channel();
    let (b_tx, b_rx) = channel();
    (ClusterLink::new(a_tx, b_rx, true), ClusterLink::new(b_tx, a_rx, true))
}

impl ClusterLink {
    fn new(
        outbound: Sender<PeerNotification>,
        inbound: Receiver<PeerNotification>,
        peer_present: bool,
    ) -> Self {
        Self {
            local: ClusterMemory::default(),
            peer: ClusterMemory::default(),
            peer_present,
            dirty: false,
            outbound,
            inbound,
        }
    }

    /// A link for a controller running without a peer.
    pub fn standalone() -> Self {
        let (tx, rx) = channel();
        Self::new(tx, rx, false)
    }

    pub fn local(&self) -> &ClusterMemory {
        &self.local
    }

    /// Last snapshot received from the peer. Cleared when contact is lost.
    pub fn peer(&self) -> &ClusterMemory {
        &self.peer
    }

    pub fn is_peer_present(&self) -> bool {
        self.peer_present
    }

    pub fn is_local_flag_set(&self, flag: ClusterFlags) -> bool {
        self.local.flags.contains(flag)
    }

    /// False whenever the peer is absent.
    pub fn is_peer_flag_set(&self, flag: ClusterFlags) -> bool {
        self.peer_present && self.peer.flags.contains(flag)
    }

    pub fn set_local_flag(&mut self, flag: ClusterFlags) {
        if !self.local.flags.contains(flag) {
            self.local.flags.insert(flag);
            self.dirty = true;
        }
    }

    pub fn clear_local_flag(&mut self, flag: ClusterFlags) {
        if self.local.flags.intersects(flag) {
            self.local.flags.remove(flag);
            self.dirty = true;
        }
    }

    pub fn capacity_expansion_blocks(&self) -> u64 {
        self.local.capacity_expansion_blocks
    }

    pub fn set_capacity_expansion_blocks(&mut self, blocks: u64) {
        if self.local.capacity_expansion_blocks != blocks {
            self.local.capacity_expansion_blocks = blocks;
            self.dirty = true;
        }
    }

    pub fn peer_capacity_expansion_blocks(&self) -> u64 {
        if self.peer_present {
            self.peer.capacity_expansion_blocks
        } else {
            0
        }
    }

    /// Send the local memory to the peer if it changed since the last send.
    ///
    /// Returns whether a snapshot was sent.
    pub fn publish(&mut self) -> bool {
        if !self.dirty || !self.peer_present {
            return false;
        }
        if self
            .outbound
            .send(PeerNotification::MemoryUpdated(self.local))
            .is_err()
        {
            self.lose_peer();
            return false;
        }
        self.dirty = false;
        true
    }

    /// Drain every notification from the peer, oldest first, applying each
    /// to the mirror.
    pub fn poll(&mut self) -> Vec<PeerNotification> {
        let mut notifications = Vec::new();
        loop {
            match self.inbound.try_recv() {
                Ok(PeerNotification::MemoryUpdated(memory)) => {
                    if self.peer_present {
                        self.peer = memory;
                        notifications.push(PeerNotification::MemoryUpdated(memory));
                    }
                }
                Ok(PeerNotification::ContactLost) => {
                    if self.peer_present {
                        self.lose_peer();
                        notifications.push(PeerNotification::ContactLost);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.peer_present {
                        self.lose_peer();
                        notifications.push(PeerNotification::ContactLost);
                    }
                    break;
                }
            }
        }
        notifications
    }

    /// Tell the peer this side is going away.
    pub fn sever(&mut self) {
        let _ = self.outbound.send(PeerNotification::ContactLost);
        self.lose_peer();
    }

    fn lose_peer(&mut self) {
        self.peer_present = false;
        self.peer = ClusterMemory::default();
    }
}
