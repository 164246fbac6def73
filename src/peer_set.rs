//! Registry of connected peers (spec §4.F).
//!
//! Backed by a `dashmap::DashMap` rather than a `parking_lot::RwLock<HashMap<..>>`
//! the way the teacher's `AuthSwarm`/responder tables are, since registration
//! and iteration both happen from many concurrent tasks and neither should
//! block the other.

use std::sync::Arc;

use dashmap::DashMap;

use crate::entities::SCStatus;
use crate::error::PeerSetError;
use crate::peer::Peer;

/// Tracks every `Ready` peer this node is connected to.
pub struct PeerSet {
    peers: DashMap<String, Arc<Peer>>,
    closed: std::sync::atomic::AtomicBool,
}

impl PeerSet {
    pub fn new() -> Self {
        PeerSet {
            peers: DashMap::new(),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn register(&self, peer: Arc<Peer>) -> Result<(), PeerSetError> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(PeerSetError::Closed);
        }
        let id = peer.id().to_string();
        match self.peers.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(PeerSetError::AlreadyRegistered(id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(peer);
                Ok(())
            }
        }
    }

    pub fn unregister(&self, id: &str) -> Result<(), PeerSetError> {
        self.peers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PeerSetError::NotRegistered(id.to_string()))
    }

    pub fn peer(&self, id: &str) -> Option<Arc<Peer>> {
        self.peers.get(id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Arc<Peer>)) {
        for entry in self.peers.iter() {
            f(entry.value());
        }
    }

    /// Picks a peer to sync from. Spec §9 leaves the selection policy open;
    /// DESIGN.md records the choice made here: prefer the peer with the
    /// highest reported `Height`, falling back to none if the set is empty.
    pub fn best_peer(&self) -> Option<Arc<Peer>> {
        self.peers
            .iter()
            .max_by_key(|entry| entry.value().status().height)
            .map(|entry| entry.value().clone())
    }

    /// Closes every peer and marks the set closed to further registration.
    pub fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        for entry in self.peers.iter() {
            entry.value().close();
        }
        self.peers.clear();
    }

    /// The best status among all registered peers, for deciding whether a
    /// sync round is worth starting.
    pub fn best_status(&self) -> Option<SCStatus> {
        self.peers
            .iter()
            .map(|entry| entry.value().status())
            .max_by_key(|s| s.height)
    }
}

impl Default for PeerSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::entities::SCStatus;
    use smol::channel::bounded;

    fn fake_peer(id: &str, height: u64) -> Arc<Peer> {
        let config = Config::default();
        let (msg_tx, _msg_rx) = bounded(config.queue_capacity);
        let (vote_tx, _vote_rx) = bounded(config.queue_capacity);
        let (close_tx, _close_rx) = bounded(1);
        Arc::new(Peer::new_for_test(
            id.to_string(),
            SCStatus {
                height,
                ..Default::default()
            },
            msg_tx,
            vote_tx,
            close_tx,
        ))
    }

    #[test]
    fn register_then_duplicate_fails() {
        let set = PeerSet::new();
        set.register(fake_peer("a", 0)).unwrap();
        let err = set.register(fake_peer("a", 0)).unwrap_err();
        assert_eq!(err, PeerSetError::AlreadyRegistered("a".to_string()));
    }

    #[test]
    fn best_peer_is_highest_reported_height() {
        let set = PeerSet::new();
        set.register(fake_peer("a", 10)).unwrap();
        set.register(fake_peer("b", 50)).unwrap();
        set.register(fake_peer("c", 30)).unwrap();
        assert_eq!(set.best_peer().unwrap().id(), "b");
    }

    #[test]
    fn close_empties_the_set_and_blocks_registration() {
        let set = PeerSet::new();
        set.register(fake_peer("a", 0)).unwrap();
        set.close();
        assert!(set.is_empty());
        let err = set.register(fake_peer("b", 0)).unwrap_err();
        assert_eq!(err, PeerSetError::Closed);
    }

    #[test]
    fn unregister_missing_peer_fails() {
        let set = PeerSet::new();
        let err = set.unregister("ghost").unwrap_err();
        assert_eq!(err, PeerSetError::NotRegistered("ghost".to_string()));
    }
}
