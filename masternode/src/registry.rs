//! The masternode registry
//!
//! Keyed by collateral reference, with each entity behind its own lock
//! so a slow check on one masternode never stalls gossip touching
//! another. The seen caches suppress gossip replay by content hash.

use crate::broadcast::MasternodeBroadcast;
use crate::context::Context;
use crate::masternode::{Masternode, MasternodeState};
use crate::ping::MasternodePing;
use dashmap::DashMap;
use log::{debug, info};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use vireo_core::{Hash256, OutPoint};

#[derive(Default)]
pub struct MasternodeRegistry {
    nodes: DashMap<OutPoint, Arc<Mutex<Masternode>>>,
    seen_broadcasts: DashMap<Hash256, MasternodeBroadcast>,
    seen_pings: DashMap<Hash256, MasternodePing>,
}

impl MasternodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, collateral: &OutPoint) -> Option<Arc<Mutex<Masternode>>> {
        self.nodes.get(collateral).map(|entry| Arc::clone(&entry))
    }

    pub fn find_by_addr(&self, addr: &SocketAddr) -> Option<Arc<Mutex<Masternode>>> {
        self.nodes
            .iter()
            .find(|entry| entry.value().lock().addr == *addr)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Point-in-time copy of one entity
    pub fn snapshot(&self, collateral: &OutPoint) -> Option<Masternode> {
        self.find(collateral).map(|entry| entry.lock().clone())
    }

    /// Point-in-time copies of every entity
    pub fn snapshot_all(&self) -> Vec<Masternode> {
        self.nodes
            .iter()
            .map(|entry| entry.value().lock().clone())
            .collect()
    }

    /// Insert a new entity; refuses to clobber an existing one
    pub fn add(&self, mn: Masternode) -> bool {
        let collateral = mn.collateral;
        match self.nodes.entry(collateral) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                debug!(
                    "registry: adding new masternode {} - count {}",
                    collateral,
                    self.nodes.len() + 1
                );
                slot.insert(Arc::new(Mutex::new(mn)));
                true
            }
        }
    }

    pub fn remove(&self, collateral: &OutPoint) -> bool {
        self.nodes.remove(collateral).is_some()
    }

    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    /// Enabled masternodes, optionally restricted to a minimum protocol
    /// version
    pub fn count_enabled(&self, min_protocol: Option<u32>) -> usize {
        self.nodes
            .iter()
            .filter(|entry| {
                let mn = entry.value().lock();
                mn.is_enabled() && min_protocol.map_or(true, |min| mn.protocol_version >= min)
            })
            .count()
    }

    /// Enabled masternodes in one collateral tier at the given height
    pub fn count_enabled_level(&self, level: u32, height: u64) -> usize {
        self.nodes
            .iter()
            .filter(|entry| {
                let mn = entry.value().lock();
                mn.is_enabled() && mn.level(height) == level
            })
            .count()
    }

    /// Copies of every enabled entity
    pub fn enabled(&self) -> Vec<Masternode> {
        self.nodes
            .iter()
            .filter_map(|entry| {
                let mn = entry.value().lock();
                mn.is_enabled().then(|| mn.clone())
            })
            .collect()
    }

    /// Periodic sweep: re-derive every state and drop the entities the
    /// state machine has marked for removal.
    pub fn check_and_remove(&self, ctx: &Context, force: bool) {
        let mut doomed = Vec::new();
        for entry in self.nodes.iter() {
            let mut mn = entry.value().lock();
            mn.check(force, ctx);
            if mn.state == MasternodeState::Remove || mn.state == MasternodeState::VinSpent {
                doomed.push(mn.collateral);
            }
        }

        for collateral in doomed {
            info!("registry: removing inactive masternode {}", collateral);
            self.nodes.remove(&collateral);
        }
    }

    /// Record a broadcast in the replay cache. `false` means we have
    /// already processed this exact message.
    pub fn note_broadcast(&self, hash: Hash256, mnb: MasternodeBroadcast) -> bool {
        match self.seen_broadcasts.entry(hash) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(mnb);
                true
            }
        }
    }

    pub fn note_ping(&self, hash: Hash256, ping: MasternodePing) -> bool {
        match self.seen_pings.entry(hash) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(ping);
                true
            }
        }
    }

    /// Evict a broadcast that failed for local, transient reasons so a
    /// later delivery gets a fresh chance
    pub fn forget_broadcast(&self, hash: &Hash256) {
        self.seen_broadcasts.remove(hash);
    }

    pub fn forget_ping(&self, hash: &Hash256) {
        self.seen_pings.remove(hash);
    }

    pub fn seen_broadcast(&self, hash: &Hash256) -> bool {
        self.seen_broadcasts.contains_key(hash)
    }

    pub fn seen_ping(&self, hash: &Hash256) -> bool {
        self.seen_pings.contains_key(hash)
    }

    /// Splice a newer ping into the cached broadcast so peers syncing
    /// from us receive current liveness instead of the admission-time
    /// ping. The broadcast hash does not cover the ping, so the cache
    /// key stays valid.
    pub fn refresh_seen_broadcast_ping(&self, hash: &Hash256, ping: MasternodePing) {
        if let Some(mut mnb) = self.seen_broadcasts.get_mut(hash) {
            mnb.last_ping = Some(ping);
        }
    }

    /// Drop both replay caches; used when initial sync completes
    pub fn reset_seen_caches(&self) {
        self.seen_broadcasts.clear();
        self.seen_pings.clear();
    }
}
