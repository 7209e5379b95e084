//! Process-scoped masternode context
//!
//! One [`Context`] per node process, created at startup and passed
//! explicitly to every validation entry point. It bundles the network
//! parameters, the registry and the external collaborators (chain lock,
//! spork oracle, relay queue, clock), replacing the ambient globals the
//! protocol is usually written against.

use crate::broadcast::MasternodeBroadcast;
use crate::chain::{BlockHashCache, ChainBackend, ChainLock};
use crate::error::Rejection;
use crate::payments::PaymentHistory;
use crate::ping::{MasternodePing, PingCheckOptions};
use crate::registry::MasternodeRegistry;
use crate::relay::{Inventory, RelayQueue};
use crate::spork::{SporkOracle, StaticSporks};
use chrono::Utc;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use vireo_core::OutPoint;
use vireo_crypto::PublicKey;

use crate::config::NetworkParams;

/// Wall clock, network-adjusted upstream. Tests pin it to a fixed
/// value so window arithmetic is deterministic.
#[derive(Clone)]
pub struct Clock {
    fixed: Option<Arc<AtomicI64>>,
}

impl Clock {
    pub fn system() -> Self {
        Clock { fixed: None }
    }

    pub fn fixed(start: i64) -> Self {
        Clock {
            fixed: Some(Arc::new(AtomicI64::new(start))),
        }
    }

    pub fn now(&self) -> i64 {
        match &self.fixed {
            Some(t) => t.load(Ordering::SeqCst),
            None => Utc::now().timestamp(),
        }
    }

    /// Move a fixed clock; no-op on the system clock
    pub fn set(&self, t: i64) {
        if let Some(fixed) = &self.fixed {
            fixed.store(t, Ordering::SeqCst);
        }
    }

    pub fn advance(&self, secs: i64) {
        if let Some(fixed) = &self.fixed {
            fixed.fetch_add(secs, Ordering::SeqCst);
        }
    }
}

/// Identity of the masternode this process operates, if any
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub collateral: OutPoint,
    pub operator_key: PublicKey,
}

/// Recorded remote ("hot-swap") activation, consumed by the local
/// masternode manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotSwapEvent {
    pub collateral: OutPoint,
    pub addr: SocketAddr,
}

pub struct Context {
    pub params: NetworkParams,
    pub clock: Clock,
    pub chain: ChainLock,
    pub block_hashes: BlockHashCache,
    pub registry: MasternodeRegistry,
    pub payments: PaymentHistory,
    pub sporks: Arc<dyn SporkOracle>,
    pub relay: RelayQueue,
    pub local: Option<LocalIdentity>,
    synced: AtomicBool,
    hot_swap: Mutex<Option<HotSwapEvent>>,
}

impl Context {
    /// Build a context around a chain backend. Returns the receiving
    /// end of the relay queue for the peer layer to drain.
    pub fn new<B: ChainBackend + 'static>(
        params: NetworkParams,
        backend: B,
    ) -> (Self, mpsc::UnboundedReceiver<Inventory>) {
        let (relay, relay_rx) = RelayQueue::new();
        let ctx = Context {
            params,
            clock: Clock::system(),
            chain: ChainLock::new(backend),
            block_hashes: BlockHashCache::new(),
            registry: MasternodeRegistry::new(),
            payments: PaymentHistory::new(),
            sporks: Arc::new(StaticSporks::new()),
            relay,
            local: None,
            synced: AtomicBool::new(false),
            hot_swap: Mutex::new(None),
        };
        (ctx, relay_rx)
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    /// Mark initial sync complete. The replay caches accumulated while
    /// syncing are reset so post-sync gossip starts from a clean slate.
    pub fn set_synced(&self, synced: bool) {
        let was = self.synced.swap(synced, Ordering::SeqCst);
        if synced && !was {
            self.registry.reset_seen_caches();
        }
    }

    pub(crate) fn record_hot_swap(&self, event: HotSwapEvent) {
        *self.hot_swap.lock() = Some(event);
    }

    /// Take the pending remote activation, if one was admitted
    pub fn take_hot_swap(&self) -> Option<HotSwapEvent> {
        self.hot_swap.lock().take()
    }

    /// Gossip intake for a masternode broadcast: content-hash dedup,
    /// update path, then admission for first-time sightings. Transient
    /// rejections evict the message from the replay cache so peers can
    /// deliver it again.
    pub fn submit_broadcast(&self, mnb: MasternodeBroadcast) -> Result<(), Rejection> {
        let hash = mnb.hash();
        if !self.registry.note_broadcast(hash, mnb.clone()) {
            // already seen, nothing to do
            return Ok(());
        }

        let result = mnb.check_and_update(self).and_then(|_| {
            // unknown or no-longer-enabled references go through the
            // admission path, which replaces a disabled leftover
            let needs_admission = match self.registry.find(&mnb.collateral.prevout) {
                Some(entry) => !entry.lock().is_enabled(),
                None => true,
            };
            if needs_admission {
                mnb.check_inputs_and_add(self)
            } else {
                Ok(())
            }
        });

        if let Err(rejection) = &result {
            if rejection.is_transient() {
                self.registry.forget_broadcast(&hash);
            }
        }
        result
    }

    /// Gossip intake for a masternode ping, with the same dedup and
    /// retry policy as [`Context::submit_broadcast`]
    pub fn submit_ping(&self, ping: MasternodePing) -> Result<(), Rejection> {
        let hash = ping.hash();
        if !self.registry.note_ping(hash, ping.clone()) {
            return Ok(());
        }

        let result = ping.check_and_update(self, PingCheckOptions::default());

        if let Err(rejection) = &result {
            if rejection.is_transient() {
                self.registry.forget_ping(&hash);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = Clock::fixed(1000);
        assert_eq!(clock.now(), 1000);
        clock.advance(50);
        assert_eq!(clock.now(), 1050);
        clock.set(10);
        assert_eq!(clock.now(), 10);
    }

    #[test]
    fn test_system_clock_ignores_set() {
        let clock = Clock::system();
        let before = clock.now();
        clock.set(0);
        assert!(clock.now() >= before);
    }
}
