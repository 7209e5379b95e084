//! Chain state access for masternode validation
//!
//! The chain/mempool engine lives elsewhere in the node; validation
//! only sees it through [`ChainBackend`], and only under a non-blocking
//! lock acquisition. Contention is "try later", never a failure.

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use vireo_core::{Hash256, OutPoint};

/// A prior transaction output as the chain sees it right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputInfo {
    pub value: u64,
    pub spent: bool,
}

/// Read access to chain and mempool state.
///
/// All lookups are synchronous; `None` means "not known to this node",
/// which callers treat as transient rather than as a validation verdict.
pub trait ChainBackend: Send {
    /// Height of the current best tip, if any chain is loaded
    fn tip_height(&self) -> Option<u64>;

    /// Hash of the best-chain block at the given height
    fn block_hash_at(&self, height: u64) -> Option<Hash256>;

    /// Timestamp of the best-chain block at the given height
    fn block_time_at(&self, height: u64) -> Option<i64>;

    /// Height of a block hash in the index, if known
    fn block_height_of(&self, hash: &Hash256) -> Option<u64>;

    /// Height of the block that confirmed the given transaction
    fn tx_block_height(&self, txid: &Hash256) -> Option<u64>;

    /// Resolve a prior output to its value and spent flag
    fn resolve_output(&self, outpoint: &OutPoint) -> Option<OutputInfo>;

    /// Whether the input would be accepted as spendable against the
    /// current chain plus mempool
    fn is_acceptable_input(&self, outpoint: &OutPoint) -> bool;
}

/// The process-wide chain lock. Masternode validation only ever tries
/// the lock; it never blocks behind block processing.
pub struct ChainLock {
    inner: Mutex<Box<dyn ChainBackend>>,
}

impl ChainLock {
    pub fn new<B: ChainBackend + 'static>(backend: B) -> Self {
        ChainLock {
            inner: Mutex::new(Box::new(backend)),
        }
    }

    /// Non-blocking acquisition; `None` means the chain is busy
    pub fn try_read(&self) -> Option<MutexGuard<'_, Box<dyn ChainBackend>>> {
        self.inner.try_lock()
    }
}

/// Lazily-populated height -> hash memoization.
///
/// Entries are append-only: a height below the tip is immutable under
/// this model, so cached hashes are never invalidated.
#[derive(Default)]
pub struct BlockHashCache {
    hashes: DashMap<u64, Hash256>,
}

impl BlockHashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// Resolve the best-chain block hash at `height`, defaulting to the tip
/// when `height` is `None`, memoizing through `cache`.
pub fn block_hash(
    chain: &dyn ChainBackend,
    cache: &BlockHashCache,
    height: Option<u64>,
) -> Option<Hash256> {
    let tip = chain.tip_height()?;
    let height = height.unwrap_or(tip);

    if height > tip {
        return None;
    }

    if let Some(cached) = cache.hashes.get(&height) {
        return Some(*cached);
    }

    let hash = chain.block_hash_at(height)?;
    cache.hashes.insert(height, hash);
    Some(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockChain;

    #[test]
    fn test_block_hash_defaults_to_tip() {
        let chain = MockChain::with_blocks(10);
        let cache = BlockHashCache::new();
        let tip_hash = block_hash(&chain, &cache, None).unwrap();
        assert_eq!(tip_hash, chain.block_hash_at(10).unwrap());
    }

    #[test]
    fn test_block_hash_above_tip_unavailable() {
        let chain = MockChain::with_blocks(5);
        let cache = BlockHashCache::new();
        assert!(block_hash(&chain, &cache, Some(6)).is_none());
    }

    #[test]
    fn test_block_hash_memoizes() {
        let chain = MockChain::with_blocks(5);
        let cache = BlockHashCache::new();
        assert!(cache.is_empty());
        assert!(block_hash(&chain, &cache, Some(3)).is_some());
        assert_eq!(cache.len(), 1);
        // second lookup hits the cache
        assert_eq!(
            block_hash(&chain, &cache, Some(3)),
            chain.block_hash_at(3)
        );
    }

    #[test]
    fn test_try_read_contended() {
        let lock = ChainLock::new(MockChain::with_blocks(1));
        let guard = lock.try_read();
        assert!(guard.is_some());
        assert!(lock.try_read().is_none());
        drop(guard);
        assert!(lock.try_read().is_some());
    }
}
