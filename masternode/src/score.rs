//! Deterministic masternode scoring
//!
//! Every node that agrees on the block hash at a height derives the
//! same score for every masternode, so winner selection needs no
//! coordination round. The score is the absolute distance between two
//! hash points, one derived from the block alone and one salted with
//! the collateral reference.

use crate::chain::{block_hash, BlockHashCache, ChainBackend};
use crate::context::Context;
use crate::masternode::Masternode;
use log::debug;
use vireo_core::{Hash256, OutPoint};

/// Score one collateral reference against the block at `height`
/// (`None` for the tip). Fails closed: if the block hash cannot be
/// resolved the score is zero, the worst possible value.
pub fn calculate_score(
    chain: &dyn ChainBackend,
    cache: &BlockHashCache,
    collateral: &OutPoint,
    height: Option<u64>,
) -> Hash256 {
    let Some(hash) = block_hash(chain, cache, height) else {
        debug!(
            "score: no block hash at {:?}, scoring {} as zero",
            height, collateral
        );
        return Hash256::ZERO;
    };

    let aux = collateral.txid.wrapping_add(collateral.vout as u64);

    let base = Hash256::digest(hash.as_bytes());

    let mut salted_input = Vec::with_capacity(64);
    salted_input.extend_from_slice(hash.as_bytes());
    salted_input.extend_from_slice(aux.as_bytes());
    let salted = Hash256::digest(&salted_input);

    salted.abs_diff(&base)
}

/// One entry in a height's ranking
#[derive(Debug, Clone)]
pub struct ScoredMasternode {
    pub collateral: OutPoint,
    pub score: Hash256,
}

/// Rank every enabled masternode at `height`, best score first.
///
/// Works on snapshots, so a ranking pass never holds any entity lock
/// across the scoring loop.
pub fn rank_masternodes(ctx: &Context, height: Option<u64>) -> Vec<ScoredMasternode> {
    let Some(chain) = ctx.chain.try_read() else {
        return Vec::new();
    };

    let mut ranked: Vec<ScoredMasternode> = ctx
        .registry
        .enabled()
        .iter()
        .map(|mn| ScoredMasternode {
            collateral: mn.collateral,
            score: calculate_score(&**chain, &ctx.block_hashes, &mn.collateral, height),
        })
        .collect();

    ranked.sort_by(|a, b| b.score.cmp(&a.score).then(a.collateral.cmp(&b.collateral)));
    ranked
}

/// Position of one masternode in the ranking at `height`, 1-based.
/// `None` when the node is absent or not enabled.
pub fn masternode_rank(ctx: &Context, collateral: &OutPoint, height: Option<u64>) -> Option<usize> {
    rank_masternodes(ctx, height)
        .iter()
        .position(|entry| entry.collateral == *collateral)
        .map(|idx| idx + 1)
}

/// The best-scoring enabled masternode at `height`
pub fn best_masternode(ctx: &Context, height: Option<u64>) -> Option<Masternode> {
    let winner = rank_masternodes(ctx, height).into_iter().next()?;
    ctx.registry.snapshot(&winner.collateral)
}
