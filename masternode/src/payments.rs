//! Payment history and last-paid resolution
//!
//! The history records which payee script each block's winner votes
//! settled on. Last-paid resolution walks it backwards from the tip to
//! answer "when was this masternode last rewarded", the input to the
//! payment-fairness ordering.

use crate::context::Context;
use crate::masternode::Masternode;
use dashmap::DashMap;
use std::collections::HashMap;
use vireo_core::{Hash256, Script};

/// Votes a payee needs at a height before last-paid resolution trusts
/// the record
pub const MIN_PAYMENT_VOTES: u32 = 2;

/// Spread in seconds added to a last-paid timestamp so masternodes paid
/// in the same block do not tie
const LAST_PAID_OFFSET_RANGE: u64 = 150;

/// A month of seconds; payments older than this stop influencing the
/// ordering directly
const PAYMENT_CYCLE_CUTOFF: i64 = 60 * 60 * 24 * 30;

/// Per-height winner-vote tallies, keyed by payee script
#[derive(Default)]
pub struct PaymentHistory {
    blocks: DashMap<u64, HashMap<Script, u32>>,
}

impl PaymentHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tally one winner vote for `payee` at `height`
    pub fn record_vote(&self, height: u64, payee: Script) {
        let mut tallies = self.blocks.entry(height).or_default();
        *tallies.entry(payee).or_insert(0) += 1;
    }

    pub fn has_payee_with_votes(&self, height: u64, payee: &Script, min_votes: u32) -> bool {
        match self.blocks.get(&height) {
            Some(tallies) => tallies.get(payee).is_some_and(|votes| *votes >= min_votes),
            None => false,
        }
    }

    /// Drop tallies for heights below `height`
    pub fn prune_below(&self, height: u64) {
        self.blocks.retain(|h, _| *h >= height);
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Stable per-masternode jitter derived from its registration, spread
/// over [0, 150) seconds
fn last_paid_offset(mn: &Masternode) -> i64 {
    let hash = Hash256::digest(format!("{}{}", mn.collateral, mn.sig_time).as_bytes());
    (hash.low_u64() % LAST_PAID_OFFSET_RANGE) as i64
}

/// When this masternode was last paid, as a block timestamp plus a
/// stable per-node offset. Zero when no payment is found.
///
/// The scan walks back from the tip over at most 1.25x the enabled
/// count, on the grounds that a node due for payment must have been
/// paid within roughly one full cycle.
pub fn get_last_paid(ctx: &Context, mn: &Masternode) -> i64 {
    let Some(chain) = ctx.chain.try_read() else {
        return 0;
    };
    let Some(tip) = chain.tip_height() else {
        return 0;
    };

    let payee = Script::pay_to_pubkey_hash(mn.collateral_key.as_bytes());
    let offset = last_paid_offset(mn);

    // nodes compete for payment within their own tier
    let enabled = ctx.registry.count_enabled_level(mn.level(tip), tip) as u64;
    let depth = enabled * 5 / 4;

    for back in 0..depth {
        let Some(height) = tip.checked_sub(back) else {
            break;
        };
        if ctx
            .payments
            .has_payee_with_votes(height, &payee, MIN_PAYMENT_VOTES)
        {
            let Some(block_time) = chain.block_time_at(height) else {
                continue;
            };
            return block_time + offset;
        }
    }

    0
}

/// Seconds since this masternode was last paid, the fairness ordering
/// key. Nodes outside the one-month window (including never-paid ones)
/// fall back to a stable hash-derived value past the cutoff, so their
/// relative order is deterministic without being gameable.
pub fn seconds_since_payment(ctx: &Context, mn: &Masternode) -> i64 {
    let last_paid = get_last_paid(ctx, mn);
    let elapsed = ctx.now() - last_paid;

    if last_paid > 0 && elapsed < PAYMENT_CYCLE_CUTOFF {
        return elapsed;
    }

    let hash = Hash256::digest(format!("{}{}", mn.collateral, mn.sig_time).as_bytes());
    PAYMENT_CYCLE_CUTOFF + (hash.low_u64() & 0xffff_ffff) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{harness, TestNode};

    #[test]
    fn test_vote_threshold() {
        let history = PaymentHistory::new();
        let payee = Script::pay_to_pubkey_hash(&[0x02; 32]);

        history.record_vote(100, payee.clone());
        assert!(!history.has_payee_with_votes(100, &payee, MIN_PAYMENT_VOTES));

        history.record_vote(100, payee.clone());
        assert!(history.has_payee_with_votes(100, &payee, MIN_PAYMENT_VOTES));

        // votes do not leak across heights or payees
        assert!(!history.has_payee_with_votes(101, &payee, MIN_PAYMENT_VOTES));
        let other = Script::pay_to_pubkey_hash(&[0x03; 32]);
        assert!(!history.has_payee_with_votes(100, &other, 1));
    }

    #[test]
    fn test_prune_below() {
        let history = PaymentHistory::new();
        let payee = Script::pay_to_pubkey_hash(&[0x02; 32]);
        for height in [10, 20, 30] {
            history.record_vote(height, payee.clone());
        }

        history.prune_below(20);
        assert_eq!(history.len(), 2);
        assert!(!history.has_payee_with_votes(10, &payee, 1));
        assert!(history.has_payee_with_votes(30, &payee, 1));
    }

    #[test]
    fn test_never_paid_is_zero() {
        let mut h = harness(200);
        let node = TestNode::register(&mut h);
        let mn = h.ctx.registry.snapshot(&node.collateral).unwrap();

        assert_eq!(get_last_paid(&h.ctx, &mn), 0);
    }

    #[test]
    fn test_last_paid_is_block_time_plus_offset() {
        let mut h = harness(200);
        let node = TestNode::register(&mut h);
        let mn = h.ctx.registry.snapshot(&node.collateral).unwrap();
        let payee = Script::pay_to_pubkey_hash(mn.collateral_key.as_bytes());

        h.ctx.payments.record_vote(200, payee.clone());
        h.ctx.payments.record_vote(200, payee);

        let last_paid = get_last_paid(&h.ctx, &mn);
        let block_time = h.chain.time_at(200);
        assert!(last_paid >= block_time);
        assert!(last_paid < block_time + LAST_PAID_OFFSET_RANGE as i64);

        // the offset is stable across calls
        assert_eq!(get_last_paid(&h.ctx, &mn), last_paid);
    }

    #[test]
    fn test_single_vote_not_trusted() {
        let mut h = harness(200);
        let node = TestNode::register(&mut h);
        let mn = h.ctx.registry.snapshot(&node.collateral).unwrap();
        let payee = Script::pay_to_pubkey_hash(mn.collateral_key.as_bytes());

        h.ctx.payments.record_vote(200, payee);
        assert_eq!(get_last_paid(&h.ctx, &mn), 0);
    }

    #[test]
    fn test_scan_depth_scales_with_enabled_count() {
        let mut h = harness(200);
        let node = TestNode::register(&mut h);
        for _ in 0..3 {
            TestNode::register(&mut h);
        }
        // 4 enabled nodes: depth 4 * 5 / 4 = 5, covering heights 196..=200
        let mn = h.ctx.registry.snapshot(&node.collateral).unwrap();
        let payee = Script::pay_to_pubkey_hash(mn.collateral_key.as_bytes());

        h.ctx.payments.record_vote(195, payee.clone());
        h.ctx.payments.record_vote(195, payee.clone());
        assert_eq!(get_last_paid(&h.ctx, &mn), 0);

        h.ctx.payments.record_vote(196, payee.clone());
        h.ctx.payments.record_vote(196, payee);
        assert!(get_last_paid(&h.ctx, &mn) > 0);
    }

    #[test]
    fn test_recent_payment_orders_by_elapsed_time() {
        let mut h = harness(200);
        let node = TestNode::register(&mut h);
        let mn = h.ctx.registry.snapshot(&node.collateral).unwrap();
        let payee = Script::pay_to_pubkey_hash(mn.collateral_key.as_bytes());

        h.ctx.payments.record_vote(200, payee.clone());
        h.ctx.payments.record_vote(200, payee);

        let elapsed = seconds_since_payment(&h.ctx, &mn);
        assert_eq!(elapsed, h.ctx.now() - get_last_paid(&h.ctx, &mn));
        assert!(elapsed < PAYMENT_CYCLE_CUTOFF);
    }

    #[test]
    fn test_never_paid_falls_past_cutoff_deterministically() {
        let mut h = harness(200);
        let node = TestNode::register(&mut h);
        let mn = h.ctx.registry.snapshot(&node.collateral).unwrap();

        let a = seconds_since_payment(&h.ctx, &mn);
        let b = seconds_since_payment(&h.ctx, &mn);
        assert_eq!(a, b);
        assert!(a >= PAYMENT_CYCLE_CUTOFF);
    }
}
