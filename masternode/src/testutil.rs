//! Shared unit-test fixtures: an in-memory chain backend, a context
//! harness with a pinned clock, and generators for masternode identities.

use crate::broadcast::MasternodeBroadcast;
use crate::chain::{ChainBackend, OutputInfo};
use crate::config::{NetworkParams, TestParamsBuilder, PROTOCOL_VERSION};
use crate::context::{Clock, Context};
use crate::masternode::Masternode;
use crate::ping::MasternodePing;
use crate::relay::Inventory;
use crate::spork::StaticSporks;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use vireo_core::{Hash256, OutPoint, COIN};
use vireo_crypto::KeyPair;

const GENESIS_TIME: i64 = 1_700_000_000;
const BLOCK_SPACING: i64 = 60;

#[derive(Default)]
struct MockChainInner {
    blocks: Vec<(Hash256, i64)>,
    outputs: HashMap<OutPoint, OutputInfo>,
    tx_heights: HashMap<Hash256, u64>,
}

/// In-memory chain backend. Clones share state, so the copy handed to
/// the context and the copy kept by the test mutate the same chain.
#[derive(Clone, Default)]
pub struct MockChain {
    inner: Arc<Mutex<MockChainInner>>,
}

impl MockChain {
    /// A best chain with blocks at heights `0..=height`, one block a
    /// minute from a fixed genesis time
    pub fn with_blocks(height: u64) -> Self {
        let blocks = (0..=height)
            .map(|h| {
                let hash = Hash256::digest(format!("block{}", h).as_bytes());
                (hash, GENESIS_TIME + h as i64 * BLOCK_SPACING)
            })
            .collect();
        MockChain {
            inner: Arc::new(Mutex::new(MockChainInner {
                blocks,
                outputs: HashMap::new(),
                tx_heights: HashMap::new(),
            })),
        }
    }

    /// Add an unspent output confirmed at `height`
    pub fn add_output(&self, outpoint: OutPoint, value: u64, height: u64) {
        let mut inner = self.inner.lock();
        inner.outputs.insert(
            outpoint,
            OutputInfo {
                value,
                spent: false,
            },
        );
        inner.tx_heights.insert(outpoint.txid, height);
    }

    pub fn spend_output(&self, outpoint: &OutPoint) {
        if let Some(info) = self.inner.lock().outputs.get_mut(outpoint) {
            info.spent = true;
        }
    }

    pub fn hash_at(&self, height: u64) -> Hash256 {
        self.inner.lock().blocks[height as usize].0
    }

    pub fn time_at(&self, height: u64) -> i64 {
        self.inner.lock().blocks[height as usize].1
    }

    pub fn tip(&self) -> u64 {
        self.inner.lock().blocks.len() as u64 - 1
    }
}

impl ChainBackend for MockChain {
    fn tip_height(&self) -> Option<u64> {
        let inner = self.inner.lock();
        (!inner.blocks.is_empty()).then(|| inner.blocks.len() as u64 - 1)
    }

    fn block_hash_at(&self, height: u64) -> Option<Hash256> {
        self.inner
            .lock()
            .blocks
            .get(height as usize)
            .map(|(hash, _)| *hash)
    }

    fn block_time_at(&self, height: u64) -> Option<i64> {
        self.inner
            .lock()
            .blocks
            .get(height as usize)
            .map(|(_, time)| *time)
    }

    fn block_height_of(&self, hash: &Hash256) -> Option<u64> {
        self.inner
            .lock()
            .blocks
            .iter()
            .position(|(h, _)| h == hash)
            .map(|idx| idx as u64)
    }

    fn tx_block_height(&self, txid: &Hash256) -> Option<u64> {
        self.inner.lock().tx_heights.get(txid).copied()
    }

    fn resolve_output(&self, outpoint: &OutPoint) -> Option<OutputInfo> {
        self.inner.lock().outputs.get(outpoint).copied()
    }

    fn is_acceptable_input(&self, outpoint: &OutPoint) -> bool {
        self.inner
            .lock()
            .outputs
            .get(outpoint)
            .map_or(false, |info| !info.spent)
    }
}

/// A context plus handles to the collaborators tests need to poke:
/// the shared mock chain, the spork switchboard and the relay receiver.
pub struct Harness {
    pub ctx: Context,
    pub chain: MockChain,
    pub sporks: Arc<StaticSporks>,
    relay_rx: mpsc::UnboundedReceiver<Inventory>,
}

impl Harness {
    /// Drain everything enqueued for relay so far
    pub fn relayed(&mut self) -> Vec<Inventory> {
        let mut out = Vec::new();
        while let Ok(inv) = self.relay_rx.try_recv() {
            out.push(inv);
        }
        out
    }
}

pub fn harness(blocks: u64) -> Harness {
    harness_with_params(blocks, TestParamsBuilder::new().build())
}

pub fn harness_with_params(blocks: u64, params: NetworkParams) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();

    let chain = MockChain::with_blocks(blocks);
    let (mut ctx, relay_rx) = Context::new(params, chain.clone());

    // pin the clock just past the tip so window arithmetic is exact
    ctx.clock = Clock::fixed(chain.time_at(blocks) + 1);

    let sporks = Arc::new(StaticSporks::new());
    ctx.sporks = sporks.clone();

    Harness {
        ctx,
        chain,
        sporks,
        relay_rx,
    }
}

static NEXT_HOST: AtomicU16 = AtomicU16::new(1);

/// One masternode identity: keys, a funded collateral on the mock
/// chain, and a unique announce address.
pub struct TestNode {
    pub collateral_owner: KeyPair,
    pub operator: KeyPair,
    pub collateral: OutPoint,
    pub addr: SocketAddr,
}

impl TestNode {
    /// Keys plus a tier-1 collateral confirmed comfortably behind the
    /// tip
    pub fn generate(h: &Harness) -> Self {
        Self::generate_at_height(h, h.chain.tip() - 40, COIN)
    }

    /// Collateral of `value` confirmed at the exact `height`
    pub fn generate_at_height(h: &Harness, height: u64, value: u64) -> Self {
        let collateral_owner = KeyPair::generate();
        let operator = KeyPair::generate();

        let txid = Hash256::digest(operator.public_key().as_bytes());
        let collateral = OutPoint::new(txid, 0);
        h.chain.add_output(collateral, value, height);

        let host = NEXT_HOST.fetch_add(1, Ordering::SeqCst);
        let addr = SocketAddr::from((
            [93, 184, (host >> 8) as u8, (host & 0xff) as u8],
            h.ctx.params.default_port,
        ));

        TestNode {
            collateral_owner,
            operator,
            collateral,
            addr,
        }
    }

    /// Generate and admit through the real broadcast path, draining
    /// whatever the admission relayed
    pub fn register(h: &mut Harness) -> Self {
        let node = Self::generate(h);
        let mnb = node.broadcast(&h.ctx);
        mnb.check_inputs_and_add(&h.ctx).unwrap();
        h.relayed();
        node
    }

    /// A signed ping for this node at the current clock
    pub fn ping(&self, ctx: &Context) -> MasternodePing {
        let mut ping = MasternodePing::new(self.collateral, ctx).unwrap();
        ping.sign(&self.operator, &ctx.clock).unwrap();
        ping
    }

    /// A signed broadcast with an embedded signed ping
    pub fn broadcast(&self, ctx: &Context) -> MasternodeBroadcast {
        let ping = self.ping(ctx);
        let mut mnb = MasternodeBroadcast::new(
            self.addr,
            self.collateral,
            self.collateral_owner.public_key(),
            self.operator.public_key(),
            PROTOCOL_VERSION,
            ctx.now(),
        );
        mnb.last_ping = Some(ping);
        mnb.sign(&self.collateral_owner, &ctx.clock).unwrap();
        mnb
    }

    /// The entity this node's broadcast would create, without going
    /// through admission
    pub fn masternode(&self, ctx: &Context) -> Masternode {
        let mnb = self.broadcast(ctx);
        let chain = ctx.chain.try_read().unwrap();
        Masternode::from_broadcast(&mnb, &**chain)
    }
}
