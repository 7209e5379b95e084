//! Masternode liveness heartbeats (MNPING)

use crate::broadcast::MasternodeBroadcast;
use crate::config::{
    MASTERNODE_MAX_SIG_TIME_SKEW, MASTERNODE_MIN_MNP_SECONDS, MASTERNODE_PING_BLOCK_DEPTH,
};
use crate::context::{Clock, Context};
use crate::error::{MasternodeError, Rejection, Result};
use crate::relay::Inventory;
use crate::spork::SporkId;
use log::debug;
use serde::{Deserialize, Serialize};
use vireo_core::{Hash256, OutPoint};
use vireo_crypto::{KeyPair, PublicKey};

/// Signed heartbeat proving a masternode is alive and following the
/// same chain as its validators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodePing {
    pub collateral: OutPoint,
    /// A recent best-chain block hash, pinned a fixed depth behind the
    /// tip at construction so minor reorgs do not invalidate the ping
    pub block_hash: Hash256,
    pub sig_time: i64,
    pub sig: Vec<u8>,
}

/// Knobs for [`MasternodePing::check_and_update`]; the defaults match
/// the plain gossip intake path.
#[derive(Debug, Clone, Copy)]
pub struct PingCheckOptions {
    /// Fail unless the referenced masternode is currently enabled
    pub require_enabled: bool,
    /// Signature/skew validation only, no state mutation
    pub verify_only: bool,
    /// Skip the minimum-interval duplicate check and do not relay
    /// (embedded-ping path during broadcast admission)
    pub skip_relay_check: bool,
}

impl Default for PingCheckOptions {
    fn default() -> Self {
        PingCheckOptions {
            require_enabled: true,
            verify_only: false,
            skip_relay_check: false,
        }
    }
}

impl PingCheckOptions {
    /// Pre-validation of an embedded ping without side effects
    pub fn verify_only() -> Self {
        PingCheckOptions {
            require_enabled: false,
            verify_only: true,
            skip_relay_check: false,
        }
    }
}

impl MasternodePing {
    /// Build an unsigned ping for the given collateral, referencing the
    /// block `MASTERNODE_PING_BLOCK_DEPTH` behind the current tip
    pub fn new(collateral: OutPoint, ctx: &Context) -> Result<Self> {
        let chain = ctx
            .chain
            .try_read()
            .ok_or(MasternodeError::ChainUnavailable)?;
        let tip = chain.tip_height().ok_or(MasternodeError::ChainUnavailable)?;
        let height = tip.saturating_sub(MASTERNODE_PING_BLOCK_DEPTH);
        let block_hash = crate::chain::block_hash(&**chain, &ctx.block_hashes, Some(height))
            .ok_or(MasternodeError::ChainUnavailable)?;

        Ok(MasternodePing {
            collateral,
            block_hash,
            sig_time: ctx.now(),
            sig: Vec::new(),
        })
    }

    /// Canonical message covered by the signature
    fn message(&self) -> Vec<u8> {
        format!("{}{}{}", self.collateral, self.block_hash, self.sig_time).into_bytes()
    }

    /// Content hash used for replay suppression and relay inventory
    pub fn hash(&self) -> Hash256 {
        let mut data = self.message();
        data.extend_from_slice(&self.sig);
        Hash256::digest(&data)
    }

    /// Wire encoding for gossip transport
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| MasternodeError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| MasternodeError::Serialization(e.to_string()))
    }

    /// Sign with the operational key, stamping `sig_time` first
    pub fn sign(&mut self, operator: &KeyPair, clock: &Clock) -> Result<()> {
        self.sig_time = clock.now();
        self.sig = operator.sign(&self.message());
        vireo_crypto::verify(&operator.public_key(), &self.message(), &self.sig)?;
        Ok(())
    }

    pub fn verify_signature(&self, operator_key: &PublicKey) -> std::result::Result<(), Rejection> {
        vireo_crypto::verify(operator_key, &self.message(), &self.sig)
            .map_err(|_| Rejection::BadPingSignature)
    }

    fn check_sig_time(&self, now: i64) -> std::result::Result<(), Rejection> {
        if self.sig_time > now + MASTERNODE_MAX_SIG_TIME_SKEW {
            debug!(
                "mnping - signature rejected, too far into the future {}",
                self.collateral
            );
            return Err(Rejection::FutureSigTime);
        }
        if self.sig_time <= now - MASTERNODE_MAX_SIG_TIME_SKEW {
            debug!(
                "mnping - signature rejected, too far into the past {}",
                self.collateral
            );
            return Err(Rejection::PastSigTime);
        }
        Ok(())
    }

    /// Validate the ping and, unless `verify_only`, refresh the
    /// referenced masternode's liveness.
    pub fn check_and_update(
        &self,
        ctx: &Context,
        opts: PingCheckOptions,
    ) -> std::result::Result<(), Rejection> {
        self.check_sig_time(ctx.now())?;

        if opts.verify_only {
            // no mutation: verify against the stored operational key if
            // we know the node, otherwise give the broadcast path the
            // benefit of the doubt
            if let Some(entry) = ctx.registry.find(&self.collateral) {
                let operator_key = entry.lock().operator_key;
                return self.verify_signature(&operator_key);
            }
            return Ok(());
        }

        let entry = ctx
            .registry
            .find(&self.collateral)
            .ok_or(Rejection::UnknownMasternode(self.collateral))?;
        let mut mn = entry.lock();

        if mn.protocol_version < ctx.params.min_payments_proto {
            return Err(Rejection::OutdatedProtocol);
        }

        if opts.require_enabled && !mn.is_enabled() {
            return Err(Rejection::NotEnabled(self.collateral));
        }

        // accept only if the previous ping is old enough relative to
        // this one; the margin tolerates sender-side scheduling jitter
        if mn.is_pinged_within(MASTERNODE_MIN_MNP_SECONDS - 60, self.sig_time)
            && !opts.skip_relay_check
        {
            debug!("mnping - ping arrived too early for {}", self.collateral);
            return Err(Rejection::PingTooEarly);
        }

        self.verify_signature(&mn.operator_key)?;

        {
            let chain = ctx.chain.try_read().ok_or(Rejection::ChainBusy)?;
            let tip = chain.tip_height().ok_or(Rejection::ChainBusy)?;

            match chain.block_height_of(&self.block_hash) {
                Some(height) => {
                    if height < tip.saturating_sub(ctx.params.max_reorg_depth) {
                        debug!(
                            "mnping - masternode {} block hash {} is too old",
                            self.collateral, self.block_hash
                        );
                        // keep the node visible, just refuse the ping
                        return Err(Rejection::StaleBlockHash);
                    }
                }
                None => {
                    debug!(
                        "mnping - masternode {} block hash {} is unknown",
                        self.collateral, self.block_hash
                    );
                    // we may simply be behind, never punish
                    return Err(Rejection::UnknownBlockHash);
                }
            }
        }

        mn.last_ping = Some(self.clone());

        // the cached broadcast copy carries an embedded ping that is
        // now outdated
        let mnb = MasternodeBroadcast::from(&*mn);
        let mnb_hash = mnb.hash();
        ctx.registry
            .refresh_seen_broadcast_ping(&mnb_hash, self.clone());

        if ctx.sporks.is_active(SporkId::MnRebroadcastEnforcement) {
            // intentional double propagation of the owning broadcast on
            // every accepted ping
            ctx.relay.enqueue(Inventory::Broadcast(mnb_hash));
        }

        mn.check(true, ctx);
        if !mn.is_enabled() {
            return Err(Rejection::NotEnabled(self.collateral));
        }

        debug!("mnping - ping accepted for {}", self.collateral);

        if !opts.skip_relay_check {
            ctx.relay.enqueue(Inventory::Ping(self.hash()));
        }

        Ok(())
    }
}
