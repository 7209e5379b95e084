//! Masternode registration broadcasts (MNANNOUNCE)

use crate::config::{
    Network, NetworkParams, MASTERNODE_MAX_SIG_TIME_SKEW, MASTERNODE_MIN_MNB_SECONDS,
    PROTOCOL_VERSION,
};
use crate::context::{Clock, Context, HotSwapEvent};
use crate::error::{MasternodeError, Rejection, Result};
use crate::masternode::Masternode;
use crate::ping::{MasternodePing, PingCheckOptions};
use crate::relay::Inventory;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use vireo_core::{Hash256, OutPoint, Script, TxIn};
use vireo_crypto::{KeyPair, PublicKey};

/// Signed registration (or re-registration) claim for one masternode.
///
/// An unpersisted projection of the entity: consumed once to create or
/// update a [`Masternode`], re-derivable from it at any time, and
/// cached by content hash for replay suppression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodeBroadcast {
    pub collateral: TxIn,
    pub addr: SocketAddr,
    pub collateral_key: PublicKey,
    pub operator_key: PublicKey,
    pub sig: Vec<u8>,
    pub sig_time: i64,
    pub protocol_version: u32,
    pub last_dsq: u64,
    pub last_ping: Option<MasternodePing>,
}

impl From<&Masternode> for MasternodeBroadcast {
    fn from(mn: &Masternode) -> Self {
        MasternodeBroadcast {
            collateral: TxIn::from_outpoint(mn.collateral),
            addr: mn.addr,
            collateral_key: mn.collateral_key,
            operator_key: mn.operator_key,
            sig: mn.sig.clone(),
            sig_time: mn.sig_time,
            protocol_version: mn.protocol_version,
            last_dsq: mn.last_dsq,
            last_ping: mn.last_ping.clone(),
        }
    }
}

impl MasternodeBroadcast {
    pub fn new(
        addr: SocketAddr,
        collateral: OutPoint,
        collateral_key: PublicKey,
        operator_key: PublicKey,
        protocol_version: u32,
        sig_time: i64,
    ) -> Self {
        MasternodeBroadcast {
            collateral: TxIn::from_outpoint(collateral),
            addr,
            collateral_key,
            operator_key,
            sig: Vec::new(),
            sig_time,
            protocol_version,
            last_dsq: 0,
            last_ping: None,
        }
    }

    /// Build and sign a broadcast for the locally-operated masternode.
    ///
    /// Needs correct blocks for the embedded ping, so this refuses to
    /// run before initial sync completes.
    pub fn create(
        ctx: &Context,
        addr: SocketAddr,
        collateral: OutPoint,
        collateral_keypair: &KeyPair,
        operator_keypair: &KeyPair,
    ) -> Result<Self> {
        if !ctx.is_synced() {
            return Err(MasternodeError::SyncInProgress);
        }

        if let Some(entry) = ctx.registry.find_by_addr(&addr) {
            if entry.lock().collateral != collateral {
                return Err(MasternodeError::DuplicateAddress(addr.to_string()));
            }
        }

        check_default_port(&addr, &ctx.params)?;

        if is_local_addr(&addr) && ctx.params.network != Network::Regtest {
            return Err(MasternodeError::InvalidAddress(addr.to_string()));
        }

        let mut ping = MasternodePing::new(collateral, ctx)?;
        ping.sign(operator_keypair, &ctx.clock)?;

        let mut mnb = MasternodeBroadcast::new(
            addr,
            collateral,
            collateral_keypair.public_key(),
            operator_keypair.public_key(),
            PROTOCOL_VERSION,
            ctx.now(),
        );
        mnb.last_ping = Some(ping);
        mnb.sign(collateral_keypair, &ctx.clock)?;

        Ok(mnb)
    }

    /// Canonical message covered by the collateral-key signature
    fn message(&self) -> Vec<u8> {
        format!(
            "{}{}{}{}{}",
            self.addr,
            self.sig_time,
            self.collateral_key,
            self.operator_key,
            self.protocol_version
        )
        .into_bytes()
    }

    /// Content hash for replay suppression and relay inventory.
    ///
    /// Excludes the embedded ping so a broadcast re-derived from the
    /// entity after a ping refresh still hashes to the cached value.
    pub fn hash(&self) -> Hash256 {
        Hash256::digest(
            format!(
                "{}{}{}",
                self.collateral.prevout, self.sig_time, self.collateral_key
            )
            .as_bytes(),
        )
    }

    /// Wire encoding for gossip transport
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| MasternodeError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| MasternodeError::Serialization(e.to_string()))
    }

    /// Sign with the collateral key, stamping `sig_time` first
    pub fn sign(&mut self, collateral_keypair: &KeyPair, clock: &Clock) -> Result<()> {
        self.sig_time = clock.now();
        self.sig = collateral_keypair.sign(&self.message());
        vireo_crypto::verify(&collateral_keypair.public_key(), &self.message(), &self.sig)?;
        Ok(())
    }

    pub fn verify_signature(&self) -> std::result::Result<(), Rejection> {
        vireo_crypto::verify(&self.collateral_key, &self.message(), &self.sig)
            .map_err(|_| Rejection::BadBroadcastSignature)
    }

    /// Structural and signature validation, plus the in-place update
    /// path when we already know this masternode.
    ///
    /// Returns `Ok` both when an update was applied and when there was
    /// simply nothing to update; an `Err` carries the DoS weight.
    pub fn check_and_update(&self, ctx: &Context) -> std::result::Result<(), Rejection> {
        let now = ctx.now();

        // past timestamps are fine, the collateral check bounds those
        if self.sig_time > now + MASTERNODE_MAX_SIG_TIME_SKEW {
            debug!(
                "mnb - signature rejected, too far into the future {}",
                self.collateral.prevout
            );
            return Err(Rejection::FutureSigTime);
        }

        let ping = self.last_ping.as_ref().ok_or(Rejection::MissingPing)?;
        ping.check_and_update(ctx, PingCheckOptions::verify_only())?;

        if self.protocol_version < ctx.params.min_payments_proto {
            debug!(
                "mnb - ignoring outdated masternode {} protocol version {}",
                self.collateral.prevout, self.protocol_version
            );
            return Err(Rejection::OutdatedProtocol);
        }

        if !Script::pay_to_pubkey_hash(self.collateral_key.as_bytes()).is_standard_p2pkh() {
            debug!("mnb - collateral pubkey script the wrong size");
            return Err(Rejection::MalformedScript);
        }

        if !Script::pay_to_pubkey_hash(self.operator_key.as_bytes()).is_standard_p2pkh() {
            debug!("mnb - operator pubkey script the wrong size");
            return Err(Rejection::MalformedScript);
        }

        if !self.collateral.script_sig.is_empty() {
            debug!(
                "mnb - ignoring non-empty scriptSig {}",
                self.collateral.prevout
            );
            return Err(Rejection::NonEmptyScriptSig);
        }

        if self.verify_signature().is_err() {
            debug!("mnb - got bad masternode address signature");
            return Err(Rejection::BadBroadcastSignature);
        }

        if self.addr.port() != ctx.params.default_port {
            return Err(Rejection::WrongPort(self.addr.port()));
        }

        // update path: only relevant if we already know this masternode
        let Some(entry) = ctx.registry.find(&self.collateral.prevout) else {
            return Ok(());
        };
        let mut mn = entry.lock();

        // an older or equal broadcast should never reach this point;
        // the replay cache filters legit duplicates
        if mn.sig_time >= self.sig_time {
            debug!(
                "mnb - bad sigTime {} for masternode {} (existing broadcast is at {})",
                self.sig_time, self.collateral.prevout, mn.sig_time
            );
            return Err(Rejection::StaleSigTime);
        }

        // not enabled yet/anymore: accept without propagating
        if !mn.is_enabled() {
            return Ok(());
        }

        if mn.collateral_key == self.collateral_key
            && !mn.is_broadcasted_within(MASTERNODE_MIN_MNB_SECONDS, now)
        {
            // the collateral key was associated with the reference at
            // admission; from here a matching key and a newer sigTime
            // are enough to take the update
            let adopt_ping = match &self.last_ping {
                Some(p) => {
                    p.verify_signature(&self.operator_key).is_ok()
                        && ping_block_is_recent(p, ctx)
                }
                None => false,
            };

            debug!("mnb - got updated entry for {}", self.collateral.prevout);
            if mn.apply_broadcast(self, adopt_ping) {
                if adopt_ping {
                    if let Some(p) = &self.last_ping {
                        ctx.registry.note_ping(p.hash(), p.clone());
                    }
                }
                mn.check(false, ctx);
                if mn.is_enabled() {
                    ctx.relay.enqueue(Inventory::Broadcast(self.hash()));
                }
            }
        }

        Ok(())
    }

    /// Admission path for first-time sightings: verify the collateral
    /// against chain and mempool state, then insert into the registry.
    pub fn check_inputs_and_add(&self, ctx: &Context) -> std::result::Result<(), Rejection> {
        // our own broadcast for an already-activated masternode
        if let Some(local) = &ctx.local {
            if local.collateral == self.collateral.prevout
                && local.operator_key == self.operator_key
            {
                return Ok(());
            }
        }

        let ping = self.last_ping.as_ref().ok_or(Rejection::MissingPing)?;
        ping.check_and_update(ctx, PingCheckOptions::verify_only())?;

        if let Some(entry) = ctx.registry.find(&self.collateral.prevout) {
            if entry.lock().is_enabled() {
                return Ok(());
            }
            // disabled leftover, replace it
            ctx.registry.remove(&self.collateral.prevout);
        }

        let prevout = self.collateral.prevout;
        let mut mn = {
            let chain = ctx.chain.try_read().ok_or(Rejection::ChainBusy)?;
            let tip = chain.tip_height().ok_or(Rejection::ChainBusy)?;

            if crate::collateral::resolve_deposit(&**chain, &prevout, tip).is_none() {
                return Err(Rejection::CollateralUnspendable);
            }

            if !chain.is_acceptable_input(&prevout) {
                return Err(Rejection::CollateralUnspendable);
            }

            debug!("mnb - accepted masternode entry {}", prevout);

            let tx_height = chain
                .tx_block_height(&prevout.txid)
                .ok_or(Rejection::CollateralUnspendable)?;
            let age = tip.saturating_sub(tx_height) + 1;
            if age < ctx.params.min_confirmations {
                info!(
                    "mnb - input must have at least {} confirmations, has {}",
                    ctx.params.min_confirmations, age
                );
                // maybe we miss a few blocks, let this one be retried
                return Err(Rejection::ImmatureCollateral {
                    required: ctx.params.min_confirmations,
                    actual: age,
                });
            }

            // sigTime must not predate the block where the collateral
            // reached the minimum confirmation count
            let conf_height = tx_height + ctx.params.min_confirmations - 1;
            if let Some(conf_time) = chain.block_time_at(conf_height) {
                if conf_time > self.sig_time {
                    debug!(
                        "mnb - bad sigTime {} for masternode {} ({} conf block is at {})",
                        self.sig_time, prevout, ctx.params.min_confirmations, conf_time
                    );
                    return Err(Rejection::BackdatedSigTime);
                }
            }

            Masternode::from_broadcast(self, &**chain)
        };

        info!("mnb - got NEW masternode entry {} at {}", prevout, self.sig_time);

        // force-check against our own clock before trusting peer state
        mn.check(true, ctx);
        ctx.registry.add(mn);

        // extended verification of the embedded ping, including block
        // hash recency; roll the insertion back if it fails
        if let Err(rejection) = ping.check_and_update(
            ctx,
            PingCheckOptions {
                require_enabled: true,
                verify_only: false,
                skip_relay_check: true,
            },
        ) {
            ctx.registry.remove(&prevout);
            return Err(rejection);
        }

        // matches our operator key: we have been remotely activated
        if let Some(local) = &ctx.local {
            if local.operator_key == self.operator_key && self.protocol_version == PROTOCOL_VERSION
            {
                ctx.record_hot_swap(HotSwapEvent {
                    collateral: prevout,
                    addr: self.addr,
                });
            }
        }

        let local_addr = is_local_addr(&self.addr) && ctx.params.network != Network::Regtest;
        if !local_addr {
            ctx.relay.enqueue(Inventory::Broadcast(self.hash()));
        }

        Ok(())
    }
}

/// Whether an embedded ping cites a block the chain index knows and
/// that sits inside the reorganization window; the same recency rule
/// the direct ping path enforces. A busy chain refuses adoption, the
/// identity update is unaffected either way.
fn ping_block_is_recent(ping: &MasternodePing, ctx: &Context) -> bool {
    let Some(chain) = ctx.chain.try_read() else {
        return false;
    };
    match (chain.tip_height(), chain.block_height_of(&ping.block_hash)) {
        (Some(tip), Some(height)) => height >= tip.saturating_sub(ctx.params.max_reorg_depth),
        _ => false,
    }
}

/// The announced address must carry the network's mandated port
pub fn check_default_port(addr: &SocketAddr, params: &NetworkParams) -> Result<()> {
    if addr.port() != params.default_port {
        return Err(MasternodeError::InvalidPort {
            port: addr.port(),
            expected: params.default_port,
            network: params.network.name(),
        });
    }
    Ok(())
}

#[cfg(test)]
impl MasternodeBroadcast {
    /// Sign over an explicit `sig_time` instead of the clock's
    pub(crate) fn resign_for_test(&mut self, collateral_keypair: &KeyPair, sig_time: i64) {
        self.sig_time = sig_time;
        self.sig = collateral_keypair.sign(&self.message());
    }
}

/// Private or loopback addresses never leave the local network
fn is_local_addr(addr: &SocketAddr) -> bool {
    match addr.ip() {
        IpAddr::V4(ip) => ip.is_private() || ip.is_loopback() || ip.is_link_local(),
        IpAddr::V6(ip) => ip.is_loopback(),
    }
}
