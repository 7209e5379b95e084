//! The masternode entity and its lifecycle state machine

use crate::broadcast::MasternodeBroadcast;
use crate::chain::ChainBackend;
use crate::collateral;
use crate::config::{
    MASTERNODE_CHECK_SECONDS, MASTERNODE_EXPIRATION_SECONDS, MASTERNODE_REMOVAL_SECONDS,
    MASTERNODE_WINNER_MINIMUM_AGE,
};
use crate::context::Context;
use crate::ping::MasternodePing;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use vireo_core::OutPoint;
use vireo_crypto::PublicKey;

/// Lifecycle states. `VinSpent` and `Remove` are absorbing: once
/// reached, `check` never moves the entity anywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasternodeState {
    /// Liveness and collateral verified
    Enabled,
    /// Freshly announced, inside the grace window
    Active,
    /// No ping within the expiration window
    Expired,
    /// Collateral consumed, terminal
    VinSpent,
    /// No ping within the removal window, drop from the registry
    Remove,
    /// Banned by proof-of-service enforcement
    PoseBan,
    /// Announced but never seen on the network
    Missing,
}

impl MasternodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MasternodeState::Enabled => "ENABLED",
            MasternodeState::Active => "ACTIVE",
            MasternodeState::Expired => "EXPIRED",
            MasternodeState::VinSpent => "VIN_SPENT",
            MasternodeState::Remove => "REMOVE",
            MasternodeState::PoseBan => "POSE_BAN",
            MasternodeState::Missing => "MISSING",
        }
    }

    /// Terminal states never leave via `check`
    pub fn is_absorbing(&self) -> bool {
        matches!(self, MasternodeState::VinSpent | MasternodeState::Remove)
    }
}

impl fmt::Display for MasternodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registered masternode, keyed by its collateral reference.
///
/// Held by the registry behind a per-entity mutex; every read-modify-
/// write sequence happens under that lock.
#[derive(Debug, Clone)]
pub struct Masternode {
    pub collateral: OutPoint,
    pub addr: SocketAddr,
    pub collateral_key: PublicKey,
    pub operator_key: PublicKey,
    pub sig: Vec<u8>,
    pub state: MasternodeState,
    pub deposit: u64,
    pub sig_time: i64,
    pub last_ping: Option<MasternodePing>,
    /// Cached input age and the tip height it was computed at
    pub cache_input_age: u64,
    pub cache_input_age_block: u64,
    pub protocol_version: u32,
    /// Last-seen mixing-queue sequence counter
    pub last_dsq: u64,
    pub last_time_checked: i64,
    /// Skips the collateral re-verification in `check`
    pub unit_test: bool,
}

impl Masternode {
    /// Build an entity from an accepted broadcast. The deposit decides
    /// the initial state: an unrecognized or unknown collateral starts
    /// at `Remove` and falls out of the registry on the next sweep.
    pub fn from_broadcast(mnb: &MasternodeBroadcast, chain: &dyn ChainBackend) -> Self {
        let height = chain.tip_height().unwrap_or(0);
        let (deposit, state) =
            match collateral::resolve_deposit(chain, &mnb.collateral.prevout, height) {
                Some(value) => (value, MasternodeState::Enabled),
                None => (0, MasternodeState::Remove),
            };

        Masternode {
            collateral: mnb.collateral.prevout,
            addr: mnb.addr,
            collateral_key: mnb.collateral_key,
            operator_key: mnb.operator_key,
            sig: mnb.sig.clone(),
            state,
            deposit,
            sig_time: mnb.sig_time,
            last_ping: mnb.last_ping.clone(),
            cache_input_age: 0,
            cache_input_age_block: 0,
            protocol_version: mnb.protocol_version,
            last_dsq: mnb.last_dsq,
            last_time_checked: 0,
            unit_test: false,
        }
    }

    /// `Enabled` and freshly-announced `Active` nodes both count as
    /// enabled for gossip purposes
    pub fn is_enabled(&self) -> bool {
        matches!(
            self.state,
            MasternodeState::Enabled | MasternodeState::Active
        )
    }

    /// Whether a ping was recorded within `window` seconds of `at`
    pub fn is_pinged_within(&self, window: i64, at: i64) -> bool {
        match &self.last_ping {
            Some(ping) => at - ping.sig_time < window,
            None => false,
        }
    }

    /// Whether the registration is newer than `window` seconds at `at`
    pub fn is_broadcasted_within(&self, window: i64, at: i64) -> bool {
        at - self.sig_time < window
    }

    /// Collateral tier at the given height
    pub fn level(&self, height: u64) -> u32 {
        collateral::level(self.deposit, height)
    }

    pub fn status(&self) -> &'static str {
        self.state.as_str()
    }

    /// Apply a newer broadcast in place. `sig_time` is strictly
    /// monotone: an update that is not newer is refused.
    ///
    /// The caller decides `adopt_ping` by pre-validating the embedded
    /// ping; a broadcast with a bad ping still updates the identity
    /// fields, it just does not refresh liveness.
    pub fn apply_broadcast(&mut self, mnb: &MasternodeBroadcast, adopt_ping: bool) -> bool {
        if mnb.sig_time <= self.sig_time {
            return false;
        }

        self.operator_key = mnb.operator_key;
        self.collateral_key = mnb.collateral_key;
        self.sig_time = mnb.sig_time;
        self.sig = mnb.sig.clone();
        self.protocol_version = mnb.protocol_version;
        self.addr = mnb.addr;
        self.last_time_checked = 0;

        if adopt_ping {
            if let Some(ping) = &mnb.last_ping {
                self.last_ping = Some(ping.clone());
            }
        }

        true
    }

    /// Re-derive the lifecycle state.
    ///
    /// Rate-limited unless `force` is set. The collateral step runs
    /// only under a successful non-blocking chain-lock acquisition;
    /// contention leaves the state untouched for a later retry.
    pub fn check(&mut self, force: bool, ctx: &Context) {
        let now = ctx.now();

        if !force && now - self.last_time_checked < MASTERNODE_CHECK_SECONDS {
            return;
        }
        self.last_time_checked = now;

        if self.state.is_absorbing() {
            return;
        }

        // just announced: skip liveness and collateral checks
        if self.is_broadcasted_within(MASTERNODE_WINNER_MINIMUM_AGE, now) {
            self.state = MasternodeState::Active;
            return;
        }

        if !self.is_pinged_within(MASTERNODE_REMOVAL_SECONDS, now) {
            self.state = MasternodeState::Remove;
            return;
        }

        if !self.is_pinged_within(MASTERNODE_EXPIRATION_SECONDS, now) {
            self.state = MasternodeState::Expired;
            return;
        }

        if !self.unit_test {
            let Some(chain) = ctx.chain.try_read() else {
                // chain busy, try later
                return;
            };

            let height = chain.tip_height().unwrap_or(0);

            match collateral::resolve_deposit(&**chain, &self.collateral, height) {
                Some(value) => self.deposit = value,
                None => {
                    debug!("masternode {} collateral no longer resolves", self.collateral);
                    self.state = MasternodeState::VinSpent;
                    return;
                }
            }

            if !chain.is_acceptable_input(&self.collateral) {
                debug!("masternode {} collateral not spendable", self.collateral);
                self.state = MasternodeState::VinSpent;
                return;
            }

            if let Some(tx_height) = chain.tx_block_height(&self.collateral.txid) {
                self.cache_input_age = height.saturating_sub(tx_height) + 1;
                self.cache_input_age_block = height;
            }
        }

        self.state = MasternodeState::Enabled;
    }
}
