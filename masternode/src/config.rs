//! Network parameters and protocol timing constants
//!
//! One value type with named presets replaces the usual per-network
//! class hierarchy. Production presets are immutable; tests that need
//! to bend a parameter go through [`TestParamsBuilder`].

use serde::{Deserialize, Serialize};

/// Protocol version this build speaks
pub const PROTOCOL_VERSION: u32 = 70913;

/// `Check` runs at most once per this many seconds unless forced
pub const MASTERNODE_CHECK_SECONDS: i64 = 5;

/// Minimum interval between accepted broadcasts for one masternode
pub const MASTERNODE_MIN_MNB_SECONDS: i64 = 5 * 60;

/// Minimum interval between accepted pings for one masternode
pub const MASTERNODE_MIN_MNP_SECONDS: i64 = 10 * 60;

/// Active masternodes ping every few minutes
pub const MASTERNODE_PING_SECONDS: i64 = 5 * 60;

/// No ping within this window marks a node expired
pub const MASTERNODE_EXPIRATION_SECONDS: i64 = 120 * 60;

/// No ping within this window marks a node for removal
pub const MASTERNODE_REMOVAL_SECONDS: i64 = 130 * 60;

/// Freshly announced nodes skip liveness and collateral checks for this
/// long ("just announced" grace window)
pub const MASTERNODE_WINNER_MINIMUM_AGE: i64 = 8000;

/// Clock-skew bound on signed gossip timestamps
pub const MASTERNODE_MAX_SIG_TIME_SKEW: i64 = 60 * 60;

/// A fresh ping references the block this many blocks behind the tip,
/// so minor reorganizations do not invalidate outstanding pings
pub const MASTERNODE_PING_BLOCK_DEPTH: u64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
    Unittest,
}

impl Network {
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "main",
            Network::Testnet => "test",
            Network::Regtest => "regtest",
            Network::Unittest => "unittest",
        }
    }
}

/// Read-only network parameters consumed by masternode validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkParams {
    pub network: Network,
    /// The only port masternodes may announce on this network
    pub default_port: u16,
    /// Blocks below `tip - depth` are considered immutable
    pub max_reorg_depth: u64,
    /// Oldest protocol version accepted for masternode payments
    pub min_payments_proto: u32,
    /// Confirmations the collateral must accumulate before admission
    pub min_confirmations: u64,
}

impl NetworkParams {
    pub fn mainnet() -> Self {
        NetworkParams {
            network: Network::Mainnet,
            default_port: 1945,
            max_reorg_depth: 100,
            min_payments_proto: 70912,
            min_confirmations: 15,
        }
    }

    pub fn testnet() -> Self {
        NetworkParams {
            network: Network::Testnet,
            default_port: 11945,
            max_reorg_depth: 100,
            min_payments_proto: 70912,
            min_confirmations: 15,
        }
    }

    pub fn regtest() -> Self {
        NetworkParams {
            network: Network::Regtest,
            default_port: 51476,
            max_reorg_depth: 100,
            min_payments_proto: 70912,
            min_confirmations: 15,
        }
    }
}

/// Builder for unit-test parameters. Mutators live here so the
/// production [`NetworkParams`] stays immutable.
#[derive(Debug, Clone)]
pub struct TestParamsBuilder {
    params: NetworkParams,
}

impl TestParamsBuilder {
    pub fn new() -> Self {
        TestParamsBuilder {
            params: NetworkParams {
                network: Network::Unittest,
                default_port: 51478,
                max_reorg_depth: 100,
                min_payments_proto: 70912,
                min_confirmations: 15,
            },
        }
    }

    pub fn default_port(mut self, port: u16) -> Self {
        self.params.default_port = port;
        self
    }

    pub fn max_reorg_depth(mut self, depth: u64) -> Self {
        self.params.max_reorg_depth = depth;
        self
    }

    pub fn min_payments_proto(mut self, version: u32) -> Self {
        self.params.min_payments_proto = version;
        self
    }

    pub fn min_confirmations(mut self, confirmations: u64) -> Self {
        self.params.min_confirmations = confirmations;
        self
    }

    pub fn build(self) -> NetworkParams {
        self.params
    }
}

impl Default for TestParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_have_distinct_ports() {
        let ports = [
            NetworkParams::mainnet().default_port,
            NetworkParams::testnet().default_port,
            NetworkParams::regtest().default_port,
            TestParamsBuilder::new().build().default_port,
        ];
        for i in 0..ports.len() {
            for j in i + 1..ports.len() {
                assert_ne!(ports[i], ports[j]);
            }
        }
    }

    #[test]
    fn test_builder_overrides() {
        let params = TestParamsBuilder::new()
            .default_port(19999)
            .min_confirmations(1)
            .build();
        assert_eq!(params.default_port, 19999);
        assert_eq!(params.min_confirmations, 1);
        assert_eq!(params.network, Network::Unittest);
    }

    #[test]
    fn test_expiration_precedes_removal() {
        assert!(MASTERNODE_EXPIRATION_SECONDS < MASTERNODE_REMOVAL_SECONDS);
    }
}
