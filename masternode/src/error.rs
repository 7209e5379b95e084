//! Masternode error types
//!
//! Two disjoint surfaces: [`MasternodeError`] for local operational
//! failures (creating and signing our own messages), and [`Rejection`]
//! for gossip messages we refuse to apply. A `Rejection` carries a
//! DoS penalty weight for the peer-scoring layer and a transience flag
//! telling the intake whether the message may be retried later.

use thiserror::Error;
use vireo_core::OutPoint;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MasternodeError {
    #[error("Sync in progress, must wait until sync is complete to start masternode")]
    SyncInProgress,

    #[error("Duplicate masternode address: {0}")]
    DuplicateAddress(String),

    #[error("Invalid port {port}, only {expected} is supported on {network}-net")]
    InvalidPort {
        port: u16,
        expected: u16,
        network: &'static str,
    },

    #[error("Invalid address {0} for masternode")]
    InvalidAddress(String),

    #[error("Masternode not found: {0}")]
    NotFound(OutPoint),

    #[error("Masternode already registered: {0}")]
    AlreadyRegistered(OutPoint),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Chain state unavailable")]
    ChainUnavailable,

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] vireo_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, MasternodeError>;

/// Why a gossip message was not applied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    // Protocol violations, penalized
    #[error("Signature timestamp too far in the future")]
    FutureSigTime,

    #[error("Signature timestamp too far in the past")]
    PastSigTime,

    #[error("Derived payee script is not the standard fixed-length form")]
    MalformedScript,

    #[error("Bad broadcast signature")]
    BadBroadcastSignature,

    #[error("Bad ping signature")]
    BadPingSignature,

    // Malformed but not necessarily hostile
    #[error("Broadcast carries no ping")]
    MissingPing,

    #[error("Collateral input carries unlocking data")]
    NonEmptyScriptSig,

    #[error("Protocol version below minimum accepted for payments")]
    OutdatedProtocol,

    #[error("Port {0} does not match the network default")]
    WrongPort(u16),

    // Stale/ordering artifacts, expected under normal gossip
    #[error("Broadcast sigTime not newer than the stored entry")]
    StaleSigTime,

    #[error("Ping arrived within the minimum ping interval")]
    PingTooEarly,

    #[error("No known masternode for {0}")]
    UnknownMasternode(OutPoint),

    #[error("Masternode {0} is not enabled")]
    NotEnabled(OutPoint),

    // Transient/local, retry later
    #[error("Chain state busy, try later")]
    ChainBusy,

    #[error("Referenced block hash is unknown")]
    UnknownBlockHash,

    #[error("Collateral needs {required} confirmations, has {actual}")]
    ImmatureCollateral { required: u64, actual: u64 },

    // Collateral failures
    #[error("Collateral is not a spendable masternode deposit")]
    CollateralUnspendable,

    #[error("Referenced block hash is beyond the reorganization window")]
    StaleBlockHash,

    #[error("sigTime predates collateral confirmation")]
    BackdatedSigTime,
}

impl Rejection {
    /// Penalty weight accumulated by the peer-scoring layer.
    /// 100 denotes definite malice or corruption, 33 a bad heartbeat
    /// signature, 1 minor clock skew; everything else goes unpunished.
    pub fn ban_score(&self) -> u32 {
        match self {
            Rejection::FutureSigTime | Rejection::PastSigTime => 1,
            Rejection::BadPingSignature => 33,
            Rejection::CollateralUnspendable => 33,
            Rejection::MalformedScript | Rejection::BadBroadcastSignature => 100,
            _ => 0,
        }
    }

    /// Transient rejections are the local node's problem, not the
    /// sender's; the message is evicted from the replay caches so it
    /// can be delivered again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Rejection::ChainBusy
                | Rejection::UnknownBlockHash
                | Rejection::ImmatureCollateral { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ban_scores_match_error_classes() {
        assert_eq!(Rejection::FutureSigTime.ban_score(), 1);
        assert_eq!(Rejection::BadPingSignature.ban_score(), 33);
        assert_eq!(Rejection::BadBroadcastSignature.ban_score(), 100);
        assert_eq!(Rejection::MalformedScript.ban_score(), 100);
        assert_eq!(Rejection::StaleSigTime.ban_score(), 0);
        assert_eq!(Rejection::ChainBusy.ban_score(), 0);
    }

    #[test]
    fn test_transient_rejections_unpunished() {
        let transient = [
            Rejection::ChainBusy,
            Rejection::UnknownBlockHash,
            Rejection::ImmatureCollateral {
                required: 15,
                actual: 3,
            },
        ];
        for r in transient {
            assert!(r.is_transient());
            assert_eq!(r.ban_score(), 0);
        }
        assert!(!Rejection::BadBroadcastSignature.is_transient());
    }
}
