//! Transaction output references

use crate::hash::Hash256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a prior transaction output.
///
/// For a masternode this is the collateral reference: it uniquely
/// identifies the node across the network.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, vout: u32) -> Self {
        OutPoint { txid, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// Transaction input as carried on the wire: the referenced output plus
/// any unlocking data. Masternode broadcasts must carry an empty
/// `script_sig`.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
}

impl TxIn {
    pub fn from_outpoint(prevout: OutPoint) -> Self {
        TxIn {
            prevout,
            script_sig: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outpoint_display() {
        let out = OutPoint::new(Hash256::ZERO, 7);
        assert!(out.to_string().ends_with(":7"));
    }

    #[test]
    fn test_txin_from_outpoint_has_empty_script_sig() {
        let txin = TxIn::from_outpoint(OutPoint::new(Hash256::digest(b"tx"), 0));
        assert!(txin.script_sig.is_empty());
    }
}
