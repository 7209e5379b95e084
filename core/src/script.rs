//! Standard output script encodings

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;

/// Length of a standard pay-to-pubkey-hash script
pub const P2PKH_SCRIPT_LEN: usize = 25;

/// A serialized output script
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct Script(pub Vec<u8>);

impl Script {
    /// Standard pay-to-pubkey-hash script for the given public key:
    /// `OP_DUP OP_HASH160 <20-byte key id> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn pay_to_pubkey_hash(pubkey: &[u8]) -> Self {
        let key_id = Self::key_id(pubkey);
        let mut bytes = Vec::with_capacity(P2PKH_SCRIPT_LEN);
        bytes.push(OP_DUP);
        bytes.push(OP_HASH160);
        bytes.push(20);
        bytes.extend_from_slice(&key_id);
        bytes.push(OP_EQUALVERIFY);
        bytes.push(OP_CHECKSIG);
        Script(bytes)
    }

    /// 20-byte key identifier derived from a public key
    pub fn key_id(pubkey: &[u8]) -> [u8; 20] {
        let mut hasher = Sha256::new();
        hasher.update(pubkey);
        let digest = hasher.finalize();
        let mut id = [0u8; 20];
        id.copy_from_slice(&digest[..20]);
        id
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the script has the exact fixed-length standard form
    pub fn is_standard_p2pkh(&self) -> bool {
        self.0.len() == P2PKH_SCRIPT_LEN
            && self.0[0] == OP_DUP
            && self.0[1] == OP_HASH160
            && self.0[2] == 20
            && self.0[23] == OP_EQUALVERIFY
            && self.0[24] == OP_CHECKSIG
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p2pkh_has_standard_length() {
        let script = Script::pay_to_pubkey_hash(&[0x02; 32]);
        assert_eq!(script.len(), P2PKH_SCRIPT_LEN);
        assert!(script.is_standard_p2pkh());
    }

    #[test]
    fn test_distinct_keys_give_distinct_scripts() {
        let a = Script::pay_to_pubkey_hash(&[0x02; 32]);
        let b = Script::pay_to_pubkey_hash(&[0x03; 32]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_non_standard_script_rejected() {
        assert!(!Script(vec![OP_DUP; 24]).is_standard_p2pkh());
        assert!(!Script::default().is_standard_p2pkh());
    }
}
