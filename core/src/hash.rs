//! 256-bit hash values with the integer arithmetic used by the
//! masternode scoring engine.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("Invalid hex string")]
    InvalidHex,

    #[error("Invalid hash length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// A 256-bit value stored big-endian, so byte order equals numeric order.
///
/// Used both as a block/transaction hash and as an unsigned 256-bit
/// integer when computing hash-distance scores.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// SHA-256 of arbitrary bytes
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Hash256(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        let bytes = hex::decode(s).map_err(|_| HashError::InvalidHex)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| HashError::InvalidLength(v.len()))?;
        Ok(Hash256(arr))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Low-order 64 bits of the value
    pub fn low_u64(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[24..32]);
        u64::from_be_bytes(buf)
    }

    /// 256-bit wrapping addition of a small integer
    pub fn wrapping_add(&self, rhs: u64) -> Hash256 {
        let mut out = self.0;
        let mut carry = rhs as u128;
        for i in (0..32).rev() {
            if carry == 0 {
                break;
            }
            let sum = out[i] as u128 + (carry & 0xff);
            out[i] = (sum & 0xff) as u8;
            carry = (carry >> 8) + (sum >> 8);
        }
        Hash256(out)
    }

    /// Unsigned absolute difference, |self - other| over 256-bit integers
    pub fn abs_diff(&self, other: &Hash256) -> Hash256 {
        let (hi, lo) = if self >= other {
            (self, other)
        } else {
            (other, self)
        };
        let mut out = [0u8; 32];
        let mut borrow = 0i16;
        for i in (0..32).rev() {
            let d = hi.0[i] as i16 - lo.0[i] as i16 - borrow;
            if d < 0 {
                out[i] = (d + 256) as u8;
                borrow = 1;
            } else {
                out[i] = d as u8;
                borrow = 0;
            }
        }
        Hash256(out)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}
