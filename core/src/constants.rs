//! Chain-wide constants

/// Base units per coin
pub const COIN: u64 = 100_000_000;
