//! Collateral verification and tier classification

use crate::chain::ChainBackend;
use vireo_core::{OutPoint, COIN};

/// Tier for amounts that map to no recognized deposit
pub const LEVEL_UNSPECIFIED: u32 = 0;

/// Classify a collateral amount into its tier at the given height.
///
/// Pure and total: unknown amounts map to [`LEVEL_UNSPECIFIED`]. The
/// height parameter lets thresholds change at activation heights
/// without breaking validation of historical registrations.
pub fn level(amount: u64, _height: u64) -> u32 {
    match amount {
        a if a == COIN => 1,
        a if a == 4 * COIN => 2,
        _ => LEVEL_UNSPECIFIED,
    }
}

/// Whether the amount is a recognized deposit at the given height
pub fn is_deposit_amount(amount: u64, height: u64) -> bool {
    level(amount, height) != LEVEL_UNSPECIFIED
}

/// Resolve a collateral reference to its deposit value.
///
/// `None` when the prior transaction or output index is unknown, or the
/// value is not a recognized deposit at the given height. Spendability
/// is a separate question answered by `ChainBackend::is_acceptable_input`.
pub fn resolve_deposit(chain: &dyn ChainBackend, outpoint: &OutPoint, height: u64) -> Option<u64> {
    let output = chain.resolve_output(outpoint)?;

    if !is_deposit_amount(output.value, height) {
        return None;
    }

    Some(output.value)
}
