//! Coinbase subsidy schedule: a halving-interval emission curve and the
//! network's minimum per-byte fee floor.

use chain_types::amount::{Amount, AmountError, NonNegative};

/// The largest subsidy, paid before the first halving.
pub const MAX_BLOCK_SUBSIDY: u64 = 50 * 100_000_000;
/// Blocks between halvings.
pub const HALVING_INTERVAL: u64 = 210_000;
/// Minimum fee per encoded byte a transaction must pay to be considered
/// standard, fixed at genesis.
pub const MIN_FEE_PER_BYTE: u64 = 1;

/// The coinbase subsidy due at `height`. Halves every
/// [`HALVING_INTERVAL`] blocks; after 64 halvings the subsidy has
/// shifted to zero and stays there permanently.
pub fn block_subsidy(height: u64) -> Result<Amount<NonNegative>, AmountError> {
    let halvings = height / HALVING_INTERVAL;
    if halvings >= 64 {
        return Amount::new(0);
    }
    Amount::new(MAX_BLOCK_SUBSIDY >> halvings)
}

/// The minimum acceptable fee for a transaction of `encoded_len` bytes.
pub fn min_fee(encoded_len: usize) -> u64 {
    MIN_FEE_PER_BYTE * encoded_len as u64
}
