//! Shared `proptest` strategies for the chain core's dev-dependencies:
//! one place that knows how to generate a valid-shaped value of each
//! core type, consolidated into its own dev-only crate instead of
//! duplicated under every `#[cfg(test)]`.

use proptest::prelude::*;

use chain_types::address::Address;
use chain_types::amount::{Amount, NonNegative, MAX_SUPPLY};
use chain_types::hash::Hash;

pub fn hash_strategy() -> impl Strategy<Value = Hash> {
    any::<[u8; 32]>().prop_map(Hash)
}

pub fn address_strategy() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(Address::from_pubkey_hash)
}

/// Amounts up to a modest fraction of `MAX_SUPPLY` — generating right up
/// to the ceiling on every case would make most arithmetic tests exercise
/// only the overflow path.
pub fn amount_strategy() -> impl Strategy<Value = Amount<NonNegative>> {
    (0..MAX_SUPPLY / 1000).prop_map(|atoms| Amount::new(atoms).unwrap())
}

pub fn small_amount_strategy() -> impl Strategy<Value = Amount<NonNegative>> {
    (0u64..1_000_000).prop_map(|atoms| Amount::new(atoms).unwrap())
}
