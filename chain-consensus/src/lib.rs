//! Stateless and contextual validation, difficulty math, chain
//! selection, and the coinbase subsidy schedule. This crate never
//! touches disk; it is pure functions over `chain_types` values and
//! `chain_state` snapshots, called by the chain state machine and the
//! mempool before either admits anything.

pub mod consensus;
pub mod error;
pub mod subsidy;
pub mod validator;

pub use consensus::{
    compact_from_target, expand_target, is_better_chain, is_canonical, pow_is_valid,
    retarget, target_difficulty_limit, CLOCK_SKEW_MAX_SECS, EXPECTED_TIMESPAN_SECS,
    RETARGET_INTERVAL,
};
pub use error::ValidationError;
pub use subsidy::{block_subsidy, min_fee, HALVING_INTERVAL, MAX_BLOCK_SUBSIDY, MIN_FEE_PER_BYTE};
pub use validator::{validate_contextual, validate_stateless};
