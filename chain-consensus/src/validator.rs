//! Block and transaction validation: a stateless tier that only needs
//! the block/transaction bytes themselves, and a contextual tier that
//! needs a state snapshot. One function per rule, each returning a
//! single tagged error.

use std::collections::{HashMap, HashSet};

use chain_state::{NonceSnapshot, UtxoSnapshot};
use chain_types::block::{Block, MAX_BLOCK_SIZE, MAX_TXS_PER_BLOCK};
use chain_types::crypto;
use chain_types::transaction::{OutPoint, Transaction, TxKind};
use chain_types::Address;

use crate::consensus::{is_canonical, pow_is_valid, target_difficulty_limit, CLOCK_SKEW_MAX_SECS};
use crate::error::ValidationError;
use crate::subsidy::{block_subsidy, min_fee};

/// Transactions beyond the first must not be coinbase, and the first
/// must be.
pub fn coinbase_is_first(block: &Block) -> Result<(), ValidationError> {
    let mut txs = block.transactions.iter();
    match txs.next() {
        Some(tx) if tx.is_coinbase() => {}
        _ => return Err(ValidationError::CoinbaseMismatch),
    }
    if txs.any(Transaction::is_coinbase) {
        return Err(ValidationError::CoinbaseMismatch);
    }
    Ok(())
}

/// Encoded size and transaction count against the wire-level caps.
pub fn size_is_valid(block: &Block) -> Result<(), ValidationError> {
    if block.transactions.len() > MAX_TXS_PER_BLOCK {
        return Err(ValidationError::OversizedBlock);
    }
    if block.encoded_len() > MAX_BLOCK_SIZE {
        return Err(ValidationError::OversizedBlock);
    }
    Ok(())
}

/// The header's `merkle_root` must match the transaction list it
/// actually carries.
pub fn merkle_root_is_valid(block: &Block) -> Result<(), ValidationError> {
    if block.compute_merkle_root() != block.header.merkle_root {
        return Err(ValidationError::MerkleMismatch);
    }
    Ok(())
}

/// The header's declared target must be canonical and within the
/// network floor, and the header hash must satisfy it.
pub fn difficulty_is_valid(block: &Block) -> Result<(), ValidationError> {
    let bits = block.header.difficulty_target;
    if !is_canonical(bits) {
        return Err(ValidationError::BadDifficultyTarget);
    }
    if crate::consensus::expand_target(bits) > target_difficulty_limit() {
        return Err(ValidationError::BadDifficultyTarget);
    }
    if !pow_is_valid(block.hash(), bits) {
        return Err(ValidationError::PowInsufficient);
    }
    Ok(())
}

/// The header timestamp must not be further in the future than the
/// network's tolerated clock skew. The lower bound (> median of the
/// last 11 ancestors) needs chain history and lives in
/// [`timestamp_is_valid_in_context`].
pub fn timestamp_not_in_future(timestamp: u64, now: u64) -> Result<(), ValidationError> {
    if timestamp > now + CLOCK_SKEW_MAX_SECS {
        return Err(ValidationError::BadTimestamp);
    }
    Ok(())
}

/// Every non-coinbase transaction must carry a public key and a
/// verifying, low-s signature over its signing bytes.
pub fn signature_is_valid(tx: &Transaction) -> Result<(), ValidationError> {
    if tx.is_coinbase() {
        return Ok(());
    }
    let pubkey = tx.public_key.as_deref().ok_or(ValidationError::BadSignature)?;
    let sig = tx.signature.as_ref().ok_or(ValidationError::BadSignature)?;
    let digest = tx.txid();
    crypto::verify(pubkey, digest.as_bytes(), sig).map_err(|_| ValidationError::BadSignature)
}

/// Fee must meet the network's per-byte minimum.
pub fn fee_is_valid(tx: &Transaction) -> Result<(), ValidationError> {
    let required = min_fee(tx.encoded_len());
    if tx.fee.atoms() < required {
        return Err(ValidationError::FeeTooLow(tx.fee.atoms(), required));
    }
    Ok(())
}

/// Runs every stateless rule over a candidate block. Cheap, and
/// independent of any particular chain state, so callers may run it
/// before even looking up the parent.
pub fn validate_stateless(block: &Block) -> Result<(), ValidationError> {
    coinbase_is_first(block)?;
    size_is_valid(block)?;
    merkle_root_is_valid(block)?;
    difficulty_is_valid(block)?;
    for tx in &block.transactions {
        signature_is_valid(tx)?;
        if !tx.is_coinbase() {
            fee_is_valid(tx)?;
        }
    }
    Ok(())
}

/// Accumulates every input across a block's transactions and fails on
/// the first repeat — this must run before any
/// `UtxoSet::reserve`/`apply_tx` call touches state.
pub fn no_intra_block_double_spend(block: &Block) -> Result<(), ValidationError> {
    let mut seen: HashSet<OutPoint> = HashSet::new();
    for tx in &block.transactions {
        for input in &tx.inputs {
            if !seen.insert(*input) {
                return Err(ValidationError::IntraBlockDoubleSpend);
            }
        }
    }
    Ok(())
}

/// Every non-coinbase input must be `Unspent` in `utxo`.
pub fn inputs_exist_and_unspent(tx: &Transaction, utxo: &UtxoSnapshot) -> Result<(), ValidationError> {
    for input in &tx.inputs {
        if !utxo.is_unspent(input) {
            return Err(ValidationError::Utxo(chain_state::UtxoError::UnknownInput(
                input.txid, input.vout,
            )));
        }
    }
    Ok(())
}

/// The sender's spendable input value must cover `amount + fee`.
pub fn sender_has_sufficient_value(tx: &Transaction, utxo: &UtxoSnapshot) -> Result<(), ValidationError> {
    let Some(sender) = tx.sender else { return Ok(()) };

    let mut total_in = 0u64;
    for input in &tx.inputs {
        if let Some(record) = utxo.get(input) {
            total_in += record.amount.atoms();
        }
    }
    let required = tx.amount.atoms().saturating_add(tx.fee.atoms());
    if total_in < required {
        return Err(ValidationError::InsufficientFunds(sender));
    }
    Ok(())
}

/// `account_nonce` must exactly equal `expected`, the sender's next
/// nonce after everything already sequenced ahead of this transaction.
/// Takes the expected value directly rather than a `NonceSnapshot`
/// because a block can carry more than one transaction from the same
/// sender — the caller (`validate_contextual`) advances `expected` by
/// one per sender as it walks the block, rather than comparing every
/// transaction against the same chain-tip nonce.
pub fn nonce_is_contiguous(tx: &Transaction, expected: u64) -> Result<(), ValidationError> {
    let Some(sender) = tx.sender else { return Ok(()) };
    if tx.account_nonce != expected {
        return Err(ValidationError::Nonce(chain_state::NonceError::Gap {
            addr: format!("{:?}", sender),
            given: tx.account_nonce,
            expected,
        }));
    }
    Ok(())
}

/// Lower bound on a header's timestamp: strictly after the median of
/// its last up-to-11 ancestors (Bitcoin's median-time-past rule).
pub fn timestamp_is_valid_in_context(timestamp: u64, ancestor_timestamps: &[u64]) -> Result<(), ValidationError> {
    if ancestor_timestamps.is_empty() {
        return Ok(());
    }
    let mut sorted = ancestor_timestamps.to_vec();
    sorted.sort_unstable();
    let median = sorted[sorted.len() / 2];
    if timestamp <= median {
        return Err(ValidationError::BadTimestamp);
    }
    Ok(())
}

/// Coinbase output total must not exceed the block's subsidy plus the
/// fees its other transactions actually pay.
pub fn coinbase_amount_is_valid(block: &Block) -> Result<(), ValidationError> {
    let coinbase = block.coinbase().ok_or(ValidationError::CoinbaseMismatch)?;
    let subsidy = block_subsidy(block.height())
        .map_err(|_| ValidationError::CoinbaseMismatch)?
        .atoms();
    let fees: u64 = block.transactions[1..].iter().map(|tx| tx.fee.atoms()).sum();
    let coinbase_total: u64 = coinbase.outputs.iter().map(|o| o.amount.atoms()).sum();

    if coinbase_total > subsidy.saturating_add(fees) {
        return Err(ValidationError::CoinbaseMismatch);
    }
    Ok(())
}

/// Runs every contextual rule over a candidate block against a
/// consistent state snapshot. Intra-block double-spend is checked
/// first since it must run before any per-transaction UTXO lookup is
/// meaningful.
pub fn validate_contextual(
    block: &Block,
    utxo: &UtxoSnapshot,
    nonce: &NonceSnapshot,
    ancestor_timestamps: &[u64],
    now: u64,
) -> Result<(), ValidationError> {
    no_intra_block_double_spend(block)?;
    timestamp_not_in_future(block.header.timestamp, now)?;
    timestamp_is_valid_in_context(block.header.timestamp, ancestor_timestamps)?;
    coinbase_amount_is_valid(block)?;

    // Tracks, per sender, the next nonce expected after everything
    // already walked in this block — seeded lazily from the chain tip
    // so a block carrying nonces N, N+1, N+2 from one sender validates
    // as contiguous instead of every tx being checked against the same
    // tip-level `current(sender)`.
    let mut expected_nonce: HashMap<Address, u64> = HashMap::new();
    for tx in &block.transactions {
        if tx.is_coinbase() {
            continue;
        }
        inputs_exist_and_unspent(tx, utxo)?;
        sender_has_sufficient_value(tx, utxo)?;
        if let Some(sender) = tx.sender {
            let expected = *expected_nonce.entry(sender).or_insert_with(|| nonce.current(&sender));
            nonce_is_contiguous(tx, expected)?;
            expected_nonce.insert(sender, expected + 1);
        }
    }
    Ok(())
}
