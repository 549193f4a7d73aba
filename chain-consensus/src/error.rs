//! Validation error taxonomy: every rejection a block or transaction can
//! hit, stateless and contextual alike.

use chain_state::{ChainError, NonceError, UtxoError};
use chain_types::Address;
use thiserror::Error;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ValidationError {
    #[error("block failed to decode or round-trip its canonical encoding")]
    MalformedBlock,
    #[error("computed merkle root does not match the header")]
    MerkleMismatch,
    #[error("header hash exceeds the target implied by its difficulty bits")]
    PowInsufficient,
    #[error("header timestamp is not within the allowed window")]
    BadTimestamp,
    #[error("encoded block exceeds MAX_BLOCK_SIZE or MAX_TXS_PER_BLOCK")]
    OversizedBlock,
    #[error("coinbase is missing, not first, or exceeds subsidy + fees")]
    CoinbaseMismatch,
    #[error("the same (txid, vout) is spent more than once within a block")]
    IntraBlockDoubleSpend,
    #[error("transaction carries no signature, or the signature does not verify")]
    BadSignature,
    #[error("transaction fee {0} is below the network minimum {1}")]
    FeeTooLow(u64, u64),
    #[error("sender {0:?} does not hold enough value to cover amount + fee")]
    InsufficientFunds(Address),
    #[error("declared difficulty target is outside the allowed retarget bounds")]
    BadDifficultyTarget,
    #[error(transparent)]
    Utxo(#[from] UtxoError),
    #[error(transparent)]
    Nonce(#[from] NonceError),
}

impl From<ValidationError> for ChainError {
    fn from(err: ValidationError) -> Self {
        ChainError::Invalid(err.to_string())
    }
}
