//! Mempool error taxonomy. None of these are retried by the mempool
//! itself — the caller decides whether to resubmit.

use thiserror::Error;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum AdmitError {
    #[error("transaction is malformed or structurally invalid for mempool admission")]
    Malformed,
    #[error("signature does not verify")]
    BadSignature,
    #[error("an input references an unknown or already-spent output")]
    UnknownInput,
    #[error("conflicts with an already-admitted transaction's reserved input")]
    DoubleSpend,
    #[error("account_nonce is not the sender's next expected nonce")]
    NonceInvalid,
    #[error("fee is below the network minimum")]
    FeeTooLow,
    #[error("mempool is at capacity")]
    Full,
    #[error("transaction has expired out of the mempool")]
    Expired,
    #[error("input is already reserved by a transaction this one does not out-fee")]
    ConflictingReservation,
}
