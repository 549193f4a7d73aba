//! Error taxonomy for the state machine components.

use chain_types::hash::Hash;
use thiserror::Error;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum UtxoError {
    #[error("input references an unknown (txid, vout): {0}:{1}")]
    UnknownInput(Hash, u32),
    #[error("input references an already-spent output: {0}:{1}")]
    AlreadySpent(Hash, u32),
    #[error("input is already reserved by another pending transaction: {0}:{1}")]
    AlreadyReserved(Hash, u32),
    #[error("transaction lists the same (txid, vout) as an input more than once: {0}:{1}")]
    DuplicateInput(Hash, u32),
    #[error("unknown reservation id")]
    UnknownReservation,
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum NonceError {
    #[error("account_nonce {given} is stale for {addr:?}; current is {current}")]
    Stale { addr: String, given: u64, current: u64 },
    #[error("account_nonce {given} leaves a gap for {addr:?}; expected {expected}")]
    Gap {
        addr: String,
        given: u64,
        expected: u64,
    },
    #[error("account_nonce {given} was already used by {addr:?}")]
    Reused { addr: String, given: u64 },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("record failed its CRC32 check")]
    CrcMismatch,
    #[error("a path derived from the index escaped the configured data directory")]
    PathEscape,
    #[error("on-disk data is corrupted: {0}")]
    Corrupted(String),
    #[error("encoding error: {0}")]
    Codec(#[from] chain_types::error::CodecError),
}

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("block height {0} is at or below the finalized depth horizon")]
    OrphanBeyondWindow(u64),
    #[error("reorg would disconnect {0} blocks, more than the configured limit of {1}")]
    ReorgTooDeep(usize, usize),
    #[error("reorg was aborted and rolled back: {0}")]
    ReorgAborted(String),
    #[error("parent block is unknown; queued as an orphan")]
    UnknownParent,
    #[error("orphan pool is full")]
    OrphanPoolFull,
    #[error(transparent)]
    Utxo(#[from] UtxoError),
    #[error(transparent)]
    Nonce(#[from] NonceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("contextual validation failed: {0}")]
    Invalid(String),
}
