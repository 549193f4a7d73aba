//! Node-level error taxonomy: every inner component's error folded into
//! one type so the facade has a single `Result` to hand callers.

use chain_consensus::ValidationError;
use chain_mempool::AdmitError;
use chain_state::{ChainError, StorageError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("block failed stateless or contextual validation: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("transaction rejected by the mempool: {0}")]
    Mempool(#[from] AdmitError),
    #[error("no block at the requested height or hash")]
    NotFound,
}
