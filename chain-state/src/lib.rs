//! Durable chain state: the UTXO set, the nonce tracker, on-disk
//! storage, and the chain state machine that ties them together under
//! two-phase-commit reorg semantics. No component here ever blocks on
//! network I/O; everything crosses into this crate as already-decoded
//! `chain_types` values.

pub mod chain;
pub mod error;
pub mod nonce;
pub mod storage;
pub mod utxo;

pub use chain::{AddBlockOutcome, ChainStateMachine, ChainTip, CHECKPOINT_INTERVAL, MAX_REORG_DEPTH};
pub use error::{ChainError, NonceError, StorageError, UtxoError};
pub use nonce::{NonceSnapshot, NonceTracker};
pub use storage::index::{AddressIndexEntry, Direction};
pub use storage::Storage;
pub use utxo::{ReservationId, UtxoRecord, UtxoSet, UtxoSnapshot, UtxoStatus};
