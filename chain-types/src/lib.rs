//! Data model, canonical codec, and crypto primitives for the chain
//! core. No component in this crate ever blocks on I/O or holds a lock
//! across a call into another crate — it is pure types and pure
//! functions, consumed by `chain-state`/`chain-consensus`/`chain-mempool`.

pub mod address;
pub mod amount;
pub mod block;
pub mod cached;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod event;
pub mod hash;
pub mod transaction;

pub use address::Address;
pub use amount::{Amount, NonNegative};
pub use block::{Block, CompactTarget, Header as BlockHeader, MAX_BLOCK_SIZE, MAX_TXS_PER_BLOCK};
pub use codec::Canonical;
pub use error::{CodecError, CryptoError};
pub use event::{Event, EventSink, NullEventSink};
pub use hash::{h256, merkle_root, Hash};
pub use transaction::{OutPoint, Transaction, TxKind, TxOutput};
