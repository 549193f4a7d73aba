//! The transaction mempool: fee-priority admission, RBF-style conflict
//! resolution, capacity eviction, TTL expiry, and block-confirmation
//! reconciliation. Holds no chain state of its own beyond its own
//! entries and reservation records — every admission check is made
//! against a snapshot borrowed from `chain-state`.

pub mod error;
pub mod mempool;

pub use error::AdmitError;
pub use mempool::Mempool;
