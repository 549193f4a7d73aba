//! Error taxonomy shared by the canonical codec and crypto primitives.
//!
//! Both kinds have no state of their own to consult, so they live next
//! to the types they describe rather than in `chain-state`/`chain-consensus`.

use thiserror::Error;

/// Errors produced by [`crate::codec`] encode/decode.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum CodecError {
    #[error("buffer ended before the expected value was fully read")]
    Truncated,
    #[error("unrecognized or out-of-place tag byte: {0}")]
    BadTag(u8),
    #[error("duplicate map key encountered during decode: {0:?}")]
    DuplicateKey(Vec<u8>),
    #[error("field value out of range")]
    OutOfRange,
    #[error("strict decode rejected unknown field(s): {0:?}")]
    UnknownFields(Vec<Vec<u8>>),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Errors produced by [`crate::crypto`].
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum CryptoError {
    #[error("signature does not verify against the given message and public key")]
    BadSignature,
    #[error("signature uses a high-S value and is rejected as malleable")]
    HighSSignature,
    #[error("public key bytes are not a recognized format")]
    UnknownKeyFormat,
}
