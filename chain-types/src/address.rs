//! Addresses: opaque, fixed-length byte strings with a consensus-fixed
//! prefix, derived from the RIPEMD160(SHA256(pubkey)) of a compressed
//! public key, minus any network-specific base58 version bytes (this
//! chain has exactly one network).

use ripemd160::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::codec::Canonical;
use crate::error::CodecError;

/// Consensus-fixed address prefix. Any decoded address whose first two
/// bytes don't match this is rejected by the codec, not by a later
/// validation pass.
pub const ADDRESS_PREFIX: [u8; 2] = [0x17, 0x00];

/// Total encoded length: 2-byte prefix + 20-byte RIPEMD160(SHA256(pubkey)).
pub const ADDRESS_LEN: usize = ADDRESS_PREFIX.len() + 20;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Builds an address from a raw 20-byte pubkey hash, prepending the
    /// consensus prefix.
    pub fn from_pubkey_hash(hash160: [u8; 20]) -> Self {
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes[..2].copy_from_slice(&ADDRESS_PREFIX);
        bytes[2..].copy_from_slice(&hash160);
        Address(bytes)
    }

    /// RIPEMD160(SHA256(compressed pubkey)), then prefixed. This is the
    /// sole consensus-meaningful address derivation; see
    /// [`crate::crypto::derive_address`] for the public entry point.
    pub fn derive(compressed_pubkey: &[u8]) -> Self {
        let sha = Sha256::digest(compressed_pubkey);
        let hash160 = Ripemd160::digest(&sha);
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&hash160);
        Address::from_pubkey_hash(arr)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Non-consensus display form; never used for hashing or comparison.
    pub fn to_base58check(&self) -> String {
        bs58::encode(&self.0).with_check().into_string()
    }

    pub fn from_base58check(s: &str) -> Result<Self, CodecError> {
        let decoded = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|_| CodecError::OutOfRange)?;
        if decoded.len() != ADDRESS_LEN || decoded[..2] != ADDRESS_PREFIX {
            return Err(CodecError::OutOfRange);
        }
        let mut arr = [0u8; ADDRESS_LEN];
        arr.copy_from_slice(&decoded);
        Ok(Address(arr))
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self.to_base58check())
    }
}

impl Canonical for Address {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }
    fn decode(buf: &mut &[u8]) -> Result<Self, CodecError> {
        let bytes = <[u8; ADDRESS_LEN]>::decode(buf)?;
        if bytes[..2] != ADDRESS_PREFIX {
            return Err(CodecError::BadTag(bytes[0]));
        }
        Ok(Address(bytes))
    }
}
