//! 32-byte domain hashes, and the single SHA-256 function consensus code
//! is allowed to call directly (everything else goes through
//! [`crate::codec::Canonical`] first).

use std::fmt;

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::codec::Canonical;
use crate::error::CodecError;

/// A 32-byte SHA-256 digest, used for both transaction ids and block
/// hashes. Ordered lexicographically (big-endian byte order), which is
/// what chain-selection tie-breaking and proof-of-work comparisons need.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Big-endian interpretation as a 256-bit integer, for comparing a
    /// block hash against an expanded difficulty target.
    pub fn as_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Canonical for Hash {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }
    fn decode(buf: &mut &[u8]) -> Result<Self, CodecError> {
        let arr = <[u8; 32]>::decode(buf)?;
        Ok(Hash(arr))
    }
}

/// SHA-256 over arbitrary bytes. The only hash function in any consensus
/// path; `h256(encode(v))` is how every domain hash in this crate is
/// computed.
pub fn h256(bytes: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash(out)
}

/// Merkle root over a list of leaf hashes. If the leaf count is odd, the
/// last leaf is duplicated before pairing — this is deliberate and must
/// be matched bit-for-bit by every implementer.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::ZERO;
    }
    let mut level: Vec<Hash> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().unwrap());
        }
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let mut buf = Vec::with_capacity(64);
            buf.extend_from_slice(&pair[0].0);
            buf.extend_from_slice(&pair[1].0);
            next.push(h256(&buf));
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merkle_root_single_leaf_is_itself() {
        let leaf = h256(b"leaf");
        assert_eq!(merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn merkle_root_odd_count_duplicates_last() {
        let a = h256(b"a");
        let b = h256(b"b");
        let c = h256(b"c");
        let with_three = merkle_root(&[a, b, c]);
        let with_duplicated_last = merkle_root(&[a, b, c, c]);
        assert_eq!(with_three, with_duplicated_last);
    }

    #[test]
    fn hash_round_trips() {
        let h = h256(b"round trip me");
        let bytes = h.encode_to_vec();
        let mut slice = bytes.as_slice();
        assert_eq!(Hash::decode(&mut slice).unwrap(), h);
    }
}
