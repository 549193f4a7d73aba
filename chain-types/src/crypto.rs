//! Signature verification and address derivation. ECDSA over secp256k1
//! with mandatory low-S normalization.
//!
//! No consensus path in this crate touches a random number generator;
//! `rand_core` is a dev-only convenience for tests that need to mint
//! keypairs.

use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1};

use crate::address::Address;
use crate::error::CryptoError;

/// The secp256k1 group order `n`, big-endian. Used only to classify a
/// signature's `s` value as low or high without needing the full
/// elliptic-curve machinery.
const CURVE_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

fn half_curve_order() -> primitive_types::U256 {
    primitive_types::U256::from_big_endian(&CURVE_ORDER) / 2
}

/// `true` if `compact_sig`'s `s` component (bytes 32..64) is at most
/// `n/2` — i.e. the signature is already in its unique low-S form and
/// is not malleable.
pub fn is_low_s(compact_sig: &[u8; 64]) -> bool {
    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&compact_sig[32..]);
    let s = primitive_types::U256::from_big_endian(&s_bytes);
    s <= half_curve_order()
}

/// Verifies a 64-byte compact ECDSA signature over `message` (expected to
/// already be a 32-byte domain hash, i.e. the txid's signed-payload hash)
/// under `pubkey` (33-byte compressed SEC1). High-S signatures are
/// rejected outright as malleable, before the cryptographic check runs.
pub fn verify(pubkey: &[u8], message: &[u8; 32], compact_sig: &[u8; 64]) -> Result<(), CryptoError> {
    if !is_low_s(compact_sig) {
        return Err(CryptoError::HighSSignature);
    }
    let pubkey = PublicKey::from_slice(pubkey).map_err(|_| CryptoError::UnknownKeyFormat)?;
    let sig = Signature::from_compact(compact_sig).map_err(|_| CryptoError::BadSignature)?;
    let msg = Message::from_slice(message).map_err(|_| CryptoError::BadSignature)?;

    let secp = Secp256k1::verification_only();
    secp.verify_ecdsa(&msg, &sig, &pubkey)
        .map_err(|_| CryptoError::BadSignature)
}

/// Derives the owning [`Address`] of a compressed public key.
pub fn derive_address(compressed_pubkey: &[u8]) -> Address {
    Address::derive(compressed_pubkey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;
    use secp256k1::{Secp256k1, SecretKey};

    fn sign_low_s(msg: &[u8; 32], sk: &SecretKey) -> [u8; 64] {
        let secp = Secp256k1::signing_only();
        let message = Message::from_slice(msg).unwrap();
        let mut sig = secp.sign_ecdsa(&message, sk);
        sig.normalize_s();
        sig.serialize_compact()
    }

    #[test]
    fn verify_accepts_valid_low_s_signature() {
        let secp = Secp256k1::new();
        let sk = SecretKey::new(&mut OsRng);
        let pk = secp256k1::PublicKey::from_secret_key(&secp, &sk);
        let msg = [7u8; 32];
        let sig = sign_low_s(&msg, &sk);

        assert!(verify(&pk.serialize(), &msg, &sig).is_ok());
    }

    #[test]
    fn verify_rejects_wrong_message() {
        let secp = Secp256k1::new();
        let sk = SecretKey::new(&mut OsRng);
        let pk = secp256k1::PublicKey::from_secret_key(&secp, &sk);
        let msg = [7u8; 32];
        let sig = sign_low_s(&msg, &sk);

        let other_msg = [8u8; 32];
        assert!(verify(&pk.serialize(), &other_msg, &sig).is_err());
    }

    #[test]
    fn verify_rejects_high_s() {
        let secp = Secp256k1::new();
        let sk = SecretKey::new(&mut OsRng);
        let pk = secp256k1::PublicKey::from_secret_key(&secp, &sk);
        let msg = [7u8; 32];
        let mut sig = sign_low_s(&msg, &sk);

        // Flip to the high-S representative: s' = n - s.
        let order = primitive_types::U256::from_big_endian(&CURVE_ORDER);
        let mut s_bytes = [0u8; 32];
        s_bytes.copy_from_slice(&sig[32..]);
        let s = primitive_types::U256::from_big_endian(&s_bytes);
        let high_s = order - s;
        let mut high_s_bytes = [0u8; 32];
        high_s.to_big_endian(&mut high_s_bytes);
        sig[32..].copy_from_slice(&high_s_bytes);

        assert_eq!(verify(&pk.serialize(), &msg, &sig), Err(CryptoError::HighSSignature));
    }
}
