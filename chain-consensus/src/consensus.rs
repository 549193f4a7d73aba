//! Difficulty math and chain selection: expanding/compacting Bitcoin-style
//! "bits", proof-of-work checks, retargeting, and cumulative-work
//! comparison between candidate chain tips.

use primitive_types::U256;

use chain_state::ChainTip;
use chain_types::block::CompactTarget;
use chain_types::hash::{h256, Hash};

/// Blocks between difficulty retargets.
pub const RETARGET_INTERVAL: u64 = 2016;
/// Target spacing the retarget formula aims to hold, in seconds
/// (`RETARGET_INTERVAL * 600`, i.e. ten-minute blocks).
pub const EXPECTED_TIMESPAN_SECS: i64 = RETARGET_INTERVAL as i64 * 600;
/// Maximum accepted drift between a header's timestamp and local time.
pub const CLOCK_SKEW_MAX_SECS: u64 = 2 * 60 * 60;

/// The loosest allowed target — the network's floor difficulty. No
/// header may declare a target above this.
pub fn target_difficulty_limit() -> U256 {
    U256::max_value() >> 32
}

/// Expands Bitcoin-style compact "bits" into a full 256-bit target.
/// Byte 3 (the exponent) counts the mantissa's length in bytes; bytes
/// 0..=2 are the mantissa, big-endian. A mantissa whose top bit is set
/// is treated as negative by the wire format and expands to zero,
/// mirroring Bitcoin's own compact-int quirk.
pub fn expand_target(bits: CompactTarget) -> U256 {
    let bits = bits.0;
    let exponent = (bits >> 24) as u32;
    let mantissa = bits & 0x007f_ffff;

    if bits & 0x0080_0000 != 0 {
        return U256::zero();
    }
    if exponent <= 3 {
        U256::from(mantissa >> (8 * (3 - exponent)))
    } else {
        U256::from(mantissa) << (8 * (exponent - 3))
    }
}

/// Compacts a 256-bit target into canonical "bits" form — the inverse
/// of [`expand_target`]. Used both to encode a freshly retargeted value
/// and to check that a header's declared bits are already canonical
/// (non-canonical encodings of the same target are rejected).
pub fn compact_from_target(target: U256) -> CompactTarget {
    if target.is_zero() {
        return CompactTarget(0);
    }

    let mut bytes = [0u8; 32];
    target.to_big_endian(&mut bytes);
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(32);
    let mut size = (32 - first_nonzero) as u32;

    let mantissa_bytes = |size: u32| -> [u8; 3] {
        let mut m = [0u8; 3];
        for (i, slot) in m.iter_mut().enumerate() {
            let byte_index = 32 - size as usize + i;
            *slot = if byte_index < 32 { bytes[byte_index] } else { 0 };
        }
        m
    };

    let mut mantissa = mantissa_bytes(size);
    // If the high bit of the mantissa would be set, the compact form
    // would be misread as negative; shift right one byte and bump size.
    if mantissa[0] & 0x80 != 0 {
        mantissa = [0, mantissa[0], mantissa[1]];
        size += 1;
    }

    let m = u32::from_be_bytes([0, mantissa[0], mantissa[1], mantissa[2]]);
    CompactTarget((size << 24) | m)
}

/// `true` if `bits` is the unique canonical compact encoding of its own
/// expanded target.
pub fn is_canonical(bits: CompactTarget) -> bool {
    compact_from_target(expand_target(bits)) == bits
}

/// Proof-of-work check: the header's hash must not exceed the target
/// its own declared bits imply.
pub fn pow_is_valid(header_hash: Hash, bits: CompactTarget) -> bool {
    header_hash.as_u256() <= expand_target(bits)
}

/// Convenience wrapper hashing the header's canonical bytes first.
pub fn pow_is_valid_for_bytes(header_canonical_bytes: &[u8], bits: CompactTarget) -> bool {
    pow_is_valid(h256(header_canonical_bytes), bits)
}

/// New target for the next retarget window: scales the old
/// target by the ratio of actual to expected timespan, clamped to
/// `[old/4, old*4]` so difficulty can only double or quarter per window.
pub fn retarget(old_target: U256, actual_timespan_secs: i64, expected_timespan_secs: i64) -> U256 {
    let actual = actual_timespan_secs.max(expected_timespan_secs / 4) as u64;
    let actual = actual.min((expected_timespan_secs * 4) as u64);

    let scaled = old_target.saturating_mul(U256::from(actual)) / U256::from(expected_timespan_secs as u64);

    let floor = old_target / 4;
    let ceiling = old_target.saturating_mul(U256::from(4u8));
    let limit = target_difficulty_limit();

    scaled.clamp(floor, ceiling).min(limit)
}

/// Chain selection: strictly greatest cumulative work wins;
/// ties broken by lexicographically smaller tip hash so every node
/// converges on the same branch without further communication.
pub fn is_better_chain(candidate: &ChainTip, current: &ChainTip) -> bool {
    match candidate.cumulative_work.cmp(&current.cumulative_work) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => candidate.hash.as_bytes() < current.hash.as_bytes(),
    }
}
