//! Checksummed content hashes
//!
//! A 160-bit content hash is RIPEMD-160 with the first 4 bytes dropped
//! (128 bits of clean data) and 32 checksum bits interleaved at fixed
//! positions, then base32-encoded into 32 uppercase characters. The
//! positions come from the decimal digits of pi: skip zeros, accumulate.

use super::hash::{ripemd160, sha256};

/// Length of an encoded 160-bit content hash
pub const CHASH160_LENGTH: usize = 32;

const CLEAN_BYTES: usize = 16;
const CHASH_BYTES: usize = 20;
const CHASH_BITS: usize = CHASH_BYTES * 8;
const CHECKSUM_BITS: usize = 32;

const PI_DIGITS: &[u8] = b"14159265358979323846264338327950288419716939937510";

const BASE32: base32::Alphabet = base32::Alphabet::RFC4648 { padding: false };

const fn checksum_offsets() -> [usize; CHECKSUM_BITS] {
    let mut offsets = [0usize; CHECKSUM_BITS];
    let mut offset = 0;
    let mut count = 0;
    let mut i = 0;
    while count < CHECKSUM_BITS {
        let digit = (PI_DIGITS[i] - b'0') as usize;
        i += 1;
        if digit == 0 {
            continue;
        }
        offset += digit;
        offsets[count] = offset;
        count += 1;
    }
    offsets
}

/// Bit positions (in the final 160 bits) that carry checksum bits
const CHECKSUM_OFFSETS: [usize; CHECKSUM_BITS] = checksum_offsets();

fn checksum(clean: &[u8]) -> [u8; 4] {
    let full = sha256(clean);
    [full[5], full[13], full[21], full[29]]
}

fn get_bit(bytes: &[u8], index: usize) -> bool {
    bytes[index / 8] & (0x80 >> (index % 8)) != 0
}

fn set_bit(bytes: &mut [u8], index: usize) {
    bytes[index / 8] |= 0x80 >> (index % 8);
}

fn mix_checksum(clean: &[u8; CLEAN_BYTES], checksum: &[u8; 4]) -> [u8; CHASH_BYTES] {
    let mut out = [0u8; CHASH_BYTES];
    let mut clean_index = 0;
    let mut checksum_index = 0;
    for position in 0..CHASH_BITS {
        let bit = if checksum_index < CHECKSUM_BITS
            && CHECKSUM_OFFSETS[checksum_index] == position
        {
            checksum_index += 1;
            get_bit(checksum, checksum_index - 1)
        } else {
            clean_index += 1;
            get_bit(clean, clean_index - 1)
        };
        if bit {
            set_bit(&mut out, position);
        }
    }
    out
}

fn separate_checksum(chash: &[u8; CHASH_BYTES]) -> ([u8; CLEAN_BYTES], [u8; 4]) {
    let mut clean = [0u8; CLEAN_BYTES];
    let mut checksum = [0u8; 4];
    let mut clean_index = 0;
    let mut checksum_index = 0;
    for position in 0..CHASH_BITS {
        let bit = get_bit(chash, position);
        if checksum_index < CHECKSUM_BITS && CHECKSUM_OFFSETS[checksum_index] == position {
            if bit {
                set_bit(&mut checksum, checksum_index);
            }
            checksum_index += 1;
        } else {
            if bit {
                set_bit(&mut clean, clean_index);
            }
            clean_index += 1;
        }
    }
    (clean, checksum)
}

/// Compute the 32-character content hash of `data`
pub fn chash160(data: &str) -> String {
    let hash = ripemd160(data.as_bytes());
    let mut clean = [0u8; CLEAN_BYTES];
    clean.copy_from_slice(&hash[4..]);
    let mixed = mix_checksum(&clean, &checksum(&clean));
    base32::encode(BASE32, &mixed)
}

/// Check length, alphabet and embedded checksum of a content hash
pub fn is_chash_valid(encoded: &str) -> bool {
    // The decoder folds case; addresses are uppercase only
    if encoded.len() != CHASH160_LENGTH || encoded.bytes().any(|c| c.is_ascii_lowercase()) {
        return false;
    }
    let Some(decoded) = base32::decode(BASE32, encoded) else {
        return false;
    };
    if decoded.len() != CHASH_BYTES {
        return false;
    }
    let mut chash = [0u8; CHASH_BYTES];
    chash.copy_from_slice(&decoded);
    let (clean, embedded) = separate_checksum(&chash);
    checksum(&clean) == embedded
}
