//! Record checksums for the disk cache.
//!
//! xxh32 with a fixed zero seed: deterministic across processes and
//! platforms, fast, and not meant to resist an adversary. It only has to
//! catch truncated or bit-flipped records before their bytes are trusted.

use xxhash_rust::xxh32::{Xxh32, xxh32};

const SEED: u32 = 0;

/// Hashes a single byte span.
#[inline]
#[must_use]
pub fn checksum(bytes: &[u8]) -> u32 {
    xxh32(bytes, SEED)
}

/// Hashes the concatenation of `parts` without copying them together.
#[must_use]
pub fn checksum_parts(parts: &[&[u8]]) -> u32 {
    let mut hasher = Xxh32::new(SEED);
    for part in parts {
        hasher.update(part);
    }
    hasher.digest()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let data = b"vertex + pixel program blob";
        assert_eq!(checksum(data), checksum(data));
    }

    #[test]
    fn test_parts_match_concatenation() {
        let key = [1u8, 2, 3, 4];
        let value = [9u8; 37];
        let joined: Vec<u8> = key.iter().chain(value.iter()).copied().collect();

        assert_eq!(checksum_parts(&[&key, &value]), checksum(&joined));
    }

    #[test]
    fn test_single_bit_flip_changes_hash() {
        let mut data = vec![0x5Au8; 64];
        let before = checksum(&data);
        data[17] ^= 0x01;
        assert_ne!(before, checksum(&data));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(checksum(&[]), checksum_parts(&[]));
        assert_eq!(checksum(&[]), checksum_parts(&[&[], &[]]));
    }
}
