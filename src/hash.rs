use std::hash::{BuildHasher, Hash};

use foldhash::fast::FixedState;

/// Seed for the first bloom base hash.
pub(crate) const BLOOM_SEED_A: u64 = 0x9e37_79b9_7f4a_7c15;
/// Seed for the second bloom base hash.
pub(crate) const BLOOM_SEED_B: u64 = 0xc2b2_ae3d_27d4_eb4f;
/// Seed used when folding trie suffixes into the overflow table.
pub(crate) const SUFFIX_SEED: u64 = 0x165c_5f0d_e2a9_3a1d;

/// Hashes `data` to a well-distributed 64-bit value.
///
/// This is the upstream hash capability the rest of the crate consumes:
/// callers use it to produce [`PreshMap`](crate::PreshMap) and
/// [`PreshCounter`](crate::PreshCounter) keys, and the bloom filter derives
/// its bit positions from the same function. Seeding is fixed, so results
/// are stable across platforms, processes and runs.
///
/// The returned value can be 0 in principle; callers feeding keys into a
/// map or counter should remap that one value into the nonzero space.
pub fn hash64(data: &[u8]) -> u64 {
    hash64_seeded(data, 0)
}

/// Hashes any hashable value with an explicit seed.
///
/// Distinct seeds give independent hash functions over the same input,
/// which is what the bloom filter's double hashing and the trie's suffix
/// folding rely on.
pub(crate) fn hash64_seeded(value: impl Hash, seed: u64) -> u64 {
    FixedState::with_seed(seed).hash_one(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = hash64(b"presh");
        let b = hash64(b"presh");
        assert_eq!(a, b);
        assert_ne!(hash64(b"presh"), hash64(b"Presh"));
    }

    #[test]
    fn test_seeds_independent() {
        let item = 42u64;
        assert_ne!(
            hash64_seeded(&item, BLOOM_SEED_A),
            hash64_seeded(&item, BLOOM_SEED_B)
        );
        assert_ne!(hash64_seeded(&item, SUFFIX_SEED), 0);
    }
}
