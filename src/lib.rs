//! Memory-dense building blocks for text and NLP pipelines.
//!
//! The `presh` crate provides a small family of performance-critical data
//! structures that all trust their callers to supply well-distributed
//! 64-bit keys: an open-addressing hash map that skips re-hashing
//! ([`PreshMap`]), a frequency counter built on the same slot array
//! ([`PreshCounter`]), a trie that assigns compact sequential ids to
//! sequences of small integers with hash backoff for rare long tails
//! ([`SequenceTrie`]), and a bloom filter with a portable, versioned byte
//! encoding ([`BloomFilter`]).
//!
//! The structures are peers, not a pipeline: each is created empty,
//! mutated in place by a single writer, and dropped by its owner. None of
//! them lock internally; sharing an instance across threads while writing
//! is the caller's problem to prevent.
//!
//! Typical usage hashes external data once with [`hash64`] and feeds the
//! resulting keys into a map or counter:
//!
//! ```
//! use presh::{hash64, PreshCounter};
//!
//! # fn main() -> presh::Result<()> {
//! let mut counts = PreshCounter::new();
//! for word in ["the", "cat", "the"] {
//!     counts.increment(hash64(word.as_bytes()) | 1, 1)?;
//! }
//! assert_eq!(counts.get(hash64(b"the") | 1), 2);
//! assert_eq!(counts.total(), 3);
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::{PreshError, Result};

mod hash;
pub use hash::hash64;

mod map;
pub use map::{PreshMap, EMPTY_KEY};

mod counter;
pub use counter::PreshCounter;

mod trie;
pub use trie::{SequenceTrie, DEFAULT_MAX_DEPTH};

mod bloom;
pub use bloom::BloomFilter;
