use std::f64::consts::LN_2;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{PreshError, Result};
use crate::hash::{hash64_seeded, BLOOM_SEED_A, BLOOM_SEED_B};

/// Bits per storage container.
const CONTAINER_BITS: u64 = 64;

/// Bit size of filters created with [`BloomFilter::default`].
const DEFAULT_SIZE_BITS: u64 = 1024;

/// Hash rounds of filters created with [`BloomFilter::default`].
const DEFAULT_HASH_ROUNDS: u64 = 3;

/// Probabilistic set over 64-bit items with a portable byte encoding.
///
/// A `BloomFilter` stores a fixed-size bit array and derives `k` bit
/// positions per item by double hashing two seeded base hashes of the
/// item. Bits are only ever set, never cleared: [`contains`](Self::contains)
/// can report a false positive, but never a false negative for an item
/// that was [`add`](Self::add)ed.
///
/// The requested size in bits is rounded up to 64-bit container
/// granularity, so [`to_bytes`](Self::to_bytes) followed by
/// [`from_bytes`](Self::from_bytes) reproduces the filter bit for bit.
/// All hashing is fixed-seeded, which keeps serialized filters portable
/// across platforms and processes.
///
/// # Examples
///
/// ```
/// use presh::BloomFilter;
///
/// # fn main() -> presh::Result<()> {
/// let mut filter = BloomFilter::new(100, 2)?;
/// filter.add(23);
/// assert!(filter.contains(23));
///
/// let restored = BloomFilter::from_bytes(&filter.to_bytes())?;
/// assert!(restored.contains(23));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    hcount: u64,
    bitfield: Vec<u64>,
}

impl BloomFilter {
    /// Creates a filter with at least `size_bits` bits and `hash_rounds`
    /// hash rounds per item.
    ///
    /// The bit count is rounded up to a multiple of 64.
    ///
    /// # Errors
    ///
    /// Returns [`PreshError::InvalidArgument`] when either parameter is
    /// zero.
    pub fn new(size_bits: u64, hash_rounds: u64) -> Result<Self> {
        if size_bits == 0 {
            return Err(PreshError::InvalidArgument(
                "bloom filter size must be nonzero".to_string(),
            ));
        }
        if hash_rounds == 0 {
            return Err(PreshError::InvalidArgument(
                "bloom filter needs at least one hash round".to_string(),
            ));
        }
        let containers = size_bits.div_ceil(CONTAINER_BITS);
        Ok(BloomFilter {
            hcount: hash_rounds,
            bitfield: vec![0; containers as usize],
        })
    }

    /// Sizes a filter for `expected_items` insertions at roughly
    /// `error_rate` false positives, via the standard optimal-filter
    /// formulas `m = -n ln p / ln^2 2` and `k = (m / n) ln 2`.
    ///
    /// # Errors
    ///
    /// Returns [`PreshError::InvalidArgument`] when `expected_items` is
    /// zero or `error_rate` is outside `(0, 1)`.
    pub fn from_capacity_and_error_rate(expected_items: u64, error_rate: f64) -> Result<Self> {
        if expected_items == 0 {
            return Err(PreshError::InvalidArgument(
                "expected item count must be nonzero".to_string(),
            ));
        }
        if !(error_rate > 0.0 && error_rate < 1.0) {
            return Err(PreshError::InvalidArgument(format!(
                "error rate must be within (0, 1), got {}",
                error_rate
            )));
        }
        let items = expected_items as f64;
        let size_bits = (-items * error_rate.ln() / (LN_2 * LN_2)).ceil();
        let rounds = (size_bits / items * LN_2).round().max(1.0);
        Self::new(size_bits as u64, rounds as u64)
    }

    /// Returns the effective bit count (a multiple of 64).
    pub fn size_bits(&self) -> u64 {
        self.bitfield.len() as u64 * CONTAINER_BITS
    }

    /// Returns the number of hash rounds per item.
    pub fn hash_rounds(&self) -> u64 {
        self.hcount
    }

    /// Sets the bit at every derived position for `item`.
    pub fn add(&mut self, item: u64) {
        let bits = self.size_bits();
        let (base, stride) = Self::base_hashes(item);
        for round in 0..self.hcount {
            let position = base.wrapping_add(round.wrapping_mul(stride)) % bits;
            self.bitfield[(position / CONTAINER_BITS) as usize] |=
                1 << (position % CONTAINER_BITS);
        }
    }

    /// Returns `true` when every derived bit position for `item` is set.
    ///
    /// Always true for items previously added; true with probability
    /// roughly `(1 - e^(-kn/m))^k` for items never added.
    pub fn contains(&self, item: u64) -> bool {
        let bits = self.size_bits();
        let (base, stride) = Self::base_hashes(item);
        (0..self.hcount).all(|round| {
            let position = base.wrapping_add(round.wrapping_mul(stride)) % bits;
            self.bitfield[(position / CONTAINER_BITS) as usize]
                & (1 << (position % CONTAINER_BITS))
                != 0
        })
    }

    /// Serializes the filter into the current byte layout:
    /// `[hash_rounds: u64][container_count: u64][containers: u64 each]`,
    /// all little-endian and contiguous.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(16 + self.bitfield.len() * 8);
        bytes.extend_from_slice(&self.hcount.to_le_bytes());
        bytes.extend_from_slice(&(self.bitfield.len() as u64).to_le_bytes());
        for container in &self.bitfield {
            bytes.extend_from_slice(&container.to_le_bytes());
        }
        bytes
    }

    /// Reconstructs a filter from [`to_bytes`](Self::to_bytes) output or
    /// from either historical layout.
    ///
    /// The layout is picked by checking the declared container count
    /// against the total byte length, not by a version marker: 8-byte
    /// header fields with 8-byte containers is the current (and legacy
    /// wide) layout; 4-byte header fields with 4-byte containers is the
    /// legacy narrow layout, in which only the low half of each 64-bit
    /// container was persisted and the high half is taken as zero.
    ///
    /// # Errors
    ///
    /// Returns [`PreshError::Format`] for buffers that match neither
    /// layout or that declare zero hash rounds or zero containers.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() >= 16 {
            let hcount = u64::from_le_bytes(data[..8].try_into().unwrap());
            let count = u64::from_le_bytes(data[8..16].try_into().unwrap());
            let expected = count
                .checked_mul(8)
                .and_then(|payload| payload.checked_add(16));
            if expected == Some(data.len() as u64) {
                Self::check_header(hcount, count)?;
                let bitfield = data[16..]
                    .chunks_exact(8)
                    .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
                    .collect();
                return Ok(BloomFilter { hcount, bitfield });
            }
        }
        if data.len() >= 8 {
            let hcount = u32::from_le_bytes(data[..4].try_into().unwrap()) as u64;
            let count = u32::from_le_bytes(data[4..8].try_into().unwrap()) as u64;
            let expected = count
                .checked_mul(4)
                .and_then(|payload| payload.checked_add(8));
            if expected == Some(data.len() as u64) {
                Self::check_header(hcount, count)?;
                log::debug!("decoding legacy narrow bloom layout ({} containers)", count);
                let bitfield = data[8..]
                    .chunks_exact(4)
                    .map(|chunk| u32::from_le_bytes(chunk.try_into().unwrap()) as u64)
                    .collect();
                return Ok(BloomFilter { hcount, bitfield });
            }
        }
        Err(PreshError::Format(format!(
            "{} bytes match no bloom filter layout",
            data.len()
        )))
    }

    fn check_header(hcount: u64, count: u64) -> Result<()> {
        if hcount == 0 || count == 0 {
            return Err(PreshError::Format(
                "bloom filter buffer declares an empty filter".to_string(),
            ));
        }
        Ok(())
    }

    /// Derives the double-hashing base and stride for `item`. The stride
    /// is forced odd so consecutive rounds never repeat a position chain.
    fn base_hashes(item: u64) -> (u64, u64) {
        let base = hash64_seeded(item, BLOOM_SEED_A);
        let stride = hash64_seeded(item, BLOOM_SEED_B) | 1;
        (base, stride)
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        BloomFilter {
            hcount: DEFAULT_HASH_ROUNDS,
            bitfield: vec![0; (DEFAULT_SIZE_BITS / CONTAINER_BITS) as usize],
        }
    }
}

/// Serializes as exactly the [`BloomFilter::to_bytes`] encoding, so the
/// filter embeds in any serde format with byte support the same way it
/// serializes standalone.
impl Serialize for BloomFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for BloomFilter {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        struct BytesVisitor;

        impl<'de> Visitor<'de> for BytesVisitor {
            type Value = BloomFilter;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a bloom filter byte encoding")
            }

            fn visit_bytes<E: de::Error>(self, data: &[u8]) -> std::result::Result<Self::Value, E> {
                BloomFilter::from_bytes(data).map_err(E::custom)
            }

            fn visit_byte_buf<E: de::Error>(
                self,
                data: Vec<u8>,
            ) -> std::result::Result<Self::Value, E> {
                self.visit_bytes(&data)
            }

            fn visit_seq<A: de::SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut data = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(byte) = seq.next_element::<u8>()? {
                    data.push(byte);
                }
                self.visit_bytes(&data)
            }
        }

        deserializer.deserialize_bytes(BytesVisitor)
    }
}
