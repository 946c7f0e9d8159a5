use crate::error::Result;
use crate::map::PreshMap;

/// Frequency counter over pre-hashed 64-bit keys.
///
/// A `PreshCounter` stores saturating integer counts in the same slot
/// array as [`PreshMap`] and keeps the total mass of all counts up to
/// date incrementally, so [`total`](Self::total) is O(1) rather than a
/// scan.
///
/// Counts saturate rather than wrap: [`increment`](Self::increment)
/// clamps at `u64::MAX` and [`decrement`](Self::decrement) clamps at
/// zero. Absent keys read as zero — there is no way to distinguish a key
/// that was never seen from one whose count was decremented back to
/// nothing, which is the useful interpretation for frequency data.
///
/// # Examples
///
/// ```
/// use presh::PreshCounter;
///
/// # fn main() -> presh::Result<()> {
/// let mut counter = PreshCounter::new();
/// counter.increment(7, 2)?;
/// counter.increment(7, 3)?;
/// assert_eq!(counter.get(7), 5);
/// assert_eq!(counter.get(8), 0);
/// assert_eq!(counter.total(), 5);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct PreshCounter {
    map: PreshMap,
    total: u64,
}

impl PreshCounter {
    /// Creates an empty counter with the default capacity.
    pub fn new() -> Self {
        PreshCounter {
            map: PreshMap::new(),
            total: 0,
        }
    }

    /// Creates an empty counter with room for at least `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        PreshCounter {
            map: PreshMap::with_capacity(capacity),
            total: 0,
        }
    }

    /// Returns the count stored under `key`, or 0 when absent.
    pub fn get(&self, key: u64) -> u64 {
        self.map.get(key).unwrap_or(0)
    }

    /// Adds `amount` to the count under `key` and returns the new count.
    ///
    /// An absent key is inserted with `amount` as its count. The count
    /// saturates at `u64::MAX`; the running total only absorbs the delta
    /// that was actually applied.
    ///
    /// # Errors
    ///
    /// Returns [`PreshError::InvalidKey`](crate::PreshError::InvalidKey)
    /// for `key == 0`.
    pub fn increment(&mut self, key: u64, amount: u64) -> Result<u64> {
        let current = self.get(key);
        let next = current.saturating_add(amount);
        self.map.set(key, next)?;
        self.total = self.total.saturating_add(next - current);
        Ok(next)
    }

    /// Subtracts `amount` from the count under `key` and returns the new
    /// count, clamping at zero.
    ///
    /// The slot stays occupied when a count reaches zero; it simply reads
    /// back as unseen.
    ///
    /// # Errors
    ///
    /// Returns [`PreshError::InvalidKey`](crate::PreshError::InvalidKey)
    /// for `key == 0`.
    pub fn decrement(&mut self, key: u64, amount: u64) -> Result<u64> {
        let current = self.get(key);
        let next = current.saturating_sub(amount);
        self.map.set(key, next)?;
        self.total = self.total.saturating_sub(current - next);
        Ok(next)
    }

    /// Returns the sum of all stored counts.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Returns the number of distinct keys ever incremented.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` when no keys were ever incremented.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over the stored `(key, count)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.map.iter()
    }
}
