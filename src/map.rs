use crate::error::{PreshError, Result};

/// Reserved key marking an empty slot.
///
/// Because the sentinel lives in the key space, 0 is not a usable key:
/// [`PreshMap::set`] rejects it with [`PreshError::InvalidKey`] and
/// [`PreshMap::get`] reports it as absent.
pub const EMPTY_KEY: u64 = 0;

/// Default slot count for maps created with [`PreshMap::new`].
const DEFAULT_CAPACITY: usize = 8;

/// A single key-value slot in the backing array.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cell {
    pub(crate) key: u64,
    pub(crate) value: u64,
}

/// Open-addressing hash map over pre-hashed 64-bit keys.
///
/// A `PreshMap` trusts that its keys were already produced by a uniform
/// hash function (see [`hash64`](crate::hash64)) and performs no further
/// hashing or collision diffusion: lookups probe linearly from
/// `key & (capacity - 1)`. The backing store is a contiguous array of
/// key-value slots with key 0 as the empty sentinel, so a slot is exactly
/// sixteen bytes and iteration is a linear scan.
///
/// Capacity is always a power of two. Once more than 70% of the slots are
/// occupied the map doubles its capacity and re-probes every occupied slot
/// into the new array, which keeps probe chains short and guarantees that
/// probing always terminates on an empty slot.
///
/// No internal locking is performed; concurrent mutation of one instance
/// must be prevented by the caller. Concurrent reads without a writer are
/// safe.
///
/// # Examples
///
/// ```
/// use presh::PreshMap;
///
/// # fn main() -> presh::Result<()> {
/// let mut map = PreshMap::new();
/// assert_eq!(map.get(1), None);
/// map.set(1, 5)?;
/// map.set(2, 6)?;
/// assert_eq!(map.get(1), Some(5));
/// assert_eq!(map.get(2), Some(6));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PreshMap {
    cells: Vec<Cell>,
    filled: usize,
}

impl PreshMap {
    /// Creates an empty map with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty map with room for at least `capacity` slots.
    ///
    /// The requested capacity is rounded up to the next power of two so
    /// probing can use mask arithmetic instead of division.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        PreshMap {
            cells: vec![Cell::default(); capacity],
            filled: 0,
        }
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.filled
    }

    /// Returns `true` when no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Returns the current slot count.
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Looks up `key`, returning its value if present.
    ///
    /// Probes from `key & (capacity - 1)` until the key or an empty slot
    /// is found. Never mutates the map; querying the reserved key 0
    /// simply reports absent.
    pub fn get(&self, key: u64) -> Option<u64> {
        let cell = &self.cells[self.find_slot(key)];
        if cell.key == key && key != EMPTY_KEY {
            Some(cell.value)
        } else {
            None
        }
    }

    /// Inserts or overwrites the value stored under `key`.
    ///
    /// An existing slot with the same key is overwritten in place. A fresh
    /// insertion occupies the first empty slot on the probe chain and, if
    /// the table then exceeds its load-factor threshold, triggers a
    /// capacity-doubling resize that re-probes every occupied slot.
    ///
    /// # Errors
    ///
    /// Returns [`PreshError::InvalidKey`] for `key == 0`, which is
    /// reserved as the empty-slot sentinel.
    pub fn set(&mut self, key: u64, value: u64) -> Result<()> {
        if key == EMPTY_KEY {
            return Err(PreshError::InvalidKey);
        }
        let index = self.find_slot(key);
        let cell = &mut self.cells[index];
        if cell.key == key {
            cell.value = value;
            return Ok(());
        }
        *cell = Cell { key, value };
        self.filled += 1;
        // Keep filled <= 70% of capacity so a probe always hits an empty
        // slot eventually.
        if self.filled * 10 >= self.cells.len() * 7 {
            self.grow();
        }
        Ok(())
    }

    /// Removes every entry while keeping the current capacity.
    pub fn clear(&mut self) {
        self.cells.fill(Cell::default());
        self.filled = 0;
    }

    /// Iterates over the stored `(key, value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.cells
            .iter()
            .filter(|cell| cell.key != EMPTY_KEY)
            .map(|cell| (cell.key, cell.value))
    }

    /// Returns the index of the slot holding `key`, or of the first empty
    /// slot on its probe chain.
    fn find_slot(&self, key: u64) -> usize {
        let mask = self.cells.len() - 1;
        let mut index = key as usize & mask;
        loop {
            let cell = &self.cells[index];
            if cell.key == key || cell.key == EMPTY_KEY {
                return index;
            }
            index = (index + 1) & mask;
        }
    }

    /// Doubles the capacity and re-probes every occupied slot.
    fn grow(&mut self) {
        let doubled = self.cells.len() * 2;
        let old = std::mem::replace(&mut self.cells, vec![Cell::default(); doubled]);
        log::debug!(
            "resizing presh map: {} -> {} slots ({} filled)",
            old.len(),
            self.cells.len(),
            self.filled
        );
        for cell in old {
            if cell.key == EMPTY_KEY {
                continue;
            }
            // Keys are unique, so reinsertion order cannot change the
            // final contents.
            let index = self.find_slot(cell.key);
            self.cells[index] = cell;
        }
    }
}

impl Default for PreshMap {
    fn default() -> Self {
        Self::new()
    }
}
