//! A fixed-capacity bit vector.
//!
//! Used for mark bits in the IR passes (live nodes in dead-code elimination, visited blocks in
//! the block map), where keys are dense node or block indices.
//!
//! # Example
//!
//! ```rust,ignore
//! use bcgraph::utils::BitSet;
//!
//! let mut marks = BitSet::new(100);
//! assert!(marks.insert(50));
//! assert!(!marks.insert(50));
//! assert!(marks.contains(50));
//! assert_eq!(marks.iter().collect::<Vec<_>>(), vec![50]);
//! ```

/// A bit vector over the indices `0..capacity`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: Vec<u64>,
    len: usize,
}

impl BitSet {
    /// Creates an empty bit set able to hold indices below `capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            len: capacity,
        }
    }

    /// Returns the capacity of this bit set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Sets the bit at `index`, returning `true` if it was previously clear.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn insert(&mut self, index: usize) -> bool {
        assert!(index < self.len, "index out of bounds");
        let mask = 1u64 << (index % 64);
        let word = &mut self.words[index / 64];
        let was_clear = *word & mask == 0;
        *word |= mask;
        was_clear
    }

    /// Clears the bit at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn remove(&mut self, index: usize) {
        assert!(index < self.len, "index out of bounds");
        self.words[index / 64] &= !(1u64 << (index % 64));
    }

    /// Returns `true` if the bit at `index` is set. Indices beyond the capacity are clear.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        index < self.len && self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// Returns the number of bits set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns an iterator over the indices of set bits, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_idx, &word)| {
                (0..64).filter_map(move |bit| {
                    (word & (1u64 << bit) != 0).then_some(word_idx * 64 + bit)
                })
            })
            .take_while(|&idx| idx < self.len)
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_basic() {
        let mut bs = BitSet::new(100);
        assert!(bs.is_empty());

        assert!(bs.insert(0));
        assert!(bs.insert(64));
        assert!(bs.insert(99));
        assert!(!bs.insert(64));

        assert!(bs.contains(64));
        assert!(!bs.contains(63));
        assert!(!bs.contains(1000));
        assert_eq!(bs.count(), 3);
        assert_eq!(bs.iter().collect::<Vec<_>>(), vec![0, 64, 99]);

        bs.remove(64);
        assert_eq!(bs.count(), 2);
    }

    #[test]
    fn test_bitset_debug() {
        let mut bs = BitSet::new(10);
        bs.insert(2);
        bs.insert(7);
        assert_eq!(format!("{bs:?}"), "{2, 7}");
    }
}
