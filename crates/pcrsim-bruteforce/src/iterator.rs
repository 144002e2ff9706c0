// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-place iteration over bit-flip combinations in rank order

use crate::combination::{apply_bit_flips, unrank, UniqueUnorderedCombination};

/// Walks every combination of `distance` bits out of `bits`, in the order
/// of their colexicographic id, without allocating per step.
#[derive(Debug, Clone)]
pub struct UniqueUnorderedCombinationIterator {
    bits: u64,
    current: Vec<u64>,
}

impl UniqueUnorderedCombinationIterator {
    /// Positioned at id 0: the lowest `distance` bits.
    pub fn new(distance: u64, bits: u64) -> Self {
        Self {
            bits,
            current: (0..distance).collect(),
        }
    }

    /// Jump to the combination with the given id.
    pub fn set_combination_id(&mut self, id: u128) {
        self.current = unrank(id, self.current.len() as u64, self.bits);
    }

    pub fn combination(&self) -> &[u64] {
        &self.current
    }

    pub fn get_combination(&self) -> UniqueUnorderedCombination {
        UniqueUnorderedCombination::from(self.current.clone())
    }

    pub fn apply_bit_flips(&self, data: &mut [u8]) {
        apply_bit_flips(&self.current, data);
    }

    /// Move to the next id. Returns false, leaving the position unchanged,
    /// once the last combination is reached.
    pub fn advance(&mut self) -> bool {
        let k = self.current.len();
        for i in 0..k {
            let limit = if i + 1 < k {
                self.current[i + 1]
            } else {
                self.bits
            };
            if self.current[i] + 1 < limit {
                self.current[i] += 1;
                for (j, slot) in self.current[..i].iter_mut().enumerate() {
                    *slot = j as u64;
                }
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combination::{binomial, rank};

    #[test]
    fn test_advance_follows_rank() {
        let (distance, bits) = (3, 9);
        let mut iter = UniqueUnorderedCombinationIterator::new(distance, bits);
        let count = binomial(bits, distance).unwrap();
        for id in 0..count {
            assert_eq!(rank(iter.combination()), Some(id));
            assert_eq!(iter.advance(), id + 1 < count);
        }
        assert_eq!(iter.combination(), &[6, 7, 8]);
    }

    #[test]
    fn test_seek_then_advance() {
        let mut iter = UniqueUnorderedCombinationIterator::new(2, 16);
        iter.set_combination_id(40);
        let seeked = iter.combination().to_vec();
        assert_eq!(rank(&seeked), Some(40));
        assert!(iter.advance());
        assert_eq!(rank(iter.combination()), Some(41));
    }

    #[test]
    fn test_empty_distance() {
        let mut iter = UniqueUnorderedCombinationIterator::new(0, 8);
        assert!(iter.combination().is_empty());
        assert!(!iter.advance());
    }
}
