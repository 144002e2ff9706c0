// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bit-flip combinations and their ranking
//!
//! A combination of distance `k` over `n` bits is a strictly ascending list
//! of `k` bit indices. Combinations are numbered in colexicographic order
//! (the combinatorial number system): the id of `c_0 < c_1 < ... < c_{k-1}`
//! is `C(c_0, 1) + C(c_1, 2) + ... + C(c_{k-1}, k)`, which makes ids of
//! distance `k` a bijection onto `[0, C(n, k))`.

use std::fmt;
use std::ops::Deref;

/// Exact binomial coefficient, `None` if it does not fit in a `u128`.
pub fn binomial(n: u64, k: u64) -> Option<u128> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 0..k {
        // result * (n - i) is always divisible by (i + 1)
        result = result.checked_mul(u128::from(n - i))? / u128::from(i + 1);
    }
    Some(result)
}

/// Colexicographic rank of an ascending list of bit indices, `None` if it
/// does not fit in a `u128`.
pub fn rank(combination: &[u64]) -> Option<u128> {
    combination
        .iter()
        .enumerate()
        .try_fold(0u128, |acc, (i, c)| acc.checked_add(binomial(*c, i as u64 + 1)?))
}

/// Inverse of [`rank`] for combinations of `distance` bits out of `bits`.
pub fn unrank(mut id: u128, distance: u64, bits: u64) -> Vec<u64> {
    let mut combination = vec![0u64; distance as usize];
    let mut upper = bits;
    for i in (1..=distance).rev() {
        // Largest c < upper with C(c, i) <= id; C(i - 1, i) == 0 bounds the search
        let mut c = upper.saturating_sub(1).max(i - 1);
        while c >= i && binomial(c, i).map_or(true, |b| b > id) {
            c -= 1;
        }
        id -= binomial(c, i).unwrap_or(0);
        combination[(i - 1) as usize] = c;
        upper = c;
    }
    combination
}

/// Flip the bits at `indices`. Bit `i` is bit `i % 8` (LSB first) of byte `i / 8`.
///
/// Flipping is its own inverse.
pub fn apply_bit_flips(indices: &[u64], data: &mut [u8]) {
    for bit in indices {
        data[(bit / 8) as usize] ^= 1 << (bit % 8);
    }
}

/// A set of distinct bit indices, ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UniqueUnorderedCombination(Vec<u64>);

impl UniqueUnorderedCombination {
    /// The combination with colexicographic `id` among those of `distance`
    /// bits out of `bits`.
    pub fn from_id(id: u128, distance: u64, bits: u64) -> Self {
        Self(unrank(id, distance, bits))
    }

    /// Hamming distance the combination represents.
    pub fn distance(&self) -> usize {
        self.0.len()
    }

    pub fn id(&self) -> Option<u128> {
        rank(&self.0)
    }

    pub fn apply_bit_flips(&self, data: &mut [u8]) {
        apply_bit_flips(&self.0, data);
    }

    pub fn into_vec(self) -> Vec<u64> {
        self.0
    }
}

impl Deref for UniqueUnorderedCombination {
    type Target = [u64];

    fn deref(&self) -> &[u64] {
        &self.0
    }
}

impl From<Vec<u64>> for UniqueUnorderedCombination {
    /// Sorts and deduplicates `indices`.
    fn from(mut indices: Vec<u64>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self(indices)
    }
}

impl fmt::Display for UniqueUnorderedCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, bit) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", bit)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binomial() {
        assert_eq!(binomial(0, 0), Some(1));
        assert_eq!(binomial(8, 2), Some(28));
        assert_eq!(binomial(64, 32), Some(1_832_624_140_942_590_534));
        assert_eq!(binomial(3, 5), Some(0));
        assert_eq!(binomial(1000, 500), None);
    }

    #[test]
    fn test_colex_order() {
        let ids: Vec<Vec<u64>> = (0..binomial(4, 2).unwrap())
            .map(|id| unrank(id, 2, 4))
            .collect();
        assert_eq!(
            ids,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![1, 2],
                vec![0, 3],
                vec![1, 3],
                vec![2, 3]
            ]
        );
    }

    #[test]
    fn test_rank_unrank_sampled() {
        for (bits, distance) in [(8u64, 1u64), (8, 3), (16, 5), (64, 4), (200, 7)] {
            let count = binomial(bits, distance).unwrap();
            let step = (count / 97).max(1);
            let mut id = 0;
            while id < count {
                let combination = unrank(id, distance, bits);
                assert_eq!(combination.len() as u64, distance);
                assert!(combination.windows(2).all(|w| w[0] < w[1]));
                assert!(combination.iter().all(|c| *c < bits));
                assert_eq!(rank(&combination), Some(id), "bits={bits} distance={distance}");
                id += step;
            }
            assert_eq!(rank(&unrank(count - 1, distance, bits)), Some(count - 1));
        }
    }

    #[test]
    fn test_last_combination_is_highest_bits() {
        let last = unrank(binomial(10, 3).unwrap() - 1, 3, 10);
        assert_eq!(last, vec![7, 8, 9]);
    }

    #[test]
    fn test_apply_bit_flips_is_involution() {
        let mut data = [0x00u8, 0xF0];
        apply_bit_flips(&[0, 1, 15], &mut data);
        assert_eq!(data, [0x03, 0x70]);
        apply_bit_flips(&[0, 1, 15], &mut data);
        assert_eq!(data, [0x00, 0xF0]);
    }

    #[test]
    fn test_display_and_from() {
        let combination = UniqueUnorderedCombination::from(vec![9, 1, 9, 4]);
        assert_eq!(combination.to_string(), "{1,4,9}");
        assert_eq!(combination.distance(), 3);
        assert_eq!(
            UniqueUnorderedCombination::from_id(combination.id().unwrap(), 3, 16),
            combination
        );
        assert_eq!(UniqueUnorderedCombination::default().to_string(), "{}");
    }
}
