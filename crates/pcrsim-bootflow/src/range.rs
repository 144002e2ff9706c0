// SPDX-License-Identifier: MIT OR Apache-2.0

//! Byte ranges over an artifact and their set algebra

use std::fmt;
use std::ops::Deref;

use serde::Serialize;

/// A contiguous byte range `[offset, offset + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Range {
    pub offset: u64,
    pub length: u64,
}

impl Range {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Exclusive end of the range.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// True if both ranges share at least one byte. Empty ranges overlap nothing.
    pub fn overlaps(&self, other: &Range) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }

    /// True if `other` lies entirely within this range.
    pub fn contains(&self, other: &Range) -> bool {
        other.offset >= self.offset && other.end() <= self.end()
    }

    /// Subtract every range in `exclude` from this range.
    ///
    /// Remainders are produced in ascending order and never have zero length.
    pub fn exclude(&self, exclude: &[Range]) -> Vec<Range> {
        let mut left = if self.is_empty() {
            Vec::new()
        } else {
            vec![*self]
        };
        for cut in exclude {
            left = left
                .into_iter()
                .flat_map(|r| r.subtract(cut))
                .collect();
        }
        left
    }

    fn subtract(self, cut: &Range) -> Vec<Range> {
        if !self.overlaps(cut) {
            return vec![self];
        }
        let mut result = Vec::with_capacity(2);
        if cut.offset > self.offset {
            result.push(Range::new(self.offset, cut.offset - self.offset));
        }
        if cut.end() < self.end() {
            result.push(Range::new(cut.end(), self.end() - cut.end()));
        }
        result
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}:{:X}", self.offset, self.end())
    }
}

/// An ordered collection of [`Range`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Ranges(Vec<Range>);

impl Ranges {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, range: Range) {
        self.0.push(range);
    }

    pub fn extend<I: IntoIterator<Item = Range>>(&mut self, ranges: I) {
        self.0.extend(ranges);
    }

    /// Sum of all range lengths (overlaps counted twice unless merged first).
    pub fn total_length(&self) -> u64 {
        self.0.iter().map(|r| r.length).sum()
    }

    /// Sort by offset and merge overlapping or directly adjacent ranges.
    ///
    /// Idempotent: a second call never changes the result.
    pub fn sort_and_merge(&mut self) {
        if self.0.len() < 2 {
            return;
        }
        self.0.sort();

        let mut merged: Vec<Range> = Vec::with_capacity(self.0.len());
        for r in self.0.drain(..) {
            match merged.last_mut() {
                Some(cur) if r.offset <= cur.end() => {
                    let end = cur.end().max(r.end());
                    cur.length = end - cur.offset;
                }
                _ => merged.push(r),
            }
        }
        self.0 = merged;
    }

    /// Subtract `exclude` from each range, dropping empty remainders.
    pub fn exclude(&self, exclude: &[Range]) -> Ranges {
        self.0
            .iter()
            .flat_map(|r| r.exclude(exclude))
            .filter(|r| !r.is_empty())
            .collect()
    }

    pub fn into_vec(self) -> Vec<Range> {
        self.0
    }
}

impl Deref for Ranges {
    type Target = [Range];

    fn deref(&self) -> &[Range] {
        &self.0
    }
}

impl From<Vec<Range>> for Ranges {
    fn from(ranges: Vec<Range>) -> Self {
        Self(ranges)
    }
}

impl From<Range> for Ranges {
    fn from(range: Range) -> Self {
        Self(vec![range])
    }
}

impl FromIterator<Range> for Ranges {
    fn from_iter<I: IntoIterator<Item = Range>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Ranges {
    type Item = Range;
    type IntoIter = std::vec::IntoIter<Range>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Ranges {
    type Item = &'a Range;
    type IntoIter = std::slice::Iter<'a, Range>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Ranges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, r) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", r)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(items: &[(u64, u64)]) -> Ranges {
        items.iter().map(|&(o, l)| Range::new(o, l)).collect()
    }

    #[test]
    fn test_merge_adjacent_ranges() {
        let mut r = ranges(&[(0x10, 0x10), (0x20, 0x08)]);
        r.sort_and_merge();
        assert_eq!(r, ranges(&[(0x10, 0x18)]));
    }

    #[test]
    fn test_disjoint_ranges_stay_separate() {
        let mut r = ranges(&[(0x30, 0x10), (0x10, 0x10)]);
        r.sort_and_merge();
        assert_eq!(r, ranges(&[(0x10, 0x10), (0x30, 0x10)]));
    }

    #[test]
    fn test_merge_overlapping_and_contained() {
        let mut r = ranges(&[(0x00, 0x20), (0x10, 0x05), (0x18, 0x10), (0x40, 0x01)]);
        r.sort_and_merge();
        assert_eq!(r, ranges(&[(0x00, 0x28), (0x40, 0x01)]));
    }

    #[test]
    fn test_sort_and_merge_is_idempotent() {
        // Deterministic pseudo-random samples
        let mut seed = 0x2545_f491_4f6c_dd1du64;
        for _ in 0..200 {
            let mut r = Ranges::new();
            for _ in 0..8 {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                r.push(Range::new(seed % 256, (seed >> 8) % 32));
            }
            r.sort_and_merge();
            let once = r.clone();
            r.sort_and_merge();
            assert_eq!(r, once);
        }
    }

    #[test]
    fn test_exclude_middle_splits_range() {
        let r = Range::new(0x00, 0x100);
        assert_eq!(
            r.exclude(&[Range::new(0x40, 0x10)]),
            vec![Range::new(0x00, 0x40), Range::new(0x50, 0xB0)]
        );
    }

    #[test]
    fn test_exclude_edges_and_whole() {
        let r = Range::new(0x10, 0x10);
        assert_eq!(r.exclude(&[Range::new(0x00, 0x18)]), vec![Range::new(0x18, 0x08)]);
        assert_eq!(r.exclude(&[Range::new(0x18, 0x100)]), vec![Range::new(0x10, 0x08)]);
        assert!(r.exclude(&[Range::new(0x00, 0x100)]).is_empty());
        assert!(r.exclude(&[r]).is_empty());
    }

    #[test]
    fn test_exclude_disjoint_passes_through() {
        let r = Range::new(0x10, 0x10);
        assert_eq!(r.exclude(&[Range::new(0x20, 0x10)]), vec![r]);
    }

    #[test]
    fn test_exclude_never_yields_empty_ranges() {
        let r = ranges(&[(0x00, 0x10), (0x10, 0x00), (0x20, 0x10)]);
        let left = r.exclude(&[Range::new(0x00, 0x10), Range::new(0x20, 0x08)]);
        assert_eq!(left, ranges(&[(0x28, 0x08)]));
    }

    #[test]
    fn test_display() {
        let r = ranges(&[(0x10, 0x10), (0x40, 0x02)]);
        assert_eq!(r.to_string(), "[10:20,40:42]");
    }
}
