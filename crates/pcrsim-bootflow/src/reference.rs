// SPDX-License-Identifier: MIT OR Apache-2.0

//! References: bytes described by location rather than by value

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

use serde::Serialize;

use crate::artifact::{ArtifactKind, Artifacts};
use crate::error::BootflowError;
use crate::mapper::AddressMapper;
use crate::range::{Range, Ranges};

/// Bytes of one artifact, optionally addressed through an [`AddressMapper`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub artifact: ArtifactKind,
    /// `None` means the ranges are native artifact offsets.
    pub mapper: Option<AddressMapper>,
    pub ranges: Ranges,
}

/// Grouping key used for canonical ordering and set operations.
type ReferenceKey = (ArtifactKind, Option<AddressMapper>);

impl Reference {
    pub fn new(
        artifact: ArtifactKind,
        mapper: Option<AddressMapper>,
        ranges: impl Into<Ranges>,
    ) -> Self {
        Self {
            artifact,
            mapper,
            ranges: ranges.into(),
        }
    }

    fn key(&self) -> ReferenceKey {
        (self.artifact, self.mapper)
    }

    /// Ranges in native artifact offsets, sorted by offset.
    ///
    /// The mapper is consulted at call time against the artifact currently
    /// loaded, so a replaced artifact is observed.
    pub fn native_ranges(&self, artifacts: &Artifacts) -> Result<Ranges, BootflowError> {
        let artifact = artifacts.get(self.artifact)?;
        let mut ranges: Vec<Range> = match self.mapper {
            Some(mapper) => mapper.resolve(artifact, &self.ranges)?,
            None => self.ranges.to_vec(),
        };
        ranges.sort();
        Ok(ranges.into())
    }

    /// Equivalent reference in native artifact offsets (no mapper).
    pub fn resolve(&self, artifacts: &Artifacts) -> Result<Reference, BootflowError> {
        Ok(Reference::new(
            self.artifact,
            None,
            self.native_ranges(artifacts)?,
        ))
    }

    /// Read the referenced bytes, ranges in ascending offset order.
    pub fn bytes(&self, artifacts: &Artifacts) -> Result<Vec<u8>, BootflowError> {
        let artifact = artifacts.get(self.artifact)?;
        let ranges = self.native_ranges(artifacts)?;
        let mut out = Vec::new();
        for r in &ranges {
            out.extend_from_slice(&artifact.read_range(r)?);
        }
        Ok(out)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mapper {
            Some(mapper) => write!(f, "{}:{}:{}", self.artifact, mapper, self.ranges),
            None => write!(f, "{}:{}", self.artifact, self.ranges),
        }
    }
}

// =============================================================================
// References
// =============================================================================

/// An ordered collection of [`Reference`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct References(Vec<Reference>);

impl References {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, reference: Reference) {
        self.0.push(reference);
    }

    pub fn extend<I: IntoIterator<Item = Reference>>(&mut self, refs: I) {
        self.0.extend(refs);
    }

    /// Canonicalize: one reference per (artifact, mapper) pair in kind order,
    /// each with sorted, merged ranges. References left with no ranges are dropped.
    pub fn sort_and_merge(&mut self) {
        let mut grouped: BTreeMap<ReferenceKey, Ranges> = BTreeMap::new();
        for r in self.0.drain(..) {
            grouped.entry(r.key()).or_default().extend(r.ranges);
        }
        self.0 = grouped
            .into_iter()
            .filter(|(_, ranges)| !ranges.is_empty())
            .map(|((artifact, mapper), mut ranges)| {
                ranges.sort_and_merge();
                Reference::new(artifact, mapper, ranges)
            })
            .collect();
    }

    /// Subtract the ranges of `other` from the references with the same
    /// (artifact, mapper) pair. Empty remainders are dropped.
    pub fn exclude(&self, other: &References) -> References {
        let mut cuts: BTreeMap<ReferenceKey, Vec<Range>> = BTreeMap::new();
        for r in &other.0 {
            cuts.entry(r.key()).or_default().extend(r.ranges.iter().copied());
        }

        self.0
            .iter()
            .filter_map(|r| {
                let ranges = match cuts.get(&r.key()) {
                    Some(cut) => r.ranges.exclude(cut),
                    None => r.ranges.exclude(&[]),
                };
                (!ranges.is_empty()).then(|| Reference::new(r.artifact, r.mapper, ranges))
            })
            .collect()
    }

    /// Concatenated bytes of all references, in collection order.
    pub fn bytes(&self, artifacts: &Artifacts) -> Result<Vec<u8>, BootflowError> {
        let mut out = Vec::new();
        for r in &self.0 {
            out.extend_from_slice(&r.bytes(artifacts)?);
        }
        Ok(out)
    }

    /// Rewrite every mapped reference into native artifact offsets.
    pub fn resolve(&self, artifacts: &Artifacts) -> Result<References, BootflowError> {
        self.0.iter().map(|r| r.resolve(artifacts)).collect()
    }
}

impl Deref for References {
    type Target = [Reference];

    fn deref(&self) -> &[Reference] {
        &self.0
    }
}

impl From<Reference> for References {
    fn from(r: Reference) -> Self {
        Self(vec![r])
    }
}

impl From<Vec<Reference>> for References {
    fn from(refs: Vec<Reference>) -> Self {
        Self(refs)
    }
}

impl FromIterator<Reference> for References {
    fn from_iter<I: IntoIterator<Item = Reference>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for References {
    type Item = Reference;
    type IntoIter = std::vec::IntoIter<Reference>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a References {
    type Item = &'a Reference;
    type IntoIter = std::slice::Iter<'a, Reference>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for References {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, r) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", r)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{BiosImage, RegisterId, Registers};
    use crate::error::ContractViolationReason;

    fn artifacts() -> Artifacts {
        let image: Vec<u8> = (0..=255u8).cycle().take(0x1000).collect();
        let mut artifacts = Artifacts::new();
        artifacts.include(BiosImage::new(image).into()).unwrap();
        artifacts
            .include(
                Registers::new()
                    .with(RegisterId::AcmPolicyStatus, 0x1122_3344_5566_7788)
                    .into(),
            )
            .unwrap();
        artifacts
    }

    fn image_ref(mapper: Option<AddressMapper>, ranges: &[(u64, u64)]) -> Reference {
        Reference::new(
            ArtifactKind::BiosImage,
            mapper,
            ranges
                .iter()
                .map(|&(o, l)| Range::new(o, l))
                .collect::<Ranges>(),
        )
    }

    /// Every (artifact, mapper, native offset) covered by a reference set.
    fn covered(refs: &References) -> Vec<(ReferenceKey, u64)> {
        let mut out = Vec::new();
        for r in refs {
            for range in &r.ranges {
                for off in range.offset..range.end() {
                    out.push((r.key(), off));
                }
            }
        }
        out
    }

    #[test]
    fn test_bytes_sorted_before_read() {
        let artifacts = artifacts();
        let r = image_ref(None, &[(0x20, 2), (0x10, 2)]);
        assert_eq!(r.bytes(&artifacts).unwrap(), vec![0x10, 0x11, 0x20, 0x21]);
    }

    #[test]
    fn test_bytes_through_mapper() {
        let artifacts = artifacts();
        // 0x1000 byte image ends at 4 GiB, so it starts at 0xFFFFF000
        let r = image_ref(Some(AddressMapper::PhysMem), &[(0xFFFF_F100, 4)]);
        assert_eq!(r.bytes(&artifacts).unwrap(), vec![0x00, 0x01, 0x02, 0x03]);
        let native = r.resolve(&artifacts).unwrap();
        assert_eq!(native, image_ref(None, &[(0x100, 4)]));
    }

    #[test]
    fn test_references_concatenate_in_order() {
        let artifacts = artifacts();
        let refs: References = vec![
            Reference::new(
                ArtifactKind::Registers,
                None,
                RegisterId::AcmPolicyStatus.range(),
            ),
            image_ref(None, &[(0x05, 1)]),
        ]
        .into();
        assert_eq!(
            refs.bytes(&artifacts).unwrap(),
            vec![0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0x05]
        );
    }

    #[test]
    fn test_read_observes_replaced_artifact() {
        let mut artifacts = artifacts();
        let r = Reference::new(
            ArtifactKind::Registers,
            None,
            RegisterId::AcmPolicyStatus.range(),
        );
        assert_eq!(r.bytes(&artifacts).unwrap()[0], 0x88);
        artifacts.replace(
            Registers::new()
                .with(RegisterId::AcmPolicyStatus, 0x42)
                .into(),
        );
        assert_eq!(r.bytes(&artifacts).unwrap()[0], 0x42);
    }

    #[test]
    fn test_references_serialize_structured() {
        let refs: References = vec![
            image_ref(Some(AddressMapper::PhysMem), &[(0xFFFF_F100, 4)]),
            Reference::new(
                ArtifactKind::Registers,
                None,
                RegisterId::AcmPolicyStatus.range(),
            ),
        ]
        .into();
        assert_eq!(
            serde_json::to_value(&refs).unwrap(),
            serde_json::json!([
                {
                    "artifact": "BiosImage",
                    "mapper": "PhysMem",
                    "ranges": [{ "offset": 0xFFFF_F100u64, "length": 4 }]
                },
                {
                    "artifact": "Registers",
                    "mapper": null,
                    "ranges": [{ "offset": 0, "length": 8 }]
                }
            ])
        );
    }

    #[test]
    fn test_oversized_reference_is_short_read() {
        let artifacts = artifacts();
        let err = image_ref(None, &[(0x800, 1 << 60)]).bytes(&artifacts).unwrap_err();
        assert!(matches!(
            err,
            BootflowError::Contract(ContractViolationReason::ShortRead {
                offset: 0x800,
                got: 0x800,
                ..
            })
        ));
    }

    #[test]
    fn test_missing_artifact_is_contract_violation() {
        let artifacts = Artifacts::new();
        let err = image_ref(None, &[(0, 1)]).bytes(&artifacts).unwrap_err();
        assert!(matches!(
            err,
            BootflowError::Contract(ContractViolationReason::ArtifactMissing { .. })
        ));
    }

    #[test]
    fn test_sort_and_merge_groups_by_kind_and_mapper() {
        let mut refs: References = vec![
            image_ref(Some(AddressMapper::PhysMem), &[(0xFFFF_F010, 0x10)]),
            Reference::new(ArtifactKind::Registers, None, Range::new(0, 8)),
            image_ref(None, &[(0x30, 0x10)]),
            image_ref(None, &[(0x10, 0x10), (0x20, 0x10)]),
            image_ref(Some(AddressMapper::PhysMem), &[(0xFFFF_F000, 0x10)]),
        ]
        .into();
        refs.sort_and_merge();

        let expected: References = vec![
            image_ref(None, &[(0x10, 0x30)]),
            image_ref(Some(AddressMapper::PhysMem), &[(0xFFFF_F000, 0x20)]),
            Reference::new(ArtifactKind::Registers, None, Range::new(0, 8)),
        ]
        .into();
        assert_eq!(refs, expected);

        let once = refs.clone();
        refs.sort_and_merge();
        assert_eq!(refs, once);
    }

    #[test]
    fn test_exclude_properties_sampled() {
        let mut seed = 0x9E37_79B9_7F4A_7C15u64;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };
        let mappers = [None, Some(AddressMapper::PhysMem)];

        for _ in 0..100 {
            let mut make = |n: usize| -> References {
                (0..n)
                    .map(|_| {
                        let v = next();
                        image_ref(mappers[(v & 1) as usize], &[((v >> 8) % 128, (v >> 16) % 24)])
                    })
                    .collect()
            };
            let a = make(6);
            let b = make(4);

            let left = a.exclude(&b);
            let cut = covered(&b);
            for item in covered(&left) {
                assert!(!cut.contains(&item), "{:?} survived exclusion", item);
            }
            for r in &left {
                assert!(r.ranges.iter().all(|x| !x.is_empty()));
            }
            assert!(a.exclude(&a).is_empty());
        }
    }

    #[test]
    fn test_exclude_passes_through_other_pairs() {
        let a: References = vec![
            image_ref(None, &[(0x00, 0x20)]),
            image_ref(Some(AddressMapper::PhysMem), &[(0xFFFF_F000, 0x20)]),
        ]
        .into();
        let b: References = image_ref(None, &[(0x10, 0x08)]).into();

        let left = a.exclude(&b);
        let expected: References = vec![
            image_ref(None, &[(0x00, 0x10), (0x18, 0x08)]),
            image_ref(Some(AddressMapper::PhysMem), &[(0xFFFF_F000, 0x20)]),
        ]
        .into();
        assert_eq!(left, expected);
    }

    #[test]
    fn test_display() {
        let r = image_ref(Some(AddressMapper::PhysMem), &[(0xFFFF_0000, 0x10)]);
        assert_eq!(r.to_string(), "BiosImage:PhysMem:[FFFF0000:FFFF0010]");
    }
}
