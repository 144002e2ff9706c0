// SPDX-License-Identifier: MIT OR Apache-2.0

//! System artifacts: the byte-addressable inputs of a simulation
//!
//! The set of artifact kinds is closed. Each kind may be loaded into a
//! simulation at most once, which is what lets a [`crate::Reference`] name
//! its artifact by kind alone.

mod bios_image;
mod registers;

pub use bios_image::BiosImage;
pub use registers::{RegisterId, Registers};

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::ContractViolationReason;
use crate::range::Range;

/// Kind tag of a [`SystemArtifact`].
///
/// The derived order is the canonical order used when sorting references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ArtifactKind {
    BiosImage,
    Registers,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::BiosImage => write!(f, "BiosImage"),
            ArtifactKind::Registers => write!(f, "Registers"),
        }
    }
}

/// A byte-addressable input of the simulation.
#[derive(Debug, Clone)]
pub enum SystemArtifact {
    BiosImage(BiosImage),
    Registers(Registers),
}

impl SystemArtifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            SystemArtifact::BiosImage(_) => ArtifactKind::BiosImage,
            SystemArtifact::Registers(_) => ArtifactKind::Registers,
        }
    }

    /// Size of the artifact's native address space in bytes.
    pub fn size(&self) -> u64 {
        match self {
            SystemArtifact::BiosImage(image) => image.size(),
            SystemArtifact::Registers(regs) => regs.size(),
        }
    }

    /// Copy bytes starting at `offset` into `buf`, returning how many were copied.
    ///
    /// Reading past the end copies fewer bytes than requested; it never fails.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> usize {
        match self {
            SystemArtifact::BiosImage(image) => image.read_at(buf, offset),
            SystemArtifact::Registers(regs) => regs.read_at(buf, offset),
        }
    }

    /// Read exactly the bytes of `range`; a short read is a contract violation.
    pub fn read_range(&self, range: &Range) -> Result<Vec<u8>, ContractViolationReason> {
        let short_read = |got: u64| ContractViolationReason::ShortRead {
            kind: self.kind(),
            offset: range.offset,
            expected: range.length,
            got,
        };
        let available = self.size().saturating_sub(range.offset);
        if range.offset.checked_add(range.length).map_or(true, |end| end > self.size()) {
            return Err(short_read(available.min(range.length)));
        }

        let mut buf = vec![0u8; range.length as usize];
        let got = self.read_at(&mut buf, range.offset);
        if got as u64 != range.length {
            return Err(short_read(got as u64));
        }
        Ok(buf)
    }
}

impl From<BiosImage> for SystemArtifact {
    fn from(image: BiosImage) -> Self {
        SystemArtifact::BiosImage(image)
    }
}

impl From<Registers> for SystemArtifact {
    fn from(regs: Registers) -> Self {
        SystemArtifact::Registers(regs)
    }
}

// =============================================================================
// Artifacts registry
// =============================================================================

/// The loaded artifacts of one simulation, at most one per [`ArtifactKind`].
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    by_kind: BTreeMap<ArtifactKind, SystemArtifact>,
}

impl Artifacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artifact. A second artifact of the same kind is rejected.
    pub fn include(&mut self, artifact: SystemArtifact) -> Result<(), ContractViolationReason> {
        let kind = artifact.kind();
        if self.by_kind.contains_key(&kind) {
            return Err(ContractViolationReason::DuplicateArtifact { kind });
        }
        self.by_kind.insert(kind, artifact);
        Ok(())
    }

    /// Swap the artifact of the same kind for `artifact`, returning the old one.
    ///
    /// References are resolved at read time, so subsequent reads observe
    /// the new content.
    pub fn replace(&mut self, artifact: SystemArtifact) -> Option<SystemArtifact> {
        self.by_kind.insert(artifact.kind(), artifact)
    }

    pub fn get(&self, kind: ArtifactKind) -> Result<&SystemArtifact, ContractViolationReason> {
        self.by_kind
            .get(&kind)
            .ok_or(ContractViolationReason::ArtifactMissing { kind })
    }

    pub fn contains(&self, kind: ArtifactKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    pub fn bios_image(&self) -> Option<&BiosImage> {
        match self.by_kind.get(&ArtifactKind::BiosImage) {
            Some(SystemArtifact::BiosImage(image)) => Some(image),
            _ => None,
        }
    }

    pub fn registers(&self) -> Option<&Registers> {
        match self.by_kind.get(&ArtifactKind::Registers) {
            Some(SystemArtifact::Registers(regs)) => Some(regs),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SystemArtifact> {
        self.by_kind.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_artifact_rejected() {
        let mut artifacts = Artifacts::new();
        artifacts
            .include(BiosImage::new(vec![0u8; 16]).into())
            .unwrap();
        let err = artifacts
            .include(BiosImage::new(vec![1u8; 16]).into())
            .unwrap_err();
        assert!(matches!(
            err,
            ContractViolationReason::DuplicateArtifact {
                kind: ArtifactKind::BiosImage
            }
        ));
        // Different kind is fine
        artifacts.include(Registers::new().into()).unwrap();
    }

    #[test]
    fn test_read_range_short_read() {
        let artifact = SystemArtifact::from(BiosImage::new(vec![0xAA; 8]));
        assert_eq!(artifact.read_range(&Range::new(4, 4)).unwrap(), vec![0xAA; 4]);
        let err = artifact.read_range(&Range::new(6, 4)).unwrap_err();
        assert!(matches!(
            err,
            ContractViolationReason::ShortRead {
                expected: 4,
                got: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_read_range_oversized_fails_without_reading() {
        let artifact = SystemArtifact::from(BiosImage::new(vec![0xAA; 8]));
        let err = artifact.read_range(&Range::new(2, u64::MAX / 2)).unwrap_err();
        assert!(matches!(
            err,
            ContractViolationReason::ShortRead {
                offset: 2,
                got: 6,
                ..
            }
        ));
        let err = artifact.read_range(&Range::new(u64::MAX, 2)).unwrap_err();
        assert!(matches!(err, ContractViolationReason::ShortRead { got: 0, .. }));
    }

    #[test]
    fn test_kind_order_is_total() {
        assert!(ArtifactKind::BiosImage < ArtifactKind::Registers);
    }
}
