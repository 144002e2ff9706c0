// SPDX-License-Identifier: MIT OR Apache-2.0

//! Address mappers between a foreign address space and an artifact's offsets

use std::fmt;

use serde::Serialize;

use crate::artifact::SystemArtifact;
use crate::error::ContractViolationReason;
use crate::range::Range;

/// x86 reset vector region ends at 4 GiB.
const FOUR_GIB: u64 = 1 << 32;

/// AMD maps at most 16 MiB of SPI flash below 4 GiB.
const AMD_FLASH_WINDOW: u64 = 16 << 20;
const AMD_FLASH_ADDR_MASK: u64 = AMD_FLASH_WINDOW - 1;
const AMD_FLASH_MMIO_BASE: u64 = 0xFF00_0000;

/// Translates ranges between a foreign address space and an artifact's
/// native offsets.
///
/// The derived order is the canonical order used when sorting references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AddressMapper {
    /// x86 physical memory: the image is mapped to end exactly at 4 GiB.
    PhysMem,
    /// AMD PSP/BIOS directory addresses: low 24 bits are an offset into the
    /// last 16 MiB of flash.
    AmdFlash,
}

impl AddressMapper {
    /// Translate `ranges` from this mapper's address space to native offsets.
    pub fn resolve(
        &self,
        artifact: &SystemArtifact,
        ranges: &[Range],
    ) -> Result<Vec<Range>, ContractViolationReason> {
        let size = artifact.size();
        ranges
            .iter()
            .map(|r| {
                self.resolve_address(size, r.offset)
                    .map(|offset| Range::new(offset, r.length))
                    .filter(|native| native.end() <= size)
                    .ok_or_else(|| self.unresolvable(artifact, r))
            })
            .collect()
    }

    /// Translate native `ranges` back into this mapper's address space.
    pub fn unresolve(
        &self,
        artifact: &SystemArtifact,
        ranges: &[Range],
    ) -> Result<Vec<Range>, ContractViolationReason> {
        let size = artifact.size();
        ranges
            .iter()
            .map(|r| {
                if r.end() > size {
                    return Err(self.unresolvable(artifact, r));
                }
                self.unresolve_offset(size, r.offset)
                    .map(|addr| Range::new(addr, r.length))
                    .ok_or_else(|| self.unresolvable(artifact, r))
            })
            .collect()
    }

    /// Translate a single address into a native offset of an artifact of `size` bytes.
    pub fn resolve_address(&self, size: u64, addr: u64) -> Option<u64> {
        match self {
            AddressMapper::PhysMem => {
                let base = FOUR_GIB.checked_sub(size)?;
                addr.checked_sub(base).filter(|offset| *offset < size)
            }
            AddressMapper::AmdFlash => {
                let offset = amd_flash_base(size) + (addr & AMD_FLASH_ADDR_MASK);
                (offset < size).then_some(offset)
            }
        }
    }

    fn unresolve_offset(&self, size: u64, offset: u64) -> Option<u64> {
        match self {
            AddressMapper::PhysMem => FOUR_GIB.checked_sub(size).map(|base| base + offset),
            AddressMapper::AmdFlash => offset
                .checked_sub(amd_flash_base(size))
                .map(|rel| AMD_FLASH_MMIO_BASE | rel),
        }
    }

    fn unresolvable(&self, artifact: &SystemArtifact, r: &Range) -> ContractViolationReason {
        ContractViolationReason::UnresolvableRange {
            mapper: *self,
            kind: artifact.kind(),
            offset: r.offset,
            end: r.end(),
            size: artifact.size(),
        }
    }
}

fn amd_flash_base(size: u64) -> u64 {
    size.saturating_sub(AMD_FLASH_WINDOW)
}

impl fmt::Display for AddressMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressMapper::PhysMem => write!(f, "PhysMem"),
            AddressMapper::AmdFlash => write!(f, "AmdFlash"),
        }
    }
}
