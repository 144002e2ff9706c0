// SPDX-License-Identifier: MIT OR Apache-2.0

//! Intel platform support: Firmware Interface Table and Boot Guard PCR0 steps
//!
//! Only the FIT is parsed here. The FIT pointer sits 0x40 bytes below the
//! 4 GiB boundary and holds the physical address of the table; every entry
//! is 16 bytes and the first one is the `_FIT_   ` header whose size field
//! counts all entries including itself.

use std::fmt;

use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::action::Action;
use crate::artifact::{ArtifactKind, BiosImage, RegisterId};
use crate::data::Data;
use crate::datasource::{register_reference, DataSource};
use crate::error::{BootflowError, DataSourceReason};
use crate::mapper::AddressMapper;
use crate::range::{Range, Ranges};
use crate::reference::{Reference, References};
use crate::state::State;

/// Physical address of the FIT pointer.
pub const FIT_POINTER_ADDRESS: u64 = 0xFFFF_FFC0;
pub const FIT_POINTER_SIZE: u64 = 8;
pub const FIT_ENTRY_SIZE: u64 = 16;
pub const FIT_HEADER_SIGNATURE: [u8; 8] = *b"_FIT_   ";

pub const FIT_TYPE_HEADER: u8 = 0x00;
pub const FIT_TYPE_MICROCODE: u8 = 0x01;
pub const FIT_TYPE_STARTUP_ACM: u8 = 0x02;
pub const FIT_TYPE_BIOS_STARTUP_MODULE: u8 = 0x07;
pub const FIT_TYPE_KEY_MANIFEST: u8 = 0x0B;
pub const FIT_TYPE_BOOT_POLICY_MANIFEST: u8 = 0x0C;

/// On-flash layout of a FIT entry
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
struct RawFitEntry {
    address: [u8; 8],
    size: [u8; 3],
    reserved: u8,
    version: [u8; 2],
    type_and_checksum_valid: u8,
    checksum: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitEntry {
    /// Physical address (or signature bytes for the header)
    pub address: u64,
    /// Raw 24-bit size field; its unit depends on the entry type
    pub size: u32,
    pub version: u16,
    pub entry_type: u8,
    pub checksum_valid: bool,
    pub checksum: u8,
}

impl From<&RawFitEntry> for FitEntry {
    fn from(raw: &RawFitEntry) -> Self {
        Self {
            address: u64::from_le_bytes(raw.address),
            size: u32::from_le_bytes([raw.size[0], raw.size[1], raw.size[2], 0]),
            version: u16::from_le_bytes(raw.version),
            entry_type: raw.type_and_checksum_valid & 0x7F,
            checksum_valid: raw.type_and_checksum_valid & 0x80 != 0,
            checksum: raw.checksum,
        }
    }
}

impl FitEntry {
    /// Physical range of the data the entry points to, when the size is known.
    pub fn data_range(&self) -> Option<Range> {
        match self.entry_type {
            // Size is in 16-byte units
            FIT_TYPE_BIOS_STARTUP_MODULE => {
                Some(Range::new(self.address, u64::from(self.size) * FIT_ENTRY_SIZE))
            }
            FIT_TYPE_KEY_MANIFEST | FIT_TYPE_BOOT_POLICY_MANIFEST => {
                Some(Range::new(self.address, u64::from(self.size)))
            }
            _ => None,
        }
    }
}

/// A parsed Firmware Interface Table.
#[derive(Debug, Clone)]
pub struct Fit {
    /// Physical address of the table
    pub address: u64,
    /// Offset of the table in the image
    pub offset: u64,
    /// All entries following the header
    pub entries: Vec<FitEntry>,
}

impl Fit {
    pub fn parse(image: &BiosImage) -> Result<Self, BootflowError> {
        let bytes = image.bytes();
        let size = image.size();
        let pointer_offset = AddressMapper::PhysMem
            .resolve_address(size, FIT_POINTER_ADDRESS)
            .filter(|off| off + FIT_POINTER_SIZE <= size)
            .ok_or(DataSourceReason::ImageTooSmall {
                size,
                what: "the FIT pointer",
            })?;
        let pointer_offset = pointer_offset as usize;
        let mut raw_pointer = [0u8; 8];
        raw_pointer.copy_from_slice(&bytes[pointer_offset..pointer_offset + 8]);
        let address = u64::from_le_bytes(raw_pointer);

        let offset = AddressMapper::PhysMem
            .resolve_address(size, address)
            .filter(|off| off + FIT_ENTRY_SIZE <= size)
            .ok_or(DataSourceReason::FitPointerOutOfImage { pointer: address })?;

        let table = &bytes[offset as usize..];
        let (header, _) = RawFitEntry::ref_from_prefix(table)
            .map_err(|_| DataSourceReason::FitPointerOutOfImage { pointer: address })?;
        if header.address != FIT_HEADER_SIGNATURE {
            return Err(DataSourceReason::FitSignatureMismatch { offset }.into());
        }
        let header = FitEntry::from(header);
        let count = header.size;
        if count == 0 || offset + u64::from(count) * FIT_ENTRY_SIZE > size {
            return Err(DataSourceReason::FitTruncated { entries: count }.into());
        }

        let mut entries = Vec::with_capacity(count as usize - 1);
        let mut rest = &table[FIT_ENTRY_SIZE as usize..];
        for _ in 1..count {
            let (raw, tail) = RawFitEntry::ref_from_prefix(rest)
                .map_err(|_| DataSourceReason::FitTruncated { entries: count })?;
            entries.push(FitEntry::from(raw));
            rest = tail;
        }

        Ok(Self {
            address,
            offset,
            entries,
        })
    }

    /// Physical range of the whole table, header included.
    pub fn table_range(&self) -> Range {
        Range::new(
            self.address,
            (self.entries.len() as u64 + 1) * FIT_ENTRY_SIZE,
        )
    }

    pub fn entries_of_type(&self, entry_type: u8) -> impl Iterator<Item = &FitEntry> {
        self.entries
            .iter()
            .filter(move |e| e.entry_type == entry_type)
    }
}

// =============================================================================
// Data sources
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntelData {
    /// The 8-byte FIT pointer below 4 GiB
    FitPointer,
    /// The FIT header and entry table
    FitHeaders,
    /// ACM_POLICY_STATUS followed by the FIT table
    Pcr0Data,
    /// The Initial Boot Block: every BIOS startup module region
    Ibb,
}

impl IntelData {
    pub fn data(&self, state: &State) -> Result<Data, BootflowError> {
        let image = state.bios_image()?;
        let phys = |ranges: Ranges| {
            Reference::new(ArtifactKind::BiosImage, Some(AddressMapper::PhysMem), ranges)
        };
        match self {
            IntelData::FitPointer => Ok(Data::references(phys(
                Range::new(FIT_POINTER_ADDRESS, FIT_POINTER_SIZE).into(),
            ))),
            IntelData::FitHeaders => {
                let fit = Fit::parse(image)?;
                Ok(Data::references(phys(fit.table_range().into())))
            }
            IntelData::Pcr0Data => {
                let fit = Fit::parse(image)?;
                let refs: References = vec![
                    register_reference(state, RegisterId::AcmPolicyStatus)?,
                    phys(fit.table_range().into()),
                ]
                .into();
                Ok(Data::references(refs))
            }
            IntelData::Ibb => {
                let fit = Fit::parse(image)?;
                let ranges: Ranges = fit
                    .entries_of_type(FIT_TYPE_BIOS_STARTUP_MODULE)
                    .filter_map(FitEntry::data_range)
                    .collect();
                if ranges.is_empty() {
                    return Err(DataSourceReason::FitEntryMissing {
                        entry_type: FIT_TYPE_BIOS_STARTUP_MODULE,
                    }
                    .into());
                }
                Ok(Data::references(phys(ranges)))
            }
        }
    }
}

impl fmt::Display for IntelData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntelData::FitPointer => write!(f, "intel:FITPointer"),
            IntelData::FitHeaders => write!(f, "intel:FITHeaders"),
            IntelData::Pcr0Data => write!(f, "intel:PCR0_DATA"),
            IntelData::Ibb => write!(f, "intel:IBB"),
        }
    }
}

// =============================================================================
// Steps
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntelStep {
    MeasurePcr0Data,
    MeasureIbb,
}

impl IntelStep {
    pub fn actions(&self, _state: &State) -> Result<Vec<Action>, BootflowError> {
        let source = match self {
            IntelStep::MeasurePcr0Data => IntelData::Pcr0Data,
            IntelStep::MeasureIbb => IntelData::Ibb,
        };
        Ok(vec![Action::tpm_extend(0, DataSource::Intel(source))])
    }
}

impl fmt::Display for IntelStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntelStep::MeasurePcr0Data => write!(f, "MeasurePCR0DATA"),
            IntelStep::MeasureIbb => write!(f, "MeasureIBB"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn test_parse_fit() {
        let image = BiosImage::new(test_support::intel_image());
        let fit = Fit::parse(&image).unwrap();
        assert_eq!(fit.address, test_support::INTEL_FIT_ADDRESS);
        assert_eq!(fit.offset, 0x8000);
        let types: Vec<u8> = fit.entries.iter().map(|e| e.entry_type).collect();
        assert_eq!(
            types,
            vec![
                FIT_TYPE_MICROCODE,
                FIT_TYPE_BIOS_STARTUP_MODULE,
                FIT_TYPE_BIOS_STARTUP_MODULE
            ]
        );
        assert_eq!(fit.table_range(), Range::new(0xFFFF_8000, 0x40));
    }

    #[test]
    fn test_no_fit_in_blank_image() {
        let image = BiosImage::new(vec![0xFFu8; 0x10000]);
        assert!(matches!(
            Fit::parse(&image),
            Err(BootflowError::DataSource(
                DataSourceReason::FitPointerOutOfImage { .. }
            ))
        ));
        let image = BiosImage::new(vec![0u8; 0x20]);
        assert!(matches!(
            Fit::parse(&image),
            Err(BootflowError::DataSource(DataSourceReason::ImageTooSmall { .. }))
        ));
    }

    #[test]
    fn test_fit_signature_checked() {
        let mut raw = test_support::intel_image();
        raw[0x8000] = b'X';
        assert!(matches!(
            Fit::parse(&BiosImage::new(raw)),
            Err(BootflowError::DataSource(
                DataSourceReason::FitSignatureMismatch { offset: 0x8000 }
            ))
        ));
    }

    #[test]
    fn test_ibb_ranges() {
        let state = test_support::intel_state();
        let data = IntelData::Ibb.data(&state).unwrap();
        let refs = data.get_references().unwrap().resolve(state.artifacts()).unwrap();
        assert_eq!(
            refs[0].ranges.to_vec(),
            vec![Range::new(0xC000, 0x2000), Range::new(0xE000, 0x1000)]
        );
    }

    #[test]
    fn test_pcr0_data_layout() {
        let state = test_support::intel_state();
        let bytes = IntelData::Pcr0Data
            .data(&state)
            .unwrap()
            .bytes(state.artifacts())
            .unwrap();
        assert_eq!(bytes.len(), 8 + 0x40);
        assert_eq!(
            &bytes[..8],
            &test_support::ACM_POLICY_STATUS.to_le_bytes()
        );
        assert_eq!(&bytes[8..16], &FIT_HEADER_SIGNATURE);
    }
}
