// SPDX-License-Identifier: MIT OR Apache-2.0

//! AMD platform support: Embedded Firmware Structure and BIOS directory tables
//!
//! The Embedded Firmware Structure (EFS) lives at one of a few well-known
//! flash offsets and points to the PSP and BIOS directory tables. Pointers
//! are flash addresses in the `0xFFxxxxxx` MMIO form, translated with
//! [`AddressMapper::AmdFlash`].

use std::fmt;

use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::action::Action;
use crate::artifact::{ArtifactKind, BiosImage};
use crate::data::Data;
use crate::datasource::DataSource;
use crate::error::{BootflowError, DataSourceReason};
use crate::mapper::AddressMapper;
use crate::range::{Range, Ranges};
use crate::reference::Reference;
use crate::state::State;

pub const EFS_SIGNATURE: u32 = 0x55AA_55AA;

/// Candidate EFS offsets relative to the flash base, most likely first
const EFS_OFFSETS: [u64; 6] = [0xFA_0000, 0xF2_0000, 0xE2_0000, 0xC2_0000, 0x82_0000, 0x02_0000];

/// `$BHD`
pub const BIOS_DIRECTORY_COOKIE: u32 = 0x4448_4224;
/// `$BL2`
pub const BIOS_DIRECTORY_LEVEL2_COOKIE: u32 = 0x324C_4224;

/// Entry type pointing to a level 2 BIOS directory
pub const BIOS_ENTRY_TYPE_LEVEL2_DIRECTORY: u8 = 0x70;

const FLASH_WINDOW: u64 = 16 << 20;

#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
struct RawEmbeddedFirmwareStructure {
    signature: [u8; 4],
    required: [u8; 16],
    psp_directory_pointer: [u8; 4],
    bios_directory_pointers: [[u8; 4]; 3],
}

pub const EFS_SIZE: u64 = core::mem::size_of::<RawEmbeddedFirmwareStructure>() as u64;

#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
struct RawBiosDirectoryHeader {
    cookie: [u8; 4],
    checksum: [u8; 4],
    total_entries: [u8; 4],
    reserved: [u8; 4],
}

#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C)]
struct RawBiosDirectoryEntry {
    entry_type: u8,
    region_type: u8,
    flags: u8,
    sub_program: u8,
    size: [u8; 4],
    source_address: [u8; 8],
    destination_address: [u8; 8],
}

const BIOS_HEADER_SIZE: u64 = core::mem::size_of::<RawBiosDirectoryHeader>() as u64;
const BIOS_ENTRY_SIZE: u64 = core::mem::size_of::<RawBiosDirectoryEntry>() as u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedFirmwareStructure {
    /// Offset of the structure in the image
    pub offset: u64,
    pub psp_directory_pointer: u32,
    /// Per CPU family generation; zero when unused
    pub bios_directory_pointers: [u32; 3],
}

/// Locate the EFS at its well-known offsets.
pub fn find_embedded_firmware(image: &BiosImage) -> Result<EmbeddedFirmwareStructure, BootflowError> {
    let bytes = image.bytes();
    let base = image.size().saturating_sub(FLASH_WINDOW);
    for candidate in EFS_OFFSETS {
        let offset = base + candidate;
        if offset + EFS_SIZE > image.size() {
            continue;
        }
        let Ok((raw, _)) = RawEmbeddedFirmwareStructure::ref_from_prefix(&bytes[offset as usize..])
        else {
            continue;
        };
        if u32::from_le_bytes(raw.signature) != EFS_SIGNATURE {
            continue;
        }
        return Ok(EmbeddedFirmwareStructure {
            offset,
            psp_directory_pointer: u32::from_le_bytes(raw.psp_directory_pointer),
            bios_directory_pointers: raw.bios_directory_pointers.map(u32::from_le_bytes),
        });
    }
    Err(DataSourceReason::EmbeddedFirmwareNotFound.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiosDirectoryEntry {
    pub entry_type: u8,
    pub region_type: u8,
    pub flags: u8,
    pub sub_program: u8,
    pub size: u32,
    pub source_address: u64,
    pub destination_address: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiosDirectoryTable {
    /// Flash address the table was reached through
    pub address: u64,
    pub cookie: u32,
    pub checksum: u32,
    pub entries: Vec<BiosDirectoryEntry>,
}

impl BiosDirectoryTable {
    /// Parse the table at flash `address`.
    pub fn parse(image: &BiosImage, address: u64) -> Result<Self, BootflowError> {
        let size = image.size();
        let offset = AddressMapper::AmdFlash
            .resolve_address(size, address)
            .filter(|off| off + BIOS_HEADER_SIZE <= size)
            .ok_or(DataSourceReason::BiosDirectoryTruncated { offset: address })?;
        let table = &image.bytes()[offset as usize..];

        let (header, mut rest) = RawBiosDirectoryHeader::ref_from_prefix(table)
            .map_err(|_| DataSourceReason::BiosDirectoryTruncated { offset })?;
        let cookie = u32::from_le_bytes(header.cookie);
        if cookie != BIOS_DIRECTORY_COOKIE && cookie != BIOS_DIRECTORY_LEVEL2_COOKIE {
            return Err(DataSourceReason::BiosDirectoryCookieInvalid { offset, cookie }.into());
        }
        let total = u64::from(u32::from_le_bytes(header.total_entries));
        if offset + BIOS_HEADER_SIZE + total * BIOS_ENTRY_SIZE > size {
            return Err(DataSourceReason::BiosDirectoryTruncated { offset }.into());
        }

        let mut entries = Vec::with_capacity(total as usize);
        for _ in 0..total {
            let (raw, tail) = RawBiosDirectoryEntry::ref_from_prefix(rest)
                .map_err(|_| DataSourceReason::BiosDirectoryTruncated { offset })?;
            entries.push(BiosDirectoryEntry {
                entry_type: raw.entry_type,
                region_type: raw.region_type,
                flags: raw.flags,
                sub_program: raw.sub_program,
                size: u32::from_le_bytes(raw.size),
                source_address: u64::from_le_bytes(raw.source_address),
                destination_address: u64::from_le_bytes(raw.destination_address),
            });
            rest = tail;
        }

        Ok(Self {
            address,
            cookie,
            checksum: u32::from_le_bytes(header.checksum),
            entries,
        })
    }

    pub fn is_level2(&self) -> bool {
        self.cookie == BIOS_DIRECTORY_LEVEL2_COOKIE
    }

    /// Flash range of the header and entry list.
    pub fn range(&self) -> Range {
        Range::new(
            self.address,
            BIOS_HEADER_SIZE + self.entries.len() as u64 * BIOS_ENTRY_SIZE,
        )
    }
}

/// Every BIOS directory table reachable from the EFS, level 2 tables included.
pub fn bios_directories(image: &BiosImage) -> Result<Vec<BiosDirectoryTable>, BootflowError> {
    let efs = find_embedded_firmware(image)?;

    let mut pending: Vec<u64> = efs
        .bios_directory_pointers
        .iter()
        .filter(|p| **p != 0 && **p != u32::MAX)
        .map(|p| u64::from(*p))
        .collect();
    pending.reverse();

    let mut tables: Vec<BiosDirectoryTable> = Vec::new();
    while let Some(address) = pending.pop() {
        if tables.iter().any(|t| t.address == address) {
            continue;
        }
        let table = BiosDirectoryTable::parse(image, address)?;
        for entry in &table.entries {
            if entry.entry_type == BIOS_ENTRY_TYPE_LEVEL2_DIRECTORY {
                pending.push(entry.source_address);
            }
        }
        tables.push(table);
    }

    if tables.is_empty() {
        return Err(DataSourceReason::BiosDirectoryNotFound.into());
    }
    Ok(tables)
}

// =============================================================================
// Data sources
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmdData {
    EmbeddedFirmware,
    BiosDirectory,
}

impl AmdData {
    pub fn data(&self, state: &State) -> Result<Data, BootflowError> {
        let image = state.bios_image()?;
        match self {
            AmdData::EmbeddedFirmware => {
                let efs = find_embedded_firmware(image)?;
                Ok(Data::references(Reference::new(
                    ArtifactKind::BiosImage,
                    None,
                    Range::new(efs.offset, EFS_SIZE),
                )))
            }
            AmdData::BiosDirectory => {
                let ranges: Ranges = bios_directories(image)?
                    .iter()
                    .map(BiosDirectoryTable::range)
                    .collect();
                Ok(Data::references(Reference::new(
                    ArtifactKind::BiosImage,
                    Some(AddressMapper::AmdFlash),
                    ranges,
                )))
            }
        }
    }
}

impl fmt::Display for AmdData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmdData::EmbeddedFirmware => write!(f, "amd:EmbeddedFirmware"),
            AmdData::BiosDirectory => write!(f, "amd:BIOSDirectory"),
        }
    }
}

// =============================================================================
// Steps
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmdStep {
    /// Log the EFS as an informational event.
    MeasureEmbeddedFirmwareStructure,
    /// Extend PCR0 with every BIOS directory table, one range at a time.
    MeasureBiosDirectory,
}

impl AmdStep {
    pub fn actions(&self, state: &State) -> Result<Vec<Action>, BootflowError> {
        match self {
            AmdStep::MeasureEmbeddedFirmwareStructure => Ok(vec![Action::tpm_event(
                0,
                DataSource::Amd(AmdData::EmbeddedFirmware),
                "EmbeddedFirmware",
            )]),
            AmdStep::MeasureBiosDirectory => {
                let data = AmdData::BiosDirectory.data(state)?;
                let mut actions = Vec::new();
                for reference in data.get_references().into_iter().flatten() {
                    for range in &reference.ranges {
                        let single = Reference::new(reference.artifact, reference.mapper, *range);
                        actions.push(Action::tpm_extend(0, DataSource::References(single.into())));
                    }
                }
                Ok(actions)
            }
        }
    }
}

impl fmt::Display for AmdStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmdStep::MeasureEmbeddedFirmwareStructure => {
                write!(f, "MeasureEmbeddedFirmwareStructure")
            }
            AmdStep::MeasureBiosDirectory => write!(f, "MeasureBIOSDirectory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn test_find_efs() {
        let image = BiosImage::new(test_support::amd_image());
        let efs = find_embedded_firmware(&image).unwrap();
        assert_eq!(efs.offset, 0x2_0000);
        assert_eq!(efs.bios_directory_pointers[0], test_support::AMD_BIOS_DIRECTORY_ADDRESS);
        assert_eq!(EFS_SIZE, 36);
    }

    #[test]
    fn test_efs_not_found() {
        let image = BiosImage::new(vec![0xFFu8; 0x40000]);
        assert!(matches!(
            find_embedded_firmware(&image),
            Err(BootflowError::DataSource(DataSourceReason::EmbeddedFirmwareNotFound))
        ));
    }

    #[test]
    fn test_bios_directories_follow_level2() {
        let image = BiosImage::new(test_support::amd_image());
        let tables = bios_directories(&image).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].cookie, BIOS_DIRECTORY_COOKIE);
        assert_eq!(tables[0].entries.len(), 2);
        assert!(tables[1].is_level2());
        assert_eq!(
            tables[0].range(),
            Range::new(u64::from(test_support::AMD_BIOS_DIRECTORY_ADDRESS), 16 + 2 * 24)
        );
    }

    #[test]
    fn test_bad_cookie() {
        let mut raw = test_support::amd_image();
        raw[0x3_0000] = 0;
        let image = BiosImage::new(raw);
        assert!(matches!(
            bios_directories(&image),
            Err(BootflowError::DataSource(
                DataSourceReason::BiosDirectoryCookieInvalid { offset: 0x3_0000, .. }
            ))
        ));
    }

    #[test]
    fn test_measure_bios_directory_one_action_per_range() {
        let state = test_support::amd_state();
        let actions = AmdStep::MeasureBiosDirectory.actions(&state).unwrap();
        assert_eq!(actions.len(), 2);
    }
}
