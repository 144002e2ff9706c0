// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synthetic firmware images and states for tests
//!
//! The images are tiny but structurally valid: each carries just enough of
//! the Intel FIT, the AMD EFS and BIOS directories, or the OCP vendor
//! version marker for the corresponding flow to run to completion.

use crate::artifact::{BiosImage, RegisterId, Registers};
use crate::ocp::OCP_VENDOR_VERSION_V1;
use crate::state::State;

// =============================================================================
// Intel
// =============================================================================

pub const INTEL_IMAGE_SIZE: usize = 0x1_0000;
/// Physical address of the FIT in [`intel_image`]
pub const INTEL_FIT_ADDRESS: u64 = 0xFFFF_8000;
/// ACM_POLICY_STATUS as read on a Boot Guard profile 5 machine
pub const ACM_POLICY_STATUS: u64 = 0x0000_0010_3298_0E5B;

fn fit_entry(address: u64, size: u32, version: u16, entry_type: u8) -> [u8; 16] {
    let mut raw = [0u8; 16];
    raw[..8].copy_from_slice(&address.to_le_bytes());
    raw[8..11].copy_from_slice(&size.to_le_bytes()[..3]);
    raw[12..14].copy_from_slice(&version.to_le_bytes());
    raw[14] = entry_type;
    raw
}

/// 64 KiB image with a FIT at 0xFFFF8000 listing a microcode update and two
/// BIOS startup modules at 0xFFFFC000 (8 KiB) and 0xFFFFE000 (4 KiB).
pub fn intel_image() -> Vec<u8> {
    let mut raw: Vec<u8> = (0..INTEL_IMAGE_SIZE)
        .map(|i| (i.wrapping_mul(31) ^ (i >> 8)) as u8)
        .collect();

    let pointer = INTEL_IMAGE_SIZE - 0x40;
    raw[pointer..pointer + 8].copy_from_slice(&INTEL_FIT_ADDRESS.to_le_bytes());

    let fit = 0x8000;
    let header = fit_entry(u64::from_le_bytes(*b"_FIT_   "), 4, 0x0100, 0x00);
    let entries = [
        header,
        fit_entry(0xFFFF_9000, 0, 0x0100, 0x01),
        fit_entry(0xFFFF_C000, 0x200, 0x0100, 0x07),
        fit_entry(0xFFFF_E000, 0x100, 0x0100, 0x07),
    ];
    for (idx, entry) in entries.iter().enumerate() {
        let at = fit + idx * 16;
        raw[at..at + 16].copy_from_slice(entry);
    }
    raw
}

pub fn intel_registers() -> Registers {
    Registers::new()
        .with(RegisterId::AcmPolicyStatus, ACM_POLICY_STATUS)
        .with(RegisterId::BtgSacmInfo, 0x0000_0001_0000_007D)
}

/// Intel image plus the register snapshot the ACM reads.
pub fn intel_state() -> State {
    let mut state = intel_state_without_registers();
    state
        .include_artifact(intel_registers())
        .expect("fresh state has no registers");
    state
}

pub fn intel_state_without_registers() -> State {
    State::with_bios_image(BiosImage::new(intel_image())).expect("fresh state")
}

// =============================================================================
// AMD
// =============================================================================

pub const AMD_IMAGE_SIZE: usize = 0x4_0000;
pub const AMD_EFS_OFFSET: usize = 0x2_0000;
/// Flash address of the level 1 BIOS directory in [`amd_image`]
pub const AMD_BIOS_DIRECTORY_ADDRESS: u32 = 0xFF03_0000;
pub const AMD_BIOS_LEVEL2_ADDRESS: u32 = 0xFF03_2000;

fn bios_directory(cookie: &[u8; 4], entries: &[(u8, u32, u64)]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(16 + entries.len() * 24);
    raw.extend_from_slice(cookie);
    raw.extend_from_slice(&0u32.to_le_bytes());
    raw.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    raw.extend_from_slice(&0u32.to_le_bytes());
    for (entry_type, size, source) in entries {
        raw.extend_from_slice(&[*entry_type, 0, 0, 0]);
        raw.extend_from_slice(&size.to_le_bytes());
        raw.extend_from_slice(&source.to_le_bytes());
        raw.extend_from_slice(&u64::MAX.to_le_bytes());
    }
    raw
}

/// 256 KiB erased flash with an EFS at 0x20000 pointing to a `$BHD`
/// directory at 0x30000, which links a `$BL2` directory at 0x32000.
pub fn amd_image() -> Vec<u8> {
    let mut raw = vec![0xFFu8; AMD_IMAGE_SIZE];

    let mut efs = Vec::with_capacity(36);
    efs.extend_from_slice(&0x55AA_55AAu32.to_le_bytes());
    efs.extend_from_slice(&[0u8; 16]);
    efs.extend_from_slice(&0u32.to_le_bytes());
    efs.extend_from_slice(&AMD_BIOS_DIRECTORY_ADDRESS.to_le_bytes());
    efs.extend_from_slice(&0u32.to_le_bytes());
    efs.extend_from_slice(&0u32.to_le_bytes());
    raw[AMD_EFS_OFFSET..AMD_EFS_OFFSET + efs.len()].copy_from_slice(&efs);

    let level1 = bios_directory(
        b"$BHD",
        &[
            (0x62, 0x1000, 0xFF03_1000),
            (0x70, 0x400, u64::from(AMD_BIOS_LEVEL2_ADDRESS)),
        ],
    );
    raw[0x3_0000..0x3_0000 + level1.len()].copy_from_slice(&level1);

    let level2 = bios_directory(b"$BL2", &[(0x62, 0x2000, 0xFF03_4000)]);
    raw[0x3_2000..0x3_2000 + level2.len()].copy_from_slice(&level2);
    raw
}

pub fn amd_state() -> State {
    State::with_bios_image(BiosImage::new(amd_image())).expect("fresh state")
}

// =============================================================================
// OCP
// =============================================================================

pub const OCP_VENDOR_VERSION_OFFSET: u64 = 0x4000;

pub fn ocp_image() -> Vec<u8> {
    let mut raw = vec![0u8; 0x1_0000];
    let at = OCP_VENDOR_VERSION_OFFSET as usize;
    raw[at..at + 16].copy_from_slice(&OCP_VENDOR_VERSION_V1);
    raw[at + 16..at + 32].copy_from_slice(b"OCP-FW-1.2.3\0\0\0\0");
    raw
}

pub fn ocp_state() -> State {
    State::with_bios_image(BiosImage::new(ocp_image())).expect("fresh state")
}

/// An image no flow recognizes.
pub fn blank_state() -> State {
    State::with_bios_image(BiosImage::new(vec![0xFFu8; 0x1_0000])).expect("fresh state")
}
