// SPDX-License-Identifier: MIT OR Apache-2.0

//! Snapshot of hardware status registers
//!
//! The snapshot is exposed as a byte-addressable artifact so that measured
//! register values can be described by reference like any other data:
//! every register occupies an 8-byte slot at `index * 8`, little-endian,
//! of which the first `width()` bytes are meaningful.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::range::Range;

/// Size of one register slot in the artifact's address space.
pub const REGISTER_SLOT_SIZE: u64 = 8;

/// Registers known to the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegisterId {
    /// Intel Boot Guard ACM policy status (MMIO 0xFED30378)
    AcmPolicyStatus,
    /// Intel Boot Guard SACM info MSR (0x13A)
    BtgSacmInfo,
    /// Intel TXT error code (MMIO 0xFED30030)
    TxtErrorCode,
}

impl RegisterId {
    pub const ALL: [RegisterId; 3] = [
        RegisterId::AcmPolicyStatus,
        RegisterId::BtgSacmInfo,
        RegisterId::TxtErrorCode,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RegisterId::AcmPolicyStatus => "ACM_POLICY_STATUS",
            RegisterId::BtgSacmInfo => "BTG_SACM_INFO",
            RegisterId::TxtErrorCode => "TXT_ERROR_CODE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name().eq_ignore_ascii_case(name))
    }

    /// Meaningful width of the register in bytes.
    pub fn width(&self) -> u64 {
        match self {
            RegisterId::AcmPolicyStatus | RegisterId::BtgSacmInfo => 8,
            RegisterId::TxtErrorCode => 4,
        }
    }

    fn index(&self) -> u64 {
        match self {
            RegisterId::AcmPolicyStatus => 0,
            RegisterId::BtgSacmInfo => 1,
            RegisterId::TxtErrorCode => 2,
        }
    }

    /// Location of the register value inside the [`Registers`] artifact.
    pub fn range(&self) -> Range {
        Range::new(self.index() * REGISTER_SLOT_SIZE, self.width())
    }

    /// Decode a register value from its `width()` little-endian bytes.
    pub fn value_from_bytes(&self, bytes: &[u8]) -> u64 {
        let mut raw = [0u8; 8];
        let n = bytes.len().min(self.width() as usize);
        raw[..n].copy_from_slice(&bytes[..n]);
        u64::from_le_bytes(raw)
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for RegisterId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RegisterId::from_name(s).ok_or_else(|| format!("unknown register: {}", s))
    }
}

/// Register values keyed by id. Registers absent from the snapshot read as zero.
///
/// Deserializes from a JSON object such as `{"ACM_POLICY_STATUS": 12345}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registers {
    values: BTreeMap<RegisterId, u64>,
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: RegisterId, value: u64) -> Self {
        self.set(id, value);
        self
    }

    pub fn set(&mut self, id: RegisterId, value: u64) {
        let mask = match id.width() {
            8 => u64::MAX,
            w => (1u64 << (w * 8)) - 1,
        };
        self.values.insert(id, value & mask);
    }

    pub fn get(&self, id: RegisterId) -> Option<u64> {
        self.values.get(&id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegisterId, u64)> + '_ {
        self.values.iter().map(|(id, v)| (*id, *v))
    }

    pub fn size(&self) -> u64 {
        RegisterId::ALL.len() as u64 * REGISTER_SLOT_SIZE
    }

    fn layout(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.size() as usize);
        for id in RegisterId::ALL {
            raw.extend_from_slice(&self.get(id).unwrap_or(0).to_le_bytes());
        }
        raw
    }

    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> usize {
        let raw = self.layout();
        let Ok(start) = usize::try_from(offset) else {
            return 0;
        };
        if start >= raw.len() {
            return 0;
        }
        let n = buf.len().min(raw.len() - start);
        buf[..n].copy_from_slice(&raw[start..start + n]);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_json_names() {
        let regs: Registers =
            serde_json::from_str(r#"{"ACM_POLICY_STATUS": 4660, "TXT_ERROR_CODE": 1}"#).unwrap();
        assert_eq!(regs.get(RegisterId::AcmPolicyStatus), Some(0x1234));
        assert_eq!(regs.get(RegisterId::TxtErrorCode), Some(1));
        assert_eq!(regs.get(RegisterId::BtgSacmInfo), None);
    }

    #[test]
    fn test_register_layout() {
        let regs = Registers::new()
            .with(RegisterId::AcmPolicyStatus, 0x0102_0304_0506_0708)
            .with(RegisterId::TxtErrorCode, 0xDEAD_BEEF_CAFE);

        let mut buf = [0u8; 8];
        let range = RegisterId::AcmPolicyStatus.range();
        assert_eq!(regs.read_at(&mut buf, range.offset), 8);
        assert_eq!(buf, [8, 7, 6, 5, 4, 3, 2, 1]);

        // Narrow registers are truncated to their width
        let range = RegisterId::TxtErrorCode.range();
        let mut buf = [0u8; 4];
        assert_eq!(regs.read_at(&mut buf, range.offset), 4);
        assert_eq!(buf, [0xFE, 0xCA, 0xEF, 0xBE]);
        assert_eq!(RegisterId::TxtErrorCode.value_from_bytes(&buf), 0xBEEF_CAFE);

        // Absent registers read as zero
        let range = RegisterId::BtgSacmInfo.range();
        let mut buf = [0xFFu8; 8];
        regs.read_at(&mut buf, range.offset);
        assert_eq!(buf, [0u8; 8]);
    }

    #[test]
    fn test_register_from_name() {
        assert_eq!(
            "btg_sacm_info".parse::<RegisterId>().unwrap(),
            RegisterId::BtgSacmInfo
        );
        assert!("NOPE".parse::<RegisterId>().is_err());
    }
}
