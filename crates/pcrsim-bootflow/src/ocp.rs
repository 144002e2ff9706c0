// SPDX-License-Identifier: MIT OR Apache-2.0

//! OCP (Open Compute Project) firmware support

use std::fmt;

use crate::action::Action;
use crate::artifact::{ArtifactKind, BiosImage};
use crate::data::Data;
use crate::datasource::DataSource;
use crate::error::{BootflowError, DataSourceReason};
use crate::range::Range;
use crate::reference::Reference;
use crate::state::State;

/// Firmware vendor version marker carried by OCP v1 firmware.
pub const OCP_VENDOR_VERSION_V1: [u8; 16] = [
    0x05, 0x2B, 0x10, 0xA7, 0xC7, 0xD9, 0x65, 0x41, 0x81, 0x40, 0x2A, 0xDD, 0xE9, 0x4A, 0xF6, 0x3C,
];

/// Location of the first firmware vendor version marker in the image.
pub fn find_vendor_version(image: &BiosImage) -> Result<Range, BootflowError> {
    image
        .bytes()
        .windows(OCP_VENDOR_VERSION_V1.len())
        .position(|w| w == OCP_VENDOR_VERSION_V1)
        .map(|pos| Range::new(pos as u64, OCP_VENDOR_VERSION_V1.len() as u64))
        .ok_or_else(|| DataSourceReason::VendorVersionNotFound.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcpData {
    FirmwareVendorVersion,
}

impl OcpData {
    pub fn data(&self, state: &State) -> Result<Data, BootflowError> {
        match self {
            OcpData::FirmwareVendorVersion => {
                let range = find_vendor_version(state.bios_image()?)?;
                Ok(Data::references(Reference::new(
                    ArtifactKind::BiosImage,
                    None,
                    range,
                )))
            }
        }
    }
}

impl fmt::Display for OcpData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcpData::FirmwareVendorVersion => write!(f, "ocp:FirmwareVendorVersion"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcpStep {
    MeasureFirmwareVendorVersion,
}

impl OcpStep {
    pub fn actions(&self, _state: &State) -> Result<Vec<Action>, BootflowError> {
        match self {
            OcpStep::MeasureFirmwareVendorVersion => Ok(vec![Action::tpm_extend(
                0,
                DataSource::Ocp(OcpData::FirmwareVendorVersion),
            )]),
        }
    }
}

impl fmt::Display for OcpStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcpStep::MeasureFirmwareVendorVersion => write!(f, "MeasureFirmwareVendorVersion"),
        }
    }
}
