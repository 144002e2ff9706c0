// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data sources: where the bytes of a measurement come from

use std::fmt;

use crate::amd::AmdData;
use crate::artifact::{ArtifactKind, RegisterId};
use crate::data::Data;
use crate::error::{BootflowError, DataSourceReason};
use crate::intel::IntelData;
use crate::ocp::OcpData;
use crate::reference::{Reference, References};
use crate::state::State;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// Fixed bytes
    Bytes(Vec<u8>),
    /// Fixed locations
    References(References),
    /// Value of one register from the register snapshot
    Register(RegisterId),
    Intel(IntelData),
    Amd(AmdData),
    Ocp(OcpData),
}

impl DataSource {
    /// Locate the data in the current state.
    pub fn data(&self, state: &State) -> Result<Data, BootflowError> {
        match self {
            DataSource::Bytes(bytes) => Ok(Data::forced(bytes.clone())),
            DataSource::References(refs) => Ok(Data::references(refs.clone())),
            DataSource::Register(id) => Ok(Data::references(register_reference(state, *id)?)),
            DataSource::Intel(source) => source.data(state),
            DataSource::Amd(source) => source.data(state),
            DataSource::Ocp(source) => source.data(state),
        }
    }
}

/// Reference to a register value that is present in the snapshot.
pub(crate) fn register_reference(state: &State, id: RegisterId) -> Result<Reference, BootflowError> {
    if state.registers()?.get(id).is_none() {
        return Err(DataSourceReason::RegisterMissing { id }.into());
    }
    Ok(Reference::new(ArtifactKind::Registers, None, id.range()))
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Bytes(bytes) => write!(f, "bytes:{}", hex::encode(bytes)),
            DataSource::References(refs) => write!(f, "{}", refs),
            DataSource::Register(id) => write!(f, "register:{}", id),
            DataSource::Intel(source) => write!(f, "{}", source),
            DataSource::Amd(source) => write!(f, "{}", source),
            DataSource::Ocp(source) => write!(f, "{}", source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{BiosImage, Registers};

    #[test]
    fn test_register_source() {
        let mut state = State::with_bios_image(BiosImage::new(vec![0u8; 16])).unwrap();
        state
            .include_artifact(Registers::new().with(RegisterId::TxtErrorCode, 0xA5))
            .unwrap();

        let data = DataSource::Register(RegisterId::TxtErrorCode)
            .data(&state)
            .unwrap();
        assert_eq!(data.bytes(state.artifacts()).unwrap(), vec![0xA5, 0, 0, 0]);

        let err = DataSource::Register(RegisterId::AcmPolicyStatus)
            .data(&state)
            .unwrap_err();
        assert!(matches!(
            err,
            BootflowError::DataSource(DataSourceReason::RegisterMissing {
                id: RegisterId::AcmPolicyStatus
            })
        ));
    }

    #[test]
    fn test_register_source_without_snapshot() {
        let state = State::with_bios_image(BiosImage::new(vec![0u8; 16])).unwrap();
        assert!(DataSource::Register(RegisterId::TxtErrorCode)
            .data(&state)
            .is_err());
    }
}
