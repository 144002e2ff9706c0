// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mutable simulation state owned by one boot run

use crate::artifact::{ArtifactKind, Artifacts, BiosImage, Registers, SystemArtifact};
use crate::data::{MeasuredData, MeasuredDataSlice};
use crate::error::{BootflowError, ContractViolationReason};
use crate::flow::Flow;
use crate::tpm::Tpm;
use crate::trustchain::{TrustChain, TrustChainKind, TrustChains};

#[derive(Debug, Clone, Default)]
pub struct State {
    artifacts: Artifacts,
    trust_chains: TrustChains,
    flow: Option<Flow>,
    measured_data: MeasuredDataSlice,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// A state with the firmware image loaded and a default TPM attached.
    pub fn with_bios_image(image: BiosImage) -> Result<Self, BootflowError> {
        let mut state = Self::new();
        state.include_artifact(image)?;
        state.include_trust_chain(Tpm::new())?;
        Ok(state)
    }

    pub fn include_artifact(&mut self, artifact: impl Into<SystemArtifact>) -> Result<(), BootflowError> {
        Ok(self.artifacts.include(artifact.into())?)
    }

    pub fn include_trust_chain(&mut self, chain: impl Into<TrustChain>) -> Result<(), BootflowError> {
        Ok(self.trust_chains.include(chain.into())?)
    }

    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    pub fn artifacts_mut(&mut self) -> &mut Artifacts {
        &mut self.artifacts
    }

    pub fn trust_chains(&self) -> &TrustChains {
        &self.trust_chains
    }

    pub fn bios_image(&self) -> Result<&BiosImage, BootflowError> {
        self.artifacts.bios_image().ok_or_else(|| {
            ContractViolationReason::ArtifactMissing {
                kind: ArtifactKind::BiosImage,
            }
            .into()
        })
    }

    pub fn registers(&self) -> Result<&Registers, BootflowError> {
        self.artifacts.registers().ok_or_else(|| {
            ContractViolationReason::ArtifactMissing {
                kind: ArtifactKind::Registers,
            }
            .into()
        })
    }

    pub fn tpm(&self) -> Result<&Tpm, BootflowError> {
        self.trust_chains
            .tpm()
            .ok_or(BootflowError::TrustChainMissing {
                kind: TrustChainKind::Tpm,
            })
    }

    pub fn tpm_mut(&mut self) -> Result<&mut Tpm, BootflowError> {
        self.trust_chains
            .tpm_mut()
            .ok_or(BootflowError::TrustChainMissing {
                kind: TrustChainKind::Tpm,
            })
    }

    /// The flow currently executed, if a run has started.
    pub fn current_flow(&self) -> Option<&Flow> {
        self.flow.as_ref()
    }

    pub(crate) fn set_flow(&mut self, flow: Flow) {
        self.flow = Some(flow);
    }

    pub fn measured_data(&self) -> &MeasuredDataSlice {
        &self.measured_data
    }

    pub(crate) fn add_measured_data(&mut self, measured: MeasuredData) {
        self.measured_data.push(measured);
    }

    /// Close every trust chain.
    pub fn finish(&mut self) {
        self.trust_chains.finish_all();
    }
}
