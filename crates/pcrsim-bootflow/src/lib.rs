// SPDX-License-Identifier: MIT OR Apache-2.0

//! Measured-boot simulation
//!
//! Runs a boot flow over a firmware image and emulates what the platform
//! measures into the TPM. Every measurement is described by [`References`]
//! into system artifacts (the firmware image, a register snapshot), so the
//! exact bytes behind a final PCR value can be recovered from the run.
//!
//! ```no_run
//! use pcrsim_bootflow::{flows, BiosImage, BootProcess, State, TpmAlg};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let image = BiosImage::new(std::fs::read("firmware.bin")?);
//! let mut process = BootProcess::with_flow(State::with_bios_image(image)?, flows::root());
//! process.finish();
//! let pcr0 = process.state().tpm()?.pcr_value(0, TpmAlg::Sha256)?;
//! println!("{}", hex::encode(pcr0));
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod amd;
pub mod artifact;
pub mod bootengine;
pub mod condition;
pub mod data;
pub mod datasource;
pub mod error;
pub mod flow;
pub mod flows;
pub mod intel;
pub mod mapper;
pub mod ocp;
pub mod range;
pub mod reference;
pub mod state;
pub mod tpm;
pub mod trustchain;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;


pub use action::{Action, ActionCoordinates, TpmAction};
pub use artifact::{ArtifactKind, Artifacts, BiosImage, RegisterId, Registers, SystemArtifact};
pub use bootengine::{BootProcess, Log, RunStatus, StepIssue, StepResult};
pub use condition::Condition;
pub use data::{Actor, Converter, Data, DataContent, MeasuredData, MeasuredDataSlice};
pub use datasource::DataSource;
pub use error::{BootflowError, ContractViolationReason, DataSourceReason, TpmCommandReason};
pub use flow::{Flow, Step};
pub use mapper::AddressMapper;
pub use range::{Range, Ranges};
pub use reference::{Reference, References};
pub use state::State;
pub use tpm::{
    Command, CommandLog, EventLog, EventLogEntry, EventType, PcrId, PcrValues, Tpm, TpmAlg,
    PCR_COUNT, SUPPORTED_ALGORITHMS,
};
pub use trustchain::{TrustChain, TrustChainKind, TrustChains};
