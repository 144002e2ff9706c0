// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conditions gating `If` steps
//!
//! A condition that cannot be evaluated (missing artifact, malformed
//! structure) is false, so platform dispatch falls through to the next
//! candidate instead of aborting.

use std::fmt;

use log::debug;

use crate::amd;
use crate::artifact::RegisterId;
use crate::error::BootflowError;
use crate::intel;
use crate::ocp;
use crate::state::State;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The image carries a valid Intel Firmware Interface Table.
    FitPresent,
    /// The image carries an AMD Embedded Firmware Structure.
    AmdManifestPresent,
    /// The image carries the OCP firmware vendor version.
    IsOcpV1,
    /// The register snapshot has a value for the register.
    RegisterPresent(RegisterId),
    Not(Box<Condition>),
    Always(bool),
}

impl Condition {
    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    pub fn check(&self, state: &State) -> bool {
        match self {
            Condition::FitPresent => probe(self, || {
                intel::Fit::parse(state.bios_image()?).map(|_| ())
            }),
            Condition::AmdManifestPresent => probe(self, || {
                amd::find_embedded_firmware(state.bios_image()?).map(|_| ())
            }),
            Condition::IsOcpV1 => probe(self, || {
                ocp::find_vendor_version(state.bios_image()?).map(|_| ())
            }),
            Condition::RegisterPresent(id) => state
                .registers()
                .map(|regs| regs.get(*id).is_some())
                .unwrap_or(false),
            Condition::Not(inner) => !inner.check(state),
            Condition::Always(value) => *value,
        }
    }
}

fn probe(condition: &Condition, f: impl FnOnce() -> Result<(), BootflowError>) -> bool {
    match f() {
        Ok(()) => true,
        Err(e) => {
            debug!("condition {} is false: {}", condition, e);
            false
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::FitPresent => write!(f, "FITPresent"),
            Condition::AmdManifestPresent => write!(f, "AMDManifestPresent"),
            Condition::IsOcpV1 => write!(f, "IsOCPv1"),
            Condition::RegisterPresent(id) => write!(f, "RegisterPresent({})", id),
            Condition::Not(inner) => write!(f, "Not({})", inner),
            Condition::Always(value) => write!(f, "{}", value),
        }
    }
}
