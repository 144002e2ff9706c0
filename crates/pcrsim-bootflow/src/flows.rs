// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in boot flows

use crate::action::Action;
use crate::amd::AmdStep;
use crate::condition::Condition;
use crate::datasource::DataSource;
use crate::flow::{Flow, Step};
use crate::intel::IntelStep;
use crate::ocp::OcpStep;
use crate::tpm::PcrId;

/// Names accepted by [`by_name`].
pub const FLOW_NAMES: [&str; 4] = ["root", "intel", "amd", "ocp-pei"];

pub fn by_name(name: &str) -> Option<Flow> {
    match name.to_ascii_lowercase().as_str() {
        "root" => Some(root()),
        "intel" => Some(intel()),
        "amd" => Some(amd()),
        "ocp-pei" | "ocppei" => Some(ocp_pei()),
        _ => None,
    }
}

/// Detects the platform and switches to its flow.
pub fn root() -> Flow {
    Flow::new(
        "root",
        vec![
            if_(Condition::FitPresent, set_flow(intel())),
            if_(Condition::AmdManifestPresent, set_flow(amd())),
            panic("unknown flow: neither AMD nor Intel"),
        ],
    )
}

/// Intel Boot Guard: the ACM measures PCR0_DATA and the IBB at locality 3.
pub fn intel() -> Flow {
    Flow::new(
        "intel",
        vec![
            init_tpm_lazy(3),
            Step::Intel(IntelStep::MeasurePcr0Data),
            Step::Intel(IntelStep::MeasureIbb),
        ],
    )
}

/// AMD: the PSP logs the EFS and measures the BIOS directory tables.
pub fn amd() -> Flow {
    Flow::new(
        "amd",
        vec![
            init_tpm_lazy(0),
            Step::Amd(AmdStep::MeasureEmbeddedFirmwareStructure),
            Step::Amd(AmdStep::MeasureBiosDirectory),
        ],
    )
}

/// OCP firmware PEI phase measuring its vendor version into PCR0.
pub fn ocp_pei() -> Flow {
    Flow::new(
        "ocp-pei",
        vec![
            init_tpm_lazy(0),
            if_(
                Condition::IsOcpV1,
                Step::Ocp(OcpStep::MeasureFirmwareVendorVersion),
            ),
            if_(
                Condition::not(Condition::IsOcpV1),
                panic("not an OCP v1 firmware"),
            ),
        ],
    )
}

// =============================================================================
// Step constructors
// =============================================================================

pub fn set_flow(flow: Flow) -> Step {
    Step::Static(vec![Action::set_flow(flow)])
}

pub fn panic(message: &str) -> Step {
    Step::Static(vec![Action::panic(message)])
}

pub fn init_tpm_lazy(locality: u8) -> Step {
    Step::Static(vec![Action::init_tpm_lazy(locality)])
}

pub fn extend(pcr: PcrId, source: DataSource) -> Step {
    Step::Static(vec![Action::tpm_extend(pcr, source)])
}

pub fn if_(condition: Condition, then: Step) -> Step {
    Step::If(condition, Box::new(then))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_name() {
        for name in FLOW_NAMES {
            assert_eq!(by_name(name).unwrap().name(), name);
        }
        assert!(by_name("arm").is_none());
    }

    #[test]
    fn test_root_display() {
        let text = root().to_string();
        assert!(text.contains("If(FITPresent, SetFlow(intel))"));
        assert!(text.contains("If(AMDManifestPresent, SetFlow(amd))"));
    }
}
