// SPDX-License-Identifier: MIT OR Apache-2.0

//! Register recovery against PCR0 of the synthetic Intel image

use pcrsim_bootflow::test_support::{self, ACM_POLICY_STATUS};
use pcrsim_bootflow::{flows, BootProcess, RegisterId, RunStatus, State, TpmAlg};
use pcrsim_bruteforce::{recover_register, PcrReplay, RecoveryError};

fn boot(acm_policy_status: u64) -> State {
    let mut state = test_support::intel_state_without_registers();
    state
        .include_artifact(
            test_support::intel_registers().with(RegisterId::AcmPolicyStatus, acm_policy_status),
        )
        .unwrap();
    let mut process = BootProcess::with_flow(state, flows::root());
    assert!(matches!(process.finish(), RunStatus::Finished));
    let (state, _, _) = process.into_parts();
    state
}

fn reported_pcr0(alg: TpmAlg) -> Vec<u8> {
    boot(ACM_POLICY_STATUS).tpm().unwrap().pcr_value(0, alg).unwrap().to_vec()
}

#[test]
fn test_recovers_two_flipped_bits() {
    let expected = reported_pcr0(TpmAlg::Sha256);
    let snapshot = ACM_POLICY_STATUS ^ (1 << 5) ^ (1 << 40);

    let state = boot(snapshot);
    let replay = PcrReplay::from_state(&state, 0, TpmAlg::Sha256).unwrap();
    assert_ne!(replay.final_value().unwrap(), expected);

    let location = replay.locate_register(RegisterId::AcmPolicyStatus).unwrap();
    let recovered = recover_register(&replay, location, &expected, 2, 0)
        .unwrap()
        .unwrap();
    assert_eq!(recovered.original, snapshot);
    assert_eq!(recovered.recovered, ACM_POLICY_STATUS);
    assert_eq!(recovered.flips.to_vec(), vec![5, 40]);
    assert!(recovered.to_string().starts_with("ACM_POLICY_STATUS"));
}

#[test]
fn test_recovery_in_sha1_bank() {
    let expected = reported_pcr0(TpmAlg::Sha1);
    let state = boot(ACM_POLICY_STATUS ^ (1 << 33));
    let replay = PcrReplay::from_state(&state, 0, TpmAlg::Sha1).unwrap();
    let location = replay.locate_register(RegisterId::AcmPolicyStatus).unwrap();

    let recovered = recover_register(&replay, location, &expected, 1, 2)
        .unwrap()
        .unwrap();
    assert_eq!(recovered.flips.to_vec(), vec![33]);
    assert_eq!(recovered.recovered, ACM_POLICY_STATUS);
}

#[test]
fn test_matching_snapshot_needs_no_flips() {
    let expected = reported_pcr0(TpmAlg::Sha256);
    let state = boot(ACM_POLICY_STATUS);
    let replay = PcrReplay::from_state(&state, 0, TpmAlg::Sha256).unwrap();
    assert_eq!(replay.final_value().unwrap(), expected);

    let location = replay.locate_register(RegisterId::AcmPolicyStatus).unwrap();
    let recovered = recover_register(&replay, location, &expected, 2, 0)
        .unwrap()
        .unwrap();
    assert_eq!(recovered.flips.distance(), 0);
    assert_eq!(recovered.recovered, recovered.original);
}

#[test]
fn test_out_of_distance_is_not_found() {
    let expected = reported_pcr0(TpmAlg::Sha256);
    let state = boot(ACM_POLICY_STATUS ^ 0b111);
    let replay = PcrReplay::from_state(&state, 0, TpmAlg::Sha256).unwrap();
    let location = replay.locate_register(RegisterId::AcmPolicyStatus).unwrap();

    let recovered = recover_register(&replay, location, &expected, 2, 0).unwrap();
    assert!(recovered.is_none());
}

#[test]
fn test_expected_digest_size_is_checked() {
    let state = boot(ACM_POLICY_STATUS);
    let replay = PcrReplay::from_state(&state, 0, TpmAlg::Sha256).unwrap();
    let location = replay.locate_register(RegisterId::AcmPolicyStatus).unwrap();

    let err = recover_register(&replay, location, &[0u8; 20], 1, 0).unwrap_err();
    assert!(matches!(
        err,
        RecoveryError::DigestSizeMismatch {
            expected: 32,
            got: 20,
            ..
        }
    ));
}
