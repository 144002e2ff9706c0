// SPDX-License-Identifier: MIT OR Apache-2.0

//! Register recovery
//!
//! A PCR value depends on a register value wherever the register's bytes
//! are part of a measured payload (ACM_POLICY_STATUS in PCR0_DATA, for
//! instance). When a reported PCR disagrees with the simulation, the usual
//! culprit is a register that differs from the snapshot in a few bits.
//! [`recover_register`] searches those bits: it replays the PCR's extends
//! with the register bytes patched until the replay ends in the expected
//! value.

use std::fmt;

use log::{debug, info};

use pcrsim_bootflow::tpm::initial_pcr_value;
use pcrsim_bootflow::{
    ArtifactKind, EventType, PcrId, References, RegisterId, State, TpmAlg, TpmCommandReason,
};

use crate::brute_forcer::BruteForcer;
use crate::combination::UniqueUnorderedCombination;
use crate::error::{InitError, RecoveryError};

/// One extend of the replayed PCR bank.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub digest: Vec<u8>,
    /// Hashed bytes, as re-read from the artifacts after the run
    pub payload: Vec<u8>,
    /// Where `payload` came from, in native artifact offsets. Empty for
    /// forced bytes or converted data.
    pub references: References,
}

/// Everything needed to recompute one PCR bank without a TPM.
#[derive(Debug, Clone)]
pub struct PcrReplay {
    pub pcr: PcrId,
    pub alg: TpmAlg,
    pub initial: Vec<u8>,
    pub measurements: Vec<Measurement>,
}

/// Byte position of a register inside a measurement payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterLocation {
    pub id: RegisterId,
    /// Index into [`PcrReplay::measurements`]
    pub measurement: usize,
    pub offset: usize,
    pub width: usize,
}

impl PcrReplay {
    /// Collect the extends of `pcr`/`alg` from a finished run.
    pub fn from_state(state: &State, pcr: PcrId, alg: TpmAlg) -> Result<Self, RecoveryError> {
        let tpm = state.tpm()?;
        let locality = tpm.locality().ok_or(RecoveryError::TpmNotInitialized { pcr })?;
        let initial = initial_pcr_value(alg, pcr, locality)?;

        let mut measurements = Vec::new();
        for (index, entry) in tpm
            .event_log()
            .filter(pcr, alg)
            .filter(|e| e.event_type == EventType::Extend)
            .enumerate()
        {
            let measured = entry
                .measured
                .as_ref()
                .ok_or(RecoveryError::PayloadUnknown { pcr, index })?;
            let payload = measured.data.bytes(state.artifacts())?;
            let references = match (measured.data.get_references(), measured.data.has_converter()) {
                (Some(refs), false) => refs.resolve(state.artifacts())?,
                _ => References::default(),
            };
            measurements.push(Measurement {
                digest: entry.digest.clone(),
                payload,
                references,
            });
        }
        debug!(
            "replay of PCR{} {}: {} measurements",
            pcr,
            alg,
            measurements.len()
        );

        Ok(Self {
            pcr,
            alg,
            initial,
            measurements,
        })
    }

    /// Fold every recorded digest into the initial value.
    pub fn final_value(&self) -> Result<Vec<u8>, RecoveryError> {
        let mut value = self.initial.clone();
        for m in &self.measurements {
            value = self.extend(&value, &m.digest)?;
        }
        Ok(value)
    }

    /// Find the first measurement whose payload carries register `id`.
    pub fn locate_register(&self, id: RegisterId) -> Option<RegisterLocation> {
        let target = id.range();
        for (index, m) in self.measurements.iter().enumerate() {
            let mut offset = 0u64;
            for reference in m.references.iter() {
                for range in &reference.ranges {
                    if reference.artifact == ArtifactKind::Registers && range.contains(&target) {
                        return Some(RegisterLocation {
                            id,
                            measurement: index,
                            offset: (offset + target.offset - range.offset) as usize,
                            width: target.length as usize,
                        });
                    }
                    offset += range.length;
                }
            }
        }
        None
    }

    fn extend(&self, old: &[u8], digest: &[u8]) -> Result<Vec<u8>, RecoveryError> {
        Ok(self.alg.extend(old, digest)?)
    }
}

/// A register value that makes the replay match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredRegister {
    pub id: RegisterId,
    /// Bits flipped relative to the snapshot, indexed LSB first
    pub flips: UniqueUnorderedCombination,
    pub original: u64,
    pub recovered: u64,
}

impl fmt::Display for RecoveredRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: 0x{:X} -> 0x{:X} (flipped bits {})",
            self.id, self.original, self.recovered, self.flips
        )
    }
}

/// Per-worker scratch: the payload being patched.
struct ReplayContext {
    payload: Vec<u8>,
}

/// Search register values within `max_distance` flipped bits of the
/// snapshot so that the replay ends in `expected`.
///
/// Returns `None` when no such value exists within the distance.
pub fn recover_register(
    replay: &PcrReplay,
    location: RegisterLocation,
    expected: &[u8],
    max_distance: u64,
    max_concurrency: usize,
) -> Result<Option<RecoveredRegister>, RecoveryError> {
    let alg = replay.alg;
    let digest_size = alg
        .digest_size()
        .ok_or(TpmCommandReason::UnsupportedHashAlgorithm { alg })?;
    if expected.len() != digest_size {
        return Err(RecoveryError::DigestSizeMismatch {
            alg,
            expected: digest_size,
            got: expected.len(),
        });
    }

    let range = location.offset..location.offset + location.width;
    let not_measured = || RecoveryError::RegisterNotMeasured {
        id: location.id,
        pcr: replay.pcr,
    };
    let target = replay
        .measurements
        .get(location.measurement)
        .ok_or_else(not_measured)?;
    let initial_data = target
        .payload
        .get(range.clone())
        .ok_or_else(not_measured)?
        .to_vec();

    let mut prefix = replay.initial.clone();
    for m in &replay.measurements[..location.measurement] {
        prefix = replay.extend(&prefix, &m.digest)?;
    }
    let suffix: Vec<&[u8]> = replay.measurements[location.measurement + 1..]
        .iter()
        .map(|m| m.digest.as_slice())
        .collect();

    let init = || -> Result<ReplayContext, InitError> {
        Ok(ReplayContext {
            payload: target.payload.clone(),
        })
    };
    let check = |ctx: &mut ReplayContext, candidate: &[u8]| -> bool {
        ctx.payload[range.clone()].copy_from_slice(candidate);
        let folded = alg.hash(&ctx.payload).and_then(|digest| {
            suffix
                .iter()
                .try_fold(alg.extend(&prefix, &digest)?, |value, d| alg.extend(&value, d))
        });
        matches!(folded, Ok(value) if value == expected)
    };

    info!(
        "searching {} within {} bits of 0x{:X}",
        location.id,
        max_distance,
        location.id.value_from_bytes(&initial_data)
    );
    let found = BruteForcer::new(&initial_data, init, check)
        .max_concurrency(max_concurrency)
        .run(max_distance)?;

    Ok(found.map(|flips| {
        let mut corrected = initial_data.clone();
        flips.apply_bit_flips(&mut corrected);
        RecoveredRegister {
            id: location.id,
            original: location.id.value_from_bytes(&initial_data),
            recovered: location.id.value_from_bytes(&corrected),
            flips,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcrsim_bootflow::test_support;
    use pcrsim_bootflow::{flows, BootProcess};

    #[test]
    fn test_replay_matches_tpm() {
        let mut process = BootProcess::with_flow(test_support::intel_state(), flows::root());
        process.finish();
        let state = process.state();
        for alg in [TpmAlg::Sha1, TpmAlg::Sha256] {
            let replay = PcrReplay::from_state(state, 0, alg).unwrap();
            assert_eq!(replay.measurements.len(), 2);
            assert_eq!(
                replay.final_value().unwrap(),
                state.tpm().unwrap().pcr_value(0, alg).unwrap()
            );
        }
    }

    #[test]
    fn test_locate_acm_policy_status() {
        let mut process = BootProcess::with_flow(test_support::intel_state(), flows::root());
        process.finish();
        let replay = PcrReplay::from_state(process.state(), 0, TpmAlg::Sha256).unwrap();

        let location = replay.locate_register(RegisterId::AcmPolicyStatus).unwrap();
        assert_eq!(location.measurement, 0);
        assert_eq!(location.offset, 0);
        assert_eq!(location.width, 8);
        assert!(replay.locate_register(RegisterId::TxtErrorCode).is_none());
    }
}
