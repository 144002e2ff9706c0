// SPDX-License-Identifier: MIT OR Apache-2.0

//! Brute force and register recovery error types

use thiserror::Error;

use pcrsim_bootflow::{BootflowError, PcrId, RegisterId, TpmAlg, TpmCommandReason};

/// Error returned by a brute force `init` function
pub type InitError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while searching for bit flips
///
/// Exhausting the search distance without a match is not an error.
#[derive(Debug, Error)]
pub enum BruteForceError {
    #[error("Distance {distance} is too high: C({bits}, {distance}) combinations overflow the combination id space")]
    TooManyCombinations { bits: u64, distance: u64 },

    #[error("Brute forcer init failed: {0}")]
    Init(String),

    #[error("Workers failed at distance {distance}: {}", .errors.join("; "))]
    Workers { distance: u64, errors: Vec<String> },
}

/// Errors that can occur while recovering a register value
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("Boot run is unusable: {0}")]
    Bootflow(#[from] BootflowError),

    #[error("Replay failed: {0}")]
    Tpm(#[from] TpmCommandReason),

    #[error("TPM was never initialized, PCR{pcr} has no starting value")]
    TpmNotInitialized { pcr: PcrId },

    #[error("Measurement #{index} into PCR{pcr} has no recorded payload")]
    PayloadUnknown { pcr: PcrId, index: usize },

    #[error("Register {id} is not part of any measurement into PCR{pcr}")]
    RegisterNotMeasured { id: RegisterId, pcr: PcrId },

    #[error("Expected {alg} value has {got} bytes, expected {expected}")]
    DigestSizeMismatch {
        alg: TpmAlg,
        expected: usize,
        got: usize,
    },

    #[error("Brute force failed: {0}")]
    BruteForce(#[from] BruteForceError),
}
