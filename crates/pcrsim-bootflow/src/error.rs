// SPDX-License-Identifier: MIT OR Apache-2.0

//! Boot flow error types

use thiserror::Error;

use crate::artifact::{ArtifactKind, RegisterId};
use crate::mapper::AddressMapper;
use crate::tpm::{PcrId, TpmAlg};
use crate::trustchain::TrustChainKind;

/// Errors that can occur while simulating a boot flow
#[derive(Debug, Clone, Error)]
pub enum BootflowError {
    #[error("Contract violation: {0}")]
    Contract(#[from] ContractViolationReason),

    #[error("TPM command failed: {0}")]
    Tpm(#[from] TpmCommandReason),

    #[error("Data source failed: {0}")]
    DataSource(#[from] DataSourceReason),

    #[error("Trust chain {kind} is not included in the state")]
    TrustChainMissing { kind: TrustChainKind },

    #[error("Flow panicked: {message}")]
    Panic { message: String },

    #[error("Nothing to measure: {what} yielded no bytes")]
    EmptyMeasurement { what: String },
}

// =============================================================================
// ContractViolationReason
// =============================================================================

/// Collaborator or programming bugs; never caused by bad firmware input.
#[derive(Debug, Clone, Error)]
pub enum ContractViolationReason {
    #[error("Artifact {kind} is already included (one instance per kind)")]
    DuplicateArtifact { kind: ArtifactKind },

    #[error("Trust chain {kind} is already included (one instance per kind)")]
    DuplicateTrustChain { kind: TrustChainKind },

    #[error("Artifact {kind} is referenced but not included in the state")]
    ArtifactMissing { kind: ArtifactKind },

    #[error("Short read from {kind} at 0x{offset:X}: expected {expected} bytes, got {got}")]
    ShortRead {
        kind: ArtifactKind,
        offset: u64,
        expected: u64,
        got: u64,
    },

    #[error("{mapper} cannot map range 0x{offset:X}:0x{end:X} within {kind} (size 0x{size:X})")]
    UnresolvableRange {
        mapper: AddressMapper,
        kind: ArtifactKind,
        offset: u64,
        end: u64,
        size: u64,
    },
}

// =============================================================================
// TpmCommandReason
// =============================================================================

#[derive(Debug, Clone, Error)]
pub enum TpmCommandReason {
    #[error("PCR {pcr} is not initialized")]
    PcrNotInitialized { pcr: PcrId },

    #[error("PCR {pcr}:{alg} is not initialized")]
    SlotNotInitialized { pcr: PcrId, alg: TpmAlg },

    #[error("TPM is already initialized at locality {current}, requested locality {requested}")]
    AlreadyInitialized { current: u8, requested: u8 },

    #[error("TPM is finished and accepts no further commands")]
    Finished,

    #[error("Unsupported hash algorithm: {alg}")]
    UnsupportedHashAlgorithm { alg: TpmAlg },

    #[error("Digest size mismatch for {alg}: expected {expected} bytes, got {got}")]
    DigestSizeMismatch {
        alg: TpmAlg,
        expected: usize,
        got: usize,
    },

    #[error("Unable to apply command #{index} '{command}': {reason}")]
    CommandFailed {
        index: usize,
        command: &'static str,
        reason: Box<TpmCommandReason>,
    },
}

// =============================================================================
// DataSourceReason
// =============================================================================

#[derive(Debug, Clone, Error)]
pub enum DataSourceReason {
    #[error("Register {id} is not present in the registers snapshot")]
    RegisterMissing { id: RegisterId },

    #[error("Firmware image of {size} bytes is too small for {what}")]
    ImageTooSmall { size: u64, what: &'static str },

    #[error("FIT pointer 0x{pointer:X} does not point into the firmware image")]
    FitPointerOutOfImage { pointer: u64 },

    #[error("FIT header signature mismatch at 0x{offset:X}")]
    FitSignatureMismatch { offset: u64 },

    #[error("FIT declares {entries} entries which do not fit into the image")]
    FitTruncated { entries: u32 },

    #[error("No FIT entries of type 0x{entry_type:02X}")]
    FitEntryMissing { entry_type: u8 },

    #[error("Embedded Firmware Structure is not found")]
    EmbeddedFirmwareNotFound,

    #[error("BIOS directory table at 0x{offset:X} has unexpected cookie 0x{cookie:08X}")]
    BiosDirectoryCookieInvalid { offset: u64, cookie: u32 },

    #[error("BIOS directory table at 0x{offset:X} is truncated")]
    BiosDirectoryTruncated { offset: u64 },

    #[error("Embedded Firmware Structure points to no BIOS directory table")]
    BiosDirectoryNotFound,

    #[error("Firmware vendor version is not found in the image")]
    VendorVersionNotFound,
}
