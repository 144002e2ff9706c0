// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hash algorithms and PCR banks of the emulated TPM

use std::fmt;

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::TpmCommandReason;

/// Index of a Platform Configuration Register.
pub type PcrId = u8;

/// Number of PCRs in a bank.
pub const PCR_COUNT: usize = 24;

/// TPM algorithm identifiers (TPM_ALG_ID)
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TpmAlg {
    Rsa = 0x0001,
    Sha1 = 0x0004,
    Sha256 = 0x000B,
    Sha384 = 0x000C,
    Sha512 = 0x000D,
    Null = 0x0010,
    Ecc = 0x0023,
}

/// Highest algorithm id a PCR bank slot is reserved for.
pub const TPM_MAX_HASH_ALG: TpmAlg = TpmAlg::Sha512;

impl TpmAlg {
    /// Get the digest size in bytes for hash algorithms
    pub fn digest_size(&self) -> Option<usize> {
        match self {
            TpmAlg::Sha1 => Some(20),
            TpmAlg::Sha256 => Some(32),
            TpmAlg::Sha384 => Some(48),
            TpmAlg::Sha512 => Some(64),
            _ => None,
        }
    }

    /// Get the algorithm name as a string
    pub fn name(&self) -> &'static str {
        match self {
            TpmAlg::Rsa => "rsa",
            TpmAlg::Sha1 => "sha1",
            TpmAlg::Sha256 => "sha256",
            TpmAlg::Sha384 => "sha384",
            TpmAlg::Sha512 => "sha512",
            TpmAlg::Null => "null",
            TpmAlg::Ecc => "ecc",
        }
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(TpmAlg::Rsa),
            0x0004 => Some(TpmAlg::Sha1),
            0x000B => Some(TpmAlg::Sha256),
            0x000C => Some(TpmAlg::Sha384),
            0x000D => Some(TpmAlg::Sha512),
            0x0010 => Some(TpmAlg::Null),
            0x0023 => Some(TpmAlg::Ecc),
            _ => None,
        }
    }

    pub fn is_hash(&self) -> bool {
        self.digest_size().is_some()
    }

    /// Hash `data` with this algorithm.
    pub fn hash(&self, data: &[u8]) -> Result<Vec<u8>, TpmCommandReason> {
        let digest = match self {
            TpmAlg::Sha1 => Sha1::digest(data).to_vec(),
            TpmAlg::Sha256 => Sha256::digest(data).to_vec(),
            TpmAlg::Sha384 => Sha384::digest(data).to_vec(),
            TpmAlg::Sha512 => Sha512::digest(data).to_vec(),
            alg => return Err(TpmCommandReason::UnsupportedHashAlgorithm { alg: *alg }),
        };
        Ok(digest)
    }

    /// `Hash(old || digest)`, the PCR extend operation.
    pub fn extend(&self, old: &[u8], digest: &[u8]) -> Result<Vec<u8>, TpmCommandReason> {
        let mut buf = Vec::with_capacity(old.len() + digest.len());
        buf.extend_from_slice(old);
        buf.extend_from_slice(digest);
        self.hash(&buf)
    }
}

impl fmt::Display for TpmAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for TpmAlg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        [
            TpmAlg::Sha1,
            TpmAlg::Sha256,
            TpmAlg::Sha384,
            TpmAlg::Sha512,
        ]
        .into_iter()
        .find(|alg| alg.name() == lower.replace('-', ""))
        .ok_or_else(|| format!("unknown hash algorithm: {}", s))
    }
}

// =============================================================================
// PCR values
// =============================================================================

/// PCR contents indexed by PCR and by algorithm id.
///
/// A slot exists only for algorithms the bank was allocated with; reading
/// or writing anything else is an "uninitialized" error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PcrValues(Vec<Vec<Option<Vec<u8>>>>);

impl PcrValues {
    /// Allocate `pcr_count` PCRs with zeroed banks for every algorithm in `algs`.
    pub fn allocate(pcr_count: usize, algs: &[TpmAlg]) -> Self {
        let slots = TPM_MAX_HASH_ALG as usize + 1;
        let mut pcrs = vec![vec![None; slots]; pcr_count];
        for pcr in pcrs.iter_mut() {
            for alg in algs {
                if let (Some(size), Some(slot)) = (alg.digest_size(), pcr.get_mut(*alg as usize)) {
                    *slot = Some(vec![0u8; size]);
                }
            }
        }
        Self(pcrs)
    }

    pub fn pcr_count(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, pcr: PcrId, alg: TpmAlg) -> Result<&[u8], TpmCommandReason> {
        let banks = self
            .0
            .get(pcr as usize)
            .ok_or(TpmCommandReason::PcrNotInitialized { pcr })?;
        banks
            .get(alg as usize)
            .and_then(|slot| slot.as_deref())
            .ok_or(TpmCommandReason::SlotNotInitialized { pcr, alg })
    }

    /// Replace the value of an allocated slot.
    ///
    /// # Panics
    ///
    /// Panics if `alg` is above [`TPM_MAX_HASH_ALG`]; no bank slot can exist
    /// for such an id, so the caller is broken.
    pub fn set(&mut self, pcr: PcrId, alg: TpmAlg, value: Vec<u8>) -> Result<(), TpmCommandReason> {
        if alg > TPM_MAX_HASH_ALG {
            panic!(
                "too high value of hash algorithm: {} (0x{:04X}) > {}",
                alg, alg as u16, TPM_MAX_HASH_ALG
            );
        }
        let banks = self
            .0
            .get_mut(pcr as usize)
            .ok_or(TpmCommandReason::PcrNotInitialized { pcr })?;
        match banks.get_mut(alg as usize) {
            Some(slot @ Some(_)) => {
                *slot = Some(value);
                Ok(())
            }
            _ => Err(TpmCommandReason::SlotNotInitialized { pcr, alg }),
        }
    }

    /// Allocated banks of one PCR in algorithm id order.
    pub fn banks(&self, pcr: PcrId) -> impl Iterator<Item = (TpmAlg, &[u8])> {
        self.0
            .get(pcr as usize)
            .into_iter()
            .flat_map(|banks| banks.iter().enumerate())
            .filter_map(|(id, slot)| {
                let alg = TpmAlg::from_u16(id as u16)?;
                slot.as_deref().map(|value| (alg, value))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_hash_known_vectors() {
        assert_eq!(
            TpmAlg::Sha1.hash(b"abc").unwrap(),
            hex!("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
        assert_eq!(
            TpmAlg::Sha256.hash(b"abc").unwrap(),
            hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert!(matches!(
            TpmAlg::Rsa.hash(b"abc"),
            Err(TpmCommandReason::UnsupportedHashAlgorithm { alg: TpmAlg::Rsa })
        ));
    }

    #[test]
    fn test_get_uninitialized() {
        let values = PcrValues::allocate(PCR_COUNT, &[TpmAlg::Sha256]);
        assert_eq!(values.get(0, TpmAlg::Sha256).unwrap(), &[0u8; 32]);
        assert!(matches!(
            values.get(0, TpmAlg::Sha1),
            Err(TpmCommandReason::SlotNotInitialized { pcr: 0, alg: TpmAlg::Sha1 })
        ));
        assert!(matches!(
            values.get(24, TpmAlg::Sha256),
            Err(TpmCommandReason::PcrNotInitialized { pcr: 24 })
        ));
    }

    #[test]
    fn test_set_requires_allocated_slot() {
        let mut values = PcrValues::allocate(2, &[TpmAlg::Sha1]);
        values.set(1, TpmAlg::Sha1, vec![1u8; 20]).unwrap();
        assert_eq!(values.get(1, TpmAlg::Sha1).unwrap(), &[1u8; 20]);
        assert!(values.set(1, TpmAlg::Sha384, vec![0u8; 48]).is_err());
        assert!(values.set(2, TpmAlg::Sha1, vec![0u8; 20]).is_err());
    }

    #[test]
    #[should_panic(expected = "too high value of hash algorithm")]
    fn test_set_above_max_slot_panics() {
        let mut values = PcrValues::allocate(1, &[TpmAlg::Sha1]);
        let _ = values.set(0, TpmAlg::Ecc, vec![]);
    }

    #[test]
    fn test_banks_in_id_order() {
        let values = PcrValues::allocate(1, &[TpmAlg::Sha256, TpmAlg::Sha1]);
        let algs: Vec<TpmAlg> = values.banks(0).map(|(alg, _)| alg).collect();
        assert_eq!(algs, vec![TpmAlg::Sha1, TpmAlg::Sha256]);
    }

    #[test]
    fn test_alg_from_str() {
        assert_eq!("SHA-256".parse::<TpmAlg>().unwrap(), TpmAlg::Sha256);
        assert_eq!("sha1".parse::<TpmAlg>().unwrap(), TpmAlg::Sha1);
        assert!("md5".parse::<TpmAlg>().is_err());
    }
}
