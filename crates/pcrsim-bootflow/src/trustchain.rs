// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trust chains: emulated roots of trust that consume measurements

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::ContractViolationReason;
use crate::tpm::Tpm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TrustChainKind {
    Tpm,
}

impl fmt::Display for TrustChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustChainKind::Tpm => write!(f, "TPM"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TrustChain {
    Tpm(Tpm),
}

impl TrustChain {
    pub fn kind(&self) -> TrustChainKind {
        match self {
            TrustChain::Tpm(_) => TrustChainKind::Tpm,
        }
    }

    /// Stop accepting measurements.
    pub fn finish(&mut self) {
        match self {
            TrustChain::Tpm(tpm) => tpm.finish(),
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            TrustChain::Tpm(tpm) => tpm.is_finished(),
        }
    }
}

impl From<Tpm> for TrustChain {
    fn from(tpm: Tpm) -> Self {
        TrustChain::Tpm(tpm)
    }
}

/// Active trust chains of one simulation, at most one per kind.
#[derive(Debug, Clone, Default)]
pub struct TrustChains {
    by_kind: BTreeMap<TrustChainKind, TrustChain>,
}

impl TrustChains {
    pub fn include(&mut self, chain: TrustChain) -> Result<(), ContractViolationReason> {
        let kind = chain.kind();
        if self.by_kind.contains_key(&kind) {
            return Err(ContractViolationReason::DuplicateTrustChain { kind });
        }
        self.by_kind.insert(kind, chain);
        Ok(())
    }

    pub fn get(&self, kind: TrustChainKind) -> Option<&TrustChain> {
        self.by_kind.get(&kind)
    }

    pub fn get_mut(&mut self, kind: TrustChainKind) -> Option<&mut TrustChain> {
        self.by_kind.get_mut(&kind)
    }

    pub fn tpm(&self) -> Option<&Tpm> {
        match self.by_kind.get(&TrustChainKind::Tpm) {
            Some(TrustChain::Tpm(tpm)) => Some(tpm),
            None => None,
        }
    }

    pub fn tpm_mut(&mut self) -> Option<&mut Tpm> {
        match self.by_kind.get_mut(&TrustChainKind::Tpm) {
            Some(TrustChain::Tpm(tpm)) => Some(tpm),
            None => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrustChain> {
        self.by_kind.values()
    }

    pub fn finish_all(&mut self) {
        for chain in self.by_kind.values_mut() {
            chain.finish();
        }
    }
}
