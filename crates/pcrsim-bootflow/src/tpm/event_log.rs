// SPDX-License-Identifier: MIT OR Apache-2.0

//! TPM event log

use std::fmt;

use crate::data::MeasuredData;
use crate::tpm::{PcrId, TpmAlg};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// The digest was extended into the PCR.
    Extend,
    /// Logged only; the PCR is unchanged.
    Informational,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Extend => write!(f, "extend"),
            EventType::Informational => write!(f, "info"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventLogEntry {
    pub pcr: PcrId,
    pub alg: TpmAlg,
    pub digest: Vec<u8>,
    pub event_type: EventType,
    pub description: String,
    /// What was measured, when known
    pub measured: Option<MeasuredData>,
}

impl fmt::Display for EventLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PCR{} {} {} {} {}",
            self.pcr,
            self.alg,
            self.event_type,
            hex::encode(&self.digest),
            self.description
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventLog(Vec<EventLogEntry>);

impl EventLog {
    pub fn push(&mut self, entry: EventLogEntry) {
        self.0.push(entry);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EventLogEntry> {
        self.0.iter()
    }

    /// Entries concerning one PCR bank.
    pub fn filter(&self, pcr: PcrId, alg: TpmAlg) -> impl Iterator<Item = &EventLogEntry> {
        self.0.iter().filter(move |e| e.pcr == pcr && e.alg == alg)
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a EventLogEntry;
    type IntoIter = std::slice::Iter<'a, EventLogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
