// SPDX-License-Identifier: MIT OR Apache-2.0

//! TPM commands and the command log

use std::fmt;

use crate::action::ActionCoordinates;
use crate::tpm::{EventLogEntry, PcrId, TpmAlg};

/// A command sent to the emulated TPM.
#[derive(Debug, Clone)]
pub enum Command {
    /// TPM2_Startup at the given locality
    Init { locality: u8 },
    /// TPM2_PCR_Extend of one bank with a precomputed digest
    Extend {
        pcr: PcrId,
        alg: TpmAlg,
        digest: Vec<u8>,
    },
    /// Append to the event log without touching the PCRs
    EventLogAdd(EventLogEntry),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Init { .. } => "Init",
            Command::Extend { .. } => "Extend",
            Command::EventLogAdd(_) => "EventLogAdd",
        }
    }

    /// One-line human readable form.
    pub fn log_string(&self) -> String {
        match self {
            Command::Init { locality } => format!("TPMInit(locality: {})", locality),
            Command::Extend { pcr, alg, digest } => {
                format!("TPMExtend(PCR: {}, {}: {})", pcr, alg, hex::encode(digest))
            }
            Command::EventLogAdd(entry) => format!("TPMEventLogAdd({})", entry),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.log_string())
    }
}

/// A committed command together with the action that caused it.
#[derive(Debug, Clone)]
pub struct CommandLogEntry {
    pub command: Command,
    pub cause: ActionCoordinates,
}

impl fmt::Display for CommandLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.command, self.cause)
    }
}

/// Every command the TPM accepted, in application order.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Vec<CommandLogEntry>);

impl CommandLog {
    pub(crate) fn push(&mut self, entry: CommandLogEntry) {
        self.0.push(entry);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CommandLogEntry> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a CommandLog {
    type Item = &'a CommandLogEntry;
    type IntoIter = std::slice::Iter<'a, CommandLogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for CommandLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, entry) in self.0.iter().enumerate() {
            writeln!(f, "{:4}. {}", idx, entry)?;
        }
        Ok(())
    }
}
