// SPDX-License-Identifier: MIT OR Apache-2.0

//! Emulated TPM: PCR banks, event log and command log
//!
//! Only the PCR-relevant behavior of a TPM 2.0 is emulated. The TPM is
//! mutated exclusively through [`Tpm::send`], which applies a batch of
//! [`Command`]s atomically and records them in the [`CommandLog`]. Replaying
//! a command log on a fresh TPM reproduces the same PCR values.

mod command;
mod event_log;
mod pcr;

pub use command::{Command, CommandLog, CommandLogEntry};
pub use event_log::{EventLog, EventLogEntry, EventType};
pub use pcr::{PcrId, PcrValues, TpmAlg, PCR_COUNT, TPM_MAX_HASH_ALG};

use log::debug;

use crate::action::ActionCoordinates;
use crate::error::TpmCommandReason;

/// PCR banks allocated by default.
pub const SUPPORTED_ALGORITHMS: [TpmAlg; 2] = [TpmAlg::Sha1, TpmAlg::Sha256];

/// Value of a PCR right after startup at `locality`.
///
/// Every PCR starts zeroed, except that PCR0 carries the startup locality
/// in its last byte.
pub fn initial_pcr_value(alg: TpmAlg, pcr: PcrId, locality: u8) -> Result<Vec<u8>, TpmCommandReason> {
    let size = alg
        .digest_size()
        .ok_or(TpmCommandReason::UnsupportedHashAlgorithm { alg })?;
    let mut value = vec![0u8; size];
    if pcr == 0 {
        value[size - 1] = locality;
    }
    Ok(value)
}

#[derive(Debug, Clone)]
pub struct Tpm {
    algorithms: Vec<TpmAlg>,
    pcr_values: PcrValues,
    locality: Option<u8>,
    event_log: EventLog,
    command_log: CommandLog,
    finished: bool,
}

impl Default for Tpm {
    fn default() -> Self {
        Self::new()
    }
}

impl Tpm {
    /// An uninitialized TPM with the [`SUPPORTED_ALGORITHMS`] banks.
    pub fn new() -> Self {
        Self {
            algorithms: SUPPORTED_ALGORITHMS.to_vec(),
            pcr_values: PcrValues::default(),
            locality: None,
            event_log: EventLog::default(),
            command_log: CommandLog::default(),
            finished: false,
        }
    }

    /// An uninitialized TPM with a custom set of hash banks.
    pub fn with_algorithms(algorithms: &[TpmAlg]) -> Result<Self, TpmCommandReason> {
        if let Some(alg) = algorithms
            .iter()
            .find(|alg| !alg.is_hash() || **alg > TPM_MAX_HASH_ALG)
        {
            return Err(TpmCommandReason::UnsupportedHashAlgorithm { alg: *alg });
        }
        let mut algorithms = algorithms.to_vec();
        algorithms.sort();
        algorithms.dedup();
        Ok(Self {
            algorithms,
            ..Self::new()
        })
    }

    /// Build a TPM with the default banks by replaying `log`.
    pub fn replay(log: &CommandLog) -> Result<Self, TpmCommandReason> {
        Self::replay_with(&SUPPORTED_ALGORITHMS, log)
    }

    pub fn replay_with(algorithms: &[TpmAlg], log: &CommandLog) -> Result<Self, TpmCommandReason> {
        let mut tpm = Self::with_algorithms(algorithms)?;
        for entry in log {
            tpm.send(vec![entry.command.clone()], entry.cause)?;
        }
        Ok(tpm)
    }

    pub fn algorithms(&self) -> &[TpmAlg] {
        &self.algorithms
    }

    pub fn is_initialized(&self) -> bool {
        self.locality.is_some()
    }

    pub fn locality(&self) -> Option<u8> {
        self.locality
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn pcr_values(&self) -> &PcrValues {
        &self.pcr_values
    }

    pub fn pcr_value(&self, pcr: PcrId, alg: TpmAlg) -> Result<&[u8], TpmCommandReason> {
        self.pcr_values.get(pcr, alg)
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn command_log(&self) -> &CommandLog {
        &self.command_log
    }

    /// Initialize at `locality` unless already initialized there.
    ///
    /// Initializing again at the same locality is a no-op; a different
    /// locality is an error.
    pub fn init_lazy(&mut self, locality: u8, cause: ActionCoordinates) -> Result<(), TpmCommandReason> {
        match self.locality {
            Some(current) if current == locality => Ok(()),
            Some(current) => Err(TpmCommandReason::AlreadyInitialized {
                current,
                requested: locality,
            }),
            None => self.send(vec![Command::Init { locality }], cause),
        }
    }

    /// Apply `commands` in order as one transaction.
    ///
    /// If any command fails, state is rolled back to before the batch and
    /// the error names the failing command. Only a fully applied batch is
    /// appended to the command log.
    pub fn send(&mut self, commands: Vec<Command>, cause: ActionCoordinates) -> Result<(), TpmCommandReason> {
        if self.finished {
            return Err(TpmCommandReason::Finished);
        }

        let saved_pcrs = self.pcr_values.clone();
        let saved_locality = self.locality;
        let saved_events = self.event_log.len();

        for (index, command) in commands.iter().enumerate() {
            if let Err(reason) = self.apply(command) {
                self.pcr_values = saved_pcrs;
                self.locality = saved_locality;
                self.event_log.truncate(saved_events);
                return Err(TpmCommandReason::CommandFailed {
                    index,
                    command: command.name(),
                    reason: Box::new(reason),
                });
            }
        }

        for command in commands {
            debug!("tpm: {} (cause {})", command.log_string(), cause);
            self.command_log.push(CommandLogEntry { command, cause });
        }
        Ok(())
    }

    /// Move to the terminal state; every later command fails.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    fn apply(&mut self, command: &Command) -> Result<(), TpmCommandReason> {
        match command {
            Command::Init { locality } => self.init(*locality),
            Command::Extend { pcr, alg, digest } => self.extend(*pcr, *alg, digest),
            Command::EventLogAdd(entry) => {
                self.event_log.push(entry.clone());
                Ok(())
            }
        }
    }

    fn init(&mut self, locality: u8) -> Result<(), TpmCommandReason> {
        if let Some(current) = self.locality {
            return Err(TpmCommandReason::AlreadyInitialized {
                current,
                requested: locality,
            });
        }
        let mut values = PcrValues::allocate(PCR_COUNT, &self.algorithms);
        for alg in &self.algorithms {
            values.set(0, *alg, initial_pcr_value(*alg, 0, locality)?)?;
        }
        self.pcr_values = values;
        self.locality = Some(locality);
        Ok(())
    }

    fn extend(&mut self, pcr: PcrId, alg: TpmAlg, digest: &[u8]) -> Result<(), TpmCommandReason> {
        let expected = alg
            .digest_size()
            .ok_or(TpmCommandReason::UnsupportedHashAlgorithm { alg })?;
        if digest.len() != expected {
            return Err(TpmCommandReason::DigestSizeMismatch {
                alg,
                expected,
                got: digest.len(),
            });
        }
        let old = self.pcr_values.get(pcr, alg)?;
        let new = alg.extend(old, digest)?;
        self.pcr_values.set(pcr, alg, new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn cause(step: usize) -> ActionCoordinates {
        ActionCoordinates {
            flow_index: 0,
            step_index: step,
            action_index: 0,
        }
    }

    fn extend_cmd(alg: TpmAlg, data: &[u8]) -> Command {
        Command::Extend {
            pcr: 0,
            alg,
            digest: alg.hash(data).unwrap(),
        }
    }

    #[test]
    fn test_uninitialized_get_fails() {
        let tpm = Tpm::new();
        assert!(matches!(
            tpm.pcr_value(0, TpmAlg::Sha256),
            Err(TpmCommandReason::PcrNotInitialized { pcr: 0 })
        ));
    }

    #[test]
    fn test_init_sets_locality_in_pcr0() {
        let mut tpm = Tpm::new();
        tpm.init_lazy(3, cause(0)).unwrap();
        let pcr0 = tpm.pcr_value(0, TpmAlg::Sha256).unwrap();
        assert_eq!(pcr0[31], 3);
        assert!(pcr0[..31].iter().all(|b| *b == 0));
        assert_eq!(tpm.pcr_value(1, TpmAlg::Sha1).unwrap(), &[0u8; 20]);
    }

    #[test]
    fn test_init_lazy_is_idempotent() {
        let mut tpm = Tpm::new();
        tpm.init_lazy(0, cause(0)).unwrap();
        tpm.init_lazy(0, cause(1)).unwrap();
        assert_eq!(tpm.command_log().len(), 1);
        assert!(matches!(
            tpm.init_lazy(3, cause(2)),
            Err(TpmCommandReason::AlreadyInitialized { current: 0, requested: 3 })
        ));
    }

    #[test]
    fn test_extend_known_value() {
        let mut tpm = Tpm::new();
        tpm.init_lazy(0, cause(0)).unwrap();
        tpm.send(vec![extend_cmd(TpmAlg::Sha256, b"abc")], cause(1))
            .unwrap();

        // SHA256(zeros(32) || SHA256("abc"))
        let mut buf = vec![0u8; 32];
        buf.extend_from_slice(&hex!(
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        ));
        assert_eq!(
            tpm.pcr_value(0, TpmAlg::Sha256).unwrap(),
            TpmAlg::Sha256.hash(&buf).unwrap().as_slice()
        );
        // Other banks untouched
        assert_eq!(tpm.pcr_value(0, TpmAlg::Sha1).unwrap(), &[0u8; 20]);
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let mut tpm = Tpm::new();
        tpm.init_lazy(0, cause(0)).unwrap();
        let before = tpm.pcr_values().clone();

        let err = tpm
            .send(
                vec![
                    extend_cmd(TpmAlg::Sha256, b"one"),
                    Command::Extend {
                        pcr: 0,
                        alg: TpmAlg::Sha1,
                        digest: vec![0u8; 3],
                    },
                ],
                cause(1),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            TpmCommandReason::CommandFailed {
                index: 1,
                command: "Extend",
                ..
            }
        ));
        assert_eq!(tpm.pcr_values(), &before);
        assert_eq!(tpm.command_log().len(), 1);
    }

    #[test]
    fn test_unallocated_bank_rejected() {
        let mut tpm = Tpm::new();
        tpm.init_lazy(0, cause(0)).unwrap();
        let err = tpm
            .send(vec![extend_cmd(TpmAlg::Sha384, b"x")], cause(1))
            .unwrap_err();
        match err {
            TpmCommandReason::CommandFailed { reason, .. } => assert!(matches!(
                *reason,
                TpmCommandReason::SlotNotInitialized { pcr: 0, alg: TpmAlg::Sha384 }
            )),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_finished_rejects_commands() {
        let mut tpm = Tpm::new();
        tpm.finish();
        assert!(matches!(
            tpm.init_lazy(0, cause(0)),
            Err(TpmCommandReason::Finished)
        ));
    }

    #[test]
    fn test_replay_is_deterministic() {
        let mut tpm = Tpm::new();
        tpm.init_lazy(3, cause(0)).unwrap();
        for (step, payload) in [b"first".as_slice(), b"second", b"third"].iter().enumerate() {
            let cmds = tpm
                .algorithms()
                .to_vec()
                .into_iter()
                .map(|alg| extend_cmd(alg, payload))
                .collect();
            tpm.send(cmds, cause(step + 1)).unwrap();
        }

        let first = Tpm::replay(tpm.command_log()).unwrap();
        let second = Tpm::replay(tpm.command_log()).unwrap();
        assert_eq!(first.pcr_values(), second.pcr_values());
        assert_eq!(first.pcr_values(), tpm.pcr_values());
        assert_eq!(first.command_log().len(), tpm.command_log().len());
    }

    #[test]
    fn test_with_algorithms_rejects_non_hash() {
        assert!(Tpm::with_algorithms(&[TpmAlg::Sha256, TpmAlg::Ecc]).is_err());
        let tpm = Tpm::with_algorithms(&[TpmAlg::Sha384, TpmAlg::Sha1, TpmAlg::Sha1]).unwrap();
        assert_eq!(tpm.algorithms(), &[TpmAlg::Sha1, TpmAlg::Sha384]);
    }
}
