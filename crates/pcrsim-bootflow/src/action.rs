// SPDX-License-Identifier: MIT OR Apache-2.0

//! Actions: the effects a step has on the simulation state

use std::fmt;

use log::warn;
use serde::Serialize;

use crate::data::{Actor, MeasuredData};
use crate::datasource::DataSource;
use crate::error::BootflowError;
use crate::flow::Flow;
use crate::state::State;
use crate::tpm::{Command, EventLogEntry, EventType, PcrId};
use crate::trustchain::TrustChainKind;

/// Position of an action within a run: which flow (counting switches),
/// which step of it, which action of the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ActionCoordinates {
    pub flow_index: usize,
    pub step_index: usize,
    pub action_index: usize,
}

impl fmt::Display for ActionCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "flow#{}:step#{}:action#{}",
            self.flow_index, self.step_index, self.action_index
        )
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    /// Replace the active flow and restart at its first step.
    SetFlow(Flow),
    /// Abort the run.
    Panic(String),
    Tpm(TpmAction),
}

#[derive(Debug, Clone)]
pub enum TpmAction {
    /// Start the TPM at `locality` unless it is already running there.
    InitLazy { locality: u8 },
    /// Measure the data into `pcr` in every allocated bank.
    Extend { pcr: PcrId, source: DataSource },
    /// Record the data's digest in the event log without extending.
    Event {
        pcr: PcrId,
        source: DataSource,
        description: String,
    },
}

/// What applying one action produced.
#[derive(Debug, Default)]
pub struct ActionOutcome {
    pub measured_data: Vec<MeasuredData>,
    /// Non-fatal problems
    pub issues: Vec<BootflowError>,
    pub set_flow: Option<Flow>,
}

impl Action {
    pub fn set_flow(flow: Flow) -> Self {
        Action::SetFlow(flow)
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Action::Panic(message.into())
    }

    pub fn init_tpm_lazy(locality: u8) -> Self {
        Action::Tpm(TpmAction::InitLazy { locality })
    }

    pub fn tpm_extend(pcr: PcrId, source: DataSource) -> Self {
        Action::Tpm(TpmAction::Extend { pcr, source })
    }

    pub fn tpm_event(pcr: PcrId, source: DataSource, description: impl Into<String>) -> Self {
        Action::Tpm(TpmAction::Event {
            pcr,
            source,
            description: description.into(),
        })
    }

    /// Apply the action; an `Err` aborts the run.
    pub fn apply(&self, state: &mut State, actor: &Actor) -> Result<ActionOutcome, BootflowError> {
        match self {
            Action::SetFlow(flow) => Ok(ActionOutcome {
                set_flow: Some(flow.clone()),
                ..ActionOutcome::default()
            }),
            Action::Panic(message) => Err(BootflowError::Panic {
                message: message.clone(),
            }),
            Action::Tpm(action) => action.apply(state, actor),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::SetFlow(flow) => write!(f, "SetFlow({})", flow.name()),
            Action::Panic(message) => write!(f, "Panic({:?})", message),
            Action::Tpm(action) => write!(f, "{}", action),
        }
    }
}

impl TpmAction {
    fn apply(&self, state: &mut State, actor: &Actor) -> Result<ActionOutcome, BootflowError> {
        match self {
            TpmAction::InitLazy { locality } => {
                state.tpm_mut()?.init_lazy(*locality, actor.coords)?;
                Ok(ActionOutcome::default())
            }
            TpmAction::Extend { pcr, source } => {
                let data = source.data(state)?;
                let bytes = data.bytes(state.artifacts())?;
                if bytes.is_empty() {
                    return Ok(ActionOutcome {
                        issues: vec![BootflowError::EmptyMeasurement {
                            what: source.to_string(),
                        }],
                        ..ActionOutcome::default()
                    });
                }
                let measured = MeasuredData {
                    data,
                    data_source: Some(source.clone()),
                    actor: actor.clone(),
                    trust_chain: TrustChainKind::Tpm,
                };
                let description = source.to_string();
                measure(state, *pcr, EventType::Extend, &bytes, &description, measured)
            }
            TpmAction::Event {
                pcr,
                source,
                description,
            } => {
                let resolved = source
                    .data(state)
                    .and_then(|data| data.bytes(state.artifacts()).map(|bytes| (data, bytes)));
                let (data, bytes) = match resolved {
                    Ok(found) => found,
                    Err(e) => {
                        warn!("event '{}' skipped: {}", description, e);
                        return Ok(ActionOutcome {
                            issues: vec![e],
                            ..ActionOutcome::default()
                        });
                    }
                };
                let measured = MeasuredData {
                    data,
                    data_source: Some(source.clone()),
                    actor: actor.clone(),
                    trust_chain: TrustChainKind::Tpm,
                };
                measure(state, *pcr, EventType::Informational, &bytes, description, measured)
            }
        }
    }
}

/// Send one batch of commands covering every bank of the TPM, then record
/// the measurement.
fn measure(
    state: &mut State,
    pcr: PcrId,
    event_type: EventType,
    bytes: &[u8],
    description: &str,
    measured: MeasuredData,
) -> Result<ActionOutcome, BootflowError> {
    let tpm = state.tpm_mut()?;
    let mut commands = Vec::with_capacity(tpm.algorithms().len() * 2);
    for alg in tpm.algorithms() {
        let digest = alg.hash(bytes)?;
        if event_type == EventType::Extend {
            commands.push(Command::Extend {
                pcr,
                alg: *alg,
                digest: digest.clone(),
            });
        }
        commands.push(Command::EventLogAdd(EventLogEntry {
            pcr,
            alg: *alg,
            digest,
            event_type,
            description: description.to_string(),
            measured: Some(measured.clone()),
        }));
    }
    tpm.send(commands, measured.actor.coords)?;

    state.add_measured_data(measured.clone());
    Ok(ActionOutcome {
        measured_data: vec![measured],
        ..ActionOutcome::default()
    })
}

impl fmt::Display for TpmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TpmAction::InitLazy { locality } => write!(f, "TPMInitLazy({})", locality),
            TpmAction::Extend { pcr, source } => write!(f, "TPMExtend(PCR{}, {})", pcr, source),
            TpmAction::Event {
                pcr,
                source,
                description,
            } => write!(f, "TPMEvent(PCR{}, {}, {:?})", pcr, source, description),
        }
    }
}
